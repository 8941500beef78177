//! Client hello extension policy.
//!
//! RFC 7366, 3: a server that receives an encrypt-then-MAC request and then
//! selects a stream or AEAD cipher suite MUST NOT send the extension back.
//! Some appliances echo it anyway and abort the handshake, so the client never
//! requests it.

use std::collections::BTreeMap;
use std::sync::OnceLock;

/// TLS extension type to extension body
pub type ClientExtensions = BTreeMap<u16, Vec<u8>>;

/// `server_name` (RFC 6066)
pub const EXT_SERVER_NAME: u16 = 0;
/// `supported_groups` (RFC 8422)
pub const EXT_SUPPORTED_GROUPS: u16 = 10;
/// `ec_point_formats` (RFC 8422)
pub const EXT_EC_POINT_FORMATS: u16 = 11;
/// `signature_algorithms` (RFC 5246)
pub const EXT_SIGNATURE_ALGORITHMS: u16 = 13;
/// `encrypt_then_mac` (RFC 7366)
pub const EXT_ENCRYPT_THEN_MAC: u16 = 22;
/// `extended_master_secret` (RFC 7627)
pub const EXT_EXTENDED_MASTER_SECRET: u16 = 23;
/// `session_ticket` (RFC 5077)
pub const EXT_SESSION_TICKET: u16 = 35;
/// `renegotiation_info` (RFC 5746)
pub const EXT_RENEGOTIATION_INFO: u16 = 0xff01;

/// Extensions an OpenSSL TLS 1.2 client advertises out of the box.
///
/// Bodies are left empty; the TLS library fills them in. Only presence is
/// controllable through the policy.
pub fn library_defaults() -> ClientExtensions {
    [
        EXT_SERVER_NAME,
        EXT_SUPPORTED_GROUPS,
        EXT_EC_POINT_FORMATS,
        EXT_SIGNATURE_ALGORITHMS,
        EXT_ENCRYPT_THEN_MAC,
        EXT_EXTENDED_MASTER_SECRET,
        EXT_SESSION_TICKET,
        EXT_RENEGOTIATION_INFO,
    ]
    .into_iter()
    .map(|ext| (ext, Vec::new()))
    .collect()
}

/// Remove encrypt-then-MAC from a base extension set
pub fn strip_encrypt_then_mac(mut extensions: ClientExtensions) -> ClientExtensions {
    extensions.remove(&EXT_ENCRYPT_THEN_MAC);
    extensions
}

/// Memoized advertised extension set for one client
#[derive(Debug)]
pub struct ExtensionPolicy {
    base: ClientExtensions,
    advertised: OnceLock<ClientExtensions>,
}

impl ExtensionPolicy {
    /// Policy over an explicit base set
    pub fn new(base: ClientExtensions) -> Self {
        Self {
            base,
            advertised: OnceLock::new(),
        }
    }

    /// Extensions to put in the client hello, computed on first use
    pub fn advertised(&self) -> &ClientExtensions {
        self.advertised.get_or_init(|| {
            let advertised = strip_encrypt_then_mac(self.base.clone());
            tracing::debug!(
                extensions = ?advertised.keys().collect::<Vec<_>>(),
                "Client extensions"
            );
            advertised
        })
    }

    /// Check if an extension will be advertised
    pub fn advertises(&self, extension: u16) -> bool {
        self.advertised().contains_key(&extension)
    }
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self::new(library_defaults())
    }
}
