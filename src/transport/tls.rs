//! TLS 1.2 pre-shared-key transport.
//!
//! Appliances authenticate local clients with a PSK instead of certificates.
//! The connector advertises the extension set chosen by an
//! [`ExtensionPolicy`] and can export session secrets in NSS key log format
//! for traffic inspection.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use openssl::error::ErrorStack;
use openssl::ssl::{SslConnector, SslMethod, SslOptions, SslVerifyMode, SslVersion};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use super::extensions::{
    ClientExtensions, ExtensionPolicy, EXT_ENCRYPT_THEN_MAC, EXT_SERVER_NAME, EXT_SESSION_TICKET,
};
use crate::error::{HomeConnectError, Result};

/// `SSL_OP_NO_ENCRYPT_THEN_MAC`, not exported by the openssl crate
const SSL_OP_NO_ENCRYPT_THEN_MAC: u32 = 1 << 19;

/// Every cipher suite keyed by a pre-shared key
const PSK_CIPHER_LIST: &str = "PSK";

/// PSK identity and secret
#[derive(Clone)]
pub struct PskCredentials {
    identity: String,
    key: Vec<u8>,
}

impl PskCredentials {
    /// Create credentials
    pub fn new(identity: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            identity: identity.into(),
            key,
        }
    }

    /// PSK identity
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Write the identity as a C string and the key into OpenSSL's buffers
    fn fill(&self, identity_out: &mut [u8], psk_out: &mut [u8]) -> Option<usize> {
        let identity = self.identity.as_bytes();
        if identity.len() >= identity_out.len() || self.key.len() > psk_out.len() {
            return None;
        }

        identity_out[..identity.len()].copy_from_slice(identity);
        identity_out[identity.len()] = 0;
        psk_out[..self.key.len()].copy_from_slice(&self.key);
        Some(self.key.len())
    }
}

impl fmt::Debug for PskCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PskCredentials")
            .field("identity", &self.identity)
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .finish()
    }
}

/// OpenSSL options that suppress extensions missing from `advertised`
pub fn ssl_options_for(advertised: &ClientExtensions) -> SslOptions {
    let mut options = SslOptions::empty();
    if !advertised.contains_key(&EXT_ENCRYPT_THEN_MAC) {
        options |= SslOptions::from_bits_retain(SSL_OP_NO_ENCRYPT_THEN_MAC.into());
    }
    if !advertised.contains_key(&EXT_SESSION_TICKET) {
        options |= SslOptions::NO_TICKET;
    }
    options
}

/// Client connector for TLS-PSK appliances
pub struct PskConnector {
    connector: SslConnector,
    policy: ExtensionPolicy,
}

impl PskConnector {
    /// Build a connector.
    ///
    /// With `key_log` set, every session secret line is appended to that file.
    pub fn new(
        credentials: PskCredentials,
        policy: ExtensionPolicy,
        key_log: Option<PathBuf>,
    ) -> Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;

        builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;
        builder.set_cipher_list(PSK_CIPHER_LIST)?;
        // No certificates with PSK suites
        builder.set_verify(SslVerifyMode::NONE);
        builder.set_options(ssl_options_for(policy.advertised()));

        builder.set_psk_client_callback(move |_ssl, _hint, identity_out, psk_out| {
            credentials
                .fill(identity_out, psk_out)
                .ok_or_else(ErrorStack::get)
        });

        if let Some(path) = key_log {
            tracing::warn!("Exporting TLS secrets to {}", path.display());
            builder.set_keylog_callback(move |_ssl, line| append_key_log(&path, line));
        }

        Ok(Self {
            connector: builder.build(),
            policy,
        })
    }

    /// Extension policy in use
    pub fn policy(&self) -> &ExtensionPolicy {
        &self.policy
    }

    /// Open a TCP connection and complete the TLS-PSK handshake
    pub async fn connect(&self, host: &str, port: u16) -> Result<SslStream<TcpStream>> {
        let tcp = TcpStream::connect((host, port)).await.map_err(|e| {
            HomeConnectError::Transport(format!("TCP connect to {host}:{port} failed: {e}"))
        })?;
        tcp.set_nodelay(true)?;

        // SNI carries host names only
        let sni = self.policy.advertises(EXT_SERVER_NAME) && host.parse::<IpAddr>().is_err();
        let ssl = self
            .connector
            .configure()?
            .use_server_name_indication(sni)
            .verify_hostname(false)
            .into_ssl(host)?;

        let mut stream = SslStream::new(ssl, tcp)?;
        Pin::new(&mut stream).connect().await.map_err(|e| {
            HomeConnectError::Transport(format!("TLS-PSK handshake with {host} failed: {e}"))
        })?;

        tracing::info!(
            host,
            port,
            cipher = ?stream.ssl().current_cipher().map(|c| c.name()),
            "TLS-PSK session established"
        );

        Ok(stream)
    }
}

impl fmt::Debug for PskConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PskConnector")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn append_key_log(path: &Path, line: &str) {
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{line}"));

    if let Err(e) = written {
        tracing::warn!("Failed to write key log {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::extensions::library_defaults;

    #[test]
    fn test_options_follow_policy() {
        let policy = ExtensionPolicy::default();
        let options = ssl_options_for(policy.advertised());

        assert!(options.contains(SslOptions::from_bits_retain(
            SSL_OP_NO_ENCRYPT_THEN_MAC.into()
        )));
        assert!(!options.contains(SslOptions::NO_TICKET));

        let options = ssl_options_for(&library_defaults());
        assert!(options.is_empty());
    }

    #[test]
    fn test_fill_writes_c_string_identity() {
        let credentials = PskCredentials::new("Client_identity", vec![1, 2, 3]);
        let mut identity = [0xffu8; 32];
        let mut psk = [0u8; 16];

        assert_eq!(credentials.fill(&mut identity, &mut psk), Some(3));
        assert_eq!(&identity[..16], b"Client_identity\0");
        assert_eq!(&psk[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_fill_rejects_oversized_values() {
        let credentials = PskCredentials::new("Client_identity", vec![0; 8]);
        assert_eq!(credentials.fill(&mut [0u8; 15], &mut [0u8; 8]), None);
        assert_eq!(credentials.fill(&mut [0u8; 32], &mut [0u8; 7]), None);
    }

    #[test]
    fn test_debug_hides_key() {
        let credentials = PskCredentials::new("id", vec![0xaa; 32]);
        let debug = format!("{credentials:?}");
        assert!(debug.contains("<32 bytes>"));
        assert!(!debug.contains("170"));
    }

    #[test]
    fn test_connector_builds() {
        let credentials = PskCredentials::new("Client_identity", vec![7; 32]);
        let connector = PskConnector::new(credentials, ExtensionPolicy::default(), None).unwrap();
        assert!(!connector.policy().advertises(EXT_ENCRYPT_THEN_MAC));
    }

    #[test]
    fn test_key_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.log");

        append_key_log(&path, "CLIENT_RANDOM aa bb");
        append_key_log(&path, "CLIENT_RANDOM cc dd");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "CLIENT_RANDOM aa bb\nCLIENT_RANDOM cc dd\n");
    }
}
