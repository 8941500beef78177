//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (for the `homeconnect` binary)

use std::path::PathBuf;
use std::time::Duration;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{HomeConnectError, Result};
use crate::protocol::{DeviceIdentity, READY_TIMEOUT_SECS};
use crate::transport::{PskCredentials, DEFAULT_PORT};

/// Standard alphabet, padding optional
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Appliance connection settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Client identity and session settings
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            HomeConnectError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| HomeConnectError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config dir>/homeconnect/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("homeconnect").join("config.toml"))
    }

    /// Apply environment variable overrides
    pub fn with_env(mut self) -> Self {
        if let Ok(host) = std::env::var("HC_HOST") {
            self.device.host = host;
        }
        if let Ok(port) = std::env::var("HC_PORT") {
            if let Ok(port) = port.parse() {
                self.device.port = port;
            }
        }
        if let Ok(key) = std::env::var("HC_KEY") {
            self.device.key = key;
        }
        if let Ok(identity) = std::env::var("HC_IDENTITY") {
            self.device.identity = identity;
        }

        if let Ok(device_id) = std::env::var("HC_DEVICE_ID") {
            self.client.device_id = device_id;
        }
        if let Ok(secs) = std::env::var("HC_READY_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.client.ready_timeout_secs = secs;
            }
        }
        if let Ok(path) = std::env::var("SSLKEYLOGFILE") {
            if !path.is_empty() {
                self.client.key_log_file = Some(PathBuf::from(path));
            }
        }

        self
    }

    /// Check that a connection can be attempted
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(HomeConnectError::Config("device.host is required".to_string()));
        }
        if self.device.port == 0 {
            return Err(HomeConnectError::Config("device.port must be non-zero".to_string()));
        }
        if self.device.identity.is_empty() {
            return Err(HomeConnectError::Config(
                "device.identity must not be empty".to_string(),
            ));
        }
        self.device.psk()?;
        if self.client.ready_timeout_secs == 0 {
            return Err(HomeConnectError::Config(
                "client.ready_timeout_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Appliance connection configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Appliance host name or IP address
    pub host: String,

    /// TLS port
    pub port: u16,

    /// Base64 pre-shared key from the appliance profile
    pub key: String,

    /// PSK identity
    pub identity: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            key: String::new(),
            identity: "Client_identity".to_string(),
        }
    }
}

impl DeviceConfig {
    /// Decode the pre-shared key.
    ///
    /// Accepts the URL-safe and standard alphabets, with or without padding.
    pub fn psk(&self) -> Result<Vec<u8>> {
        let normalized: String = self
            .key
            .trim()
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                c => c,
            })
            .collect();

        let key = KEY_ENGINE.decode(normalized)?;
        if key.is_empty() {
            return Err(HomeConnectError::Config("device.key is required".to_string()));
        }
        Ok(key)
    }

    /// PSK credentials for the TLS connector
    pub fn credentials(&self) -> Result<PskCredentials> {
        Ok(PskCredentials::new(self.identity.clone(), self.psk()?))
    }
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("key", &"<redacted>")
            .field("identity", &self.identity)
            .finish()
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Device type reported to the appliance
    pub device_type: String,

    /// Device name reported to the appliance
    pub device_name: String,

    /// Stable device ID reported to the appliance
    pub device_id: String,

    /// Seconds to wait for the session handshake
    pub ready_timeout_secs: u64,

    /// Append TLS secrets to this file (NSS key log format)
    pub key_log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let identity = DeviceIdentity::default();
        Self {
            device_type: identity.device_type,
            device_name: identity.device_name,
            device_id: identity.device_id,
            ready_timeout_secs: READY_TIMEOUT_SECS,
            key_log_file: None,
        }
    }
}

impl ClientConfig {
    /// Identity sent in the `/ei/initialValues` response
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            device_type: self.device_type.clone(),
            device_name: self.device_name.clone(),
            device_id: self.device_id.clone(),
        }
    }

    /// Handshake deadline
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.port, 443);
        assert_eq!(config.device.identity, "Client_identity");
        assert_eq!(config.client.device_type, "Application");
        assert_eq!(config.client.ready_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [device]
            host = "192.168.1.50"
            key = "AAECAwQFBgcICQoLDA0ODw"

            [client]
            device_name = "kitchen"
            ready_timeout_secs = 5
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.device.host, "192.168.1.50");
        assert_eq!(config.device.port, 443);
        assert_eq!(config.client.device_name, "kitchen");
        assert_eq!(config.client.device_id, "deadbeef");
        assert_eq!(config.client.ready_timeout_secs, 5);
        assert_eq!(config.device.psk().unwrap(), (0u8..16).collect::<Vec<_>>());
        config.validate().unwrap();
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device]\nhost = \"oven.local\"\nport = 8443\nkey = \"AQID\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.device.host, "oven.local");
        assert_eq!(config.device.port, 8443);

        assert!(matches!(
            Config::from_file("/nonexistent/homeconnect.toml"),
            Err(HomeConnectError::Config(_))
        ));
    }

    #[test]
    fn test_psk_alphabets_and_padding() {
        let device = |key: &str| DeviceConfig {
            key: key.to_string(),
            ..Default::default()
        };

        // 0xfb 0xff encodes with both alphabet-specific characters
        assert_eq!(device("-_8").psk().unwrap(), vec![0xfb, 0xff]);
        assert_eq!(device("+/8=").psk().unwrap(), vec![0xfb, 0xff]);
        assert_eq!(device("+/8").psk().unwrap(), vec![0xfb, 0xff]);

        assert!(device("").psk().is_err());
        assert!(device("not base64!").psk().is_err());
    }

    #[test]
    fn test_identity_from_client_config() {
        let client = ClientConfig {
            device_id: "0badcafe".to_string(),
            ..Default::default()
        };
        let identity = client.identity();
        assert_eq!(identity.device_id, "0badcafe");
        assert_eq!(identity.device_type, "Application");
    }

    #[test]
    fn test_debug_redacts_key() {
        let device = DeviceConfig {
            key: "c2VjcmV0".to_string(),
            ..Default::default()
        };
        assert!(!format!("{device:?}").contains("c2VjcmV0"));
    }
}
