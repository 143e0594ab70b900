//! Configuration handling for the echo client.
//!
//! Settings come from an optional YAML file, then environment variables,
//! then command-line flags, each layer overriding the previous one.

use anyhow::{Context, Result};
use echo_session::{DEFAULT_CA_FILE, DEFAULT_CERT_FILE, DEFAULT_DH_FILE, DEFAULT_KEY_FILE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Echo client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// TLS configuration
    pub tls: TlsConfig,
    /// Per-stage timeouts
    pub timeouts: TimeoutConfig,
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to CA certificate file used to verify the server
    pub ca_file: String,
    /// Certificate chain file name inside the credential folder
    pub cert_file: String,
    /// Private key file name inside the credential folder
    pub key_file: String,
    /// DH parameters file name inside the credential folder
    pub dh_file: String,
    /// Name to verify the server certificate against (defaults to the host)
    pub server_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_file: DEFAULT_CA_FILE.to_string(),
            cert_file: DEFAULT_CERT_FILE.to_string(),
            key_file: DEFAULT_KEY_FILE.to_string(),
            dh_file: DEFAULT_DH_FILE.to_string(),
            server_name: None,
        }
    }
}

/// Timeouts, in humantime notation ("10s", "500ms")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-endpoint connect timeout
    pub connect: String,
    /// TLS handshake timeout
    pub handshake: String,
    /// Timeout for each of the write and the read
    pub io: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: "10s".to_string(),
            handshake: "10s".to_string(),
            io: "10s".to_string(),
        }
    }
}

impl TimeoutConfig {
    /// Parsed connect timeout
    pub fn connect(&self) -> Result<Duration> {
        parse_timeout("connect", &self.connect)
    }

    /// Parsed handshake timeout
    pub fn handshake(&self) -> Result<Duration> {
        parse_timeout("handshake", &self.handshake)
    }

    /// Parsed I/O timeout
    pub fn io(&self) -> Result<Duration> {
        parse_timeout("io", &self.io)
    }
}

fn parse_timeout(name: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .with_context(|| format!("Invalid {} timeout {:?}", name, value))
}

impl EchoConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let mut config = match std::fs::read_to_string(config_path) {
            Ok(content) => {
                let config: EchoConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", config_path))?;
                info!("Loaded configuration from {:?}", config_path);
                config
            }
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", config_path);
                Self::default()
            }
        };

        config.apply_environment_overrides();

        // Surface bad durations at load time rather than mid-exchange
        config.timeouts.connect()?;
        config.timeouts.handshake()?;
        config.timeouts.io()?;

        info!(
            "Final client configuration: ca_file={}, cert_file={}, key_file={}, dh_file={}, timeouts={}/{}/{}",
            config.tls.ca_file,
            config.tls.cert_file,
            config.tls.key_file,
            config.tls.dh_file,
            config.timeouts.connect,
            config.timeouts.handshake,
            config.timeouts.io
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        if let Ok(ca_file) = std::env::var("TLS_ECHO_CA_FILE") {
            info!("CA file overridden by environment: {}", ca_file);
            self.tls.ca_file = ca_file;
        }

        if let Ok(server_name) = std::env::var("TLS_ECHO_SERVER_NAME") {
            info!("Server name overridden by environment: {}", server_name);
            self.tls.server_name = Some(server_name);
        }

        if let Ok(timeout) = std::env::var("TLS_ECHO_CONNECT_TIMEOUT") {
            info!("Connect timeout overridden by environment: {}", timeout);
            self.timeouts.connect = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::NamedTempFile;

    // Loading reads process-wide environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_default_config() {
        let config = EchoConfig::default();
        assert_eq!(config.tls.ca_file, "certs/server.crt");
        assert_eq!(config.tls.cert_file, "server.crt");
        assert_eq!(config.tls.key_file, "server.key");
        assert_eq!(config.tls.dh_file, "dh512.pem");
        assert_eq!(config.timeouts.connect().unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_from_file() {
        let _env = env_lock();
        let yaml_content = r#"
tls:
  ca_file: /etc/echo/ca.pem
  key_file: client.key
  server_name: echo.internal
timeouts:
  handshake: 2s
  io: 500ms
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = EchoConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.tls.ca_file, "/etc/echo/ca.pem");
        assert_eq!(config.tls.key_file, "client.key");
        assert_eq!(config.tls.cert_file, "server.crt");
        assert_eq!(config.tls.server_name.as_deref(), Some("echo.internal"));
        assert_eq!(config.timeouts.handshake().unwrap(), Duration::from_secs(2));
        assert_eq!(config.timeouts.io().unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let config = EchoConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.tls.dh_file, "dh512.pem");
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let _env = env_lock();
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"timeouts:\n  io: soon\n")
            .unwrap();

        let err = EchoConfig::load_from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("io timeout"));
    }

    #[test]
    fn test_environment_overrides_file() {
        let _env = env_lock();
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"tls:\n  ca_file: /etc/echo/ca.pem\ntimeouts:\n  connect: 4s\n")
            .unwrap();

        std::env::set_var("TLS_ECHO_CA_FILE", "/run/secrets/ca.pem");
        std::env::set_var("TLS_ECHO_CONNECT_TIMEOUT", "750ms");
        let result = EchoConfig::load_from_file(temp_file.path());
        std::env::remove_var("TLS_ECHO_CA_FILE");
        std::env::remove_var("TLS_ECHO_CONNECT_TIMEOUT");

        let config = result.unwrap();
        assert_eq!(config.tls.ca_file, "/run/secrets/ca.pem");
        assert_eq!(config.timeouts.connect().unwrap(), Duration::from_millis(750));
        assert_eq!(config.timeouts.handshake().unwrap(), Duration::from_secs(10));
    }
}
