//! Stack configuration
//!
//! Both roles are configured with plain serde structs, loadable from TOML.
//! Every field has a default so partial files work.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Policy applied when a charge point connects while a session with the
/// same identifier is still registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DuplicatePolicy {
    /// Keep the existing session and refuse the new connection.
    RejectDuplicate,
    /// Evict the existing session and accept the new connection.
    ReplaceOnDuplicate,
}

/// Central system (server role) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CentralSystemConfig {
    /// Listen URL, e.g. `ws://0.0.0.0:8080/ocpp`. The path is the prefix
    /// charge points append their identifier to.
    pub listen_url: String,
    /// Timeout for server-initiated calls, in milliseconds.
    pub call_request_timeout_ms: u64,
    /// WebSocket PING interval in seconds (0 disables).
    pub websocket_ping_interval_secs: u64,
    /// Heartbeat interval advertised to accepted charge points, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Interval advertised to pending/rejected charge points, in seconds.
    pub boot_notification_retry_interval_secs: u64,
    /// Require HTTP Basic credentials on upgrade.
    pub http_basic_authent: bool,
    /// Behavior on duplicate charge point identifiers.
    pub duplicate_policy: DuplicatePolicy,
    /// Grace delay before a disconnected session is removed, in
    /// milliseconds.
    pub session_close_grace_ms: u64,
    /// Capacity of the per-peer inbound request queue.
    pub incoming_requests_limit: usize,
    /// TLS material handed to the transport, when serving `wss://`.
    pub tls: Option<TlsServerConfig>,
}

impl Default for CentralSystemConfig {
    fn default() -> Self {
        Self {
            listen_url: "ws://0.0.0.0:8080/ocpp".to_string(),
            call_request_timeout_ms: 30_000,
            websocket_ping_interval_secs: 60,
            heartbeat_interval_secs: 300,
            boot_notification_retry_interval_secs: 10,
            http_basic_authent: false,
            duplicate_policy: DuplicatePolicy::RejectDuplicate,
            session_close_grace_ms: 50,
            incoming_requests_limit: 64,
            tls: None,
        }
    }
}

impl CentralSystemConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn call_request_timeout(&self) -> Duration {
        Duration::from_millis(self.call_request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn boot_notification_retry_interval(&self) -> Duration {
        Duration::from_secs(self.boot_notification_retry_interval_secs)
    }

    pub fn session_close_grace(&self) -> Duration {
        Duration::from_millis(self.session_close_grace_ms)
    }
}

/// Charge point (client role) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChargePointConfig {
    /// Central system base URL, e.g. `ws://cs.example.com:8080/ocpp`.
    /// The charge point identifier is appended as the last path segment.
    pub connect_url: String,
    /// Charge point identifier (1–20 ASCII characters).
    pub identifier: String,
    /// HTTP Basic password (`AuthorizationKey`); the user name is the
    /// identifier.
    pub basic_auth_password: Option<String>,
    /// Reconnect retry interval in seconds.
    pub retry_interval_secs: u64,
    /// Timeout for charge-point-initiated calls, in milliseconds.
    pub call_request_timeout_ms: u64,
    /// Heartbeat interval fallback when the central system does not
    /// communicate one, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Retry interval between boot notification attempts while not
    /// accepted, in seconds.
    pub boot_notification_retry_interval_secs: u64,
    /// Attempts for transaction-related messages before giving up.
    pub transaction_message_attempts: u32,
    /// Spacing between transaction message attempts, in seconds.
    pub transaction_message_retry_interval_secs: u64,
    /// Identity advertised in `BootNotification`.
    pub charge_point_vendor: String,
    pub charge_point_model: String,
    pub charge_point_serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub meter_type: Option<String>,
    pub meter_serial_number: Option<String>,
    /// Number of physical connectors.
    pub number_of_connectors: u32,
    /// Active OCPP security profile (0–3).
    pub security_profile: u8,
    /// TLS trust settings for `wss://` connections.
    pub tls: Option<TlsClientConfig>,
}

impl Default for ChargePointConfig {
    fn default() -> Self {
        Self {
            connect_url: "ws://127.0.0.1:8080/ocpp".to_string(),
            identifier: "CP".to_string(),
            basic_auth_password: None,
            retry_interval_secs: 5,
            call_request_timeout_ms: 30_000,
            heartbeat_interval_secs: 300,
            boot_notification_retry_interval_secs: 10,
            transaction_message_attempts: 3,
            transaction_message_retry_interval_secs: 10,
            charge_point_vendor: "Open OCPP".to_string(),
            charge_point_model: "Simulated CP".to_string(),
            charge_point_serial_number: None,
            firmware_version: None,
            iccid: None,
            imsi: None,
            meter_type: None,
            meter_serial_number: None,
            number_of_connectors: 1,
            security_profile: 0,
            tls: None,
        }
    }
}

impl ChargePointConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn call_request_timeout(&self) -> Duration {
        Duration::from_millis(self.call_request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn boot_notification_retry_interval(&self) -> Duration {
        Duration::from_secs(self.boot_notification_retry_interval_secs)
    }

    pub fn transaction_message_retry_interval(&self) -> Duration {
        Duration::from_secs(self.transaction_message_retry_interval_secs)
    }
}

/// TLS material for the server side of the transport.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsServerConfig {
    /// Server certificate (PEM file path).
    pub server_certificate: String,
    /// Server certificate private key (PEM file path).
    pub server_certificate_private_key: String,
    pub server_certificate_private_key_passphrase: Option<String>,
    /// CA signing chain for the server certificate.
    pub server_certificate_ca: Option<String>,
    pub tlsv12_cipher_list: Option<String>,
    pub tlsv13_cipher_list: Option<String>,
    pub ecdh_curve: Option<String>,
    /// Require and verify a client certificate.
    pub client_certificate_authent: bool,
}

/// TLS trust settings for the client side of the transport.
///
/// Every relaxation defaults to off and must be opted into explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsClientConfig {
    /// CA trust store (PEM file path). Empty uses the system store.
    pub ca_store: Option<String>,
    pub client_certificate: Option<String>,
    pub client_certificate_private_key: Option<String>,
    pub client_certificate_private_key_passphrase: Option<String>,
    pub allow_selfsigned_certificates: bool,
    pub allow_expired_certificates: bool,
    pub accept_untrusted_certificates: bool,
    pub skip_server_name_check: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CentralSystemConfig::default();
        assert_eq!(config.call_request_timeout(), Duration::from_secs(30));
        assert_eq!(config.duplicate_policy, DuplicatePolicy::RejectDuplicate);
        assert!(config.tls.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = CentralSystemConfig::from_toml_str(
            r#"
            listen_url = "ws://0.0.0.0:9000/ocpp"
            duplicate_policy = "ReplaceOnDuplicate"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_url, "ws://0.0.0.0:9000/ocpp");
        assert_eq!(config.duplicate_policy, DuplicatePolicy::ReplaceOnDuplicate);
        assert_eq!(config.heartbeat_interval_secs, 300);
    }

    #[test]
    fn charge_point_toml_with_tls_section() {
        let config = ChargePointConfig::from_toml_str(
            r#"
            connect_url = "wss://cs.example.com/ocpp"
            identifier = "CP001"
            basic_auth_password = "secret"

            [tls]
            ca_store = "/etc/ocpp/ca.pem"
            "#,
        )
        .unwrap();
        assert_eq!(config.identifier, "CP001");
        let tls = config.tls.unwrap();
        assert_eq!(tls.ca_store.as_deref(), Some("/etc/ocpp/ca.pem"));
        assert!(!tls.allow_selfsigned_certificates);
        assert!(!tls.skip_server_name_check);
    }
}
