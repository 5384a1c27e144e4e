//! OCPP 1.6 configuration key store
//!
//! Backs `GetConfiguration`/`ChangeConfiguration`. Keys carry read-only,
//! reboot-required and write-only attributes; write-only values (the
//! `AuthorizationKey`) are never reported back. `SecurityProfile` may
//! only increase.

use dashmap::DashMap;

use crate::config::ChargePointConfig;

/// Outcome of a `ChangeConfiguration` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeConfigurationStatus {
    Accepted,
    Rejected,
    RebootRequired,
    NotSupported,
}

/// One reported configuration key.
#[derive(Debug, Clone)]
pub struct ConfigKeyValue {
    pub key: String,
    pub readonly: bool,
    /// `None` for write-only keys.
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
struct ConfigEntry {
    value: String,
    readonly: bool,
    reboot_required: bool,
    write_only: bool,
    /// Value must parse as a non-negative integer.
    numeric: bool,
}

impl ConfigEntry {
    fn numeric(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            readonly: false,
            reboot_required: false,
            write_only: false,
            numeric: true,
        }
    }

    fn boolean(value: bool) -> Self {
        Self {
            value: value.to_string(),
            readonly: false,
            reboot_required: false,
            write_only: false,
            numeric: false,
        }
    }

    fn text(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            readonly: false,
            reboot_required: false,
            write_only: false,
            numeric: false,
        }
    }

    fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    fn reboot(mut self) -> Self {
        self.reboot_required = true;
        self
    }

    fn hidden(mut self) -> Self {
        self.write_only = true;
        self
    }
}

/// Thread-safe store of the OCPP configuration keys.
pub struct OcppConfigStore {
    entries: DashMap<String, ConfigEntry>,
}

impl OcppConfigStore {
    /// Seed the key set from the stack configuration.
    pub fn new(config: &ChargePointConfig) -> Self {
        let entries = DashMap::new();
        let mut seed = |key: &str, entry: ConfigEntry| {
            entries.insert(key.to_string(), entry);
        };

        // Core profile
        seed("AuthorizationCacheEnabled", ConfigEntry::boolean(true));
        seed("AuthorizeRemoteTxRequests", ConfigEntry::boolean(false));
        seed("ClockAlignedDataInterval", ConfigEntry::numeric("0"));
        seed("ConnectionTimeOut", ConfigEntry::numeric("60"));
        seed(
            "HeartbeatInterval",
            ConfigEntry::numeric(config.heartbeat_interval_secs.to_string()),
        );
        seed("LocalAuthListEnabled", ConfigEntry::boolean(true));
        seed("MeterValueSampleInterval", ConfigEntry::numeric("60"));
        seed(
            "MeterValuesSampledData",
            ConfigEntry::text("Energy.Active.Import.Register"),
        );
        seed(
            "NumberOfConnectors",
            ConfigEntry::numeric(config.number_of_connectors.to_string()).read_only(),
        );
        seed("ResetRetries", ConfigEntry::numeric("1"));
        seed(
            "StopTransactionOnEVSideDisconnect",
            ConfigEntry::boolean(true),
        );
        seed("StopTransactionOnInvalidId", ConfigEntry::boolean(true));
        seed(
            "TransactionMessageAttempts",
            ConfigEntry::numeric(config.transaction_message_attempts.to_string()),
        );
        seed(
            "TransactionMessageRetryInterval",
            ConfigEntry::numeric(config.transaction_message_retry_interval_secs.to_string()),
        );
        seed(
            "UnlockConnectorOnEVSideDisconnect",
            ConfigEntry::boolean(true),
        );
        // The ping interval only applies when the socket is set up.
        seed(
            "WebSocketPingInterval",
            ConfigEntry::numeric("60").reboot(),
        );

        // Security extension
        seed(
            "AuthorizationKey",
            ConfigEntry::text(config.basic_auth_password.clone().unwrap_or_default()).hidden(),
        );
        seed(
            "CertificateSignedMaxChainSize",
            ConfigEntry::numeric("10000").read_only(),
        );
        seed(
            "CertificateStoreMaxLength",
            ConfigEntry::numeric("50").read_only(),
        );
        seed("CpoName", ConfigEntry::text(""));
        seed(
            "SecurityProfile",
            ConfigEntry::numeric(config.security_profile.to_string()),
        );
        seed(
            "SupportedFileTransferProtocols",
            ConfigEntry::text("FTP,FTPS,HTTP,HTTPS").read_only(),
        );
        seed("AdditionalRootCertificateCheck", ConfigEntry::boolean(false));

        Self { entries }
    }

    /// Report keys for `GetConfiguration`. With no filter, every key is
    /// reported. Write-only keys never expose their value.
    pub fn get(&self, keys: Option<&[String]>) -> (Vec<ConfigKeyValue>, Vec<String>) {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        match keys {
            Some(keys) => {
                for key in keys {
                    match self.entries.get(key) {
                        Some(entry) => known.push(Self::report(key, entry.value())),
                        None => unknown.push(key.clone()),
                    }
                }
            }
            None => {
                for entry in self.entries.iter() {
                    known.push(Self::report(entry.key(), entry.value()));
                }
                known.sort_by(|a, b| a.key.cmp(&b.key));
            }
        }
        (known, unknown)
    }

    fn report(key: &str, entry: &ConfigEntry) -> ConfigKeyValue {
        ConfigKeyValue {
            key: key.to_string(),
            readonly: entry.readonly,
            value: (!entry.write_only).then(|| entry.value.clone()),
        }
    }

    /// Apply a `ChangeConfiguration` request.
    pub fn change(&self, key: &str, value: &str) -> ChangeConfigurationStatus {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return ChangeConfigurationStatus::NotSupported;
        };
        if entry.readonly {
            return ChangeConfigurationStatus::Rejected;
        }
        if entry.numeric && value.parse::<u64>().is_err() {
            return ChangeConfigurationStatus::Rejected;
        }

        // The security profile can only be raised, never lowered.
        if key == "SecurityProfile" {
            let current: u8 = entry.value.parse().unwrap_or(0);
            match value.parse::<u8>() {
                Ok(requested) if requested >= current && requested <= 3 => {}
                _ => return ChangeConfigurationStatus::Rejected,
            }
        }

        entry.value = value.to_string();
        if entry.reboot_required {
            ChangeConfigurationStatus::RebootRequired
        } else {
            ChangeConfigurationStatus::Accepted
        }
    }

    /// Current value, `None` for unknown keys. Write-only values are
    /// readable here, for the stack's own use.
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn value_as_u64(&self, key: &str) -> Option<u64> {
        self.value_of(key).and_then(|v| v.parse().ok())
    }
}
