//! Protocol version registry and action tables.
//!
//! Wire payload records come from `rust_ocpp` for the standard 1.6 and
//! 2.0.1 message sets; the 1.6 security extension and the ISO 15118
//! Plug-and-Charge profile have their own records here.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod iso15118;
pub mod security;

/// Supported OCPP protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    /// OCPP 1.6 (JSON / OCPP-J)
    V16,
    /// OCPP 2.0.1
    V201,
}

impl OcppVersion {
    /// WebSocket subprotocol identifier, used in `Sec-WebSocket-Protocol`.
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::V16 => "ocpp1.6",
            Self::V201 => "ocpp2.0.1",
        }
    }

    pub fn from_subprotocol(s: &str) -> Option<Self> {
        match s.trim() {
            "ocpp1.6" => Some(Self::V16),
            "ocpp2.0.1" => Some(Self::V201),
            _ => None,
        }
    }

    /// Supported versions, newest first.
    pub const ALL: &'static [OcppVersion] = &[Self::V201, Self::V16];

    pub fn version_string(&self) -> &'static str {
        match self {
            Self::V16 => "1.6",
            Self::V201 => "2.0.1",
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OCPP {}", self.version_string())
    }
}

/// Actions a central system may send to a charge point (OCPP 1.6 core,
/// security extension included).
pub fn is_cs_to_cp_action(action: &str) -> bool {
    matches!(
        action,
        "CancelReservation"
            | "CertificateSigned"
            | "ChangeAvailability"
            | "ChangeConfiguration"
            | "ClearCache"
            | "ClearChargingProfile"
            | "DeleteCertificate"
            | "ExtendedTriggerMessage"
            | "GetCompositeSchedule"
            | "GetConfiguration"
            | "GetDiagnostics"
            | "GetInstalledCertificateIds"
            | "GetLocalListVersion"
            | "GetLog"
            | "InstallCertificate"
            | "RemoteStartTransaction"
            | "RemoteStopTransaction"
            | "ReserveNow"
            | "Reset"
            | "SendLocalList"
            | "SetChargingProfile"
            | "SignedUpdateFirmware"
            | "TriggerMessage"
            | "UnlockConnector"
            | "UpdateFirmware"
    ) || action == "DataTransfer"
}

/// Actions a charge point may send to a central system (OCPP 1.6 core,
/// security extension included).
pub fn is_cp_to_cs_action(action: &str) -> bool {
    matches!(
        action,
        "Authorize"
            | "BootNotification"
            | "DataTransfer"
            | "DiagnosticsStatusNotification"
            | "FirmwareStatusNotification"
            | "Heartbeat"
            | "LogStatusNotification"
            | "MeterValues"
            | "SecurityEventNotification"
            | "SignCertificate"
            | "SignedFirmwareStatusNotification"
            | "StartTransaction"
            | "StatusNotification"
            | "StopTransaction"
    )
}

/// Server-initiated actions a charge point accepts while its registration
/// status is `Pending`.
pub fn allowed_while_pending(action: &str) -> bool {
    matches!(
        action,
        "ChangeConfiguration"
            | "GetConfiguration"
            | "TriggerMessage"
            | "ExtendedTriggerMessage"
            | "Reset"
    )
}

/// Charge-point-initiated actions permitted while not yet accepted.
pub fn originates_while_pending(action: &str) -> bool {
    matches!(
        action,
        "BootNotification" | "Heartbeat" | "StatusNotification"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprotocol_mapping_round_trips() {
        for version in OcppVersion::ALL {
            assert_eq!(
                OcppVersion::from_subprotocol(version.subprotocol()),
                Some(*version)
            );
        }
        assert_eq!(OcppVersion::from_subprotocol("ocpp9.9"), None);
    }

    #[test]
    fn direction_tables_are_disjoint_apart_from_data_transfer() {
        for action in ["Reset", "UnlockConnector", "CertificateSigned", "GetLog"] {
            assert!(is_cs_to_cp_action(action));
            assert!(!is_cp_to_cs_action(action));
        }
        for action in ["BootNotification", "StartTransaction", "SignCertificate"] {
            assert!(is_cp_to_cs_action(action));
            assert!(!is_cs_to_cp_action(action));
        }
        assert!(is_cs_to_cp_action("DataTransfer"));
        assert!(is_cp_to_cs_action("DataTransfer"));
    }

    #[test]
    fn pending_whitelist_is_restrictive() {
        assert!(allowed_while_pending("ChangeConfiguration"));
        assert!(allowed_while_pending("TriggerMessage"));
        assert!(!allowed_while_pending("RemoteStartTransaction"));
        assert!(!allowed_while_pending("UpdateFirmware"));
    }
}
