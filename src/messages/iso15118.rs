//! ISO 15118 Plug-and-Charge messages for OCPP 1.6
//!
//! On OCPP 1.6 the PnC extension rides inside `DataTransfer` frames with
//! vendor id `org.openchargealliance.iso15118-pnc`: the `messageId` field
//! carries the logical action name and `data` the JSON-encoded payload.
//! This module defines the payload records and the envelope helpers.

use serde::{Deserialize, Serialize};

use super::security::{CertificateHashData, HashAlgorithm};

/// DataTransfer vendor id reserved for the ISO 15118 PnC extension.
pub const PNC_VENDOR_ID: &str = "org.openchargealliance.iso15118-pnc";

// ── Shared data types ──────────────────────────────────────────

/// OCSP request data for one certificate of the EV contract chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcspRequestData {
    pub hash_algorithm: HashAlgorithm,
    pub issuer_name_hash: String,
    pub issuer_key_hash: String,
    pub serial_number: String,
    #[serde(rename = "responderURL")]
    pub responder_url: String,
}

/// Trust domains for PnC certificate installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallCertificateUse {
    V2GRootCertificate,
    MORootCertificate,
}

/// Certificate kinds listable through PnC `GetInstalledCertificateIds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetCertificateIdUse {
    V2GRootCertificate,
    MORootCertificate,
    V2GCertificateChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateAction {
    Install,
    Update,
}

// ── Authorize (CP → CS) ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncAuthorizeRequest {
    /// Contract certificate chain, PEM, when not previously installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    pub id_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso15118_certificate_hash_data: Option<Vec<OcspRequestData>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PncAuthorizationStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizeCertificateStatus {
    Accepted,
    SignatureError,
    CertificateExpired,
    CertificateRevoked,
    NoCertificateAvailable,
    CertChainError,
    ContractCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncIdTokenInfo {
    pub status: PncAuthorizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_expiry_date_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncAuthorizeResponse {
    pub id_token_info: PncIdTokenInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_status: Option<AuthorizeCertificateStatus>,
}

// ── Get15118EVCertificate (CP → CS) ────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Get15118EvCertificateRequest {
    #[serde(rename = "iso15118SchemaVersion")]
    pub iso15118_schema_version: String,
    pub action: CertificateAction,
    /// Raw EXI stream from the EV, Base64 encoded.
    pub exi_request: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Iso15118EvCertificateStatus {
    Accepted,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Get15118EvCertificateResponse {
    pub status: Iso15118EvCertificateStatus,
    pub exi_response: String,
}

// ── GetCertificateStatus (CP → CS) ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCertificateStatusRequest {
    pub ocsp_request_data: OcspRequestData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetCertificateStatusKind {
    Accepted,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCertificateStatusResponse {
    pub status: GetCertificateStatusKind,
    /// DER encoded OCSP response, Base64 encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocsp_result: Option<String>,
}

// ── SignCertificate (CP → CS) ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncSignCertificateRequest {
    pub csr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_type: Option<PncCertificateType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PncCertificateType {
    ChargingStationCertificate,
    V2GCertificate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncSignCertificateResponse {
    pub status: super::security::GenericStatus,
}

// ── CertificateSigned (CS → CP) ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncCertificateSignedRequest {
    pub certificate_chain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_type: Option<PncCertificateType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncCertificateSignedResponse {
    pub status: super::security::GenericStatus,
}

// ── InstallCertificate / DeleteCertificate / GetInstalledCertificateIds (CS → CP)

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncInstallCertificateRequest {
    pub certificate_type: InstallCertificateUse,
    pub certificate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncInstallCertificateResponse {
    pub status: super::security::InstallCertificateStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncDeleteCertificateRequest {
    pub certificate_hash_data: CertificateHashData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncDeleteCertificateResponse {
    pub status: super::security::DeleteCertificateStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncGetInstalledCertificateIdsRequest {
    pub certificate_type: Vec<GetCertificateIdUse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateHashDataChain {
    pub certificate_type: GetCertificateIdUse,
    pub certificate_hash_data: CertificateHashData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_certificate_hash_data: Option<Vec<CertificateHashData>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncGetInstalledCertificateIdsResponse {
    pub status: super::security::GetInstalledCertificateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_hash_data_chain: Option<Vec<CertificateHashDataChain>>,
}

// ── TriggerMessage (CS → CP) ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PncTriggerKind {
    SignChargingStationCertificate,
    SignV2GCertificate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncTriggerMessageRequest {
    pub requested_message: PncTriggerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PncTriggerMessageResponse {
    pub status: super::security::TriggerMessageStatus,
}

// ── DataTransfer envelope helpers ──────────────────────────────

/// Serialize a PnC payload into the `data` string of a DataTransfer frame.
pub fn encode_envelope<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(payload)
}

/// Parse the `data` string of an inbound PnC DataTransfer frame.
pub fn decode_envelope<T: serde::de::DeserializeOwned>(
    data: Option<&str>,
) -> Result<T, serde_json::Error> {
    serde_json::from_str(data.unwrap_or("{}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::security::GenericStatus;

    #[test]
    fn ocsp_request_data_uses_upper_case_url_wire_name() {
        let data = OcspRequestData {
            hash_algorithm: HashAlgorithm::SHA256,
            issuer_name_hash: "nh".into(),
            issuer_key_hash: "kh".into(),
            serial_number: "01".into(),
            responder_url: "https://ocsp.example.com".into(),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("responderURL").is_some());
        assert!(json.get("responderUrl").is_none());
    }

    #[test]
    fn envelope_round_trips() {
        let request = PncSignCertificateRequest {
            csr: "-----BEGIN CERTIFICATE REQUEST-----".into(),
            certificate_type: Some(PncCertificateType::ChargingStationCertificate),
        };
        let data = encode_envelope(&request).unwrap();
        let back: PncSignCertificateRequest = decode_envelope(Some(&data)).unwrap();
        assert_eq!(back.csr, request.csr);
    }

    #[test]
    fn missing_envelope_data_fails_for_required_fields() {
        let decoded: Result<PncSignCertificateRequest, _> = decode_envelope(None);
        assert!(decoded.is_err());
    }

    #[test]
    fn authorize_response_omits_absent_certificate_status() {
        let response = PncAuthorizeResponse {
            id_token_info: PncIdTokenInfo {
                status: PncAuthorizationStatus::Accepted,
                cache_expiry_date_time: None,
            },
            certificate_status: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("certificateStatus").is_none());
        assert_eq!(json["idTokenInfo"]["status"], "Accepted");
    }

    #[test]
    fn generic_status_is_shared_with_security_module() {
        let response = PncCertificateSignedResponse {
            status: GenericStatus::Accepted,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap()["status"],
            "Accepted"
        );
    }
}
