//! ISO 15118 PnC operations on a charge point session
//!
//! On 1.6 connections the PnC extension is tunnelled through DataTransfer
//! with the reserved vendor id; each operation wraps its payload into the
//! envelope and unwraps the peer's answer.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use super::DataTransferResult;
use crate::centralsystem::session::ChargePointSession;
use crate::messages::iso15118::{
    self, CertificateHashDataChain, GetCertificateIdUse, InstallCertificateUse,
    PncCertificateSignedRequest, PncCertificateSignedResponse, PncDeleteCertificateRequest,
    PncDeleteCertificateResponse, PncGetInstalledCertificateIdsRequest,
    PncGetInstalledCertificateIdsResponse, PncInstallCertificateRequest,
    PncInstallCertificateResponse, PncTriggerKind, PncTriggerMessageRequest,
    PncTriggerMessageResponse, PNC_VENDOR_ID,
};
use crate::messages::security::CertificateHashData;
use crate::messages::OcppVersion;
use crate::rpc::RpcError;

impl ChargePointSession {
    /// One PnC round trip: wrap, send as DataTransfer, unwrap.
    async fn pnc_call<Req, Resp>(&self, message_id: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported(message_id));
        }
        let data = iso15118::encode_envelope(request)
            .map_err(|e| RpcError::SendFailed(format!("serialization failed: {}", e)))?;
        let DataTransferResult { status, data } = self
            .data_transfer(PNC_VENDOR_ID, Some(message_id.to_string()), Some(data))
            .await?;
        if status != "Accepted" {
            return Err(RpcError::CallError {
                code: status,
                description: format!("PnC {} refused", message_id),
            });
        }
        iso15118::decode_envelope(data.as_deref())
            .map_err(|e| RpcError::InvalidResponse(format!("failed to parse response: {}", e)))
    }

    /// Deliver a signed ISO 15118 certificate chain.
    pub async fn iso15118_certificate_signed(
        &self,
        certificate_chain: &str,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            "PnC CertificateSigned"
        );
        let request = PncCertificateSignedRequest {
            certificate_chain: certificate_chain.to_string(),
            certificate_type: None,
        };
        let response: PncCertificateSignedResponse =
            self.pnc_call("CertificateSigned", &request).await?;
        Ok(format!("{:?}", response.status))
    }

    pub async fn iso15118_delete_certificate(
        &self,
        certificate_hash_data: CertificateHashData,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            serial_number = certificate_hash_data.serial_number.as_str(),
            "PnC DeleteCertificate"
        );
        let request = PncDeleteCertificateRequest {
            certificate_hash_data,
        };
        let response: PncDeleteCertificateResponse =
            self.pnc_call("DeleteCertificate", &request).await?;
        Ok(format!("{:?}", response.status))
    }

    pub async fn iso15118_get_installed_certificate_ids(
        &self,
        certificate_type: Vec<GetCertificateIdUse>,
    ) -> Result<Vec<CertificateHashDataChain>, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            "PnC GetInstalledCertificateIds"
        );
        let request = PncGetInstalledCertificateIdsRequest { certificate_type };
        let response: PncGetInstalledCertificateIdsResponse =
            self.pnc_call("GetInstalledCertificateIds", &request).await?;
        Ok(response.certificate_hash_data_chain.unwrap_or_default())
    }

    pub async fn iso15118_install_certificate(
        &self,
        certificate_type: InstallCertificateUse,
        certificate_pem: &str,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            ?certificate_type,
            "PnC InstallCertificate"
        );
        let request = PncInstallCertificateRequest {
            certificate_type,
            certificate: certificate_pem.to_string(),
        };
        let response: PncInstallCertificateResponse =
            self.pnc_call("InstallCertificate", &request).await?;
        Ok(format!("{:?}", response.status))
    }

    /// Ask the charge point to produce an ISO 15118 CSR.
    pub async fn iso15118_trigger_sign_certificate(
        &self,
        kind: PncTriggerKind,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            ?kind,
            "PnC TriggerMessage"
        );
        let request = PncTriggerMessageRequest {
            requested_message: kind,
        };
        let response: PncTriggerMessageResponse =
            self.pnc_call("TriggerMessage", &request).await?;
        Ok(format!("{:?}", response.status))
    }
}
