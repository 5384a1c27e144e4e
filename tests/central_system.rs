//! Central-system dispatch and command-surface tests over an in-process
//! endpoint, without a WebSocket in the middle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use ocpp_stack::centralsystem::handler::ChargePointHandler;
use ocpp_stack::centralsystem::{
    BootInfo, CentralSystemEvents, ChargePointSession, IdTagDecision, RegisterOutcome,
    RegistrationVerdict, ResetKind, SessionRegistry, StartTransactionDecision,
    StartTransactionInfo, StopTransactionInfo, UpdateKind,
};
use ocpp_stack::config::{CentralSystemConfig, DuplicatePolicy};
use ocpp_stack::messages::OcppVersion;
use ocpp_stack::rpc::{OcppFrame, RpcEndpoint};

struct TestEvents {
    boot_verdict: RegistrationVerdict,
    sign_requests: AtomicUsize,
}

impl TestEvents {
    fn accepting() -> Arc<Self> {
        Arc::new(Self {
            boot_verdict: RegistrationVerdict::Accepted,
            sign_requests: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CentralSystemEvents for TestEvents {
    async fn authorize(&self, _charge_point_id: &str, id_tag: &str) -> IdTagDecision {
        if id_tag == "VALID" {
            IdTagDecision::accepted()
        } else {
            IdTagDecision::invalid()
        }
    }

    async fn boot_notification(
        &self,
        _charge_point_id: &str,
        _info: BootInfo,
    ) -> RegistrationVerdict {
        self.boot_verdict
    }

    async fn start_transaction(
        &self,
        _charge_point_id: &str,
        _info: StartTransactionInfo,
    ) -> StartTransactionDecision {
        StartTransactionDecision {
            transaction_id: 1234,
            id_tag_info: IdTagDecision::accepted(),
        }
    }

    async fn stop_transaction(
        &self,
        _charge_point_id: &str,
        _info: StopTransactionInfo,
    ) -> Option<IdTagDecision> {
        None
    }

    async fn sign_certificate(&self, _charge_point_id: &str, _csr_pem: &str) -> bool {
        self.sign_requests.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn iso15118_sign_certificate(&self, _charge_point_id: &str, _csr_pem: &str) -> bool {
        true
    }
}

struct Harness {
    session: Arc<ChargePointSession>,
    endpoint: Arc<RpcEndpoint>,
    outbound: mpsc::UnboundedReceiver<String>,
}

fn harness(events: Arc<TestEvents>) -> Harness {
    let config = Arc::new(CentralSystemConfig::default());
    let registry = SessionRegistry::shared();
    let (tx, outbound) = mpsc::unbounded_channel();
    let endpoint = Arc::new(RpcEndpoint::new("CP1", tx));
    let session = match registry.register(
        "CP1",
        OcppVersion::V16,
        Arc::clone(&endpoint),
        None,
        Duration::from_secs(5),
        DuplicatePolicy::RejectDuplicate,
    ) {
        RegisterOutcome::New(session) => session,
        _ => panic!("expected new session"),
    };
    let handler = Arc::new(ChargePointHandler::new(
        Arc::clone(&session),
        events,
        config,
    ));
    endpoint.register_listener(handler);
    endpoint.start();
    Harness {
        session,
        endpoint,
        outbound,
    }
}

async fn roundtrip(harness: &mut Harness, frame: &str) -> OcppFrame {
    harness.endpoint.process_incoming(frame);
    let reply = harness.outbound.recv().await.unwrap();
    OcppFrame::parse(&reply).unwrap()
}

/// Drive the session to `Accepted` the way a real peer would.
async fn accept(harness: &mut Harness) {
    let reply = roundtrip(
        harness,
        r#"[2,"boot","BootNotification",{"chargePointVendor":"Vendor","chargePointModel":"Model"}]"#,
    )
    .await;
    assert!(reply.is_call_result());
    assert!(harness.session.is_accepted());
}

#[tokio::test]
async fn pending_session_rejects_core_calls_until_boot_is_accepted() {
    let mut harness = harness(TestEvents::accepting());
    assert!(!harness.session.is_accepted());

    // A StartTransaction before boot acceptance is refused.
    let reply = roundtrip(
        &mut harness,
        r#"[2,"1","StartTransaction",{"connectorId":1,"idTag":"VALID","meterStart":0,"timestamp":"2024-06-01T10:00:00Z"}]"#,
    )
    .await;
    match reply {
        OcppFrame::CallError { error_code, .. } => assert_eq!(error_code, "SecurityError"),
        other => panic!("expected CallError, got {:?}", other),
    }

    // Heartbeat is allowed while pending.
    let reply = roundtrip(&mut harness, r#"[2,"2","Heartbeat",{}]"#).await;
    assert!(reply.is_call_result());

    // Boot notification flips the session to accepted.
    let reply = roundtrip(
        &mut harness,
        r#"[2,"3","BootNotification",{"chargePointVendor":"Vendor","chargePointModel":"Model"}]"#,
    )
    .await;
    match reply {
        OcppFrame::CallResult { payload, .. } => {
            assert_eq!(payload["status"], "Accepted");
            assert_eq!(payload["interval"], 300);
            assert!(payload.get("currentTime").is_some());
        }
        other => panic!("expected CallResult, got {:?}", other),
    }
    assert!(harness.session.is_accepted());

    // Now transactions go through.
    let reply = roundtrip(
        &mut harness,
        r#"[2,"4","StartTransaction",{"connectorId":1,"idTag":"VALID","meterStart":7,"timestamp":"2024-06-01T10:00:00Z"}]"#,
    )
    .await;
    match reply {
        OcppFrame::CallResult { payload, .. } => {
            assert_eq!(payload["transactionId"], 1234);
            assert_eq!(payload["idTagInfo"]["status"], "Accepted");
        }
        other => panic!("expected CallResult, got {:?}", other),
    }
}

#[tokio::test]
async fn authorize_maps_decision_onto_the_wire() {
    let mut harness = harness(TestEvents::accepting());
    accept(&mut harness).await;

    let reply = roundtrip(&mut harness, r#"[2,"1","Authorize",{"idTag":"VALID"}]"#).await;
    match reply {
        OcppFrame::CallResult { payload, .. } => {
            assert_eq!(payload["idTagInfo"]["status"], "Accepted");
            // Absent optional fields stay absent.
            assert!(payload["idTagInfo"].get("expiryDate").is_none());
        }
        other => panic!("expected CallResult, got {:?}", other),
    }

    let reply = roundtrip(&mut harness, r#"[2,"2","Authorize",{"idTag":"NOPE"}]"#).await;
    match reply {
        OcppFrame::CallResult { payload, .. } => {
            assert_eq!(payload["idTagInfo"]["status"], "Invalid");
        }
        other => panic!("expected CallResult, got {:?}", other),
    }
}

#[tokio::test]
async fn decode_failures_are_classified() {
    let mut harness = harness(TestEvents::accepting());
    accept(&mut harness).await;

    // Missing required field.
    let reply = roundtrip(&mut harness, r#"[2,"1","Authorize",{}]"#).await;
    match reply {
        OcppFrame::CallError { error_code, .. } => {
            assert_eq!(error_code, "OccurenceConstraintViolation")
        }
        other => panic!("expected CallError, got {:?}", other),
    }

    // Wrong JSON type.
    let reply = roundtrip(&mut harness, r#"[2,"2","Authorize",{"idTag":42}]"#).await;
    match reply {
        OcppFrame::CallError { error_code, .. } => {
            assert_eq!(error_code, "TypeConstraintViolation")
        }
        other => panic!("expected CallError, got {:?}", other),
    }

    // Unknown action.
    let reply = roundtrip(&mut harness, r#"[2,"3","FlyToMoon",{}]"#).await;
    match reply {
        OcppFrame::CallError { error_code, .. } => assert_eq!(error_code, "NotImplemented"),
        other => panic!("expected CallError, got {:?}", other),
    }
}

#[tokio::test]
async fn pnc_sign_certificate_rides_data_transfer() {
    let events = TestEvents::accepting();
    let mut harness = harness(Arc::clone(&events));
    accept(&mut harness).await;

    let inner = serde_json::json!({ "csr": "-----BEGIN CERTIFICATE REQUEST-----" }).to_string();
    let frame = serde_json::json!([
        2,
        "9",
        "DataTransfer",
        {
            "vendorId": "org.openchargealliance.iso15118-pnc",
            "messageId": "SignCertificate",
            "data": inner,
        }
    ])
    .to_string();

    let reply = roundtrip(&mut harness, &frame).await;
    match reply {
        OcppFrame::CallResult { payload, .. } => {
            assert_eq!(payload["status"], "Accepted");
            let data: Value =
                serde_json::from_str(payload["data"].as_str().unwrap()).unwrap();
            assert_eq!(data["status"], "Accepted");
        }
        other => panic!("expected CallResult, got {:?}", other),
    }
    // Routed to the PnC handler, not the plain sign-certificate one.
    assert_eq!(events.sign_requests.load(Ordering::SeqCst), 0);
}

/// Answers server-initiated calls the way a charge point would.
fn scripted_charge_point(
    mut outbound: mpsc::UnboundedReceiver<String>,
    endpoint: Arc<RpcEndpoint>,
) {
    tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            let frame = match OcppFrame::parse(&text) {
                Ok(frame) => frame,
                Err(_) => continue,
            };
            let OcppFrame::Call {
                unique_id, action, ..
            } = frame
            else {
                continue;
            };
            let payload: Value = match action.as_str() {
                "Reset" => serde_json::json!({ "status": "Accepted" }),
                "GetConfiguration" => serde_json::json!({
                    "configurationKey": [
                        { "key": "HeartbeatInterval", "readonly": false, "value": "300" }
                    ],
                    "unknownKey": ["Bogus"],
                }),
                "CertificateSigned" => serde_json::json!({ "status": "Accepted" }),
                "SendLocalList" => serde_json::json!({ "status": "Accepted" }),
                _ => serde_json::json!({}),
            };
            let reply = OcppFrame::CallResult { unique_id, payload };
            endpoint.process_incoming(&reply.serialize());
        }
    });
}

#[tokio::test]
async fn session_commands_round_trip_through_the_endpoint() {
    let harness = harness(TestEvents::accepting());
    let Harness {
        session,
        endpoint,
        outbound,
    } = harness;
    scripted_charge_point(outbound, endpoint);

    assert_eq!(session.reset(ResetKind::Soft).await.unwrap(), "Accepted");

    let configuration = session
        .get_configuration(Some(vec!["HeartbeatInterval".into(), "Bogus".into()]))
        .await
        .unwrap();
    assert_eq!(configuration.configuration_key.len(), 1);
    assert_eq!(configuration.configuration_key[0].key, "HeartbeatInterval");
    assert_eq!(configuration.unknown_key, vec!["Bogus".to_string()]);

    assert_eq!(
        session
            .certificate_signed("-----BEGIN CERTIFICATE-----")
            .await
            .unwrap(),
        "Accepted"
    );

    assert_eq!(
        session
            .send_local_list(3, UpdateKind::Full, None)
            .await
            .unwrap(),
        "Accepted"
    );
}

#[tokio::test]
async fn v201_only_operations_refuse_a_v16_session() {
    let harness = harness(TestEvents::accepting());
    let error = harness
        .session
        .get_variables(vec![("OCPPCommCtrlr".into(), "HeartbeatInterval".into())])
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ocpp_stack::RpcError::UnsupportedVersion(_)
    ));
}
