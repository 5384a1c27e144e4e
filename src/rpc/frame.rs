//! OCPP-J message framing
//!
//! Implements the OCPP-J (JSON over WebSocket) transport envelope. The
//! framing is identical across OCPP versions:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! Parsing is strict: the arity must match the message type exactly, ids
//! and action names must be strings, payloads and error details must be
//! objects. Anything else is a framing error that the endpoint answers
//! with a `ProtocolError` carrying an empty unique id.

use serde_json::Value;
use thiserror::Error;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// A parsed OCPP-J frame (version-agnostic transport envelope).
#[derive(Debug, Clone)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

/// Errors raised while decoding an OCPP-J frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("frame is not a JSON array")]
    NotAnArray,
    #[error("message type is not an unsigned integer")]
    InvalidMessageType,
    #[error("unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("wrong frame arity: expected {expected}, got {got}")]
    WrongArity { expected: usize, got: usize },
    #[error("field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}

impl OcppFrame {
    // ── Parsing ────────────────────────────────────────────

    /// Parse a raw JSON text into an `OcppFrame`.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let arr = value.as_array().ok_or(FrameError::NotAnArray)?;
        if arr.is_empty() {
            return Err(FrameError::NotAnArray);
        }

        let msg_type = arr[0].as_u64().ok_or(FrameError::InvalidMessageType)?;
        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(arr),
            MSG_TYPE_CALL_RESULT => Self::parse_call_result(arr),
            MSG_TYPE_CALL_ERROR => Self::parse_call_error(arr),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }

    fn expect_arity(arr: &[Value], expected: usize) -> Result<(), FrameError> {
        if arr.len() != expected {
            return Err(FrameError::WrongArity {
                expected,
                got: arr.len(),
            });
        }
        Ok(())
    }

    fn string_field(value: &Value, what: &'static str) -> Result<String, FrameError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or(FrameError::FieldTypeMismatch(what))
    }

    fn object_field(value: &Value, what: &'static str) -> Result<Value, FrameError> {
        if value.is_object() {
            Ok(value.clone())
        } else {
            Err(FrameError::FieldTypeMismatch(what))
        }
    }

    fn parse_call(arr: &[Value]) -> Result<Self, FrameError> {
        Self::expect_arity(arr, 4)?;
        Ok(Self::Call {
            unique_id: Self::string_field(&arr[1], "uniqueId must be a string")?,
            action: Self::string_field(&arr[2], "action must be a string")?,
            payload: Self::object_field(&arr[3], "payload must be an object")?,
        })
    }

    fn parse_call_result(arr: &[Value]) -> Result<Self, FrameError> {
        Self::expect_arity(arr, 3)?;
        Ok(Self::CallResult {
            unique_id: Self::string_field(&arr[1], "uniqueId must be a string")?,
            payload: Self::object_field(&arr[2], "payload must be an object")?,
        })
    }

    fn parse_call_error(arr: &[Value]) -> Result<Self, FrameError> {
        Self::expect_arity(arr, 5)?;
        Ok(Self::CallError {
            unique_id: Self::string_field(&arr[1], "uniqueId must be a string")?,
            error_code: Self::string_field(&arr[2], "errorCode must be a string")?,
            error_description: Self::string_field(&arr[3], "errorDescription must be a string")?,
            error_details: Self::object_field(&arr[4], "errorDetails must be an object")?,
        })
    }

    // ── Serialization ──────────────────────────────────────

    /// Serialize this frame to its JSON wire form.
    pub fn serialize(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        // serde_json::to_string on a Value never fails
        serde_json::to_string(&arr).unwrap()
    }

    // ── Helpers ────────────────────────────────────────────

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Build a `CallError` frame with empty details.
    pub fn error(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(Default::default()),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }

    pub fn is_call_result(&self) -> bool {
        matches!(self, Self::CallResult { .. })
    }

    pub fn is_call_error(&self) -> bool {
        matches!(self, Self::CallError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_call() {
        let text = r#"[2,"abc123","BootNotification",{"chargePointVendor":"Vendor","chargePointModel":"Model"}]"#;
        let frame = OcppFrame::parse(text).unwrap();
        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(action, "BootNotification");
                assert_eq!(payload["chargePointVendor"], "Vendor");
            }
            _ => panic!("Expected Call frame"),
        }
    }

    #[test]
    fn parse_call_result() {
        let text = r#"[3,"abc123",{"currentTime":"2024-01-01T00:00:00Z"}]"#;
        let frame = OcppFrame::parse(text).unwrap();
        match frame {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(payload["currentTime"], "2024-01-01T00:00:00Z");
            }
            _ => panic!("Expected CallResult frame"),
        }
    }

    #[test]
    fn parse_call_error() {
        let text = r#"[4,"abc123","NotImplemented","Action not supported",{}]"#;
        let frame = OcppFrame::parse(text).unwrap();
        match frame {
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(error_code, "NotImplemented");
                assert_eq!(error_description, "Action not supported");
            }
            _ => panic!("Expected CallError frame"),
        }
    }

    #[test]
    fn arity_is_exact_per_message_type() {
        // Call with 3 elements
        assert!(OcppFrame::parse(r#"[2,"id","Heartbeat"]"#).is_err());
        // Call with 5 elements
        assert!(OcppFrame::parse(r#"[2,"id","Heartbeat",{},{}]"#).is_err());
        // CallResult with 4 elements
        assert!(OcppFrame::parse(r#"[3,"id",{},{}]"#).is_err());
        // CallError with 4 elements
        assert!(OcppFrame::parse(r#"[4,"id","GenericError","msg"]"#).is_err());
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(OcppFrame::parse(r#"[2,"id","Heartbeat",[]]"#).is_err());
        assert!(OcppFrame::parse(r#"[2,"id","Heartbeat",null]"#).is_err());
        assert!(OcppFrame::parse(r#"[3,"id","not-an-object"]"#).is_err());
        assert!(OcppFrame::parse(r#"[4,"id","GenericError","msg",42]"#).is_err());
    }

    #[test]
    fn non_json_and_wrong_shapes_are_rejected() {
        assert!(OcppFrame::parse("not-json").is_err());
        assert!(OcppFrame::parse(r#"{"msg":"nope"}"#).is_err());
        assert!(OcppFrame::parse(r#"[]"#).is_err());
        assert!(OcppFrame::parse(r#"[5,"id",{}]"#).is_err());
        assert!(OcppFrame::parse(r#"["2","id","Heartbeat",{}]"#).is_err());
        assert!(OcppFrame::parse(r#"[2,17,"Heartbeat",{}]"#).is_err());
    }

    #[test]
    fn roundtrip_call() {
        let frame = OcppFrame::Call {
            unique_id: "id1".into(),
            action: "Heartbeat".into(),
            payload: serde_json::json!({}),
        };
        let json = frame.serialize();
        let parsed = OcppFrame::parse(&json).unwrap();
        assert!(parsed.is_call());
        assert_eq!(parsed.unique_id(), "id1");
    }

    #[test]
    fn roundtrip_call_error() {
        let frame = OcppFrame::error("id3", "GenericError", "Something went wrong");
        let json = frame.serialize();
        let parsed = OcppFrame::parse(&json).unwrap();
        assert!(parsed.is_call_error());
        assert_eq!(parsed.unique_id(), "id3");
    }

    #[test]
    fn empty_payload_serializes_as_empty_object() {
        let frame = OcppFrame::CallResult {
            unique_id: "7".into(),
            payload: serde_json::json!({}),
        };
        assert_eq!(frame.serialize(), r#"[3,"7",{}]"#);
    }
}
