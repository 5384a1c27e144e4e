//! RPC error codes and error types
//!
//! `ErrorCode` is the closed OCPP-J set used on the wire. `CallError` is
//! what a call handler returns to produce a CALLERROR frame. `RpcError` is
//! what a caller of [`RpcEndpoint::call`](super::RpcEndpoint::call) gets
//! back on failure.

use std::fmt;

use thiserror::Error;

/// Closed set of OCPP-J error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurenceConstraintViolation => "OccurenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        }
    }

    /// Parse a wire error code. Unknown codes yield `None`; callers keep
    /// the original text when they need to surface it.
    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "NotImplemented" => Self::NotImplemented,
            "NotSupported" => Self::NotSupported,
            "InternalError" => Self::InternalError,
            "ProtocolError" => Self::ProtocolError,
            "SecurityError" => Self::SecurityError,
            "FormationViolation" => Self::FormationViolation,
            "PropertyConstraintViolation" => Self::PropertyConstraintViolation,
            "OccurenceConstraintViolation" => Self::OccurenceConstraintViolation,
            "TypeConstraintViolation" => Self::TypeConstraintViolation,
            "GenericError" => Self::GenericError,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a call handler; rendered as a CALLERROR frame.
#[derive(Debug, Clone)]
pub struct CallError {
    pub code: ErrorCode,
    pub description: String,
}

impl CallError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn not_implemented(action: &str) -> Self {
        Self::new(ErrorCode::NotImplemented, format!("Unknown action: {}", action))
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, description)
    }

    /// Default error for handler failures that carry no explicit code.
    pub fn generic(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::GenericError, description)
    }

    pub fn security(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::SecurityError, description)
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

/// Failure surfaced to the originator of an outbound call.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("peer not connected")]
    NotConnected,
    #[error("failed to send: {0}")]
    SendFailed(String),
    #[error("call timed out")]
    Timeout,
    #[error("endpoint stopped")]
    Stopped,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("CallError {code}: {description}")]
    CallError { code: String, description: String },
    #[error("unsupported for negotiated version: {0}")]
    UnsupportedVersion(String),
}

/// Classify a serde decode failure into the OCPP validation error codes.
///
/// Structural problems are `FormationViolation`, wrong JSON types are
/// `TypeConstraintViolation`, out-of-range values (unknown enum variants)
/// are `PropertyConstraintViolation` and missing required fields are
/// `OccurenceConstraintViolation`.
pub fn classify_decode_error(err: &serde_json::Error) -> ErrorCode {
    let message = err.to_string();
    if message.contains("missing field") {
        ErrorCode::OccurenceConstraintViolation
    } else if message.contains("unknown variant") {
        ErrorCode::PropertyConstraintViolation
    } else if message.contains("invalid type") || message.contains("invalid value") {
        ErrorCode::TypeConstraintViolation
    } else {
        ErrorCode::FormationViolation
    }
}

/// Decode a call payload into a typed request record.
pub fn decode_payload<T: serde::de::DeserializeOwned>(
    payload: &serde_json::Value,
) -> Result<T, CallError> {
    if !payload.is_object() {
        return Err(CallError::new(
            ErrorCode::FormationViolation,
            "payload is not an object",
        ));
    }
    serde_json::from_value(payload.clone())
        .map_err(|e| CallError::new(classify_decode_error(&e), e.to_string()))
}

/// Encode a typed response record into a call result payload.
///
/// A failure here means the stack produced a response that does not
/// serialize, which is an internal fault by definition.
pub fn encode_payload<T: serde::Serialize>(response: &T) -> Result<serde_json::Value, CallError> {
    serde_json::to_value(response).map_err(|e| CallError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Probe {
        #[allow(dead_code)]
        connector_id: u32,
        #[allow(dead_code)]
        status: Status,
    }

    #[derive(Debug, Deserialize)]
    enum Status {
        Available,
        Charging,
    }

    #[test]
    fn wire_names_round_trip() {
        for code in [
            ErrorCode::NotImplemented,
            ErrorCode::NotSupported,
            ErrorCode::InternalError,
            ErrorCode::ProtocolError,
            ErrorCode::SecurityError,
            ErrorCode::FormationViolation,
            ErrorCode::PropertyConstraintViolation,
            ErrorCode::OccurenceConstraintViolation,
            ErrorCode::TypeConstraintViolation,
            ErrorCode::GenericError,
        ] {
            assert_eq!(ErrorCode::from_wire(code.as_str()), Some(code));
        }
        assert_eq!(ErrorCode::from_wire("SomethingElse"), None);
    }

    #[test]
    fn missing_field_is_occurence_violation() {
        let err = decode_payload::<Probe>(&serde_json::json!({"status": "Available"}))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OccurenceConstraintViolation);
    }

    #[test]
    fn wrong_type_is_type_violation() {
        let err = decode_payload::<Probe>(
            &serde_json::json!({"connectorId": "one", "status": "Available"}),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeConstraintViolation);
    }

    #[test]
    fn unknown_variant_is_property_violation() {
        let err = decode_payload::<Probe>(
            &serde_json::json!({"connectorId": 1, "status": "Flying"}),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::PropertyConstraintViolation);
    }

    #[test]
    fn non_object_payload_is_formation_violation() {
        let err = decode_payload::<Probe>(&serde_json::json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.code, ErrorCode::FormationViolation);
    }
}
