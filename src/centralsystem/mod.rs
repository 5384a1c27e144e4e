//! Central system (server) role
//!
//! - [`server`]: WebSocket accept loop, handshake checks, connection glue
//! - [`session`]: session registry and per-peer state
//! - [`handler`]: inbound call dispatch to [`CentralSystemEvents`]
//! - [`commands`]: server-initiated operation surface on a session

pub mod commands;
pub mod events;
pub mod handler;
pub mod server;
pub mod session;

pub use commands::{
    Availability, ClearChargingProfileCriteria, CompositeScheduleResult, ConfigurationResult,
    DataTransferResult, GetLogResult, GetVariablesResult, KeyValue, LocalAuthEntry, LogKind,
    ResetKind, SetVariablesResult, TriggerType, UpdateKind,
};
pub use events::{
    AuthorizationVerdict, BootInfo, CentralSystemEvents, DataTransferDecision,
    DataTransferVerdict, IdTagDecision, MeterValuesInfo, RegistrationVerdict,
    StartTransactionDecision, StartTransactionInfo, StatusNotificationInfo, StopTransactionInfo,
    TransactionEventInfo,
};
pub use server::{CentralSystem, ProtocolNegotiator, ServerError};
pub use session::{ChargePointSession, RegisterOutcome, SessionRegistry, SharedSessionRegistry};
