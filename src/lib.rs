//! # ocpp-stack
//!
//! OCPP 1.6 / 2.0.1 protocol stack over JSON-WebSocket, covering both the
//! charge point and central system roles, the security extensions and the
//! ISO 15118 Plug-and-Charge profile.
//!
//! ## Layout
//!
//! - **support**: bounded queue, URL handling, shutdown signal
//! - **config**: TOML-loadable configuration for both roles
//! - **rpc**: OCPP-J framing, error codes, per-peer RPC endpoint
//! - **messages**: version registry, action tables, security and PnC records
//! - **centralsystem**: server, session registry, handlers, command surface
//! - **chargepoint**: reconnecting client, boot/heartbeat cycle,
//!   transaction retry queue, configuration key store
//! - **x509**: keys, CSRs, certificates, chain verification, digests
//! - **persistence**: storage traits and an in-memory implementation

pub mod centralsystem;
pub mod chargepoint;
pub mod config;
pub mod messages;
pub mod persistence;
pub mod rpc;
pub mod support;
pub mod x509;

// Commonly used types at crate root
pub use centralsystem::{CentralSystem, CentralSystemEvents, ChargePointSession};
pub use chargepoint::{ChargePoint, ChargePointEvents, ChargePointStorage};
pub use config::{CentralSystemConfig, ChargePointConfig, DuplicatePolicy};
pub use messages::OcppVersion;
pub use rpc::{CallError, ErrorCode, OcppFrame, RpcEndpoint, RpcError};
