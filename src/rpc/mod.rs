//! RPC layer: OCPP-J framing, error codes and the per-peer endpoint.
//!
//! ```text
//! transport text ──► RpcEndpoint::process_incoming ──► requests queue ──► dispatch worker ──► RpcListener
//!                                                 └──► results queue  ──► RpcEndpoint::call waiter
//! ```

pub mod endpoint;
pub mod error;
pub mod frame;

pub use endpoint::{RpcEndpoint, RpcListener, RpcSpy};
pub use error::{classify_decode_error, decode_payload, encode_payload, CallError, ErrorCode, RpcError};
pub use frame::{FrameError, OcppFrame};
