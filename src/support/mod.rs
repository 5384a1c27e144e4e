//! Cross-cutting utilities: bounded queue, URL handling, shutdown signal,
//! keepalive timer, logging bootstrap.

pub mod keepalive;
pub mod logging;
pub mod queue;
pub mod shutdown;
pub mod url;

pub use keepalive::{keepalive, next_ping};
pub use logging::init_logging;
pub use queue::MessageQueue;
pub use shutdown::ShutdownSignal;
pub use url::{ConnectionUrl, UrlError};
