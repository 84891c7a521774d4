//! Tokio runtime for chat synchronization: the websocket session, the HTTP
//! chat API and the task that keeps the in-memory stores consistent.

/// Request/response chat API.
pub mod api;
/// Environment-backed configuration.
pub mod config;
/// Runtime task and its handle.
pub mod runtime;
/// Connection lifecycle, authentication and room membership.
pub mod session;
/// Push transport.
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::{ChatApi, HttpChatApi};
pub use config::{ClientConfig, ConfigError, RuntimeConfig};
pub use runtime::{SyncHandle, spawn_runtime};
pub use session::{ConnectOutcome, Inbound, TransportSession};
pub use transport::{Transport, TransportLink, WsTransport};
