//! Long-lived gRPC clients for the services the core calls outward to:
//! Anchor (database drivers), UnifiedModel (schema translation), Mesh
//! (overlay transport), Transformation (per-value functions), and Stream
//! (message-platform subscriptions).
//!
//! Clients wrap a shared `tonic::transport::Channel` and issue calls through
//! `tonic::client::Grpc` directly. Channels are dialed once at engine start
//! and live until shutdown; a failed dial leaves the engine in degraded mode
//! with that client absent.

use std::time::Duration;

pub mod anchor;
pub mod mesh;
pub mod stream;
pub mod transformation;
pub mod unified_model;

mod addresses;
pub use addresses::Addresses;

mod call;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid gRPC endpoint: '{0}'")]
    InvalidEndpoint(String),
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
    #[error(transparent)]
    Grpc(#[from] tonic::Status),
    #[error("{0} service is not available")]
    NotAvailable(&'static str),
}

impl Error {
    /// Whether the error indicates the remote service is absent or
    /// unreachable, as opposed to having rejected the call.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Error::NotAvailable(_) | Error::Transport(_) => true,
            Error::Grpc(status) => status.code() == tonic::Code::Unavailable,
            Error::InvalidEndpoint(_) => false,
        }
    }
}

/// Dial policy shared by every gateway: bounded connect, aggressive HTTP/2
/// keepalive so a dead peer is noticed between calls.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Dial a `host:port` target and return a ready Channel.
pub async fn dial_channel(target: &str) -> Result<tonic::transport::Channel> {
    let endpoint = tonic::transport::Endpoint::from_shared(format!("http://{target}"))
        .map_err(|_| Error::InvalidEndpoint(target.to_string()))?
        .connect_timeout(CONNECT_TIMEOUT)
        .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
        .keep_alive_timeout(KEEPALIVE_TIMEOUT)
        .keep_alive_while_idle(true);

    Ok(endpoint.connect().await?)
}
