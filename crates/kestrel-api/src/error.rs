use thiserror::Error;

use kestrel_gateway::GatewayError;

/// Errors surfaced to repository and fetcher callers.
#[derive(Debug, Error)]
pub enum KestrelError {
    /// The socket failed, closed, or a request could not be sent.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered with a `NOTICE` instead of results.
    #[error("server error: {0}")]
    Protocol(String),

    /// Every item of a non-empty batch failed to decode.
    #[error("failed to decode {failed} of {total} events")]
    Decode { failed: usize, total: usize },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<GatewayError> for KestrelError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Protocol(message) => Self::Protocol(message),
            other => Self::Connection(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, KestrelError>;
