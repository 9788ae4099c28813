use thiserror::Error;

/// Failures surfaced to callers of the gateway.
///
/// Cloneable so a single transport failure can be handed to every
/// subscription that was in flight when it happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Transport is down or was lost while the request was in flight.
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection was closed by the caller.
    #[error("connection closed")]
    Closed,

    /// The server answered the request with a NOTICE frame.
    #[error("server error: {0}")]
    Protocol(String),

    /// The request could not be serialized.
    #[error("invalid request: {0}")]
    Encode(String),
}
