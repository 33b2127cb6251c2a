//! Error types for the broadcast node

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Broadcast core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Encoding a message to JSON failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inbound message did not match any known shape
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// An inbound line that could not be decoded into an [`Envelope`].
///
/// `src` and `kind` are recovered best-effort from the raw JSON so that the
/// rejection can be attributed in logs.
///
/// [`Envelope`]: crate::message::Envelope
#[derive(Debug, Error)]
#[error(
    "malformed message from {} (type {}): {source}",
    .src.as_deref().unwrap_or("?"),
    .kind.as_deref().unwrap_or("?")
)]
pub struct DecodeError {
    pub src: Option<String>,
    pub kind: Option<String>,
    #[source]
    pub source: serde_json::Error,
}
