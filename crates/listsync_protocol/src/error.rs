//! Protocol error types.

use thiserror::Error;
use uuid::Uuid;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or reassembling snapshots.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A snapshot could not be serialized.
    #[error("encoding failed: {0}")]
    Encoding(#[source] serde_json::Error),

    /// Received bytes are not a valid snapshot or chunk.
    #[error("decoding failed: {0}")]
    Decoding(#[source] serde_json::Error),

    /// A chunk envelope is malformed or inconsistent with its session.
    #[error("invalid chunk: {message}")]
    InvalidChunk {
        /// What is wrong with it.
        message: String,
    },

    /// A chunk arrived for a session that timed out. The session was discarded.
    #[error("chunk session {session_id} timed out")]
    SessionExpired {
        /// The discarded session.
        session_id: Uuid,
    },
}

impl ProtocolError {
    /// Creates an invalid chunk error.
    pub fn invalid_chunk(message: impl Into<String>) -> Self {
        Self::InvalidChunk {
            message: message.into(),
        }
    }
}
