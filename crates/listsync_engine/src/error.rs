//! Error types for the sync engine.

use crate::connectivity::AccountStatus;
use listsync_core::{CoreError, ItemId, ListId};
use listsync_protocol::ProtocolError;
use thiserror::Error;
use uuid::Uuid;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The local snapshot could not be serialized. Nothing was sent.
    #[error("snapshot encoding failed: {0}")]
    EncodingFailure(#[source] ProtocolError),

    /// A list alone exceeds the transport ceiling. It was not sent; the
    /// remaining lists were.
    #[error("list {list_id} needs {size} bytes, transport ceiling is {ceiling}")]
    SizeLimitExceeded {
        /// The list that was skipped.
        list_id: ListId,
        /// Size of the smallest unit that could carry it.
        size: usize,
        /// The ceiling.
        ceiling: usize,
    },

    /// The remote account is not available. Nothing was changed.
    #[error("remote account unavailable: {0}")]
    AccountUnavailable(AccountStatus),

    /// A chunk session never completed and was discarded unapplied.
    #[error("chunk session {session_id} did not complete")]
    PartialChunkTimeout {
        /// The discarded session.
        session_id: Uuid,
    },

    /// An item does not belong to the list carrying it, or names a list
    /// that does not exist. The item was not stored.
    #[error("item {item_id} claims list {claimed_list_id} but arrived in list {list_id}")]
    IntegrityViolation {
        /// The dropped item.
        item_id: ItemId,
        /// The list the item says it belongs to.
        claimed_list_id: ListId,
        /// The list that carried it.
        list_id: ListId,
    },

    /// The record store rejected a write, or a stored record could not be
    /// read back. The batch was rolled back.
    #[error("storage failure: {0}")]
    StorageFailure(#[source] CoreError),

    /// The entity store refused an operation, such as an edit of a missing
    /// list. Nothing was written.
    #[error("operation rejected: {0}")]
    Rejected(#[source] CoreError),

    /// Received bytes could not be decoded.
    #[error("decoding failed: {0}")]
    Decoding(#[source] ProtocolError),

    /// A call to the remote replica did not finish in time.
    #[error("{operation} timed out")]
    Timeout {
        /// Which call timed out.
        operation: &'static str,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::AccountUnavailable(status) => status.is_transient(),
            SyncError::Timeout { .. } => true,
            SyncError::PartialChunkTimeout { .. } => true,
            SyncError::Decoding(_) => true,
            SyncError::StorageFailure(err) => err.is_storage(),
            _ => false,
        }
    }

    /// Returns true if the error left local state untouched.
    pub fn is_local_state_untouched(&self) -> bool {
        !matches!(
            self,
            SyncError::SizeLimitExceeded { .. } | SyncError::IntegrityViolation { .. }
        )
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Storage(_) | CoreError::Codec(_) => SyncError::StorageFailure(err),
            CoreError::OrphanItem { item_id, list_id } => SyncError::IntegrityViolation {
                item_id,
                claimed_list_id: list_id,
                list_id,
            },
            CoreError::ListNotFound(_)
            | CoreError::ItemNotFound(_)
            | CoreError::InvalidOperation { .. } => SyncError::Rejected(err),
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Encoding(_) => SyncError::EncodingFailure(err),
            ProtocolError::SessionExpired { session_id } => {
                SyncError::PartialChunkTimeout { session_id }
            }
            ProtocolError::Decoding(_) | ProtocolError::InvalidChunk { .. } => {
                SyncError::Decoding(err)
            }
        }
    }
}
