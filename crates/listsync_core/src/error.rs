//! Error types for listsync core.

use crate::types::{ItemId, ListId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in entity store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Record store error. The batch that hit it was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] listsync_storage::StorageError),

    /// A stored record could not be decoded or encoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// List not found.
    #[error("list not found: {0}")]
    ListNotFound(ListId),

    /// Item not found.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// An item references a list that does not exist.
    #[error("item {item_id} references missing list {list_id}")]
    OrphanItem {
        /// The offending item.
        item_id: ItemId,
        /// The list it points at.
        list_id: ListId,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if the error came from the record store.
    pub fn is_storage(&self) -> bool {
        matches!(self, CoreError::Storage(_))
    }
}
