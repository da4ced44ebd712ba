//! # listsync storage
//!
//! The persistent record store a replica keeps its lists, items and queued
//! operations in.
//!
//! Stores are **opaque keyed record stores**: a record is a `(collection, id)`
//! key plus a byte payload the store never interprets. The engine only relies
//! on three capabilities:
//!
//! - open a store by container identifier
//! - fetch records matching a predicate
//! - save a [`WriteBatch`] atomically (all records or none)
//!
//! ## Available Stores
//!
//! - [`InMemoryRecordStore`] - For tests and ephemeral replicas
//! - [`FileRecordStore`] - Durable store under a container directory
//!
//! ## Example
//!
//! ```rust
//! use listsync_storage::{Collection, InMemoryRecordStore, RecordKey, RecordStore, WriteBatch};
//!
//! let store = InMemoryRecordStore::open("group.lists");
//! let mut batch = WriteBatch::new();
//! batch.put(RecordKey::new(Collection::Lists, "a"), b"{}".to_vec());
//! store.save(batch).unwrap();
//! assert_eq!(store.fetch_collection(Collection::Lists).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod record;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileRecordStore;
pub use memory::InMemoryRecordStore;
pub use record::{Collection, Record, RecordKey, RecordOp, WriteBatch};
pub use store::RecordStore;
