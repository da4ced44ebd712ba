//! # listsync core
//!
//! Data model and entity store for listsync replicas.
//!
//! This crate provides:
//! - Identifiers and millisecond timestamps for lists and items
//! - The [`Clock`] used to bump last-modified timestamps
//! - [`List`], [`Item`] and the [`Snapshot`] view of a replica
//! - [`EntityStore`], the authoritative in-memory state backed by a
//!   [`listsync_storage::RecordStore`]
//!
//! ## Key Invariants
//!
//! - Every item references an existing list; orphans are dropped on load
//! - Identifiers are never reused
//! - Local mutations bump `modified_at` to `max(now, previous + 1 tick)`
//! - Writes are serialized; readers never observe a half-applied batch

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod model;
mod stats;
mod store;
mod transaction;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use model::{Item, List, ListSnapshot, Snapshot};
pub use stats::StoreStats;
pub use store::EntityStore;
pub use transaction::{StoreTransaction, Upserted};
pub use types::{ItemId, ListId, Timestamp};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
