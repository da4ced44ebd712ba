//! # listsync testkit
//!
//! Test utilities for listsync replicas.
//!
//! This crate provides:
//! - Replica fixtures over in-memory or temporary file-backed record stores
//! - Snapshot builders with fixed timestamps
//! - Property-based generators for lists, items, snapshots and queued operations
//! - A primary/companion pair wired through the real engine and codec
//!
//! ## Usage
//!
//! ```rust,ignore
//! use listsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn lists_reach_the_companion() {
//!     let pair = ReplicaPair::new(SIZE_CEILING);
//!     pair.primary().create_list("Groceries").unwrap();
//!     pair.sync().await.unwrap();
//!     pair.assert_converged();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use listsync_protocol::SIZE_CEILING;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
