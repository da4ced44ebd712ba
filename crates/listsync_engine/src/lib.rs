//! # listsync engine
//!
//! Reconciliation and sync orchestration for listsync replicas.
//!
//! This crate provides:
//! - The merge engine (absence-based removal, last-write-wins upserts)
//! - The connectivity / account state machine
//! - A persistent offline operation queue with at-least-once replay
//! - The sync orchestrator with an in-flight guard, progress and retry
//! - The responder side of an exchange ([`SyncPeer`])
//!
//! ## Architecture
//!
//! One sync cycle runs:
//! 1. Check the remote status; stop unless it is available
//! 2. Replay the offline queue into the entity store
//! 3. Encode the local active snapshot, chunking it under the size ceiling
//! 4. Exchange snapshots with the remote replica
//! 5. Reassemble and merge the received snapshot in one batch
//! 6. Record the last successful sync
//!
//! The status check and the exchange are the only suspension points. Both
//! carry timeouts. No lock is held across either.
//!
//! ## Key Invariants
//!
//! - An empty received snapshot never deletes anything
//! - Archived lists are never removed by absence
//! - A merge is persisted as a single flush, or not at all
//! - At most one sync runs at a time; a concurrent call is a no-op
//! - Progress never decreases during a sync and never rests mid-way

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod error;
mod inbound;
mod merge;
mod peer;
mod queue;
mod remote;
mod state;

pub use config::{RetryConfig, SyncConfig};
pub use connectivity::{AccountStatus, ConnectivityMonitor, RemoteStatus};
pub use error::{SyncError, SyncResult};
pub use inbound::{Inbound, Received};
pub use merge::{IntegrityViolation, MergeEngine, MergePlan, MergeReport};
pub use peer::SyncPeer;
pub use queue::{DrainReport, OfflineQueue};
pub use remote::{LoopbackRemote, MockRemote, RemoteReplica};
pub use state::{LocalOutcome, SyncEngine, SyncOutcome, SyncReport, SyncStats};
