//! # listsync protocol
//!
//! What replicas put on the wire, and the rules they agree on.
//!
//! This crate provides:
//! - [`SnapshotCodec`] for encoding snapshots and splitting them into
//!   list-aligned chunks under the transport size ceiling
//! - [`ChunkEnvelope`] and [`Frame`], the transmitted units
//! - [`Reassembler`] for collecting chunk sessions on the receiving side
//! - [`ConflictPolicy`], the last-write-wins rule with its tie-break
//! - [`QueuedOperation`] and [`OperationLog`] for buffering offline edits
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - No transmitted unit exceeds the size ceiling
//! - A list and its items are never split across chunks
//! - A chunk session is merged only once every chunk has arrived
//! - Conflict resolution is symmetric: argument order never changes the winner

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod conflict;
mod envelope;
mod error;
mod operation;
mod oplog;
mod reassembly;

pub use codec::{SnapshotCodec, SIZE_CEILING};
pub use conflict::{Conflict, ConflictPolicy, ConflictResolution, EntityKind, Versioned};
pub use envelope::{ChunkEnvelope, Frame, ReceivedSnapshot, SkippedList, TransportBatch};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{OperationType, QueuedOperation};
pub use oplog::{OperationLog, QueueEntry};
pub use reassembly::{ExpiredSession, Reassembler, DEFAULT_CHUNK_TIMEOUT};
