//! Record keys, records and write batches.

use std::fmt;

/// A named group of records inside one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    /// List records.
    Lists,
    /// Item records.
    Items,
    /// Pending offline operations.
    Queue,
    /// Replica metadata (sync bookkeeping).
    Meta,
}

impl Collection {
    /// Converts to a numeric code for the on-disk format.
    pub fn to_code(self) -> u8 {
        match self {
            Collection::Lists => 1,
            Collection::Items => 2,
            Collection::Queue => 3,
            Collection::Meta => 4,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Collection::Lists),
            2 => Some(Collection::Items),
            3 => Some(Collection::Queue),
            4 => Some(Collection::Meta),
            _ => None,
        }
    }

    /// Returns a short name for display.
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Lists => "lists",
            Collection::Items => "items",
            Collection::Queue => "queue",
            Collection::Meta => "meta",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key addressing one record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// Collection the record lives in.
    pub collection: Collection,
    /// Record identifier, unique within its collection.
    pub id: String,
}

impl RecordKey {
    /// Creates a new record key.
    pub fn new(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record key.
    pub key: RecordKey,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl Record {
    /// Creates a new record.
    pub fn new(key: RecordKey, payload: Vec<u8>) -> Self {
        Self { key, payload }
    }
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOp {
    /// Insert or replace a record.
    Put(Record),
    /// Remove a record. Removing an absent record is not an error.
    Delete(RecordKey),
}

impl RecordOp {
    /// Returns the key this operation touches.
    pub fn key(&self) -> &RecordKey {
        match self {
            RecordOp::Put(record) => &record.key,
            RecordOp::Delete(key) => key,
        }
    }
}

/// An ordered set of mutations saved as one atomic unit.
///
/// Later operations on the same key override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<RecordOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a put.
    pub fn put(&mut self, key: RecordKey, payload: Vec<u8>) {
        self.ops.push(RecordOp::Put(Record::new(key, payload)));
    }

    /// Stages a delete.
    pub fn delete(&mut self, key: RecordKey) {
        self.ops.push(RecordOp::Delete(key));
    }

    /// Returns the staged operations in order.
    pub fn ops(&self) -> &[RecordOp] {
        &self.ops
    }

    /// Consumes the batch, returning its operations.
    pub fn into_ops(self) -> Vec<RecordOp> {
        self.ops
    }

    /// Returns the number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_codes() {
        for collection in [
            Collection::Lists,
            Collection::Items,
            Collection::Queue,
            Collection::Meta,
        ] {
            assert_eq!(Collection::from_code(collection.to_code()), Some(collection));
        }
        assert_eq!(Collection::from_code(0), None);
    }

    #[test]
    fn batch_keeps_order() {
        let mut batch = WriteBatch::new();
        batch.put(RecordKey::new(Collection::Lists, "a"), vec![1]);
        batch.delete(RecordKey::new(Collection::Lists, "a"));

        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.ops()[1], RecordOp::Delete(_)));
        assert_eq!(batch.ops()[0].key().to_string(), "lists/a");
    }
}
