//! Snapshot encoding and list-aligned chunking.

use crate::envelope::{ChunkEnvelope, Frame, SkippedList, TransportBatch};
use crate::error::{ProtocolError, ProtocolResult};
use listsync_core::{ListId, ListSnapshot, Snapshot};
use serde::Serialize;
use uuid::Uuid;

/// Maximum size in bytes of one transmitted unit (whole snapshot or chunk).
pub const SIZE_CEILING: usize = 262_144;

/// Encodes and decodes snapshots, chunking them to fit a size ceiling.
///
/// # Chunking
///
/// A snapshot whose encoding fits under the ceiling is sent as one unit.
/// Otherwise its lists are packed greedily, in order, into
/// [`ChunkEnvelope`]s. Chunk boundaries only fall between whole lists. A
/// list that cannot fit even alone in an envelope is left out and reported
/// in [`TransportBatch::skipped`]; its id travels in every envelope so the
/// receiver does not take its absence as a deletion.
///
/// # Example
///
/// ```rust
/// use listsync_core::{List, ListSnapshot, Snapshot, Timestamp};
/// use listsync_protocol::{Frame, SnapshotCodec};
///
/// let codec = SnapshotCodec::default();
/// let list = List::new("Groceries", 0, Timestamp::from_millis(0));
/// let snapshot = Snapshot::new(vec![ListSnapshot::new(list, vec![])]);
///
/// let batch = codec.encode_for_transport(&snapshot).unwrap();
/// assert_eq!(batch.len(), 1);
/// assert_eq!(codec.decode_frame(&batch.units[0]).unwrap(), Frame::Snapshot(snapshot));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCodec {
    ceiling: usize,
}

impl Default for SnapshotCodec {
    fn default() -> Self {
        Self::new(SIZE_CEILING)
    }
}

impl SnapshotCodec {
    /// Creates a codec with the given size ceiling.
    pub const fn new(ceiling: usize) -> Self {
        Self { ceiling }
    }

    /// Returns the size ceiling.
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Encodes a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encoding`] if serialization fails.
    pub fn encode(&self, snapshot: &Snapshot) -> ProtocolResult<Vec<u8>> {
        to_bytes(snapshot)
    }

    /// Decodes a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decoding`] if the bytes are not a snapshot.
    pub fn decode(&self, bytes: &[u8]) -> ProtocolResult<Snapshot> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Decoding)
    }

    /// Decodes one transmitted unit: a whole snapshot or a chunk envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decoding`] if the bytes are neither.
    pub fn decode_frame(&self, bytes: &[u8]) -> ProtocolResult<Frame> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(ProtocolError::Decoding)?;
        let is_chunk = value
            .as_object()
            .is_some_and(|object| object.contains_key("sessionId"));

        if is_chunk {
            serde_json::from_value(value)
                .map(Frame::Chunk)
                .map_err(ProtocolError::Decoding)
        } else {
            serde_json::from_value(value)
                .map(Frame::Snapshot)
                .map_err(ProtocolError::Decoding)
        }
    }

    /// Encodes a snapshot into units that each fit under the ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encoding`] if serialization fails, or
    /// [`ProtocolError::InvalidChunk`] if not even an empty envelope fits.
    pub fn encode_for_transport(&self, snapshot: &Snapshot) -> ProtocolResult<TransportBatch> {
        let whole = self.encode(snapshot)?;
        if whole.len() <= self.ceiling {
            return Ok(TransportBatch {
                session_id: None,
                units: vec![whole],
                skipped: Vec::new(),
            });
        }

        let session_id = Uuid::new_v4();
        let sizes = snapshot
            .lists
            .iter()
            .map(encoded_len)
            .collect::<ProtocolResult<Vec<usize>>>()?;
        let (overhead, skipped) = self.envelope_overhead(session_id, snapshot, &sizes)?;
        let omitted: Vec<ListId> = skipped.iter().map(|s| s.list_id).collect();

        for entry in &skipped {
            tracing::warn!(
                list_id = %entry.list_id,
                size = entry.size,
                ceiling = self.ceiling,
                "list exceeds the transport ceiling and will not be sent"
            );
        }

        let mut chunks: Vec<Vec<&ListSnapshot>> = Vec::new();
        let mut current: Vec<&ListSnapshot> = Vec::new();
        // Bytes of the lists in `current` plus the commas between them.
        let mut current_len = 0usize;
        for (entry, &size) in snapshot.lists.iter().zip(&sizes) {
            if omitted.contains(&entry.list.id) {
                continue;
            }
            if !current.is_empty() && overhead + current_len + 1 + size > self.ceiling {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current_len += if current.is_empty() { size } else { size + 1 };
            current.push(entry);
        }
        if !current.is_empty() || chunks.is_empty() {
            chunks.push(current);
        }

        let chunk_count = chunks.len() as u32;
        let mut units = Vec::with_capacity(chunks.len());
        for (index, lists) in chunks.into_iter().enumerate() {
            let payload = Snapshot::new(lists.into_iter().cloned().collect());
            let envelope = ChunkEnvelope::new(session_id, index as u32, chunk_count, payload)
                .with_omitted(omitted.clone());
            let unit = to_bytes(&envelope)?;
            debug_assert!(unit.len() <= self.ceiling);
            units.push(unit);
        }

        tracing::debug!(
            %session_id,
            chunks = units.len(),
            bytes = whole.len(),
            skipped = skipped.len(),
            "snapshot chunked for transport"
        );

        Ok(TransportBatch {
            session_id: Some(session_id),
            units,
            skipped,
        })
    }

    /// Returns the size of an envelope with an empty payload, and the lists
    /// that cannot fit in any envelope.
    ///
    /// Index and count are measured with as many digits as the list count,
    /// which bounds both. Omitted ids are carried in every envelope, so the
    /// overhead and the omitted set are grown together until stable.
    fn envelope_overhead(
        &self,
        session_id: Uuid,
        snapshot: &Snapshot,
        sizes: &[usize],
    ) -> ProtocolResult<(usize, Vec<SkippedList>)> {
        let bound = snapshot.lists.len() as u32;
        let mut omitted: Vec<ListId> = Vec::new();
        loop {
            let empty_chunk = ChunkEnvelope::new(session_id, bound, bound, Snapshot::empty())
                .with_omitted(omitted.clone());
            let overhead = encoded_len(&empty_chunk)?;
            if overhead > self.ceiling {
                return Err(ProtocolError::invalid_chunk(format!(
                    "ceiling {} is below the {overhead}-byte envelope overhead",
                    self.ceiling
                )));
            }

            let skipped: Vec<SkippedList> = snapshot
                .lists
                .iter()
                .zip(sizes)
                .filter(|(_, &size)| overhead + size > self.ceiling)
                .map(|(entry, &size)| SkippedList {
                    list_id: entry.list.id,
                    size: overhead + size,
                })
                .collect();

            if skipped.len() == omitted.len() {
                return Ok((overhead, skipped));
            }
            omitted = skipped.iter().map(|s| s.list_id).collect();
        }
    }
}

fn to_bytes<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(ProtocolError::Encoding)
}

fn encoded_len<T: Serialize>(value: &T) -> ProtocolResult<usize> {
    to_bytes(value).map(|bytes| bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_core::{Item, List, Timestamp};

    fn list_with_items(name: &str, order: u32, items: usize, title_len: usize) -> ListSnapshot {
        let now = Timestamp::from_millis(1_700_000_000_000);
        let list = List::new(name, order, now);
        let items = (0..items)
            .map(|i| Item::new(list.id, "x".repeat(title_len), i as u32, now))
            .collect();
        ListSnapshot::new(list, items)
    }

    #[test]
    fn small_snapshot_is_one_unit() {
        let codec = SnapshotCodec::default();
        let snapshot = Snapshot::new(vec![list_with_items("A", 0, 3, 10)]);

        let batch = codec.encode_for_transport(&snapshot).unwrap();
        assert!(!batch.is_chunked());
        assert_eq!(batch.units, vec![codec.encode(&snapshot).unwrap()]);
    }

    #[test]
    fn empty_snapshot_encodes() {
        let codec = SnapshotCodec::default();
        let bytes = codec.encode(&Snapshot::empty()).unwrap();
        assert_eq!(bytes, b"{\"lists\":[]}");
        assert!(codec.decode(&bytes).unwrap().is_empty());
    }

    #[test]
    fn oversized_snapshot_is_chunked_at_list_boundaries() {
        let codec = SnapshotCodec::new(8 * 1024);
        let lists: Vec<ListSnapshot> = (0..10)
            .map(|i| list_with_items(&format!("L{i}"), i, 10, 100))
            .collect();
        let snapshot = Snapshot::new(lists);

        let batch = codec.encode_for_transport(&snapshot).unwrap();
        assert!(batch.is_chunked());
        assert!(batch.len() > 1);
        assert!(batch.skipped.is_empty());

        let mut rebuilt = Vec::new();
        for (index, unit) in batch.units.iter().enumerate() {
            assert!(unit.len() <= codec.ceiling());
            match codec.decode_frame(unit).unwrap() {
                Frame::Chunk(envelope) => {
                    assert_eq!(envelope.chunk_index as usize, index);
                    assert_eq!(envelope.chunk_count as usize, batch.len());
                    assert_eq!(Some(envelope.session_id), batch.session_id);
                    rebuilt.extend(envelope.payload.lists);
                }
                Frame::Snapshot(_) => panic!("expected a chunk"),
            }
        }
        assert_eq!(
            codec.encode(&Snapshot::new(rebuilt)).unwrap(),
            codec.encode(&snapshot).unwrap()
        );
    }

    #[test]
    fn list_too_large_alone_is_skipped() {
        let codec = SnapshotCodec::new(4 * 1024);
        let small = list_with_items("small", 0, 2, 10);
        let huge = list_with_items("huge", 1, 40, 200);
        let huge_id = huge.list.id;
        let snapshot = Snapshot::new(vec![small.clone(), huge, list_with_items("tail", 2, 1, 10)]);

        let batch = codec.encode_for_transport(&snapshot).unwrap();
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].list_id, huge_id);
        assert!(batch.skipped[0].size > codec.ceiling());

        let mut sent = Vec::new();
        for unit in &batch.units {
            assert!(unit.len() <= codec.ceiling());
            let Frame::Chunk(envelope) = codec.decode_frame(unit).unwrap() else {
                panic!("expected a chunk");
            };
            assert_eq!(envelope.omitted_list_ids, vec![huge_id]);
            sent.extend(envelope.payload.lists.into_iter().map(|l| l.list.id));
        }
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], small.list.id);
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = SnapshotCodec::default();
        assert!(matches!(codec.decode(b"not json"), Err(ProtocolError::Decoding(_))));
        assert!(matches!(codec.decode_frame(b"[1,2]"), Err(ProtocolError::Decoding(_))));
        assert!(matches!(
            codec.decode_frame(b"{\"sessionId\":\"nope\"}"),
            Err(ProtocolError::Decoding(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn chunks_respect_ceiling(
            shape in proptest::collection::vec((0usize..30, 1usize..120), 1..25),
            ceiling in 2_048usize..16_384,
        ) {
            let codec = SnapshotCodec::new(ceiling);
            let lists: Vec<ListSnapshot> = shape
                .iter()
                .enumerate()
                .map(|(i, &(items, title_len))| list_with_items(&format!("L{i}"), i as u32, items, title_len))
                .collect();
            let snapshot = Snapshot::new(lists);

            let batch = codec.encode_for_transport(&snapshot).unwrap();
            let mut rebuilt = Vec::new();
            for unit in &batch.units {
                proptest::prop_assert!(unit.len() <= ceiling);
                match codec.decode_frame(unit).unwrap() {
                    Frame::Chunk(envelope) => rebuilt.extend(envelope.payload.lists),
                    Frame::Snapshot(whole) => rebuilt.extend(whole.lists),
                }
            }

            let skipped: Vec<ListId> = batch.skipped.iter().map(|s| s.list_id).collect();
            let expected: Vec<ListSnapshot> = snapshot
                .lists
                .iter()
                .filter(|entry| !skipped.contains(&entry.list.id))
                .cloned()
                .collect();
            // Whole lists only: every received list carries all of its items.
            proptest::prop_assert_eq!(rebuilt, expected);
        }
    }
}
