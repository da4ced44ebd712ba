//! File-based record store for persistent storage.
//!
//! Layout of a container directory:
//!
//! ```text
//! <root>/<container>/
//! ├─ LOCK          # Advisory lock for single-writer
//! └─ records.dat   # Framed records, rewritten atomically on every save
//! ```

use crate::error::{StorageError, StorageResult};
use crate::record::{Collection, Record, RecordKey, RecordOp, WriteBatch};
use crate::store::RecordStore;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const MAGIC: &[u8; 4] = b"LSRS";
const FORMAT_VERSION: u8 = 1;
const LOCK_FILE: &str = "LOCK";
const DATA_FILE: &str = "records.dat";
const TEMP_FILE: &str = "records.tmp";

/// A file-based record store.
///
/// Records survive process restarts. Each `save` writes the whole record set
/// to a temporary file, syncs it and renames it over the data file, so a
/// crash leaves either the previous or the new state on disk.
///
/// # Thread Safety
///
/// The container directory is locked exclusively while the store is open.
/// A second `open` of the same container fails with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use listsync_storage::{FileRecordStore, RecordStore};
/// use std::path::Path;
///
/// let store = FileRecordStore::open(Path::new("/var/lib/lists"), "group.lists").unwrap();
/// println!("{} flushes", store.flush_count());
/// ```
#[derive(Debug)]
pub struct FileRecordStore {
    container: String,
    dir: PathBuf,
    records: RwLock<BTreeMap<RecordKey, Vec<u8>>>,
    flushes: AtomicU64,
    _lock_file: File,
}

impl FileRecordStore {
    /// Opens or creates the container `container` under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, another process
    /// holds the lock, or the data file is corrupted.
    pub fn open(root: &Path, container: &str) -> StorageResult<Self> {
        let dir = root.join(container);
        fs::create_dir_all(&dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(dir));
        }

        let data_path = dir.join(DATA_FILE);
        let records = if data_path.exists() {
            decode_records(&fs::read(&data_path)?)?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(container, records = records.len(), "opened record store");

        Ok(Self {
            container: container.to_string(),
            dir,
            records: RwLock::new(records),
            flushes: AtomicU64::new(0),
            _lock_file: lock_file,
        })
    }

    /// Returns the container directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn write_atomically(&self, records: &BTreeMap<RecordKey, Vec<u8>>) -> StorageResult<()> {
        let temp_path = self.dir.join(TEMP_FILE);
        let bytes = encode_records(records);

        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, self.dir.join(DATA_FILE))?;
        Ok(())
    }
}

impl RecordStore for FileRecordStore {
    fn container(&self) -> &str {
        &self.container
    }

    fn fetch(&self, predicate: &dyn Fn(&Record) -> bool) -> StorageResult<Vec<Record>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .map(|(key, payload)| Record::new(key.clone(), payload.clone()))
            .filter(|record| predicate(record))
            .collect())
    }

    fn save(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut records = self.records.write();
        let mut next = records.clone();
        for op in batch.into_ops() {
            match op {
                RecordOp::Put(record) => {
                    next.insert(record.key, record.payload);
                }
                RecordOp::Delete(key) => {
                    next.remove(&key);
                }
            }
        }

        // The in-memory view only changes once the file is durable.
        self.write_atomically(&next)?;
        *records = next;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

fn encode_records(records: &BTreeMap<RecordKey, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + records.len() * 64);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());

    for (key, payload) in records {
        out.push(key.collection.to_code());
        out.extend_from_slice(&(key.id.len() as u32).to_le_bytes());
        out.extend_from_slice(key.id.as_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
    }
    out
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> StorageResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                StorageError::corrupted(format!("truncated record at offset {}", self.offset))
            })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> StorageResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> StorageResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn decode_records(bytes: &[u8]) -> StorageResult<BTreeMap<RecordKey, Vec<u8>>> {
    let mut cursor = Cursor { bytes, offset: 0 };

    if cursor.take(4)? != MAGIC {
        return Err(StorageError::corrupted("bad magic"));
    }
    let version = cursor.u8()?;
    if version != FORMAT_VERSION {
        return Err(StorageError::corrupted(format!(
            "unsupported format version {version}"
        )));
    }

    let count = cursor.u32()?;
    let mut records = BTreeMap::new();
    for _ in 0..count {
        let code = cursor.u8()?;
        let collection = Collection::from_code(code)
            .ok_or_else(|| StorageError::corrupted(format!("unknown collection code {code}")))?;
        let id_len = cursor.u32()? as usize;
        let id = std::str::from_utf8(cursor.take(id_len)?)
            .map_err(|_| StorageError::corrupted("record id is not UTF-8"))?
            .to_string();
        let payload_len = cursor.u32()? as usize;
        let payload = cursor.take(payload_len)?.to_vec();
        records.insert(RecordKey::new(collection, id), payload);
    }

    if cursor.offset != bytes.len() {
        return Err(StorageError::corrupted("trailing bytes after last record"));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn put(batch: &mut WriteBatch, collection: Collection, id: &str, payload: &[u8]) {
        batch.put(RecordKey::new(collection, id), payload.to_vec());
    }

    #[test]
    fn records_survive_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let store = FileRecordStore::open(temp.path(), "group.lists").unwrap();
            let mut batch = WriteBatch::new();
            put(&mut batch, Collection::Lists, "l1", b"list");
            put(&mut batch, Collection::Items, "i1", b"item");
            store.save(batch).unwrap();
            assert_eq!(store.flush_count(), 1);
        }

        let store = FileRecordStore::open(temp.path(), "group.lists").unwrap();
        let items = store.fetch_collection(Collection::Items).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].payload, b"item");
    }

    #[test]
    fn second_open_is_locked() {
        let temp = TempDir::new().unwrap();
        let _first = FileRecordStore::open(temp.path(), "c").unwrap();
        let second = FileRecordStore::open(temp.path(), "c");
        assert!(matches!(second, Err(StorageError::Locked(_))));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = TempDir::new().unwrap();
        drop(FileRecordStore::open(temp.path(), "c").unwrap());
        assert!(FileRecordStore::open(temp.path(), "c").is_ok());
    }

    #[test]
    fn corrupted_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("c");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DATA_FILE), b"LSRS\x01\x05\x00\x00\x00").unwrap();

        let result = FileRecordStore::open(temp.path(), "c");
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn delete_persists() {
        let temp = TempDir::new().unwrap();
        let store = FileRecordStore::open(temp.path(), "c").unwrap();

        let mut batch = WriteBatch::new();
        put(&mut batch, Collection::Lists, "l1", b"x");
        store.save(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(RecordKey::new(Collection::Lists, "l1"));
        store.save(batch).unwrap();
        drop(store);

        let store = FileRecordStore::open(temp.path(), "c").unwrap();
        assert!(store.fetch_collection(Collection::Lists).unwrap().is_empty());
    }

    #[test]
    fn encoding_roundtrip() {
        let mut map = BTreeMap::new();
        map.insert(RecordKey::new(Collection::Queue, "0001"), vec![]);
        map.insert(RecordKey::new(Collection::Meta, "cursor"), vec![1, 2, 3]);
        assert_eq!(decode_records(&encode_records(&map)).unwrap(), map);
    }
}
