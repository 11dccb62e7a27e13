//! Persistent snapshot-file backend.

use crate::backend::{BatchOp, KvBackend, KvCursor};
use crate::error::{KvError, KvResult};
use crate::memory::MemoryBackend;
use crate::Config;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Magic bytes at the start of a snapshot file.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"LKVS";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// A persistent ordered key-value backend.
///
/// The whole key space is held in memory and rewritten to a snapshot file
/// (temp file + atomic rename) on every committed mutation. This favors
/// simplicity and crash atomicity over write throughput, which is the right
/// trade for an embedded store of this scale.
///
/// An exclusive `fs2` lock on a sibling `.lock` file guarantees a single
/// process owns the backend between open and close.
pub struct FileBackend {
    tree: MemoryBackend,
    path: PathBuf,
    /// Held for the lifetime of the backend; the lock releases on drop.
    _lock_file: File,
    /// Serializes mutate-then-persist sequences across threads.
    commit: Mutex<()>,
    sync_on_commit: bool,
}

impl FileBackend {
    /// Opens (or creates) a snapshot file backend at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the lock (`Locked`)
    /// - The file does not exist and `create_if_missing` is off
    /// - The snapshot is corrupt or has an unsupported version
    /// - An I/O error occurs
    pub fn open(path: &Path, config: &Config) -> KvResult<Self> {
        if let Some(parent) = path.parent() {
            if config.create_if_missing && !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(|_| KvError::Locked {
            path: path.display().to_string(),
        })?;

        let tree = MemoryBackend::new();
        match fs::read(path) {
            Ok(bytes) => {
                let entries = decode_snapshot(&bytes)?;
                tree.batch(
                    entries
                        .into_iter()
                        .map(|(key, value)| BatchOp::Put { key, value })
                        .collect(),
                )?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if !config.create_if_missing {
                    return Err(KvError::Io(err));
                }
            }
            Err(err) => return Err(KvError::Io(err)),
        }

        Ok(Self {
            tree,
            path: path.to_path_buf(),
            _lock_file: lock_file,
            commit: Mutex::new(()),
            sync_on_commit: config.sync_on_commit,
        })
    }

    /// Writes the current tree to the snapshot file via temp file + rename.
    fn persist(&self) -> KvResult<()> {
        let bytes = self.tree.with_entries(encode_snapshot);
        let tmp_path = self.path.with_extension("tmp");

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&bytes)?;
        if self.sync_on_commit {
            tmp.sync_all()?;
        }
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        self.tree.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        let _guard = self.commit.lock();
        self.tree.put(key, value)?;
        self.persist()
    }

    fn del(&self, key: &[u8]) -> KvResult<()> {
        let _guard = self.commit.lock();
        self.tree.del(key)?;
        self.persist()
    }

    fn batch(&self, ops: Vec<BatchOp>) -> KvResult<()> {
        let _guard = self.commit.lock();
        self.tree.batch(ops)?;
        self.persist()
    }

    fn scan(&self, lower: &[u8], upper: &[u8], reverse: bool) -> KvResult<Box<dyn KvCursor>> {
        self.tree.scan(lower, upper, reverse)
    }

    fn close(&self) -> KvResult<()> {
        let _guard = self.commit.lock();
        self.persist()?;
        self.tree.close()
    }
}

fn encode_snapshot(map: &std::collections::BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&SNAPSHOT_MAGIC);
    buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    let count = u32::try_from(map.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&count.to_le_bytes());
    for (key, value) in map {
        let klen = u32::try_from(key.len()).unwrap_or(u32::MAX);
        buf.extend_from_slice(&klen.to_le_bytes());
        buf.extend_from_slice(key);
        let vlen = u32::try_from(value.len()).unwrap_or(u32::MAX);
        buf.extend_from_slice(&vlen.to_le_bytes());
        buf.extend_from_slice(value);
    }
    buf
}

fn take<'a>(data: &'a [u8], cursor: &mut usize, len: usize) -> KvResult<&'a [u8]> {
    let end = cursor
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| KvError::corrupt("snapshot truncated"))?;
    let slice = &data[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn decode_snapshot(data: &[u8]) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut cursor = 0usize;

    let magic = take(data, &mut cursor, 4)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(KvError::corrupt("invalid snapshot magic"));
    }

    let version_bytes = take(data, &mut cursor, 2)?;
    let version = u16::from_le_bytes([version_bytes[0], version_bytes[1]]);
    if version > SNAPSHOT_VERSION {
        return Err(KvError::corrupt(format!(
            "unsupported snapshot version: {version}"
        )));
    }

    let count_bytes = take(data, &mut cursor, 4)?;
    let count = u32::from_le_bytes([
        count_bytes[0],
        count_bytes[1],
        count_bytes[2],
        count_bytes[3],
    ]) as usize;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let klen_bytes = take(data, &mut cursor, 4)?;
        let klen =
            u32::from_le_bytes([klen_bytes[0], klen_bytes[1], klen_bytes[2], klen_bytes[3]])
                as usize;
        let key = take(data, &mut cursor, klen)?.to_vec();

        let vlen_bytes = take(data, &mut cursor, 4)?;
        let vlen =
            u32::from_le_bytes([vlen_bytes[0], vlen_bytes[1], vlen_bytes[2], vlen_bytes[3]])
                as usize;
        let value = take(data, &mut cursor, vlen)?.to_vec();

        entries.push((key, value));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(path: &Path) -> FileBackend {
        FileBackend::open(path, &Config::default()).unwrap()
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lkv");

        {
            let backend = open(&path);
            backend.put(b"a", b"1").unwrap();
            backend
                .batch(vec![
                    BatchOp::put(b"b".to_vec(), b"2".to_vec()),
                    BatchOp::put(b"c".to_vec(), b"3".to_vec()),
                ])
                .unwrap();
            backend.close().unwrap();
        }

        let backend = open(&path);
        assert_eq!(backend.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(backend.get(b"c").unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn delete_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lkv");

        {
            let backend = open(&path);
            backend.put(b"a", b"1").unwrap();
            backend.del(b"a").unwrap();
            backend.close().unwrap();
        }

        let backend = open(&path);
        assert_eq!(backend.get(b"a").unwrap(), None);
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lkv");

        let _first = open(&path);
        let second = FileBackend::open(&path, &Config::default());
        assert!(matches!(second, Err(KvError::Locked { .. })));
    }

    #[test]
    fn lock_releases_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lkv");

        {
            let backend = open(&path);
            backend.put(b"a", b"1").unwrap();
        }
        let backend = open(&path);
        assert_eq!(backend.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn missing_file_without_create_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.lkv");

        let config = Config::default().create_if_missing(false);
        // The file is only written on first commit, so a fresh path means a
        // missing database.
        assert!(FileBackend::open(&path, &config).is_err());
    }

    #[test]
    fn corrupt_snapshot_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lkv");
        fs::write(&path, b"XXXXjunk").unwrap();

        let result = FileBackend::open(&path, &Config::default());
        assert!(matches!(result, Err(KvError::Corrupt { .. })));
    }

    #[test]
    fn truncated_snapshot_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lkv");

        {
            let backend = open(&path);
            backend.put(b"key", b"value").unwrap();
            backend.close().unwrap();
        }
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let result = FileBackend::open(&path, &Config::default());
        assert!(matches!(result, Err(KvError::Corrupt { .. })));
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(b"k1".to_vec(), b"v1".to_vec());
        map.insert(b"k2".to_vec(), vec![]);
        map.insert(vec![], b"root".to_vec());

        let bytes = encode_snapshot(&map);
        let entries = decode_snapshot(&bytes).unwrap();
        assert_eq!(entries.len(), 3);
        for (key, value) in entries {
            assert_eq!(map.get(&key), Some(&value));
        }
    }
}
