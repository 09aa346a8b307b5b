use crate::error::{JsonStashError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// One persisted record: the unit the log is made of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: u64,
    pub dataset_name: String,
    pub serialized_record: String,
}

/// Result of reading the log back.
pub struct Replay {
    pub entries: Vec<StoredEntry>,
    /// Byte length covered by complete frames.
    pub valid_len: u64,
}

/// Append-only log of `u32` little-endian length-prefixed bincode frames.
///
/// Frames are staged whole in memory and written on `flush_sync`. The file
/// only ever grows by complete frames: a failed write is cut back to the last
/// committed length, and if even that fails the log refuses further writes.
pub struct Wal {
    path: PathBuf,
    file: File,
    pending: Vec<u8>,
    // bytes of complete frames on disk
    committed: u64,
    poisoned: Option<String>,
}

impl Wal {
    pub const FILE_NAME: &'static str = "records.wal";

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let path = dir.as_ref().join(Self::FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let committed = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            pending: Vec::new(),
            committed,
            poisoned: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &StoredEntry) -> Result<()> {
        self.check_poisoned()?;
        let bytes = bincode::serialize(entry)?;
        let len = bytes.len() as u32;
        self.pending.extend_from_slice(&len.to_le_bytes());
        self.pending.extend_from_slice(&bytes);
        Ok(())
    }

    /// Write staged frames and fsync.
    pub fn flush_sync(&mut self) -> Result<()> {
        self.check_poisoned()?;
        if !self.pending.is_empty() {
            if let Err(e) = self.file.write_all(&self.pending) {
                self.rollback(&e);
                return Err(e.into());
            }
            self.committed += self.pending.len() as u64;
            self.pending.clear();
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Cut a partially written batch off the file. Staged frames are kept so
    /// a later flush can retry them.
    fn rollback(&mut self, cause: &std::io::Error) {
        match self.file.set_len(self.committed) {
            Ok(()) => {
                tracing::warn!(path = %self.path.display(), error = %cause, "wal write failed, rolled back");
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "wal rollback failed, log is read-only");
                self.poisoned = Some(format!(
                    "write-ahead log {} is unusable after a failed write: {cause}",
                    self.path.display()
                ));
            }
        }
    }

    fn check_poisoned(&self) -> Result<()> {
        match &self.poisoned {
            Some(msg) => Err(JsonStashError::Store(msg.clone())),
            None => Ok(()),
        }
    }

    /// Read every complete frame. A frame cut short by EOF ends the replay
    /// and is excluded from `valid_len`; a complete frame that does not
    /// decode is a store error.
    pub fn replay(&self) -> Result<Replay> {
        let file = OpenOptions::new().read(true).open(&self.path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        let mut valid_len = 0u64;
        loop {
            let mut len_buf = [0u8; 4];
            if let Err(e) = reader.read_exact(&mut len_buf) {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    break;
                }
                return Err(e.into());
            }
            let len = u32::from_le_bytes(len_buf) as u64;
            if len > file_len - valid_len - 4 {
                tracing::warn!(path = %self.path.display(), offset = valid_len, "torn frame at wal tail");
                break;
            }
            let mut data = vec![0u8; len as usize];
            reader.read_exact(&mut data)?;
            let entry: StoredEntry = bincode::deserialize(&data).map_err(|e| {
                JsonStashError::Store(format!(
                    "corrupt frame at offset {valid_len} in {}: {e}",
                    self.path.display()
                ))
            })?;
            entries.push(entry);
            valid_len += 4 + len;
        }
        Ok(Replay { entries, valid_len })
    }

    /// Log length in bytes, including staged frames.
    pub fn len(&self) -> u64 {
        self.committed + self.pending.len() as u64
    }

    /// Drop everything on disk past `len`. Staged frames are discarded.
    pub fn truncate_to(&mut self, len: u64) -> Result<()> {
        self.pending.clear();
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.committed = len;
        Ok(())
    }

    /// Swap the handle for a read-only one so every write fails.
    #[cfg(test)]
    pub(crate) fn fail_writes(&mut self) -> Result<()> {
        self.file = File::open(&self.path)?;
        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if self.pending.is_empty() || self.poisoned.is_some() {
            return;
        }
        if let Err(e) = self.flush_sync() {
            tracing::warn!(path = %self.path.display(), "wal flush on close failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(id: u64, ds: &str, json: &str) -> StoredEntry {
        StoredEntry {
            id,
            dataset_name: ds.into(),
            serialized_record: json.into(),
        }
    }

    fn append_raw(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut raw = OpenOptions::new().append(true).open(path)?;
        raw.write_all(bytes)?;
        raw.sync_all()?;
        Ok(())
    }

    #[test]
    fn replays_appended_frames() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path())?;
        wal.append(&entry(1, "people", r#"{"a":1}"#))?;
        wal.append(&entry(2, "cars", r#"{"b":2}"#))?;
        wal.flush_sync()?;

        let replay = Wal::open(dir.path())?.replay()?;
        assert_eq!(replay.entries.len(), 2);
        assert_eq!(replay.entries[1], entry(2, "cars", r#"{"b":2}"#));
        assert_eq!(replay.valid_len, wal.len());
        Ok(())
    }

    #[test]
    fn staged_frames_are_not_on_disk_until_flushed() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path())?;
        wal.append(&entry(1, "people", r#"{"a":1}"#))?;
        assert!(wal.len() > 0);
        assert!(wal.replay()?.entries.is_empty());
        wal.flush_sync()?;
        assert_eq!(wal.replay()?.entries.len(), 1);
        Ok(())
    }

    #[test]
    fn staged_frames_are_written_on_drop() -> Result<()> {
        let dir = tempdir().unwrap();
        {
            let mut wal = Wal::open(dir.path())?;
            wal.append(&entry(1, "people", r#"{"a":1}"#))?;
        }
        assert_eq!(Wal::open(dir.path())?.replay()?.entries.len(), 1);
        Ok(())
    }

    #[test]
    fn torn_tail_is_ignored_and_truncatable() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path())?;
        wal.append(&entry(1, "people", r#"{"a":1}"#))?;
        wal.flush_sync()?;
        let good = wal.len();

        // a length prefix promising more bytes than follow
        append_raw(wal.path(), &100u32.to_le_bytes())?;
        append_raw(wal.path(), b"partial")?;

        let replay = wal.replay()?;
        assert_eq!(replay.entries.len(), 1);
        assert_eq!(replay.valid_len, good);

        wal.truncate_to(replay.valid_len)?;
        assert_eq!(wal.len(), good);
        assert_eq!(std::fs::metadata(wal.path())?.len(), good);
        Ok(())
    }

    #[test]
    fn oversized_length_prefix_is_a_torn_tail() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path())?;
        wal.append(&entry(1, "people", r#"{"a":1}"#))?;
        wal.flush_sync()?;
        let good = wal.len();

        append_raw(wal.path(), &u32::MAX.to_le_bytes())?;
        append_raw(wal.path(), b"xy")?;

        let replay = wal.replay()?;
        assert_eq!(replay.entries.len(), 1);
        assert_eq!(replay.valid_len, good);
        Ok(())
    }

    #[test]
    fn undecodable_frame_is_a_store_error() -> Result<()> {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path())?;
        // complete frame whose body is not a StoredEntry
        append_raw(wal.path(), &3u32.to_le_bytes())?;
        append_raw(wal.path(), &[0xff, 0xff, 0xff])?;

        match wal.replay() {
            Err(JsonStashError::Store(msg)) => assert!(msg.contains("offset 0")),
            other => panic!("expected Store error, got {:?}", other.map(|r| r.entries)),
        }
        Ok(())
    }

    #[test]
    fn failed_write_leaves_only_complete_frames() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut wal = Wal::open(dir.path())?;
        wal.append(&entry(1, "people", r#"{"a":1}"#))?;
        wal.flush_sync()?;

        wal.fail_writes()?;
        wal.append(&entry(2, "people", &"x".repeat(16 * 1024)))?;
        assert!(wal.flush_sync().is_err());

        // the read-only handle cannot truncate either, so the log is poisoned
        assert!(matches!(
            wal.append(&entry(3, "people", "{}")),
            Err(JsonStashError::Store(_))
        ));
        assert!(matches!(wal.flush_sync(), Err(JsonStashError::Store(_))));

        let replay = Wal::open(dir.path())?.replay()?;
        assert_eq!(replay.entries, vec![entry(1, "people", r#"{"a":1}"#)]);
        Ok(())
    }
}
