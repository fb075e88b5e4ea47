//! Snapshot file for queued and in-flight actions.
//!
//! The file holds one record per pending action, in queue order:
//! ```text
//! [u32 length][bincode serialized PendingAction]
//! [u32 length][bincode serialized PendingAction]
//! ...
//! ```
//! A snapshot is written to a sibling temp file and renamed over the old one,
//! so a crash mid-write leaves the previous snapshot intact.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::queue::PendingAction;
use crate::repository::{PendingActionRepository, RepositoryError, Result};

/// Largest record accepted when reading. Anything above is treated as a
/// corrupted length prefix.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

pub struct FilePendingStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FilePendingStore {
    /// Store at `{base_dir}/{session_id}/pending/pending_actions.log`.
    /// Directories are created if missing.
    pub fn new(base_dir: impl AsRef<Path>, session_id: &str) -> Result<Self> {
        let dir = base_dir.as_ref().join(session_id).join("pending");
        fs::create_dir_all(&dir)?;

        let path = dir.join("pending_actions.log");
        let tmp_path = dir.join("pending_actions.log.tmp");
        tracing::debug!("Pending action store at {}", path.display());

        Ok(Self { path, tmp_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(&self, actions: &[PendingAction]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.tmp_path)?;
        let mut writer = BufWriter::new(file);

        for action in actions {
            let bytes = bincode::serialize(action)
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
            if bytes.len() > MAX_RECORD_LEN {
                return Err(RepositoryError::RecordTooLarge {
                    len: bytes.len(),
                    limit: MAX_RECORD_LEN,
                });
            }
            writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
            writer.write_all(&bytes)?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| RepositoryError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

impl PendingActionRepository for FilePendingStore {
    fn save(&self, actions: &[PendingAction]) -> Result<()> {
        if let Err(e) = self.write_snapshot(actions) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(e);
        }
        fs::rename(&self.tmp_path, &self.path)?;
        tracing::trace!(count = actions.len(), "Saved pending actions");
        Ok(())
    }

    fn load(&self) -> Result<Vec<PendingAction>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);
        let mut actions = Vec::new();
        let mut index = 0usize;

        loop {
            let mut len_bytes = [0u8; 4];
            match read_full(&mut reader, &mut len_bytes)? {
                0 => break,
                4 => {}
                _ => {
                    tracing::warn!(record = index, "Truncated length prefix; stopping");
                    break;
                }
            }

            let len = u32::from_le_bytes(len_bytes) as usize;
            if len > MAX_RECORD_LEN {
                tracing::warn!(
                    record = index,
                    len,
                    "Record length exceeds limit; stopping"
                );
                break;
            }

            let mut data = vec![0u8; len];
            if read_full(&mut reader, &mut data)? < len {
                tracing::warn!(record = index, "Truncated record; stopping");
                break;
            }

            match bincode::deserialize::<PendingAction>(&data) {
                Ok(action) => actions.push(action),
                Err(e) => {
                    tracing::warn!(record = index, error = %e, "Skipping corrupt pending action");
                }
            }
            index += 1;
        }

        Ok(actions)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_core::{Action, EntityAddress, StateModifier, Speculation, TransferAssetAction};
    use tempfile::TempDir;

    fn pending(amount: u64) -> PendingAction {
        let agent = EntityAddress::shared("persist-agent");
        let action = Action::new(
            agent,
            TransferAssetAction {
                recipient: EntityAddress::shared("persist-friend"),
                amount,
                memo: Some(format!("#{amount}")),
            },
        );
        PendingAction::new(
            action,
            vec![Speculation::new(
                agent,
                StateModifier::AdjustBalance {
                    amount: -(amount as i64),
                },
            )],
        )
    }

    #[test]
    fn save_then_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = FilePendingStore::new(dir.path(), "session").unwrap();
        let actions = vec![pending(1), pending(2), pending(3)];

        store.save(&actions).unwrap();
        assert_eq!(store.load().unwrap(), actions);

        // A second save replaces the snapshot.
        store.save(&actions[1..]).unwrap();
        assert_eq!(store.load().unwrap(), actions[1..].to_vec());
        assert!(!store.path().with_extension("log.tmp").exists());
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FilePendingStore::new(dir.path().join("nested"), "fresh").unwrap();
        assert!(store.load().unwrap().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_record_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = FilePendingStore::new(dir.path(), "corrupt").unwrap();
        let (first, last) = (pending(10), pending(30));

        let mut bytes = Vec::new();
        for record in [
            bincode::serialize(&first).unwrap(),
            vec![0xff; 7],
            bincode::serialize(&last).unwrap(),
        ] {
            bytes.extend_from_slice(&(record.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&record);
        }
        fs::write(store.path(), bytes).unwrap();

        assert_eq!(store.load().unwrap(), vec![first, last]);
    }

    #[test]
    fn truncated_tail_keeps_complete_records() {
        let dir = TempDir::new().unwrap();
        let store = FilePendingStore::new(dir.path(), "truncated").unwrap();
        let (first, second) = (pending(5), pending(6));
        store.save(&[first.clone(), second]).unwrap();

        let mut bytes = fs::read(store.path()).unwrap();
        bytes.truncate(bytes.len() - 3);
        fs::write(store.path(), &bytes).unwrap();
        assert_eq!(store.load().unwrap(), vec![first]);
    }

    #[test]
    fn oversized_length_stops_reading() {
        let dir = TempDir::new().unwrap();
        let store = FilePendingStore::new(dir.path(), "oversized").unwrap();
        let first = pending(1);

        let record = bincode::serialize(&first).unwrap();
        let mut bytes = (record.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&record);
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]);
        fs::write(store.path(), bytes).unwrap();

        assert_eq!(store.load().unwrap(), vec![first]);
    }

    #[test]
    fn clear_removes_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = FilePendingStore::new(dir.path(), "clear").unwrap();
        store.save(&[pending(1)]).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
