//! Evaluation journal (C9): append-only log of completed inference
//! records, newline-delimited JSON, one record per finished device→edge
//! round trip.
//!
//! Backed by `split-mmap`'s memory-mapped file wrapper rather than
//! buffered file writes: the file carries an 16-byte header (`write_offset`,
//! `record_count`, both `u64` LE) followed by the NDJSON body, and the
//! mapping is grown by doubling when a record would not fit. A single
//! `Mutex` around the mapping gives the "one lock around the underlying
//! mmap region" single-writer discipline the rest of this workspace uses.

use serde::{Deserialize, Serialize};
use split_core::ClientId;
use split_mmap::{MmapFile, MmapFileMut};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const HEADER_LEN: u64 = 16;
const INITIAL_CAPACITY: u64 = 1 << 20; // 1 MiB

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("failed to open journal at '{path}'")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to grow journal file")]
    Grow(#[source] std::io::Error),

    #[error("failed to serialise record")]
    Serialize(#[from] serde_json::Error),

    #[error("journal file is corrupt: {0}")]
    Corrupt(String),
}

/// One completed device -> edge inference round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRecord {
    pub timestamp_send: f64,
    pub timestamp_recv: f64,
    pub client_id: String,
    pub message_id: String,
    /// Raw wire `k`: `-1` means the device ran the whole model locally.
    pub k: i32,
    pub activation_bytes: u32,
    pub per_layer_device_times: Vec<f32>,
}

impl EvaluationRecord {
    pub fn client_id(&self) -> Result<ClientId, split_core::CoreError> {
        ClientId::new(self.client_id.clone())
    }
}

struct Inner {
    mmap: MmapFileMut,
    write_offset: u64,
    record_count: u64,
}

pub struct EvaluationJournal {
    path: PathBuf,
    state: Mutex<Inner>,
}

impl EvaluationJournal {
    /// Opens (creating if necessary) the journal file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.to_string_lossy().to_string();

        let exists = path.exists();
        let mut mmap = if exists {
            MmapFileMut::open_rw(&path).map_err(|source| JournalError::Open { path: path_str.clone(), source })?
        } else {
            MmapFileMut::create_rw(&path, INITIAL_CAPACITY)
                .map_err(|source| JournalError::Open { path: path_str.clone(), source })?
        };

        let (write_offset, record_count) = if exists {
            let header = &mmap.as_mut_slice()[0..HEADER_LEN as usize];
            let write_offset = u64::from_le_bytes(header[0..8].try_into().unwrap());
            let record_count = u64::from_le_bytes(header[8..16].try_into().unwrap());
            if write_offset < HEADER_LEN {
                return Err(JournalError::Corrupt(format!(
                    "write_offset {write_offset} is smaller than the header length"
                )));
            }
            (write_offset, record_count)
        } else {
            write_header(&mut mmap, HEADER_LEN, 0);
            (HEADER_LEN, 0)
        };

        Ok(Self { path, state: Mutex::new(Inner { mmap, write_offset, record_count }) })
    }

    /// Appends one record. Grows the backing mapping (doubling capacity)
    /// if the serialised record plus its trailing newline would not fit.
    pub fn append(&self, record: &EvaluationRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut inner = self.state.lock().unwrap();
        let needed_end = inner.write_offset + line.len() as u64;
        if needed_end > inner.mmap.len() as u64 {
            self.grow_to_locked(&mut inner, needed_end)?;
        }

        let offset = inner.write_offset as usize;
        inner.mmap.as_mut_slice()[offset..offset + line.len()].copy_from_slice(&line);
        inner.write_offset += line.len() as u64;
        inner.record_count += 1;
        write_header(&mut inner.mmap, inner.write_offset, inner.record_count);

        Ok(())
    }

    fn grow_to_locked(&self, inner: &mut Inner, needed_len: u64) -> Result<(), JournalError> {
        let mut new_capacity = (inner.mmap.len() as u64).max(INITIAL_CAPACITY);
        while new_capacity < needed_len {
            new_capacity *= 2;
        }

        let existing_len = inner.write_offset as usize;
        let mut preserved = vec![0u8; existing_len];
        preserved.copy_from_slice(&inner.mmap.as_mut_slice()[..existing_len]);

        let mut grown = MmapFileMut::create_rw(&self.path, new_capacity).map_err(JournalError::Grow)?;
        grown.as_mut_slice()[..existing_len].copy_from_slice(&preserved);
        inner.mmap = grown;
        Ok(())
    }

    /// Number of records appended so far (including ones written in a
    /// prior process lifetime, if this journal was opened from an
    /// existing file).
    pub fn len(&self) -> u64 {
        self.state.lock().unwrap().record_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads every record currently in the journal. For diagnostics and
    /// tests; not on the append hot path.
    pub fn iter_records(&self) -> Result<Vec<EvaluationRecord>, JournalError> {
        let inner = self.state.lock().unwrap();
        let body = &inner.mmap.as_slice()[HEADER_LEN as usize..inner.write_offset as usize];
        parse_ndjson(body)
    }
}

fn write_header(mmap: &mut MmapFileMut, write_offset: u64, record_count: u64) {
    let header = mmap.as_mut_slice();
    header[0..8].copy_from_slice(&write_offset.to_le_bytes());
    header[8..16].copy_from_slice(&record_count.to_le_bytes());
}

fn parse_ndjson(body: &[u8]) -> Result<Vec<EvaluationRecord>, JournalError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| JournalError::Corrupt(format!("journal body is not valid UTF-8: {e}")))?;
    text.lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(JournalError::from))
        .collect()
}

/// Read-only view, for offline tools that only need to stream an
/// already-closed journal without taking the write lock.
pub fn read_only_records(path: impl AsRef<Path>) -> Result<Vec<EvaluationRecord>, JournalError> {
    let path = path.as_ref();
    let mmap = MmapFile::open_ro(path)
        .map_err(|source| JournalError::Open { path: path.to_string_lossy().to_string(), source })?;
    let write_offset = u64::from_le_bytes(mmap.as_slice()[0..8].try_into().unwrap());
    parse_ndjson(&mmap.as_slice()[HEADER_LEN as usize..write_offset as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(message_id: &str) -> EvaluationRecord {
        EvaluationRecord {
            timestamp_send: 1.0,
            timestamp_recv: 1.2,
            client_id: "dev-1".into(),
            message_id: message_id.into(),
            k: 10,
            activation_bytes: 4096,
            per_layer_device_times: vec![0.01, 0.02, 0.03],
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("split_journal_{name}_{:?}", std::thread::current().id()))
    }

    #[test]
    fn append_then_iter_round_trips() {
        let path = temp_path("roundtrip");
        let _ = std::fs::remove_file(&path);
        let journal = EvaluationJournal::open(&path).unwrap();

        journal.append(&sample("aaaa")).unwrap();
        journal.append(&sample("bbbb")).unwrap();

        assert_eq!(journal.len(), 2);
        let records = journal.iter_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message_id, "aaaa");
        assert_eq!(records[1].message_id, "bbbb");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reopening_an_existing_journal_preserves_records() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);
        {
            let journal = EvaluationJournal::open(&path).unwrap();
            journal.append(&sample("aaaa")).unwrap();
        }
        {
            let journal = EvaluationJournal::open(&path).unwrap();
            assert_eq!(journal.len(), 1);
            journal.append(&sample("bbbb")).unwrap();
            assert_eq!(journal.len(), 2);
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let path = temp_path("grow");
        let _ = std::fs::remove_file(&path);
        let journal = EvaluationJournal::open(&path).unwrap();

        // Each record is small; appending many forces at least one growth
        // past the 1 MiB initial capacity.
        let big_times: Vec<f32> = vec![0.001; 20_000];
        let mut record = sample("gggg");
        record.per_layer_device_times = big_times;
        for _ in 0..5 {
            journal.append(&record).unwrap();
        }
        assert_eq!(journal.len(), 5);
        assert_eq!(journal.iter_records().unwrap().len(), 5);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn read_only_records_matches_writer_view() {
        let path = temp_path("readonly");
        let _ = std::fs::remove_file(&path);
        {
            let journal = EvaluationJournal::open(&path).unwrap();
            journal.append(&sample("aaaa")).unwrap();
            journal.append(&sample("bbbb")).unwrap();
        }
        let records = read_only_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        let _ = std::fs::remove_file(&path);
    }
}
