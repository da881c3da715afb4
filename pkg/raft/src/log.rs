//! The durable log component: append, random-access read, forward iteration.
//!
//! Two implementations share [`Log`]: [`MemoryLog`] (the reference behavior — entries are lost
//! on restart) and [`FileLog`], which mirrors every append as a JSON line to an append-only file
//! and replays it at construction time so a restarted node does not silently lose committed
//! history.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::errors::{RaftError, RaftResult};
use crate::types::{LogEntry, LogIndex, Term};

/// Append-only, dense, 1-indexed log of [`LogEntry`] values.
pub trait Log: Send {
    /// Appends `entry` at the end of the log. If an entry already occupies `entry.index`, this
    /// is a no-op when its term matches `entry.term`, or a truncate-then-append of the suffix
    /// starting at `entry.index` when it doesn't (the only case of a genuine conflict). Returns
    /// `InconsistentAppend` if `entry.index` is greater than `last_index() + 1`.
    fn append(&mut self, entry: LogEntry) -> RaftResult<()>;

    /// Removes every entry at index `from` and later. A no-op if `from > last_index()`.
    fn truncate_from(&mut self, from: LogIndex);

    fn get(&self, index: LogIndex) -> Option<LogEntry>;

    fn term(&self, index: LogIndex) -> Option<Term> {
        if index == 0 {
            return Some(0);
        }
        self.get(index).map(|e| e.term)
    }

    fn last_index(&self) -> LogIndex;

    fn last_term(&self) -> Term {
        self.term(self.last_index()).unwrap_or(0)
    }

    /// Entries from `from` (inclusive) through the end of the log, in index order.
    fn entries_from(&self, from: LogIndex) -> Vec<LogEntry>;
}

/// In-memory log. Matches the reference implementation: fast, simple, and non-durable.
#[derive(Default)]
pub struct MemoryLog {
    entries: Vec<LogEntry>,
}

impl MemoryLog {
    pub fn new() -> Self {
        MemoryLog { entries: Vec::new() }
    }

    fn index_to_slot(&self, index: LogIndex) -> Option<usize> {
        if index == 0 {
            return None;
        }
        let slot = (index - 1) as usize;
        if slot < self.entries.len() {
            Some(slot)
        } else {
            None
        }
    }
}

impl Log for MemoryLog {
    fn append(&mut self, entry: LogEntry) -> RaftResult<()> {
        append_with_truncate(&mut self.entries, entry)?;
        Ok(())
    }

    fn truncate_from(&mut self, from: LogIndex) {
        if from == 0 {
            self.entries.clear();
        } else if let Some(slot) = self.index_to_slot(from) {
            self.entries.truncate(slot);
        }
    }

    fn get(&self, index: LogIndex) -> Option<LogEntry> {
        self.index_to_slot(index).map(|slot| self.entries[slot].clone())
    }

    fn last_index(&self) -> LogIndex {
        self.entries.len() as LogIndex
    }

    fn entries_from(&self, from: LogIndex) -> Vec<LogEntry> {
        if from == 0 {
            return self.entries.clone();
        }
        match self.index_to_slot(from) {
            Some(slot) => self.entries[slot..].to_vec(),
            None => Vec::new(),
        }
    }
}

/// Shared truncate-then-append rule, usable by any `Vec`-backed log representation. Truncates
/// the suffix only when the entry already at `entry.index` conflicts (a different term) with the
/// incoming one; a resend of an entry that already matches is a no-op, leaving any later entries
/// untouched. Returns whether the log was actually mutated, so callers with side effects keyed on
/// mutation (e.g. `FileLog`'s rewrite) can skip them for a no-op.
fn append_with_truncate(entries: &mut Vec<LogEntry>, entry: LogEntry) -> RaftResult<bool> {
    let expected = entries.len() as LogIndex + 1;
    if entry.index > expected {
        return Err(RaftError::InconsistentAppend { expected, attempted: entry.index });
    }

    if entry.index < expected {
        let slot = (entry.index - 1) as usize;
        if entries[slot].term == entry.term {
            return Ok(false);
        }
        // Conflicting entry: truncate the suffix starting here and replace it, per log-matching.
        entries.truncate(slot);
    }
    entries.push(entry);
    Ok(true)
}

/// File-backed log. Keeps the same in-memory representation as [`MemoryLog`] for reads, but
/// mirrors every append as one JSON line to `path`, and replays that file at construction.
///
/// The backing file is opened in append mode for the common case (pure appends dominate
/// steady-state replication). A conflicting append — a follower overwriting an uncommitted
/// suffix — instead rewrites the file from scratch from the truncated in-memory log, since the
/// file itself has no in-place truncation primitive that's portable and race-free.
pub struct FileLog {
    memory: MemoryLog,
    path: PathBuf,
    file: File,
}

impl FileLog {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut memory = MemoryLog::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: LogEntry = serde_json::from_str(&line)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                memory.entries.push(entry);
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(FileLog { memory, path, file })
    }

    fn rewrite_from_memory(&mut self) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        for entry in &self.memory.entries {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
        }
        file.flush()?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }
}

impl Log for FileLog {
    fn append(&mut self, entry: LogEntry) -> RaftResult<()> {
        let was_overwrite = entry.index <= self.memory.last_index();
        let changed = append_with_truncate(&mut self.memory.entries, entry)?;
        if !changed {
            // Resent entry already matches what's on disk; nothing to mirror.
            return Ok(());
        }

        if was_overwrite {
            self.rewrite_from_memory().map_err(|e| RaftError::Internal(e.to_string()))?;
            return Ok(());
        }

        let line = serde_json::to_string(self.memory.entries.last().unwrap())
            .map_err(|e| RaftError::Internal(e.to_string()))?;
        writeln!(self.file, "{line}").map_err(|e| RaftError::Internal(e.to_string()))?;
        self.file.flush().map_err(|e| RaftError::Internal(e.to_string()))?;
        Ok(())
    }

    fn truncate_from(&mut self, from: LogIndex) {
        self.memory.truncate_from(from);
        self.rewrite_from_memory().ok();
    }

    fn get(&self, index: LogIndex) -> Option<LogEntry> {
        self.memory.get(index)
    }

    fn last_index(&self) -> LogIndex {
        self.memory.last_index()
    }

    fn entries_from(&self, from: LogIndex) -> Vec<LogEntry> {
        self.memory.entries_from(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: LogIndex, term: Term) -> LogEntry {
        LogEntry { index, term, command: vec![] }
    }

    #[test]
    fn dense_append_succeeds() {
        let mut log = MemoryLog::new();
        log.append(entry(1, 1)).unwrap();
        log.append(entry(2, 1)).unwrap();
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.last_term(), 1);
    }

    #[test]
    fn non_dense_append_is_rejected() {
        let mut log = MemoryLog::new();
        let err = log.append(entry(2, 1)).unwrap_err();
        assert!(matches!(err, RaftError::InconsistentAppend { expected: 1, attempted: 2 }));
    }

    #[test]
    fn conflicting_append_truncates_suffix() {
        let mut log = MemoryLog::new();
        log.append(entry(1, 1)).unwrap();
        log.append(entry(2, 1)).unwrap();
        log.append(entry(3, 1)).unwrap();

        // A leader of term 2 overwrites starting at index 2.
        log.append(entry(2, 2)).unwrap();
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.term(2), Some(2));
    }

    #[test]
    fn resending_an_identical_entry_leaves_later_entries_intact() {
        let mut log = MemoryLog::new();
        log.append(entry(1, 1)).unwrap();
        log.append(entry(2, 1)).unwrap();
        log.append(entry(3, 1)).unwrap();

        // A heartbeat/retry resending an entry that already matches must not truncate index 3.
        log.append(entry(2, 1)).unwrap();
        assert_eq!(log.last_index(), 3);
        assert_eq!(log.term(3), Some(1));
    }

    #[test]
    fn entries_from_returns_suffix() {
        let mut log = MemoryLog::new();
        for i in 1..=5 {
            log.append(entry(i, 1)).unwrap();
        }
        assert_eq!(log.entries_from(3).len(), 3);
        assert_eq!(log.entries_from(10).len(), 0);
    }

    #[test]
    fn file_log_replays_on_reopen() {
        let dir = std::env::temp_dir().join(format!("raft-log-test-{}", uuid_like()));
        let path = dir.join("log.jsonl");

        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(entry(1, 1)).unwrap();
            log.append(entry(2, 1)).unwrap();
        }

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.term(2), Some(1));

        std::fs::remove_dir_all(&dir).ok();
    }

    fn uuid_like() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as u64
    }
}
