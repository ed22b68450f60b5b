// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Persistent error journal.
//!
//! Every fatal error of a run is recorded in a JSON journal file, so
//! recurring failures can be reviewed later. Errors are deduplicated by
//! message. Recording the same message again bumps its occurrence count
//! rather than adding a new entry.
//!
//! Entries that have been dealt with can be moved into a separate archive
//! file, which keeps the journal itself short.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Single recorded error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: u64,
    pub message: String,

    /// Chain of error causes, if any.
    pub stack: Option<String>,
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: DateTime<Utc>,
    pub count: u64,
}

/// Error journal backed by JSON files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorJournal {
    path: PathBuf,
    archive_path: PathBuf,
}

impl ErrorJournal {
    /// Construct new journal. Files are only created once written to.
    pub fn new(path: impl Into<PathBuf>, archive_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            archive_path: archive_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Read all journal entries.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::Read`] if journal exists but cannot be read.
    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        load(&self.path)
    }

    /// Read all archived entries.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::Read`] if archive exists but cannot be read.
    pub fn archived(&self) -> Result<Vec<JournalEntry>> {
        load(&self.archive_path)
    }

    /// Record error occurring now.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::Read`] if journal cannot be read.
    /// - Return [`JournalError::Write`] if journal cannot be written.
    pub fn record(
        &self,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> Result<JournalEntry> {
        self.record_at(message, stack, Utc::now())
    }

    /// Record error occurring at target time.
    ///
    /// Time is truncated to millisecond precision.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::Read`] if journal cannot be read.
    /// - Return [`JournalError::Write`] if journal cannot be written.
    #[instrument(skip(self, message, stack), level = "debug")]
    pub fn record_at(
        &self,
        message: impl Into<String>,
        stack: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<JournalEntry> {
        let message = message.into();
        let at = at.trunc_subsecs(3);
        let mut entries = self.entries()?;

        let entry = match entries.iter_mut().find(|entry| entry.message == message) {
            Some(entry) => {
                entry.count += 1;
                entry.last_occurrence = at;
                entry.stack = stack;
                debug!("error {} occurred {} times", entry.id, entry.count);
                entry.clone()
            }
            None => {
                let entry = JournalEntry {
                    id: next_id(&entries),
                    message,
                    stack,
                    first_occurrence: at,
                    last_occurrence: at,
                    count: 1,
                };
                entries.push(entry.clone());
                debug!("recorded new error {}", entry.id);
                entry
            }
        };

        store(&self.path, &entries)?;

        Ok(entry)
    }

    /// Move entry from journal into archive.
    ///
    /// # Errors
    ///
    /// - Return [`JournalError::UnknownEntry`] if no entry has target id.
    /// - Return [`JournalError::Read`] or [`JournalError::Write`] if files
    ///   cannot be accessed.
    #[instrument(skip(self), level = "debug")]
    pub fn archive(&self, id: u64) -> Result<JournalEntry> {
        let mut entries = self.entries()?;
        let at = entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(JournalError::UnknownEntry { id })?;
        let entry = entries.remove(at);

        let mut archived = self.archived()?;
        archived.push(entry.clone());

        // INVARIANT: Write archive first, so an entry is never lost in between.
        store(&self.archive_path, &archived)?;
        store(&self.path, &entries)?;

        Ok(entry)
    }
}

fn next_id(entries: &[JournalEntry]) -> u64 {
    entries.iter().map(|entry| entry.id).max().map_or(1, |id| id + 1)
}

fn load(path: &Path) -> Result<Vec<JournalEntry>> {
    let content = match read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(JournalError::Read {
                source: err,
                path: path.to_path_buf(),
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str(&content) {
        Ok(entries) => Ok(entries),
        Err(err) => {
            warn!("journal {:?} is corrupt, starting over: {err}", path.display());
            Ok(Vec::new())
        }
    }
}

fn store(path: &Path, entries: &[JournalEntry]) -> Result<()> {
    let write_err = |err| JournalError::Write {
        source: err,
        path: path.to_path_buf(),
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(write_err)?;
    }

    let content = serde_json::to_string_pretty(entries)?;
    write(path, content).map_err(write_err)?;

    Ok(())
}

/// Error journal error types.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// No journal entry with target id.
    #[error("no journal entry with id {id}")]
    UnknownEntry { id: u64 },

    /// Journal file cannot be read.
    #[error("failed to read journal at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Journal file cannot be written.
    #[error("failed to write journal at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Journal entries cannot be serialized.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = JournalError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, secs).unwrap()
    }

    #[test]
    fn record_deduplicates_by_message() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let journal = ErrorJournal::new(
            root.path().join("state/errors.json"),
            root.path().join("state/archive.json"),
        );

        journal.record_at("compose failed", None, at(0))?;
        journal.record_at("no environment", None, at(1))?;
        let entry = journal.record_at("compose failed", Some("exit 1".into()), at(2))?;

        let expect = JournalEntry {
            id: 1,
            message: "compose failed".into(),
            stack: Some("exit 1".into()),
            first_occurrence: at(0),
            last_occurrence: at(2),
            count: 2,
        };
        assert_eq!(entry, expect);

        let entries = journal.entries()?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], expect);
        assert_eq!(entries[1].id, 2);

        let content = read_to_string(journal.path())?;
        assert!(content.contains(r#""firstOccurrence": "2025-01-01T12:00:00Z""#));
        assert!(content.contains(r#""lastOccurrence": "2025-01-01T12:00:02Z""#));

        Ok(())
    }

    #[test]
    fn record_truncates_to_millis() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let journal = ErrorJournal::new(root.path().join("errors.json"), root.path().join("a.json"));

        let now = at(0) + chrono::Duration::nanoseconds(123_456_789);
        let entry = journal.record_at("boom", None, now)?;
        assert_eq!(entry.first_occurrence.timestamp_subsec_nanos(), 123_000_000);

        Ok(())
    }

    #[test]
    fn archive_moves_entry() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let journal = ErrorJournal::new(root.path().join("errors.json"), root.path().join("archive.json"));

        journal.record_at("first", None, at(0))?;
        journal.record_at("second", None, at(1))?;
        let archived = journal.archive(1)?;
        assert_eq!(archived.message, "first");

        let result = journal.entries()?;
        assert_eq!(result.iter().map(|entry| entry.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(journal.archived()?, vec![archived]);

        let entry = journal.record_at("third", None, at(2))?;
        assert_eq!(entry.id, 3);

        let result = journal.archive(1);
        assert!(matches!(result, Err(JournalError::UnknownEntry { id: 1 })));

        Ok(())
    }

    #[test]
    fn corrupt_journal_starts_over() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let path = root.path().join("errors.json");
        write(&path, "{ not json")?;

        let journal = ErrorJournal::new(&path, root.path().join("archive.json"));
        assert!(journal.entries()?.is_empty());

        let entry = journal.record_at("boom", None, at(0))?;
        assert_eq!(entry.id, 1);
        assert_eq!(journal.entries()?.len(), 1);

        Ok(())
    }
}
