//! Activity log: append-only line-delimited JSON of committed and rejected work.
//!
//! Each line is a self-contained JSON object, assembled in memory and written
//! with a single `write_all` so that a concurrent reader tailing the file never
//! sees a partial line.
//!
//! Fallback chain:
//! 1. Configured file path
//! 2. stderr with `[DTR-ACTIVITY]` prefix
//! 3. Silent discard (tree operations never fail because of logging)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{DtrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ImportCommitted,
    ImportRejected,
    NodeDeleted,
    ServerStarted,
}

/// A single activity entry. Only `ts`, `event` and `severity` are always set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// RFC 3339 UTC wall-clock time of the entry.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Batch `updateDate` or delete date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
    /// Rows written to the nodes table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ActivityEntry {
    /// Create a new entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            date: None,
            node_id: None,
            items: None,
            created: None,
            updated: None,
            written: None,
            removed: None,
            history: None,
            duration_ms: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// Attach the code and message of a failure.
    #[must_use]
    pub fn with_error(mut self, err: &DtrError) -> Self {
        self.error_code = Some(err.code().to_string());
        self.error_message = Some(err.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    File,
    Stderr,
    Discard,
}

struct Inner {
    writer: Option<BufWriter<File>>,
    state: WriterState,
    lines: u64,
}

/// Thread-safe JSONL activity writer.
pub struct ActivityLog {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl ActivityLog {
    /// Open the log for appending. Falls through the degradation chain when the
    /// file cannot be opened.
    #[must_use]
    pub fn open(path: &Path) -> Self {
        let inner = match open_append(path) {
            Ok(file) => Inner {
                writer: Some(BufWriter::new(file)),
                state: WriterState::File,
                lines: 0,
            },
            Err(err) => {
                let _ = writeln!(
                    io::stderr(),
                    "[DTR-ACTIVITY] cannot open {}: {err}; using stderr",
                    path.display()
                );
                Inner {
                    writer: None,
                    state: WriterState::Stderr,
                    lines: 0,
                }
            }
        };
        Self {
            path: path.to_path_buf(),
            inner: Mutex::new(inner),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it.
    pub fn record(&self, entry: &ActivityEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[DTR-ACTIVITY] serialize error: {e}");
                return;
            }
        };
        let mut inner = self.inner.lock();
        write_line(&mut inner, &line);
    }

    /// Current degradation state.
    #[must_use]
    pub fn state(&self) -> &'static str {
        match self.inner.lock().state {
            WriterState::File => "file",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    /// Lines accepted since the log was opened, on any sink.
    #[must_use]
    pub fn lines_written(&self) -> u64 {
        self.inner.lock().lines
    }
}

fn write_line(inner: &mut Inner, line: &str) {
    loop {
        match inner.state {
            WriterState::File => {
                let ok = inner.writer.as_mut().is_some_and(|w| {
                    w.write_all(line.as_bytes()).is_ok() && w.flush().is_ok()
                });
                if ok {
                    inner.lines += 1;
                    return;
                }
                inner.writer = None;
                inner.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[DTR-ACTIVITY] file write failed, using stderr");
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[DTR-ACTIVITY] {line}").is_ok() {
                    inner.lines += 1;
                } else {
                    inner.state = WriterState::Discard;
                }
                return;
            }
            WriterState::Discard => return,
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| DtrError::io(parent, source))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DtrError::io(path, source))
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_separate_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/activity.jsonl");
        let log = ActivityLog::open(&path);
        assert_eq!(log.state(), "file");

        let mut committed = ActivityEntry::new(EventType::ImportCommitted, Severity::Info);
        committed.items = Some(3);
        log.record(&committed);
        log.record(&ActivityEntry::new(EventType::ServerStarted, Severity::Info));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "import_committed");
        assert_eq!(first["severity"], "info");
        assert_eq!(first["items"], 3);
        assert!(first.get("node_id").is_none());
        assert_eq!(log.lines_written(), 2);
    }

    #[test]
    fn error_fields_carry_code() {
        let err = DtrError::validation("bad date");
        let entry = ActivityEntry::new(EventType::ImportRejected, Severity::Warning).with_error(&err);
        assert_eq!(entry.error_code.as_deref(), Some("DTR-2002"));
        assert!(entry.error_message.unwrap().contains("bad date"));
    }

    #[test]
    fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        ActivityLog::open(&path).record(&ActivityEntry::new(EventType::NodeDeleted, Severity::Info));
        ActivityLog::open(&path).record(&ActivityEntry::new(EventType::NodeDeleted, Severity::Info));
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn unopenable_path_degrades_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let log = ActivityLog::open(&blocker.join("activity.jsonl"));
        assert_eq!(log.state(), "stderr");
        log.record(&ActivityEntry::new(EventType::ServerStarted, Severity::Info));
    }
}
