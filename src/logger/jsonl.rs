//! JSONL activity log: one self-contained JSON object per line.
//!
//! Records what the tool did to which volume (fill, release, catalog
//! queries, failures) so a test run leaves an auditable trail. Logging must
//! never fail an operation: if the log file cannot be opened or written,
//! the writer degrades to stderr and finally to discarding.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Event types matching the mdf activity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CatalogQuery,
    Fill,
    Release,
    Error,
}

/// A single log entry; optional fields are omitted from the JSON when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Bytes written (fill) or freed (release).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Creation strategy that produced the artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            mount: None,
            artifact: None,
            bytes: None,
            method: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Degradation state of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    File,
    Stderr,
    Discard,
}

/// Append-only JSONL writer with a file → stderr → discard fallback chain.
pub struct JsonlWriter {
    path: PathBuf,
    file: Option<File>,
    state: WriterState,
}

impl JsonlWriter {
    /// Open the log file for appending, creating parent directories.
    /// An unopenable path degrades to stderr instead of failing.
    pub fn open(path: PathBuf) -> Self {
        match open_append(&path) {
            Ok(file) => Self {
                path,
                file: Some(file),
                state: WriterState::File,
            },
            Err(error) => {
                let _ = writeln!(
                    io::stderr(),
                    "[mdf] activity log unavailable at {} ({error}); logging to stderr",
                    path.display()
                );
                Self {
                    path,
                    file: None,
                    state: WriterState::Stderr,
                }
            }
        }
    }

    /// Write one entry as a single atomic line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(error) => {
                let _ = writeln!(io::stderr(), "[mdf] log serialize error: {error}");
                return;
            }
        };

        match self.state {
            WriterState::File => {
                let write_failed = self
                    .file
                    .as_mut()
                    .is_none_or(|f| f.write_all(line.as_bytes()).is_err());
                if write_failed {
                    self.file = None;
                    self.state = WriterState::Stderr;
                    let _ = writeln!(
                        io::stderr(),
                        "[mdf] activity log write failed for {}; logging to stderr",
                        self.path.display()
                    );
                    let _ = write!(io::stderr(), "{line}");
                }
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "{line}").is_err() {
                    self.state = WriterState::Discard;
                }
            }
            WriterState::Discard => {}
        }
    }

    /// Flush the underlying file, if any.
    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    /// Current degradation state, for diagnostics.
    #[must_use]
    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::File => "file",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_valid_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut writer = JsonlWriter::open(path.clone());

        let mut entry = LogEntry::new(EventType::Fill, Severity::Info);
        entry.mount = Some("/data".to_string());
        entry.bytes = Some(513_802_240);
        entry.method = Some("native_preallocate".to_string());
        writer.write_entry(&entry);
        writer.flush();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event"], "fill");
        assert_eq!(parsed["mount"], "/data");
        assert_eq!(parsed["bytes"], 513_802_240u64);
    }

    #[test]
    fn unset_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.jsonl");
        let mut writer = JsonlWriter::open(path.clone());

        writer.write_entry(&LogEntry::new(EventType::CatalogQuery, Severity::Info));
        writer.flush();

        let line = fs::read_to_string(&path).unwrap();
        assert!(!line.contains("\"mount\""));
        assert!(!line.contains("\"error_code\""));
        assert!(!line.contains("\"bytes\""));
    }

    #[test]
    fn multiple_entries_stay_on_separate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.jsonl");
        let mut writer = JsonlWriter::open(path.clone());

        for _ in 0..4 {
            writer.write_entry(&LogEntry::new(EventType::Release, Severity::Info));
        }
        writer.flush();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 4);
        for line in contents.lines() {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("log.jsonl");
        let mut writer = JsonlWriter::open(path.clone());
        assert_eq!(writer.state(), "file");

        writer.write_entry(&LogEntry::new(EventType::Error, Severity::Warning));
        writer.flush();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn unopenable_path_degrades_to_stderr() {
        let writer = JsonlWriter::open(PathBuf::from("/proc/mdf-cannot-write-here/log.jsonl"));
        assert_eq!(writer.state(), "stderr");
    }
}
