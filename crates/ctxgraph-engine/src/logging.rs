//! Append-only JSONL log sinks under a configurable data root (§6
//! file-system side effects), grounded on `original_source/log_config.py`'s
//! date-session filename pattern and subdirectory layout. Each line is one
//! self-contained JSON object; files rotate by UTC date, never mutated in
//! place.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

const INJECTIONS_SUBDIR: &str = "injections";
const WARNINGS_SUBDIR: &str = "warnings";
const SESSION_METRICS_SUBDIR: &str = "session_metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Injections,
    Warnings,
    SessionMetrics,
}

impl LogCategory {
    fn subdir(self) -> &'static str {
        match self {
            LogCategory::Injections => INJECTIONS_SUBDIR,
            LogCategory::Warnings => WARNINGS_SUBDIR,
            LogCategory::SessionMetrics => SESSION_METRICS_SUBDIR,
        }
    }
}

/// Writes dated, append-only JSONL files under `{data_root}/{category}/`.
/// Reopens the file on every write (rotation is just "today's filename
/// differs") rather than holding a long-lived handle, since these writes
/// are infrequent relative to the graph thread's hot path.
pub struct LogSink {
    data_root: PathBuf,
    session_id: String,
}

impl LogSink {
    pub fn new(data_root: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            data_root: data_root.into(),
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Serializes `value` and appends it as one line to today's log file
    /// for `category`. Creates the subdirectory on first use. I/O failures
    /// are logged, never propagated — a missing log line must not fail the
    /// operation that produced it.
    pub fn write(&self, category: LogCategory, value: &impl Serialize) {
        let dir = self.data_root.join(category.subdir());
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(error = %e, dir = %dir.display(), "failed to create log directory");
            return;
        }

        let filename = self.filename();
        let path = dir.join(&filename);

        let line = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize log line");
                return;
            }
        };

        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{line}") {
                    tracing::warn!(error = %e, path = %path.display(), "failed to append log line");
                    return;
                }
                if let Err(e) = file.flush() {
                    tracing::warn!(error = %e, path = %path.display(), "failed to flush log file");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to open log file");
            }
        }
    }

    fn filename(&self) -> String {
        let date = chrono::Utc::now().format("%Y-%m-%d");
        format!("{date}-{}.jsonl", self.session_id)
    }
}

/// Path-safety for filename components embedded in a log path — mirrors
/// `log_config.py::validate_filename_component`.
pub fn validate_filename_component(value: &str) -> bool {
    !value.contains('\0')
        && !value.contains('/')
        && !value.contains('\\')
        && !value.contains(':')
        && !value.contains("..")
}

pub fn ensure_log_directories(data_root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(data_root)?;
    fs::create_dir_all(data_root.join(INJECTIONS_SUBDIR))?;
    fs::create_dir_all(data_root.join(WARNINGS_SUBDIR))?;
    fs::create_dir_all(data_root.join(SESSION_METRICS_SUBDIR))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::new(dir.path(), "test-session");
        sink.write(LogCategory::Warnings, &json!({"file": "a.py", "line": 1}));
        sink.write(LogCategory::Warnings, &json!({"file": "b.py", "line": 2}));

        let warnings_dir = dir.path().join(WARNINGS_SUBDIR);
        let entries: Vec<_> = fs::read_dir(&warnings_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let content = fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(serde_json::from_str::<serde_json::Value>(lines[0]).is_ok());
    }

    #[test]
    fn filename_embeds_date_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::new(dir.path(), "abc123");
        let filename = sink.filename();
        assert!(filename.ends_with("-abc123.jsonl"));
        assert!(filename.starts_with(&chrono::Utc::now().format("%Y-%m-%d").to_string()));
    }

    #[test]
    fn rejects_unsafe_filename_components() {
        assert!(!validate_filename_component("../escape"));
        assert!(!validate_filename_component("a/b"));
        assert!(validate_filename_component("abc-123"));
    }
}
