use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use ctxgraph_core::{Clock, CtxGraphError, InvalidationCallback, Result, SystemClock};
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

/// Hardcoded directories and extensions that are never watched, regardless
/// of configuration (NFR-8 in the original design).
const ALWAYS_IGNORED: &[&str] = &[
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    "node_modules",
    ".tox",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".eggs",
    "*.egg-info",
    "dist",
    "build",
];

/// Files that are never watched even if the caller's ignore configuration
/// would otherwise let them through.
const SENSITIVE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "credentials.json",
    "*.key",
    "*.pem",
    "*.p12",
    "*.pfx",
    "*_key",
    "*_secret",
    "*.jks",
    "*.keystore",
    "*.truststore",
    "*.cer",
    "*.crt",
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    "secrets.yaml",
    "secrets.yml",
    ".npmrc",
    ".pypirc",
    "gcloud.json",
    ".aws",
];

const MAX_GITIGNORE_LINE_LEN: usize = 1000;

/// A file change observed by the watcher, already filtered to supported,
/// non-ignored paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(String),
    Modified(String),
    Deleted(String),
}

impl ChangeEvent {
    pub fn path(&self) -> &str {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Modified(p) | ChangeEvent::Deleted(p) => p,
        }
    }
}

/// Language-agnostic file system watcher: timestamp-only tracking, no
/// debouncing, extension-based dispatch, with a fixed ignore policy layered
/// under `.gitignore` and caller-provided patterns.
pub struct FileWatcher {
    project_root: PathBuf,
    gitignore_patterns: Vec<String>,
    user_ignore_patterns: HashSet<String>,
    timestamps: Mutex<std::collections::HashMap<String, f64>>,
    callbacks: Mutex<Vec<InvalidationCallback>>,
    clock: Arc<dyn Clock>,
}

impl FileWatcher {
    pub fn new(
        project_root: impl AsRef<Path>,
        gitignore_path: Option<PathBuf>,
        user_ignore_patterns: HashSet<String>,
    ) -> Result<Self> {
        Self::with_clock(
            project_root,
            gitignore_path,
            user_ignore_patterns,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        project_root: impl AsRef<Path>,
        gitignore_path: Option<PathBuf>,
        user_ignore_patterns: HashSet<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let project_root = project_root.as_ref().to_path_buf();
        let gitignore_path =
            gitignore_path.unwrap_or_else(|| project_root.join(".gitignore"));
        let gitignore_patterns = load_gitignore(&gitignore_path);

        Ok(Self {
            project_root,
            gitignore_patterns,
            user_ignore_patterns,
            timestamps: Mutex::new(std::collections::HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            clock,
        })
    }

    pub fn register_invalidation_callback(&self, callback: InvalidationCallback) {
        self.callbacks.lock().push(callback);
    }

    fn notify_invalidation_callbacks(&self, path: &str) {
        for cb in self.callbacks.lock().iter() {
            cb(path);
        }
    }

    pub fn update_timestamp(&self, path: &str) {
        let now = self.clock.now_secs();
        self.timestamps.lock().insert(path.to_string(), now);
    }

    pub fn get_timestamp(&self, path: &str) -> Option<f64> {
        self.timestamps.lock().get(path).copied()
    }

    /// Returns every path with a recorded event and clears the table, as
    /// in the upstream "process pending changes" sweep.
    pub fn drain_timestamps(&self) -> Vec<String> {
        let mut timestamps = self.timestamps.lock();
        let paths: Vec<String> = timestamps.keys().cloned().collect();
        timestamps.clear();
        paths
    }

    pub fn is_supported_file(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("py")
    }

    pub fn get_language(&self, path: &Path) -> Option<&'static str> {
        if self.is_supported_file(path) {
            Some("python")
        } else {
            None
        }
    }

    /// The 4-layer ignore policy: hardcoded directories, sensitive files,
    /// `.gitignore` patterns, then caller-configured patterns. Any match
    /// short-circuits to `true`.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let rel_path = path.strip_prefix(&self.project_root).unwrap_or(path);
        let rel_path_str = rel_path.to_string_lossy();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        for pattern in ALWAYS_IGNORED {
            if matches_pattern(path, &rel_path_str, &filename, pattern) {
                return true;
            }
        }
        for pattern in SENSITIVE_PATTERNS {
            if matches_pattern(path, &rel_path_str, &filename, pattern) {
                return true;
            }
        }
        for pattern in &self.gitignore_patterns {
            if matches_pattern(path, &rel_path_str, &filename, pattern) {
                return true;
            }
        }
        for pattern in &self.user_ignore_patterns {
            if matches_pattern(path, &rel_path_str, &filename, pattern) {
                return true;
            }
        }
        false
    }

    /// Drives the notify watcher loop; blocks the calling thread until the
    /// channel closes or a fatal watcher error occurs. Falls back to a
    /// 2-second poll watcher if the native backend (e.g. macOS FSEvents)
    /// panics on construction.
    pub fn watch(&self, tx: Sender<ChangeEvent>) -> Result<()> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel::<notify::Result<Event>>();

        let watcher_result = catch_unwind(AssertUnwindSafe(|| {
            let tx_clone = notify_tx.clone();
            notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = tx_clone.send(res);
            })
        }));

        let mut watcher: Box<dyn Watcher + Send> = match watcher_result {
            Ok(Ok(watcher)) => Box::new(watcher),
            Ok(Err(e)) => return Err(notify_error(e)),
            Err(_) => {
                tracing::warn!("native file watcher unavailable, falling back to polling");
                let tx_clone = notify_tx.clone();
                let poll_config =
                    NotifyConfig::default().with_poll_interval(Duration::from_secs(2));
                let poll_watcher = PollWatcher::new(
                    move |res: notify::Result<Event>| {
                        let _ = tx_clone.send(res);
                    },
                    poll_config,
                )
                .map_err(notify_error)?;
                Box::new(poll_watcher)
            }
        };

        watcher
            .watch(&self.project_root, RecursiveMode::Recursive)
            .map_err(notify_error)?;

        for res in notify_rx {
            let event = res.map_err(notify_error)?;
            for path in &event.paths {
                if path.is_dir() {
                    continue;
                }
                if self.should_ignore(path) {
                    continue;
                }
                if !self.is_supported_file(path) {
                    continue;
                }
                let path_str = path.to_string_lossy().to_string();
                self.update_timestamp(&path_str);

                let change = match event.kind {
                    EventKind::Create(_) => Some(ChangeEvent::Created(path_str.clone())),
                    EventKind::Modify(_) => Some(ChangeEvent::Modified(path_str.clone())),
                    EventKind::Remove(_) => Some(ChangeEvent::Deleted(path_str.clone())),
                    _ => None,
                };

                if let Some(change) = change {
                    if !matches!(change, ChangeEvent::Created(_)) {
                        self.notify_invalidation_callbacks(&path_str);
                    }
                    if tx.send(change).is_err() {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

fn notify_error(e: notify::Error) -> CtxGraphError {
    CtxGraphError::Configuration(format!("file watcher error: {e}"))
}

fn load_gitignore(path: &Path) -> Vec<String> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut patterns = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.len() > MAX_GITIGNORE_LINE_LEN {
            tracing::warn!(
                line = line_num + 1,
                "gitignore pattern too long, skipping"
            );
            continue;
        }
        patterns.push(line.to_string());
    }
    patterns
}

fn matches_pattern(path: &Path, rel_path_str: &str, filename: &str, pattern: &str) -> bool {
    if pattern.contains('*') {
        if glob_match(pattern, rel_path_str) || glob_match(pattern, filename) {
            return true;
        }
        path.components().any(|c| {
            glob_match(pattern, &c.as_os_str().to_string_lossy())
        })
    } else {
        if filename == pattern {
            return true;
        }
        path.components()
            .any(|c| c.as_os_str().to_string_lossy() == pattern)
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    globset::Glob::new(pattern)
        .map(|g| g.compile_matcher().is_match(candidate))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher(root: &Path) -> FileWatcher {
        FileWatcher::new(root, None, HashSet::new()).unwrap()
    }

    #[test]
    fn ignores_always_ignored_directories() {
        let dir = tempfile::tempdir().unwrap();
        let w = watcher(dir.path());
        let path = dir.path().join("__pycache__").join("mod.pyc");
        assert!(w.should_ignore(&path));
    }

    #[test]
    fn ignores_sensitive_files() {
        let dir = tempfile::tempdir().unwrap();
        let w = watcher(dir.path());
        assert!(w.should_ignore(&dir.path().join(".env")));
        assert!(w.should_ignore(&dir.path().join("id_rsa")));
        assert!(w.should_ignore(&dir.path().join("secrets.yaml")));
    }

    #[test]
    fn respects_gitignore_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n# comment\n\nbuild_artifacts/\n")
            .unwrap();
        let w = FileWatcher::new(dir.path(), None, HashSet::new()).unwrap();
        assert!(w.should_ignore(&dir.path().join("output.log")));
        assert!(!w.should_ignore(&dir.path().join("main.py")));
    }

    #[test]
    fn only_python_files_are_supported() {
        let dir = tempfile::tempdir().unwrap();
        let w = watcher(dir.path());
        assert!(w.is_supported_file(Path::new("a.py")));
        assert!(!w.is_supported_file(Path::new("a.ts")));
    }

    #[test]
    fn gitignore_line_over_limit_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let long_pattern = "a".repeat(1001);
        std::fs::write(dir.path().join(".gitignore"), format!("{long_pattern}\nvalid.py\n"))
            .unwrap();
        let w = FileWatcher::new(dir.path(), None, HashSet::new()).unwrap();
        assert!(!w.gitignore_patterns.contains(&long_pattern));
        assert!(w.gitignore_patterns.contains(&"valid.py".to_string()));
    }
}
