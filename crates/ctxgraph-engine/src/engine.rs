//! The external surface (§6): one `Engine` owning the graph thread's state
//! (graph, watcher, updater, detector-backed analyzer) and the cache,
//! grounded on the teacher's `codegraph-api::state::AppState` — a single
//! `Arc`-wrapped bundle the host process constructs once and shares.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ctxgraph_cache::WorkingMemoryCache;
use ctxgraph_core::{Clock, Config, CtxGraphError, Relationship, Result, Severity, SystemClock, Warning};
use ctxgraph_graph::{FileWatcher, GraphExport, GraphUpdater};

use crate::context::{self, AssembledContext};
use crate::logging::{LogCategory, LogSink};
use crate::two_phase_analyzer::TwoPhaseAnalyzer;

pub use ctxgraph_core::FileMetadata;

#[derive(Debug, Clone)]
pub struct ReadWithContextResult {
    pub path: String,
    pub content: String,
    pub context: AssembledContext,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryAnalysisStats {
    pub scanned: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Owns every long-lived piece of state: the relationship graph (behind
/// [`GraphUpdater`]), the working-memory cache, the file watcher, and the
/// JSONL log sinks. Constructed once per process (§9 "global state: none at
/// module scope — one owning process holds the graph, cache, watcher,
/// detectors").
pub struct Engine {
    project_root: PathBuf,
    config: Config,
    graph_updater: Arc<GraphUpdater>,
    analyzer: Arc<TwoPhaseAnalyzer>,
    cache: Arc<WorkingMemoryCache>,
    log_sink: LogSink,
    warnings: parking_lot::Mutex<Vec<Warning>>,
}

impl Engine {
    pub fn new(project_root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let project_root = project_root.into();
        let session_id = uuid::Uuid::new_v4().to_string();

        crate::logging::ensure_log_directories(&config.data_root)
            .map_err(CtxGraphError::Io)?;

        let file_watcher = Arc::new(FileWatcher::new(&project_root, None, HashSet::new())?);
        let analyzer = Arc::new(TwoPhaseAnalyzer::new(
            project_root.clone(),
            config.symbol_cache_max_entries,
        ));
        let cache = Arc::new(WorkingMemoryCache::new(config.cache_size_limit_bytes));

        let cache_for_callback = cache.clone();
        file_watcher.register_invalidation_callback(Box::new(move |path: &str| {
            cache_for_callback.invalidate(path);
        }));

        let graph_updater = Arc::new(GraphUpdater::new(
            ctxgraph_graph::RelationshipGraph::new(),
            analyzer.clone() as Arc<dyn ctxgraph_graph::FileAnalyzer>,
            file_watcher,
            &project_root,
        ));

        let log_sink = LogSink::new(config.data_root.clone(), session_id);

        Ok(Self {
            project_root,
            config,
            graph_updater,
            analyzer,
            cache,
            log_sink,
            warnings: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawns the watcher's native/poll event loop plus a drain thread that
    /// keeps its channel alive (the watcher stops itself once its receiver
    /// is dropped — see `FileWatcher::watch`). Best-effort: a watcher
    /// failure is logged, not propagated, since `read_with_context` can
    /// still serve a correct (if less fresh) answer via its own staleness
    /// check.
    pub fn start_watching(self: &Arc<Self>) {
        let watcher = self.graph_updater.file_watcher().clone();
        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::spawn(move || {
            if let Err(e) = watcher.watch(tx) {
                tracing::error!(error = %e, "file watcher stopped");
            }
        });
        std::thread::spawn(move || {
            for event in rx {
                tracing::trace!(?event, "file watcher event");
            }
        });
    }

    fn validate_path(&self, path: &Path) -> Result<String> {
        let s = path.to_string_lossy();
        if s.contains('\0') {
            return Err(CtxGraphError::InvalidInput(
                "path must not contain null bytes".to_string(),
            ));
        }
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        let normalized = normalize_lexically(&absolute);
        let root = std::fs::canonicalize(&self.project_root).unwrap_or_else(|_| self.project_root.clone());
        if !normalized.starts_with(&root) && !normalized.starts_with(&self.project_root) {
            return Err(CtxGraphError::InvalidInput(format!(
                "path escapes project root: {}",
                path.display()
            )));
        }
        Ok(normalized.to_string_lossy().to_string())
    }

    /// §6 `read_with_context`: resolves staleness over `path`'s transitive
    /// dependency cone, then assembles content + context + warnings.
    pub fn read_with_context(&self, path: &Path) -> Result<ReadWithContextResult> {
        let path_str = self.validate_path(path)?;

        let watcher = self.graph_updater.file_watcher().clone();
        let needs_analysis = |f: &str| -> bool {
            let last_event = watcher.get_timestamp(f);
            let meta = self.graph_updater.with_graph(|g| g.get_metadata(f));
            match (last_event, meta) {
                (Some(ts), Some(m)) => ts > m.last_analyzed,
                (_, None) => true,
                (None, Some(_)) => false,
            }
        };

        let analyzer = self.analyzer.clone();
        self.graph_updater.with_graph_mut(|graph| {
            let mut resolver = ctxgraph_graph::StalenessResolver::new(graph);
            resolver.resolve_staleness(&path_str, needs_analysis, |g, f| {
                analyzer
                    .analyze_file_two_phase(g, Path::new(f))
                    .unwrap_or(false)
            })
        });

        self.collect_new_warnings();

        let watcher_ts = self.graph_updater.file_watcher().get_timestamp(&path_str);
        let content = self.cache.get(Path::new(&path_str), None, watcher_ts)?;

        let (dependencies, dependents) = self.graph_updater.with_graph(|g| {
            (g.dependencies(&path_str), g.dependents(&path_str))
        });

        let assembled = context::assemble(
            &self.cache,
            &path_str,
            dependencies,
            dependents,
            self.config.context_token_limit,
        );

        let warnings = self.warnings_reachable_from(&path_str);

        self.log_sink.write(
            LogCategory::Injections,
            &serde_json::json!({
                "path": path_str,
                "token_estimate": assembled.token_estimate,
                "budget_exceeded": assembled.budget_exceeded,
                "warning_count": warnings.len(),
                "timestamp": SystemClock.now_secs(),
            }),
        );

        Ok(ReadWithContextResult {
            path: path_str,
            content,
            context: assembled,
            warnings,
        })
    }

    fn warnings_reachable_from(&self, path: &str) -> Vec<Warning> {
        let cone: HashSet<String> = self.graph_updater.with_graph(|g| {
            let snapshot = g.snapshot();
            let mut cone = g.transitive_dependencies(path, &snapshot);
            cone.insert(path.to_string());
            cone
        });
        self.warnings
            .lock()
            .iter()
            .filter(|w| cone.contains(&w.file))
            .cloned()
            .collect()
    }

    /// Drains warnings produced since the last call from both the graph
    /// updater (broken references) and the two-phase analyzer (dynamic
    /// patterns, parse errors), applying the suppression rules from §6
    /// before they ever enter the warning store or the log sink.
    fn collect_new_warnings(&self) {
        let mut fresh = self.graph_updater.drain_warnings();
        fresh.extend(self.analyzer.drain_warnings());

        let mut store = self.warnings.lock();
        for w in fresh {
            let suppressed = w
                .kind
                .suppression_key()
                .map(|key| self.config.is_suppressed(&w.file, key))
                .unwrap_or(false);
            if suppressed {
                continue;
            }
            self.log_sink.write(LogCategory::Warnings, &w);
            store.push(w);
        }
    }

    pub fn analyze_file(&self, path: &Path) -> bool {
        let path_str = match self.validate_path(path) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let has_metadata = self
            .graph_updater
            .with_graph(|g| g.get_metadata(&path_str).map(|m| !m.deleted).unwrap_or(false));
        let ok = if has_metadata {
            self.graph_updater.update_on_modify(&path_str)
        } else {
            self.graph_updater.update_on_create(&path_str)
        };
        self.collect_new_warnings();
        ok
    }

    pub fn delete_file(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy().to_string();
        self.analyzer.remove_file(&path_str);
        let ok = self.graph_updater.update_on_delete(&path_str);
        self.cache.invalidate(&path_str);
        self.collect_new_warnings();
        ok
    }

    /// §6 `analyze_directory`: walks `root`, analyzing every file the
    /// watcher's ignore policy and extension dispatch accept.
    pub fn analyze_directory(&self, root: &Path) -> DirectoryAnalysisStats {
        let watcher = self.graph_updater.file_watcher();
        let mut stats = DirectoryAnalysisStats::default();

        let walker = ignore::WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            stats.scanned += 1;
            if watcher.should_ignore(path) || !watcher.is_supported_file(path) {
                stats.skipped += 1;
                continue;
            }
            if self.analyze_file(path) {
                stats.analyzed += 1;
            } else {
                stats.failed += 1;
            }
        }

        self.log_sink.write(
            LogCategory::SessionMetrics,
            &serde_json::json!({
                "event": "analyze_directory",
                "root": root.display().to_string(),
                "scanned": stats.scanned,
                "analyzed": stats.analyzed,
                "failed": stats.failed,
                "skipped": stats.skipped,
                "timestamp": SystemClock.now_secs(),
            }),
        );

        stats
    }

    pub fn get_dependencies(&self, path: &str) -> Vec<Relationship> {
        self.graph_updater.with_graph(|g| g.dependencies(path))
    }

    pub fn get_dependents(&self, path: &str) -> Vec<Relationship> {
        self.graph_updater.with_graph(|g| g.dependents(path))
    }

    pub fn export_graph(&self) -> GraphExport {
        self.graph_updater.with_graph(|g| g.export())
    }

    /// Filters the accumulated warning store, optionally by file and
    /// minimum severity, after pulling in anything produced since the last
    /// drain.
    pub fn get_warnings(&self, file: Option<&str>, min_severity: Option<Severity>) -> Vec<Warning> {
        self.collect_new_warnings();
        self.warnings
            .lock()
            .iter()
            .filter(|w| file.map(|f| w.file == f).unwrap_or(true))
            .filter(|w| match min_severity {
                Some(Severity::Warning) => w.severity == Severity::Warning,
                _ => true,
            })
            .cloned()
            .collect()
    }

    pub fn invalidate_cache(&self, path: Option<&str>) {
        match path {
            Some(p) => self.cache.invalidate(p),
            None => self.cache.clear(),
        }
    }

    pub fn cache(&self) -> &Arc<WorkingMemoryCache> {
        &self.cache
    }

    /// Drains the watcher's recorded timestamps and dispatches each changed
    /// path to create/modify/delete, for callers driving their own poll
    /// loop (the CLI's `watch` subcommand).
    pub fn process_pending_changes(&self) -> ctxgraph_graph::ProcessStats {
        let stats = self.graph_updater.process_pending_changes();
        self.collect_new_warnings();
        stats
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other.as_os_str()),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(root: &Path) -> Engine {
        let mut config = Config::default();
        config.data_root = root.join(".ctxgraph");
        Engine::new(root, config).unwrap()
    }

    #[test]
    fn s1_simple_import_resolution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("utils.py"), "").unwrap();
        std::fs::write(dir.path().join("a.py"), "import utils\n").unwrap();

        let e = engine(dir.path());
        assert!(e.analyze_file(&dir.path().join("a.py")));

        let key = dir.path().join("a.py").to_string_lossy().to_string();
        let deps = e.get_dependencies(&key);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].line_number, 1);
    }

    #[test]
    fn read_with_context_returns_content_and_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("utils.py"), "def helper():\n    pass\n").unwrap();
        let a = dir.path().join("a.py");
        std::fs::write(&a, "import utils\n").unwrap();

        let e = engine(dir.path());
        let result = e.read_with_context(&a).unwrap();
        assert_eq!(result.content, "import utils\n");
        assert!(result.context.text.contains("utils.py"));
    }

    #[test]
    fn s6_deletion_emits_broken_reference_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let m = dir.path().join("m.py");
        std::fs::write(&m, "").unwrap();
        let a = dir.path().join("a.py");
        std::fs::write(&a, "import m\n").unwrap();
        let b = dir.path().join("b.py");
        std::fs::write(&b, "import m\n").unwrap();

        let e = engine(dir.path());
        e.analyze_file(&a);
        e.analyze_file(&b);
        e.delete_file(&m);

        let warnings = e.get_warnings(None, None);
        assert_eq!(
            warnings
                .iter()
                .filter(|w| w.kind == ctxgraph_core::WarningKind::BrokenReference)
                .count(),
            2
        );
    }

    #[test]
    fn invalidate_cache_drops_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        std::fs::write(&a, "x = 1\n").unwrap();
        let e = engine(dir.path());
        e.read_with_context(&a).unwrap();
        assert_eq!(e.cache().len(), 1);
        e.invalidate_cache(Some(&a.to_string_lossy()));
        assert_eq!(e.cache().len(), 0);
    }

    #[test]
    fn rejects_path_outside_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(dir.path());
        let outside = Path::new("/etc/passwd");
        assert!(e.read_with_context(outside).is_err());
    }
}
