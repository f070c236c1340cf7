use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ctxgraph_core::{FileMetadata, Result, SystemClock, Warning, WarningKind};
use parking_lot::Mutex;

use crate::file_watcher::FileWatcher;
use crate::graph::RelationshipGraph;

const PERFORMANCE_TARGET_SECS: f64 = 0.2;

/// Re-analyzes a single file and stores its relationships into the graph.
/// Implemented by `ctxgraph-parser`'s analyzer; kept as a trait here so this
/// crate never depends on the parser crate.
pub trait FileAnalyzer: Send + Sync {
    /// Analyzes `filepath`, removing its prior outgoing relationships from
    /// `graph` and adding the freshly-extracted ones. Returns `true` if the
    /// file parsed successfully, `false` if it is unparseable (relationships
    /// are still removed in that case — a stale file has no relationships).
    fn analyze_file_two_phase(&self, graph: &mut RelationshipGraph, filepath: &Path)
        -> Result<bool>;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessStats {
    pub total: usize,
    pub modified: usize,
    pub created: usize,
    pub deleted: usize,
    pub failed: usize,
    pub elapsed_ms: f64,
}

/// Coordinates incremental updates to a [`RelationshipGraph`] in response to
/// file system events. Single-threaded: callers must serialize calls (the
/// engine drives this from one dedicated thread).
pub struct GraphUpdater {
    graph: Mutex<RelationshipGraph>,
    analyzer: Arc<dyn FileAnalyzer>,
    file_watcher: Arc<FileWatcher>,
    project_root: PathBuf,
    warnings: Mutex<Vec<Warning>>,
}

impl GraphUpdater {
    pub fn new(
        graph: RelationshipGraph,
        analyzer: Arc<dyn FileAnalyzer>,
        file_watcher: Arc<FileWatcher>,
        project_root: impl AsRef<Path>,
    ) -> Self {
        let project_root = std::fs::canonicalize(project_root.as_ref())
            .unwrap_or_else(|_| project_root.as_ref().to_path_buf());
        Self {
            graph: Mutex::new(graph),
            analyzer,
            file_watcher,
            project_root,
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_graph<R>(&self, f: impl FnOnce(&RelationshipGraph) -> R) -> R {
        f(&self.graph.lock())
    }

    /// Exclusive access to the graph, for callers that need to drive the
    /// staleness resolver or otherwise mutate outside the on_modify/
    /// on_create/on_delete paths above.
    pub fn with_graph_mut<R>(&self, f: impl FnOnce(&mut RelationshipGraph) -> R) -> R {
        f(&mut self.graph.lock())
    }

    pub fn analyzer(&self) -> &Arc<dyn FileAnalyzer> {
        &self.analyzer
    }

    pub fn file_watcher(&self) -> &Arc<FileWatcher> {
        &self.file_watcher
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn drain_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    fn validate_filepath(&self, filepath: &str) -> bool {
        let path = Path::new(filepath);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        normalize_lexically(&absolute).starts_with(&self.project_root)
    }

    fn check_performance_target(&self, filepath: &str, elapsed_secs: f64, action: &str) {
        if elapsed_secs > PERFORMANCE_TARGET_SECS {
            tracing::warn!(
                file = filepath,
                elapsed_ms = elapsed_secs * 1000.0,
                action,
                "performance target exceeded (target: <200ms)"
            );
        }
    }

    /// Removes old relationships, re-analyzes, re-adds. Rolls back to the
    /// prior snapshot if analysis throws; does NOT roll back if the file is
    /// merely unparseable (stale relationships stay removed).
    pub fn update_on_modify(&self, filepath: &str) -> bool {
        if !self.validate_filepath(filepath) {
            tracing::warn!(file = filepath, "rejecting update outside project root");
            return false;
        }
        let start = Instant::now();

        let (old_dependencies, old_dependents, old_metadata) = {
            let graph = self.graph.lock();
            (
                graph.dependencies(filepath),
                graph.dependents(filepath),
                graph.get_metadata(filepath),
            )
        };

        let result = {
            let mut graph = self.graph.lock();
            self.analyzer
                .analyze_file_two_phase(&mut graph, Path::new(filepath))
        };

        let elapsed = start.elapsed().as_secs_f64();
        self.check_performance_target(filepath, elapsed, "modify");

        match result {
            Ok(success) => {
                if !success {
                    tracing::warn!(file = filepath, "re-analysis failed, file marked unparseable");
                }
                success
            }
            Err(e) => {
                tracing::error!(file = filepath, error = %e, "graph update failed, rolling back");
                let mut graph = self.graph.lock();
                graph.remove_all_for(filepath);
                for r in old_dependencies.into_iter().chain(old_dependents) {
                    let _ = graph.add(r);
                }
                if let Some(meta) = old_metadata {
                    graph.set_metadata(filepath, meta);
                }
                false
            }
        }
    }

    /// Removes every relationship touching `filepath`, emits broken
    /// reference warnings for its dependents, and marks it deleted.
    pub fn update_on_delete(&self, filepath: &str) -> bool {
        if !self.validate_filepath(filepath) {
            tracing::warn!(file = filepath, "rejecting delete outside project root");
            return false;
        }
        let start = Instant::now();
        let clock = SystemClock;
        use ctxgraph_core::Clock;

        let mut graph = self.graph.lock();
        let dependents = graph.dependents(filepath);
        if !dependents.is_empty() {
            drop(graph);
            self.emit_broken_reference_warnings(filepath, &dependents, clock.now_secs());
            graph = self.graph.lock();
        }

        graph.remove_all_for(filepath);
        let deletion_time = clock.now_secs();
        let mut metadata = FileMetadata::new(filepath.to_string(), deletion_time);
        metadata.deleted = true;
        metadata.deletion_time = Some(deletion_time);
        metadata.relationship_count = 0;
        graph.set_metadata(filepath, metadata);
        drop(graph);

        let elapsed = start.elapsed().as_secs_f64();
        self.check_performance_target(filepath, elapsed, "delete");
        true
    }

    /// Analyzes a newly created file and stores its relationships.
    pub fn update_on_create(&self, filepath: &str) -> bool {
        if !self.validate_filepath(filepath) {
            tracing::warn!(file = filepath, "rejecting create outside project root");
            return false;
        }
        let start = Instant::now();
        let result = {
            let mut graph = self.graph.lock();
            self.analyzer
                .analyze_file_two_phase(&mut graph, Path::new(filepath))
        };
        let elapsed = start.elapsed().as_secs_f64();
        self.check_performance_target(filepath, elapsed, "create");

        match result {
            Ok(success) => {
                if !success {
                    tracing::warn!(file = filepath, "analysis failed for new file");
                }
                success
            }
            Err(e) => {
                tracing::error!(file = filepath, error = %e, "graph update failed for created file");
                false
            }
        }
    }

    fn emit_broken_reference_warnings(
        &self,
        deleted_file: &str,
        dependents: &[ctxgraph_core::Relationship],
        now: f64,
    ) {
        let mut by_source: HashMap<&str, Vec<&ctxgraph_core::Relationship>> = HashMap::new();
        for rel in dependents {
            by_source.entry(rel.source_file.as_str()).or_default().push(rel);
        }

        let mut sources: Vec<_> = by_source.keys().copied().collect();
        sources.sort();

        for source_file in sources {
            let rels = &by_source[source_file];
            let broken: Vec<String> = rels
                .iter()
                .map(|rel| match &rel.target_symbol {
                    Some(symbol) => format!(
                        "{symbol} (line {}, type: {})",
                        rel.line_number, rel.relationship_type
                    ),
                    None => format!("line {} (type: {})", rel.line_number, rel.relationship_type),
                })
                .collect();
            let message = format!(
                "imported file deleted: {source_file} imports from {deleted_file} which no \
                 longer exists. broken references: {}",
                broken.join(", ")
            );
            tracing::warn!(file = source_file, deleted_file, "{message}");
            self.warnings.lock().push(Warning::new(
                WarningKind::BrokenReference,
                source_file.to_string(),
                rels.first().map(|r| r.line_number).unwrap_or(0),
                "broken_reference",
                message,
                now,
            ));
        }
    }

    /// Drains the file watcher's timestamp table and dispatches each path
    /// to create/modify/delete based on existence and prior graph metadata.
    pub fn process_pending_changes(&self) -> ProcessStats {
        let start = Instant::now();
        let mut stats = ProcessStats::default();

        let pending: Vec<String> = self.file_watcher.drain_timestamps();

        for filepath in pending {
            stats.total += 1;
            let exists = Path::new(&filepath).exists();

            if exists {
                let has_metadata = self
                    .graph
                    .lock()
                    .get_metadata(&filepath)
                    .map(|m| !m.deleted)
                    .unwrap_or(false);
                let success = if has_metadata {
                    let ok = self.update_on_modify(&filepath);
                    if ok {
                        stats.modified += 1;
                    }
                    ok
                } else {
                    let ok = self.update_on_create(&filepath);
                    if ok {
                        stats.created += 1;
                    }
                    ok
                };
                if !success {
                    stats.failed += 1;
                }
            } else {
                let ok = self.update_on_delete(&filepath);
                if ok {
                    stats.deleted += 1;
                } else {
                    stats.failed += 1;
                }
            }
        }

        stats.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            total = stats.total,
            modified = stats.modified,
            created = stats.created,
            deleted = stats.deleted,
            failed = stats.failed,
            elapsed_ms = stats.elapsed_ms,
            "processed pending file changes"
        );
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
    use ctxgraph_core::{Relationship, RelationshipType};
    use std::collections::HashSet;

    struct NoopAnalyzer;
    impl FileAnalyzer for NoopAnalyzer {
        fn analyze_file_two_phase(
            &self,
            _graph: &mut RelationshipGraph,
            _filepath: &Path,
        ) -> Result<bool> {
            Ok(true)
        }
    }

    fn updater(root: &Path) -> GraphUpdater {
        let watcher = Arc::new(FileWatcher::new(root, None, HashSet::new()).unwrap());
        GraphUpdater::new(RelationshipGraph::new(), Arc::new(NoopAnalyzer), watcher, root)
    }

    #[test]
    fn rejects_paths_outside_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let u = updater(dir.path());
        assert!(!u.validate_filepath("/etc/passwd"));
    }

    #[test]
    fn accepts_paths_inside_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let u = updater(dir.path());
        let file = dir.path().join("a.py");
        assert!(u.validate_filepath(file.to_str().unwrap()));
    }

    #[test]
    fn delete_marks_metadata_deleted_and_emits_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let u = updater(dir.path());
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        u.graph
            .lock()
            .add(
                Relationship::new(
                    a.to_str().unwrap(),
                    b.to_str().unwrap(),
                    RelationshipType::Import,
                    1,
                )
                .unwrap(),
            )
            .unwrap();

        assert!(u.update_on_delete(b.to_str().unwrap()));
        let meta = u.with_graph(|g| g.get_metadata(b.to_str().unwrap()));
        assert!(meta.unwrap().deleted);
        assert_eq!(u.drain_warnings().len(), 1);
    }
}
