//! Bridges `ctxgraph-parser`'s two-phase pipeline to the [`FileAnalyzer`]
//! seam `ctxgraph-graph::GraphUpdater` depends on, so that crate never has
//! to know about tree-sitter or detectors (§2 crate mapping: the engine is
//! the only crate that wires every lower layer together).
//!
//! Phase 1 (symbol extraction) runs per file through a shared, persistent
//! [`RelationshipBuilder`] so that a single changed file's references can
//! resolve against definitions already known from every other file the
//! engine has seen — exactly the cross-file resolution §4.5 describes.

use std::path::Path;

use ctxgraph_core::{FileMetadata, Result, SystemClock, Warning};
use ctxgraph_graph::{FileAnalyzer, RelationshipGraph};
use ctxgraph_parser::{Analyzer, AnalyzerConfig, RelationshipBuilder, SymbolDataCache};
use parking_lot::Mutex;

struct Inner {
    analyzer: Analyzer,
    builder: RelationshipBuilder,
    symbol_cache: SymbolDataCache,
}

/// Owns the analyzer, the cross-file symbol index, and the per-file symbol
/// data cache behind one lock. `FileAnalyzer::analyze_file_two_phase` takes
/// `&self` (the trait is invoked from `GraphUpdater`, which itself is
/// `Send + Sync` and may be shared across the graph and watcher threads),
/// so interior mutability here plays the same role `parking_lot::Mutex`
/// plays for the working-memory cache in §5.
pub struct TwoPhaseAnalyzer {
    inner: Mutex<Inner>,
    warnings: Mutex<Vec<Warning>>,
}

impl TwoPhaseAnalyzer {
    pub fn new(project_root: impl Into<std::path::PathBuf>, symbol_cache_max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                analyzer: Analyzer::new(AnalyzerConfig::new(project_root.into())),
                builder: RelationshipBuilder::new(),
                symbol_cache: SymbolDataCache::new(symbol_cache_max_entries),
            }),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Drains warnings accumulated by analysis since the last drain, for
    /// the engine's `get_warnings`/log-sink plumbing.
    pub fn drain_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    pub fn remove_file(&self, filepath: &str) {
        self.inner.lock().builder.remove_file(filepath);
    }
}

impl FileAnalyzer for TwoPhaseAnalyzer {
    fn analyze_file_two_phase(
        &self,
        graph: &mut RelationshipGraph,
        filepath: &Path,
    ) -> Result<bool> {
        let filepath_str = filepath.to_string_lossy().to_string();
        let now = {
            use ctxgraph_core::Clock;
            SystemClock.now_secs()
        };

        let mut inner = self.inner.lock();

        let content_hash = None; // hash validation disabled by default, §4.4 supplement
        let (data, warnings) = if let Some(cached) = inner.symbol_cache.get(filepath, content_hash)
        {
            (cached, Vec::new())
        } else {
            let (data, warnings) = inner.analyzer.extract_symbol_data(filepath)?;
            inner.symbol_cache.put(filepath, data.clone(), None);
            (data, warnings)
        };

        let is_valid = data.is_valid;
        let has_dynamic_patterns = data.has_dynamic_patterns;
        let dynamic_pattern_types = data.dynamic_pattern_types.clone();

        inner.builder.add_file(data);
        let relationships = inner.builder.build_for(&filepath_str);

        graph.remove_all_for(&filepath_str);
        let mut relationship_count = 0usize;
        for r in relationships {
            if graph.add(r)? {
                relationship_count += 1;
            }
        }

        let mut meta = FileMetadata::new(filepath_str.clone(), now);
        meta.relationship_count = relationship_count;
        meta.has_dynamic_patterns = has_dynamic_patterns;
        meta.dynamic_pattern_types = dynamic_pattern_types;
        meta.is_unparseable = !is_valid;
        graph.set_metadata(&filepath_str, meta);

        drop(inner);
        self.warnings.lock().extend(warnings);

        Ok(is_valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxgraph_core::RelationshipType;

    #[test]
    fn resolves_call_target_line_across_two_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.py"), "def helper():\n    pass\n").unwrap();
        let main = dir.path().join("main.py");
        std::fs::write(&main, "import util\n\nutil.helper()\n").unwrap();

        let analyzer = TwoPhaseAnalyzer::new(dir.path(), 100);
        let mut graph = RelationshipGraph::new();

        // Prime the builder with util.py's symbol data first.
        analyzer
            .analyze_file_two_phase(&mut graph, &dir.path().join("util.py"))
            .unwrap();
        analyzer.analyze_file_two_phase(&mut graph, &main).unwrap();

        let deps = graph.dependencies(main.to_str().unwrap());
        assert!(deps.iter().any(|r| r.relationship_type == RelationshipType::Import));
    }

    #[test]
    fn unparseable_file_reports_failure_but_clears_stale_edges() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        std::fs::write(&a, "def f(:\n").unwrap();

        let analyzer = TwoPhaseAnalyzer::new(dir.path(), 100);
        let mut graph = RelationshipGraph::new();
        let ok = analyzer.analyze_file_two_phase(&mut graph, &a).unwrap();
        assert!(!ok);
    }
}
