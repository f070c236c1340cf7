//! §4.4: the per-file analysis pipeline. Ties together [`file_io`] (read),
//! [`ast`] (parse with timeout), [`detectors::DetectorRegistry`] (dispatch),
//! and a [`RelationshipGraph`] (store), in both the single-phase mode used
//! by `analyze_file()` and the phase-1-only mode the two-phase variant
//! needs for cross-file symbol resolution.

use std::path::{Path, PathBuf};

use ctxgraph_core::{
    Clock, CtxGraphError, FileMetadata, FileSymbolData, Result, SystemClock, Warning,
};
use ctxgraph_graph::RelationshipGraph;

use crate::detectors::DetectorRegistry;
use crate::file_io::read_source_file;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub project_root: PathBuf,
}

impl AnalyzerConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }
}

/// Outcome of a single-phase or phase-1 run: whether the file parsed
/// cleanly, and any warnings produced along the way (dynamic patterns,
/// parse failures).
#[derive(Debug, Default)]
pub struct AnalysisOutcome {
    pub success: bool,
    pub warnings: Vec<Warning>,
}

/// Owns the detector registry and drives it over a single file at a time.
/// Not `Send`-shared across files concurrently: the registry's per-file
/// detector caches assume serialized, single-threaded use (§4.2).
pub struct Analyzer {
    registry: DetectorRegistry,
    project_root: PathBuf,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            registry: DetectorRegistry::new(),
            project_root: config.project_root,
        }
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.registry.detector_names()
    }

    /// §4.4 steps 1-4, single-phase: read, parse, dispatch every detector's
    /// `detect()`, then store into `graph`. Always removes the file's prior
    /// outgoing+incoming relationships first (`remove_all_for`) so a
    /// re-analysis never leaves stale edges behind, even when the file is
    /// now unparseable.
    pub fn analyze_file(
        &mut self,
        graph: &mut RelationshipGraph,
        filepath: &Path,
    ) -> Result<AnalysisOutcome> {
        let filepath_str = filepath.to_string_lossy().to_string();
        let now = SystemClock.now_secs();

        let read = match read_source_file(filepath) {
            Ok(r) => r,
            Err(CtxGraphError::FileTooLarge { .. }) | Err(CtxGraphError::LineCountExceeded { .. }) => {
                // §7: logged and skipped, not surfaced as a hard error. The
                // file keeps whatever relationships it already had.
                return Ok(AnalysisOutcome::default());
            }
            Err(e) => return Err(e),
        };

        let (relationships, warnings) =
            self.registry
                .analyze_source(&read.content, filepath, &self.project_root);

        graph.remove_all_for(&filepath_str);
        let mut has_dynamic_patterns = false;
        let mut dynamic_pattern_types: Vec<String> = Vec::new();
        for w in &warnings {
            if let Some(key) = w.kind.suppression_key() {
                has_dynamic_patterns = true;
                if !dynamic_pattern_types.iter().any(|t| t == key) {
                    dynamic_pattern_types.push(key.to_string());
                }
            }
        }
        dynamic_pattern_types.sort();

        let mut relationship_count = 0usize;
        for r in relationships {
            if graph.add(r)? {
                relationship_count += 1;
            }
        }

        let is_unparseable = self.is_syntax_error(&warnings);
        let mut meta = FileMetadata::new(filepath_str.clone(), now);
        meta.relationship_count = relationship_count;
        meta.has_dynamic_patterns = has_dynamic_patterns;
        meta.dynamic_pattern_types = dynamic_pattern_types;
        meta.is_unparseable = is_unparseable;
        graph.set_metadata(&filepath_str, meta);

        Ok(AnalysisOutcome {
            success: !is_unparseable,
            warnings,
        })
    }

    /// Phase 1 of two-phase analysis: symbol extraction only, no graph
    /// writes. The caller (the engine's cross-file joiner) feeds the result
    /// into a shared [`crate::RelationshipBuilder`].
    pub fn extract_symbol_data(&mut self, filepath: &Path) -> Result<(FileSymbolData, Vec<Warning>)> {
        let filepath_str = filepath.to_string_lossy().to_string();

        let read = match read_source_file(filepath) {
            Ok(r) => r,
            Err(CtxGraphError::FileTooLarge { .. }) | Err(CtxGraphError::LineCountExceeded { .. }) => {
                let mut data = FileSymbolData::new(filepath_str);
                data.is_valid = false;
                data.error_message = Some("file exceeds size/line limits".to_string());
                return Ok((data, Vec::new()));
            }
            Err(e) => return Err(e),
        };

        let (data, warnings) =
            self.registry
                .extract_symbol_data(&read.content, filepath, &self.project_root);
        Ok((data, warnings))
    }

    fn is_syntax_error(&self, warnings: &[Warning]) -> bool {
        warnings
            .iter()
            .any(|w| w.kind == ctxgraph_core::WarningKind::ParseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxgraph_core::RelationshipType;

    fn analyzer(root: &Path) -> Analyzer {
        Analyzer::new(AnalyzerConfig::new(root))
    }

    #[test]
    fn analyzes_simple_import_into_graph() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("utils.py"), "").unwrap();
        let a = dir.path().join("a.py");
        std::fs::write(&a, "import utils\n").unwrap();

        let mut graph = RelationshipGraph::new();
        let mut an = analyzer(dir.path());
        let outcome = an.analyze_file(&mut graph, &a).unwrap();
        assert!(outcome.success);

        let deps = graph.dependencies(a.to_str().unwrap());
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].relationship_type, RelationshipType::Import);
        assert_eq!(
            deps[0].target_file,
            dir.path().join("utils.py").to_string_lossy()
        );
        let meta = graph.get_metadata(a.to_str().unwrap()).unwrap();
        assert_eq!(meta.relationship_count, 1);
        assert!(!meta.is_unparseable);
    }

    #[test]
    fn reanalysis_drops_stale_relationships() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "").unwrap();
        std::fs::write(dir.path().join("b.py"), "").unwrap();
        let main = dir.path().join("main.py");
        std::fs::write(&main, "import a\n").unwrap();

        let mut graph = RelationshipGraph::new();
        let mut an = analyzer(dir.path());
        an.analyze_file(&mut graph, &main).unwrap();
        assert_eq!(graph.dependencies(main.to_str().unwrap()).len(), 1);

        std::fs::write(&main, "import b\n").unwrap();
        an.analyze_file(&mut graph, &main).unwrap();
        let deps = graph.dependencies(main.to_str().unwrap());
        assert_eq!(deps.len(), 1);
        assert_eq!(
            deps[0].target_file,
            dir.path().join("b.py").to_string_lossy()
        );
    }

    #[test]
    fn marks_syntax_errors_unparseable() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        std::fs::write(&a, "def f(:\n").unwrap();

        let mut graph = RelationshipGraph::new();
        let mut an = analyzer(dir.path());
        let outcome = an.analyze_file(&mut graph, &a).unwrap();
        assert!(!outcome.success);
        let meta = graph.get_metadata(a.to_str().unwrap()).unwrap();
        assert!(meta.is_unparseable);
    }

    #[test]
    fn extracts_symbol_data_without_touching_graph() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        std::fs::write(&a, "def helper():\n    pass\n").unwrap();

        let mut an = analyzer(dir.path());
        let (data, _warnings) = an.extract_symbol_data(&a).unwrap();
        assert!(data.is_valid);
        assert!(data.definitions.iter().any(|d| d.name == "helper"));
    }
}
