use std::path::Path;

use ctxgraph_core::{FileSymbolData, Relationship, SymbolDefinition, SymbolReference, Warning};

use crate::ast::{parse_with_timeout, walk_capped, ParseOutcome};

use super::attribute_rebinding::AttributeRebindingDetector;
use super::class_inheritance::ClassInheritanceDetector;
use super::conditional_import::ConditionalImportDetector;
use super::decorator::DecoratorDetector;
use super::dynamic_dispatch::DynamicDispatchDetector;
use super::exec_eval::ExecEvalDetector;
use super::function_call::FunctionCallDetector;
use super::import::ImportDetector;
use super::metaclass::MetaclassDetector;
use super::{now_secs, AnalysisContext, Detector};

/// Detectors sorted by descending priority (ties broken by insertion
/// order), invoked once per AST node during the analyzer's single DFS
/// walk (§4.2).
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    /// The full, fixed detector set (§4.3): import-family foundation pass,
    /// the core relationship pass, then the warning-only dynamic-pattern
    /// pass, in priority order.
    pub fn new() -> Self {
        let mut detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(ImportDetector::new()),
            Box::new(ConditionalImportDetector::new()),
            Box::new(ClassInheritanceDetector::new()),
            Box::new(FunctionCallDetector::new()),
            Box::new(DynamicDispatchDetector::new()),
            Box::new(ExecEvalDetector::new()),
            Box::new(AttributeRebindingDetector::new()),
            Box::new(DecoratorDetector::new()),
            Box::new(MetaclassDetector::new()),
        ];
        detectors.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { detectors }
    }

    /// A registry holding a single detector, for detector-level unit tests.
    pub fn with_detector(detector: impl Detector + 'static) -> Self {
        Self {
            detectors: vec![Box::new(detector)],
        }
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Parses `source` and runs every detector's `detect()` over every AST
    /// node in priority order, collecting relationships directly (single-
    /// phase mode, §4.4). On detector panic-free failure the detector
    /// simply contributes nothing for that node; warnings accumulated by
    /// warning-only detectors are drained once, at the end.
    pub fn analyze_source(
        &mut self,
        source: &str,
        file: &Path,
        project_root: &Path,
    ) -> (Vec<Relationship>, Vec<Warning>) {
        let mut relationships = Vec::new();
        let mut parse_warning = None;
        let file_str = file.to_string_lossy().to_string();

        match parse_with_timeout(source.as_bytes().to_vec()) {
            ParseOutcome::Ok(tree) => {
                let ctx = AnalysisContext {
                    file: &file_str,
                    project_root,
                    source: source.as_bytes(),
                };
                walk_capped(tree.root_node(), |node| {
                    for detector in &mut self.detectors {
                        relationships.extend(detector.detect(node, &ctx));
                    }
                });
            }
            ParseOutcome::SyntaxError(tree) => {
                let ctx = AnalysisContext {
                    file: &file_str,
                    project_root,
                    source: source.as_bytes(),
                };
                walk_capped(tree.root_node(), |node| {
                    for detector in &mut self.detectors {
                        relationships.extend(detector.detect(node, &ctx));
                    }
                });
                tracing::warn!(file = %file_str, "syntax error while parsing");
                parse_warning = Some(Warning::new(
                    ctxgraph_core::WarningKind::ParseError,
                    file_str.clone(),
                    1,
                    "syntax_error",
                    format!("{file_str}: syntax error"),
                    now_secs(),
                ));
            }
            ParseOutcome::Timeout => {
                tracing::warn!(file = %file_str, "parse timed out");
                parse_warning = Some(Warning::new(
                    ctxgraph_core::WarningKind::ParseError,
                    file_str.clone(),
                    1,
                    "parse_timeout",
                    format!("{file_str}: parse timed out"),
                    now_secs(),
                ));
            }
        }

        let mut warnings = self.drain_all_warnings();
        warnings.extend(parse_warning);
        (relationships, warnings)
    }

    /// Phase 1 of two-phase analysis (§4.4): runs `extract_symbols()` on
    /// every detector that supports it, and `detect()` on every detector
    /// that doesn't (i.e. the warning-only ones, which always return an
    /// empty relationship vec but still accumulate warnings).
    pub fn extract_symbol_data(
        &mut self,
        source: &str,
        file: &Path,
        project_root: &Path,
    ) -> (FileSymbolData, Vec<Warning>) {
        let file_str = file.to_string_lossy().to_string();
        let mut data = FileSymbolData::new(file_str.clone());
        let start = std::time::Instant::now();

        let mut definitions: Vec<SymbolDefinition> = Vec::new();
        let mut references: Vec<SymbolReference> = Vec::new();

        match parse_with_timeout(source.as_bytes().to_vec()) {
            ParseOutcome::Ok(tree) => {
                let ctx = AnalysisContext {
                    file: &file_str,
                    project_root,
                    source: source.as_bytes(),
                };
                definitions = super::definitions::extract_definitions(tree.root_node(), &ctx);
                walk_capped(tree.root_node(), |node| {
                    for detector in &mut self.detectors {
                        if detector.supports_symbol_extraction() {
                            let (_defs, refs) = detector.extract_symbols(node, &ctx);
                            references.extend(refs);
                        } else {
                            let _ = detector.detect(node, &ctx);
                        }
                    }
                });
                data.is_valid = true;
            }
            ParseOutcome::SyntaxError(tree) => {
                let ctx = AnalysisContext {
                    file: &file_str,
                    project_root,
                    source: source.as_bytes(),
                };
                definitions = super::definitions::extract_definitions(tree.root_node(), &ctx);
                data.is_valid = false;
                data.error_message = Some("syntax error".to_string());
            }
            ParseOutcome::Timeout => {
                data.is_valid = false;
                data.error_message = Some("parse timeout".to_string());
                tracing::warn!(file = %file_str, "parse timed out");
            }
        }

        let (dynamic_types, warnings) = self.collect_dynamic_pattern_info();
        data.definitions = definitions;
        data.references = references;
        data.parse_time_secs = start.elapsed().as_secs_f64();
        data.has_dynamic_patterns = !dynamic_types.is_empty();
        data.dynamic_pattern_types = dynamic_types;

        (data, warnings)
    }

    fn collect_dynamic_pattern_info(&mut self) -> (Vec<String>, Vec<Warning>) {
        let warnings = self.drain_all_warnings();
        let mut types: Vec<String> = warnings
            .iter()
            .filter_map(|w| w.kind.suppression_key().map(str::to_string))
            .collect();
        types.sort();
        types.dedup();
        (types, warnings)
    }

    fn drain_all_warnings(&mut self) -> Vec<Warning> {
        let mut all = Vec::new();
        for detector in &mut self.detectors {
            all.extend(detector.drain_warnings());
        }
        all
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_descending() {
        let registry = DetectorRegistry::new();
        let priorities: Vec<i32> = registry.detectors.iter().map(|d| d.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn dynamic_detectors_never_produce_relationships() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "eval(x)\ngetattr(o, n)\nclass Foo(metaclass=M):\n    pass\n";
        let mut registry = DetectorRegistry::new();
        let (rels, warnings) = registry.analyze_source(source, &a, dir.path());
        assert!(rels
            .iter()
            .all(|r| r.relationship_type != ctxgraph_core::RelationshipType::Import));
        assert!(!warnings.is_empty());
    }
}
