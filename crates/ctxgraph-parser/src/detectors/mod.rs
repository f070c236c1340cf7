use std::path::{Path, PathBuf};

use ctxgraph_core::{Relationship, SymbolDefinition, SymbolReference, Warning};
use tree_sitter::Node;

pub mod attribute_rebinding;
pub mod class_inheritance;
pub mod conditional_import;
pub mod decorator;
pub mod definitions;
pub mod dynamic_dispatch;
pub mod exec_eval;
pub mod function_call;
pub mod import;
pub mod metaclass;
pub mod registry;
pub mod scope_cache;

pub use registry::DetectorRegistry;

/// Read-only context threaded through a single `detect`/`extract_symbols`
/// call: which file is being analyzed, where the project root is (for
/// import resolution), and the file's source bytes (for node text lookup).
pub struct AnalysisContext<'a> {
    pub file: &'a str,
    pub project_root: &'a Path,
    pub source: &'a [u8],
}

/// Wall-clock timestamp for warning records, shared by every warning-only
/// detector.
pub fn now_secs() -> f64 {
    use ctxgraph_core::Clock;
    ctxgraph_core::SystemClock.now_secs()
}

impl<'a> AnalysisContext<'a> {
    pub fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }

    pub fn current_file_path(&self) -> PathBuf {
        PathBuf::from(self.file)
    }

    pub fn line_of(&self, node: Node) -> u32 {
        node.start_position().row as u32 + 1
    }
}

/// A single pattern analyzer, dispatched once per AST node by the
/// [`DetectorRegistry`] in priority order. Detectors that resolve names
/// against local scope or import bindings must invalidate their per-file
/// cache whenever `ctx.file` changes from the previously seen file — see
/// [`scope_cache::FileScopeCache`].
pub trait Detector: Send {
    fn name(&self) -> &'static str;

    /// Higher runs first. Import-family detectors run before anything that
    /// depends on resolved import bindings; warning-only detectors run last.
    fn priority(&self) -> i32;

    fn supports_symbol_extraction(&self) -> bool {
        false
    }

    /// Phase 1A: produce relationships directly from a single AST node.
    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship>;

    /// Phase 1 of two-phase analysis: produce symbol definitions/references
    /// without touching the graph. Only called if
    /// [`Detector::supports_symbol_extraction`] returns `true`.
    fn extract_symbols(
        &mut self,
        _node: Node,
        _ctx: &AnalysisContext,
    ) -> (Vec<SymbolDefinition>, Vec<SymbolReference>) {
        (Vec::new(), Vec::new())
    }

    /// Warning-only detectors accumulate here; the analyzer drains this
    /// between files.
    fn drain_warnings(&mut self) -> Vec<Warning> {
        Vec::new()
    }
}
