use ctxgraph_core::{Relationship, Warning, WarningKind};
use tree_sitter::Node;

use super::{now_secs, AnalysisContext, Detector};

/// Any use of `exec()` or `eval()` (§4.3.5): runtime code evaluation can do
/// anything, so it is flagged and never modeled as a relationship.
#[derive(Default)]
pub struct ExecEvalDetector {
    warnings: Vec<Warning>,
}

impl ExecEvalDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for ExecEvalDetector {
    fn name(&self) -> &'static str {
        "exec_eval"
    }

    fn priority(&self) -> i32 {
        25
    }

    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship> {
        if node.kind() != "call" {
            return Vec::new();
        }
        let Some(function) = node.child_by_field_name("function") else {
            return Vec::new();
        };
        if function.kind() != "identifier" {
            return Vec::new();
        }
        let name = ctx.text(function);
        if name != "exec" && name != "eval" {
            return Vec::new();
        }
        let line = ctx.line_of(node);
        self.warnings.push(Warning::new(
            WarningKind::ExecEval,
            ctx.file,
            line,
            "exec_eval",
            format!("use of {name}() — cross-file effects cannot be statically determined"),
            now_secs(),
        ));
        Vec::new()
    }

    fn drain_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::registry::DetectorRegistry;

    #[test]
    fn warns_on_eval() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let mut registry = DetectorRegistry::with_detector(ExecEvalDetector::new());
        let (rels, warnings) = registry.analyze_source("eval(user_input)\n", &a, dir.path());
        assert!(rels.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::ExecEval);
    }
}
