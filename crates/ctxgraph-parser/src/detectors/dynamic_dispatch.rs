use ctxgraph_core::{Relationship, Warning, WarningKind};
use tree_sitter::Node;

use super::{now_secs, AnalysisContext, Detector};

const DISPATCH_BUILTINS: &[&str] = &["getattr", "setattr", "hasattr", "delattr"];

/// `<getattr-like>(obj, <non-literal>)` — the attribute name isn't known
/// statically, so no relationship can be emitted (§4.3.5). A literal string
/// attribute name produces no warning at all.
#[derive(Default)]
pub struct DynamicDispatchDetector {
    warnings: Vec<Warning>,
}

impl DynamicDispatchDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for DynamicDispatchDetector {
    fn name(&self) -> &'static str {
        "dynamic_dispatch"
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
        if function.kind() != "identifier" || !DISPATCH_BUILTINS.contains(&ctx.text(function)) {
            return Vec::new();
        }
        let Some(args) = node.child_by_field_name("arguments") else {
            return Vec::new();
        };
        let positional: Vec<Node> = {
            let mut cursor = args.walk();
            args.named_children(&mut cursor)
                .filter(|c| c.kind() != "keyword_argument")
                .collect()
        };
        let Some(attr_arg) = positional.get(1) else {
            return Vec::new();
        };
        if attr_arg.kind() == "string" {
            return Vec::new();
        }

        let line = ctx.line_of(node);
        self.warnings.push(
            Warning::new(
                WarningKind::DynamicDispatch,
                ctx.file,
                line,
                "dynamic_dispatch",
                format!(
                    "{}() called with a non-literal attribute name; target cannot be resolved statically",
                    ctx.text(function)
                ),
                now_secs(),
            )
            .with_column(attr_arg.start_position().column as u32),
        );
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
    fn warns_on_non_literal_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "getattr(obj, name)\n";
        let mut registry = DetectorRegistry::with_detector(DynamicDispatchDetector::new());
        let (rels, warnings) = registry.analyze_source(source, &a, dir.path());
        assert!(rels.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::DynamicDispatch);
    }

    #[test]
    fn no_warning_for_literal_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "getattr(obj, 'name')\n";
        let mut registry = DetectorRegistry::with_detector(DynamicDispatchDetector::new());
        let (_, warnings) = registry.analyze_source(source, &a, dir.path());
        assert!(warnings.is_empty());
    }
}
