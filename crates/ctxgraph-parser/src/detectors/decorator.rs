use ctxgraph_core::{Relationship, Warning, WarningKind};
use tree_sitter::Node;

use super::{now_secs, AnalysisContext, Detector};

const ALLOWED_EXACT: &[&str] = &[
    "staticmethod",
    "classmethod",
    "property",
    "pytest.fixture",
    "unittest.mock.patch",
    "mock.patch",
];
const ALLOWED_PREFIXES: &[&str] = &["pytest.mark."];

fn is_allowed(name: &str) -> bool {
    ALLOWED_EXACT.contains(&name) || ALLOWED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Decoration by any callable not in the fixed allow-list (§4.3.5): an
/// unknown decorator may replace the decorated function/class entirely, so
/// no relationship is assumed for what it does.
#[derive(Default)]
pub struct DecoratorDetector {
    warnings: Vec<Warning>,
}

impl DecoratorDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn callable_text<'a>(&self, expr: Node<'a>, ctx: &AnalysisContext<'a>) -> Option<&'a str> {
        match expr.kind() {
            "identifier" | "attribute" => Some(ctx.text(expr)),
            "call" => {
                let function = expr.child_by_field_name("function")?;
                Some(ctx.text(function))
            }
            _ => None,
        }
    }
}

impl Detector for DecoratorDetector {
    fn name(&self) -> &'static str {
        "decorator"
    }

    fn priority(&self) -> i32 {
        25
    }

    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship> {
        if node.kind() != "decorator" {
            return Vec::new();
        }
        let mut cursor = node.walk();
        let Some(expr) = node.named_children(&mut cursor).next() else {
            return Vec::new();
        };
        let Some(name) = self.callable_text(expr, ctx) else {
            return Vec::new();
        };
        if is_allowed(name) {
            return Vec::new();
        }

        let line = ctx.line_of(node);
        self.warnings.push(Warning::new(
            WarningKind::Decorator,
            ctx.file,
            line,
            "decorator",
            format!("decorator @{name} may replace the decorated definition at runtime"),
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
    fn allowlisted_decorator_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "class Foo:\n    @staticmethod\n    def bar():\n        pass\n";
        let mut registry = DetectorRegistry::with_detector(DecoratorDetector::new());
        let (_, warnings) = registry.analyze_source(source, &a, dir.path());
        assert!(warnings.is_empty());
    }

    #[test]
    fn unknown_decorator_warns() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "@app.route('/x')\ndef handler():\n    pass\n";
        let mut registry = DetectorRegistry::with_detector(DecoratorDetector::new());
        let (_, warnings) = registry.analyze_source(source, &a, dir.path());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Decorator);
    }

    #[test]
    fn pytest_mark_is_allowlisted() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "@pytest.mark.slow\ndef test_x():\n    pass\n";
        let mut registry = DetectorRegistry::with_detector(DecoratorDetector::new());
        let (_, warnings) = registry.analyze_source(source, &a, dir.path());
        assert!(warnings.is_empty());
    }
}
