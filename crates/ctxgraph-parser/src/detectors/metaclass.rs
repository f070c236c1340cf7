use ctxgraph_core::{Relationship, Warning, WarningKind};
use tree_sitter::Node;

use super::{now_secs, AnalysisContext, Detector};

const KNOWN_STANDARD_METACLASSES: &[&str] = &["type", "ABCMeta", "abc.ABCMeta"];

/// A class declared with a `metaclass=` keyword argument, unless the
/// metaclass is one of the known-standard ones (§4.3.5). Custom metaclasses
/// can inject attributes/methods invisibly at class-creation time.
#[derive(Default)]
pub struct MetaclassDetector {
    warnings: Vec<Warning>,
}

impl MetaclassDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for MetaclassDetector {
    fn name(&self) -> &'static str {
        "metaclass"
    }

    fn priority(&self) -> i32 {
        25
    }

    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship> {
        if node.kind() != "class_definition" {
            return Vec::new();
        }
        let Some(superclasses) = node.child_by_field_name("superclasses") else {
            return Vec::new();
        };
        let mut cursor = superclasses.walk();
        for child in superclasses.children(&mut cursor) {
            if child.kind() != "keyword_argument" {
                continue;
            }
            let Some(name_node) = child.child_by_field_name("name") else {
                continue;
            };
            if ctx.text(name_node) != "metaclass" {
                continue;
            }
            let Some(value_node) = child.child_by_field_name("value") else {
                continue;
            };
            let metaclass_name = ctx.text(value_node);
            if KNOWN_STANDARD_METACLASSES.contains(&metaclass_name) {
                continue;
            }
            let line = ctx.line_of(node);
            self.warnings.push(Warning::new(
                WarningKind::Metaclass,
                ctx.file,
                line,
                "metaclass",
                format!(
                    "class uses custom metaclass {metaclass_name} — attribute injection cannot be statically resolved"
                ),
                now_secs(),
            ));
        }
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
    fn custom_metaclass_warns() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "class Foo(metaclass=MyMeta):\n    pass\n";
        let mut registry = DetectorRegistry::with_detector(MetaclassDetector::new());
        let (_, warnings) = registry.analyze_source(source, &a, dir.path());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Metaclass);
    }

    #[test]
    fn standard_metaclass_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "class Foo(metaclass=ABCMeta):\n    pass\n";
        let mut registry = DetectorRegistry::with_detector(MetaclassDetector::new());
        let (_, warnings) = registry.analyze_source(source, &a, dir.path());
        assert!(warnings.is_empty());
    }
}
