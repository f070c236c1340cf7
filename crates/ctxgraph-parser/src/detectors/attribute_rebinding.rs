use ctxgraph_core::{Relationship, SymbolDefinition, SymbolReference, Warning, WarningKind};
use tree_sitter::Node;

use super::scope_cache::FileScopeCache;
use super::{now_secs, AnalysisContext, Detector};

/// Assignment to `module.attr` where the left-hand side is a module-or-
/// import qualified attribute and isn't `self.*`/`cls.*` (§4.3.5). Rebinding
/// an imported module's attribute at runtime invalidates any relationship
/// analysis would otherwise assume, so this is warned, never modeled.
#[derive(Default)]
pub struct AttributeRebindingDetector {
    scope: FileScopeCache,
    warnings: Vec<Warning>,
}

impl AttributeRebindingDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for AttributeRebindingDetector {
    fn name(&self) -> &'static str {
        "attribute_rebinding"
    }

    fn priority(&self) -> i32 {
        25
    }

    fn supports_symbol_extraction(&self) -> bool {
        // Runs alongside the symbol-extracting detectors purely to keep its
        // per-file scope cache (import bindings) warm; it never emits
        // definitions or references of its own.
        true
    }

    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship> {
        if node.kind() != "assignment" {
            return Vec::new();
        }
        self.scope.ensure_for(root_of(node), ctx);
        let Some(left) = node.child_by_field_name("left") else {
            return Vec::new();
        };
        if left.kind() != "attribute" {
            return Vec::new();
        }
        let Some(object) = left.child_by_field_name("object") else {
            return Vec::new();
        };
        if object.kind() != "identifier" {
            return Vec::new();
        }
        let object_name = ctx.text(object);
        if object_name == "self" || object_name == "cls" {
            return Vec::new();
        }
        if self.scope.resolve_import(object_name).is_none() {
            return Vec::new();
        }

        let Some(attribute) = left.child_by_field_name("attribute") else {
            return Vec::new();
        };
        let line = ctx.line_of(node);
        self.warnings.push(Warning::new(
            WarningKind::AttributeRebinding,
            ctx.file,
            line,
            "attribute_rebinding",
            format!(
                "runtime rebinding of {object_name}.{} — dependents of that module may observe a different value than static analysis assumes",
                ctx.text(attribute)
            ),
            now_secs(),
        ));
        Vec::new()
    }

    fn extract_symbols(
        &mut self,
        node: Node,
        ctx: &AnalysisContext,
    ) -> (Vec<SymbolDefinition>, Vec<SymbolReference>) {
        self.scope.ensure_for(root_of(node), ctx);
        (Vec::new(), Vec::new())
    }

    fn drain_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

fn root_of(mut node: Node) -> Node {
    while let Some(parent) = node.parent() {
        node = parent;
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::registry::DetectorRegistry;

    #[test]
    fn warns_on_imported_module_attribute_rebinding() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "import config\nconfig.DEBUG = True\n";
        let mut registry = DetectorRegistry::with_detector(AttributeRebindingDetector::new());
        let (_, warnings) = registry.analyze_source(source, &a, dir.path());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::AttributeRebinding);
    }

    #[test]
    fn self_attribute_assignment_is_not_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "class Foo:\n    def bar(self):\n        self.x = 1\n";
        let mut registry = DetectorRegistry::with_detector(AttributeRebindingDetector::new());
        let (_, warnings) = registry.analyze_source(source, &a, dir.path());
        assert!(warnings.is_empty());
    }
}
