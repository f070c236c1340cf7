use ctxgraph_core::{
    sentinel, ReferenceKind, Relationship, RelationshipType, SentinelKind, SymbolDefinition,
    SymbolReference,
};
use tree_sitter::Node;

use crate::resolution::BUILTIN_NAMES;

use super::scope_cache::FileScopeCache;
use super::{AnalysisContext, Detector};

/// Resolves calls whose callable is a bare name `f()` or a module-qualified
/// two-level name `m.f()` (§4.3.3). Method chains (`a.b().c()`) and longer
/// attribute chains (`a.b.c()`) are deliberately not emitted.
#[derive(Default)]
pub struct FunctionCallDetector {
    scope: FileScopeCache,
}

impl FunctionCallDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(callable_name, is_method_call)` for the callable of a
    /// `call` node, or `None` if the shape is one we deliberately skip.
    fn callable_name(&self, function: Node, ctx: &AnalysisContext) -> Option<(String, bool)> {
        match function.kind() {
            "identifier" => Some((ctx.text(function).to_string(), false)),
            "attribute" => {
                let object = function.child_by_field_name("object")?;
                let attribute = function.child_by_field_name("attribute")?;
                if object.kind() != "identifier" {
                    // `a.b().c()` or `a.b.c()` — longer chain, skip.
                    return None;
                }
                Some((
                    format!("{}.{}", ctx.text(object), ctx.text(attribute)),
                    object_is_self_or_cls(ctx.text(object)),
                ))
            }
            _ => None,
        }
    }

    fn resolve(&self, name: &str, ctx: &AnalysisContext) -> String {
        let bare = name.rsplit('.').next().unwrap_or(name);
        if self.scope.is_local(bare) {
            return ctx.file.to_string();
        }
        let prefix = name.split('.').next().unwrap_or(name);
        if let Some(target) = self.scope.resolve_import(prefix) {
            return target.to_string();
        }
        if BUILTIN_NAMES.contains(bare) {
            return sentinel(SentinelKind::Builtin, bare);
        }
        sentinel(SentinelKind::Unresolved, name)
    }
}

fn object_is_self_or_cls(name: &str) -> bool {
    name == "self" || name == "cls"
}

impl Detector for FunctionCallDetector {
    fn name(&self) -> &'static str {
        "function_call"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn supports_symbol_extraction(&self) -> bool {
        true
    }

    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship> {
        if node.kind() != "call" {
            return Vec::new();
        }
        self.scope.ensure_for(root_of(node), ctx);
        let Some(function) = node.child_by_field_name("function") else {
            return Vec::new();
        };
        let Some((name, is_method)) = self.callable_name(function, ctx) else {
            return Vec::new();
        };
        let target = self.resolve(&name, ctx);
        let line = ctx.line_of(node);
        let Ok(mut rel) = Relationship::new(ctx.file, target, RelationshipType::FunctionCall, line)
        else {
            return Vec::new();
        };
        rel = rel.with_target_symbol(name.rsplit('.').next().unwrap_or(&name).to_string());
        if is_method {
            rel = rel.with_metadata("is_method_call", "true");
        }
        vec![rel]
    }

    fn extract_symbols(
        &mut self,
        node: Node,
        ctx: &AnalysisContext,
    ) -> (Vec<SymbolDefinition>, Vec<SymbolReference>) {
        if node.kind() != "call" {
            return (Vec::new(), Vec::new());
        }
        self.scope.ensure_for(root_of(node), ctx);
        let Some(function) = node.child_by_field_name("function") else {
            return (Vec::new(), Vec::new());
        };
        let Some((name, is_method)) = self.callable_name(function, ctx) else {
            return (Vec::new(), Vec::new());
        };
        let target = self.resolve(&name, ctx);
        let bare = name.rsplit('.').next().unwrap_or(&name).to_string();
        let line = ctx.line_of(node);

        let mut r = SymbolReference::new(bare.clone(), ReferenceKind::FunctionCall, line);
        r.resolved_module = Some(target);
        r.resolved_symbol = Some(bare);
        r.is_method_call = is_method;
        (Vec::new(), vec![r])
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
    fn resolves_local_function_call() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "def helper():\n    pass\n\ndef main():\n    helper()\n";
        let mut registry = DetectorRegistry::with_detector(FunctionCallDetector::new());
        let (rels, _) = registry.analyze_source(source, &a, dir.path());
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target_file, a.to_string_lossy());
    }

    #[test]
    fn resolves_builtin_call() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "x = len([1, 2])\n";
        let mut registry = DetectorRegistry::with_detector(FunctionCallDetector::new());
        let (rels, _) = registry.analyze_source(source, &a, dir.path());
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target_file, "<builtin:len>");
    }

    #[test]
    fn skips_longer_attribute_chains() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "a.b.c()\n";
        let mut registry = DetectorRegistry::with_detector(FunctionCallDetector::new());
        let (rels, _) = registry.analyze_source(source, &a, dir.path());
        assert!(rels.is_empty());
    }
}
