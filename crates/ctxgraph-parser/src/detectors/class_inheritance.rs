use ctxgraph_core::{
    sentinel, ReferenceKind, Relationship, RelationshipType, SentinelKind, SymbolDefinition,
    SymbolReference,
};
use tree_sitter::Node;

use crate::resolution::BUILTIN_NAMES;

use super::scope_cache::FileScopeCache;
use super::{AnalysisContext, Detector};

/// One relationship per base class listed in a `class` statement, in
/// source order (§4.3.4). `metaclass=` keyword arguments are skipped here —
/// they belong to [`super::metaclass::MetaclassDetector`].
#[derive(Default)]
pub struct ClassInheritanceDetector {
    scope: FileScopeCache,
}

impl ClassInheritanceDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn bases<'a>(&self, node: Node<'a>, ctx: &AnalysisContext) -> Vec<(String, Node<'a>)> {
        let Some(superclasses) = node.child_by_field_name("superclasses") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = superclasses.walk();
        for child in superclasses.children(&mut cursor) {
            match child.kind() {
                "identifier" => out.push((ctx.text(child).to_string(), child)),
                "attribute" => out.push((ctx.text(child).to_string(), child)),
                _ => {}
            }
        }
        out
    }

    fn resolve(&self, base: &str) -> String {
        let bare = base.rsplit('.').next().unwrap_or(base);
        if self.scope.is_local(bare) {
            return String::new(); // caller substitutes current file
        }
        let prefix = base.split('.').next().unwrap_or(base);
        if let Some(target) = self.scope.resolve_import(prefix) {
            return target.to_string();
        }
        if BUILTIN_NAMES.contains(bare) {
            return sentinel(SentinelKind::Builtin, bare);
        }
        sentinel(SentinelKind::Unresolved, base)
    }
}

impl Detector for ClassInheritanceDetector {
    fn name(&self) -> &'static str {
        "class_inheritance"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn supports_symbol_extraction(&self) -> bool {
        true
    }

    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship> {
        if node.kind() != "class_definition" {
            return Vec::new();
        }
        self.scope.ensure_for(root_of(node), ctx);
        let bases = self.bases(node, ctx);
        let total = bases.len();
        let line = ctx.line_of(node);

        bases
            .into_iter()
            .enumerate()
            .filter_map(|(i, (base, base_node))| {
                let resolved = self.resolve(&base);
                let target = if resolved.is_empty() {
                    ctx.file.to_string()
                } else {
                    resolved
                };
                let mut rel = Relationship::new(
                    ctx.file,
                    target,
                    RelationshipType::ClassInheritance,
                    ctx.line_of(base_node),
                )
                .ok()?;
                rel = rel
                    .with_target_symbol(base.rsplit('.').next().unwrap_or(&base).to_string())
                    .with_metadata("inheritance_order", i.to_string())
                    .with_metadata("total_parents", total.to_string());
                let _ = line;
                Some(rel)
            })
            .collect()
    }

    fn extract_symbols(
        &mut self,
        node: Node,
        ctx: &AnalysisContext,
    ) -> (Vec<SymbolDefinition>, Vec<SymbolReference>) {
        if node.kind() != "class_definition" {
            return (Vec::new(), Vec::new());
        }
        self.scope.ensure_for(root_of(node), ctx);
        let refs = self
            .bases(node, ctx)
            .into_iter()
            .map(|(base, base_node)| {
                let resolved = self.resolve(&base);
                let target = if resolved.is_empty() {
                    ctx.file.to_string()
                } else {
                    resolved
                };
                let bare = base.rsplit('.').next().unwrap_or(&base).to_string();
                let mut r = SymbolReference::new(bare.clone(), ReferenceKind::ClassReference, ctx.line_of(base_node));
                r.resolved_module = Some(target);
                r.resolved_symbol = Some(bare);
                r
            })
            .collect();
        (Vec::new(), refs)
    }
}

fn root_of(mut node: Node) -> Node {
    while let Some(parent) = node.parent() {
        node = parent;
    }
    node
}
