use ctxgraph_core::{ReferenceKind, Relationship, RelationshipType, SymbolDefinition, SymbolReference};
use tree_sitter::Node;

use crate::import_parsing::{conditional_guard, parse_import_from_statement, parse_import_statement};

use super::{AnalysisContext, Detector};

/// `if TYPE_CHECKING:` / `if sys.version_info <op> (...):` bodies (§4.3.2).
/// Priority 95: runs after the plain import detector so the foundation
/// pass (priority 100) sees the same import statements first, but since
/// each statement is owned by exactly one of the two detectors (via
/// [`conditional_guard`]) ordering between them doesn't change the result.
#[derive(Default)]
pub struct ConditionalImportDetector;

impl ConditionalImportDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for ConditionalImportDetector {
    fn name(&self) -> &'static str {
        "conditional_import"
    }

    fn priority(&self) -> i32 {
        95
    }

    fn supports_symbol_extraction(&self) -> bool {
        true
    }

    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship> {
        let Some(condition_type) = conditional_guard(node, ctx) else {
            return Vec::new();
        };
        let bindings = match node.kind() {
            "import_statement" => parse_import_statement(node, ctx),
            "import_from_statement" => parse_import_from_statement(node, ctx),
            _ => return Vec::new(),
        };
        let line = ctx.line_of(node);
        bindings
            .into_iter()
            .filter_map(|binding| {
                let mut rel = Relationship::new(
                    ctx.file,
                    binding.resolved_target.clone(),
                    RelationshipType::Import,
                    line,
                )
                .ok()?;
                rel = rel
                    .with_metadata("module", binding.module_dotted.clone())
                    .with_metadata("conditional", "true")
                    .with_metadata("condition_type", condition_type);
                if binding.is_wildcard {
                    rel = rel.with_metadata("wildcard", "true");
                }
                if let Some(symbol) = &binding.imported_symbol {
                    rel = rel.with_target_symbol(symbol.clone());
                }
                Some(rel)
            })
            .collect()
    }

    fn extract_symbols(
        &mut self,
        node: Node,
        ctx: &AnalysisContext,
    ) -> (Vec<SymbolDefinition>, Vec<SymbolReference>) {
        let Some(_condition_type) = conditional_guard(node, ctx) else {
            return (Vec::new(), Vec::new());
        };
        let bindings = match node.kind() {
            "import_statement" => parse_import_statement(node, ctx),
            "import_from_statement" => parse_import_from_statement(node, ctx),
            _ => return (Vec::new(), Vec::new()),
        };
        let line = ctx.line_of(node);
        let refs = bindings
            .into_iter()
            .map(|binding| {
                let mut r = SymbolReference::new(binding.bound_name.clone(), ReferenceKind::Import, line);
                r.resolved_module = Some(binding.resolved_target);
                r.resolved_symbol = binding.imported_symbol;
                r.module_name = Some(binding.module_dotted);
                r.is_relative = binding.is_relative;
                r.relative_level = binding.relative_level;
                r.alias = Some(binding.bound_name);
                r.is_wildcard = binding.is_wildcard;
                r.is_conditional = true;
                r
            })
            .collect();
        (Vec::new(), refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::registry::DetectorRegistry;

    #[test]
    fn type_checking_import_marked_conditional() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let source = "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    import foo\n";
        let mut registry = DetectorRegistry::with_detector(ConditionalImportDetector::new());
        let (rels, _) = registry.analyze_source(source, &a, dir.path());
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].metadata.get("conditional").map(String::as_str), Some("true"));
        assert_eq!(
            rels[0].metadata.get("condition_type").map(String::as_str),
            Some("TYPE_CHECKING")
        );
    }
}
