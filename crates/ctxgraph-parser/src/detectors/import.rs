use ctxgraph_core::{ReferenceKind, Relationship, RelationshipType, SymbolDefinition, SymbolReference};
use tree_sitter::Node;

use crate::import_parsing::{conditional_guard, parse_import_from_statement, parse_import_statement};

use super::{AnalysisContext, Detector};

/// Foundation detector (priority 100): every `import`/`from ... import`
/// form, resolved against the filesystem per §4.3.1. Conditional imports
/// (directly inside `if TYPE_CHECKING:` / `if sys.version_info ...:`) are
/// left to [`super::conditional_import::ConditionalImportDetector`] so each
/// import statement is emitted exactly once.
#[derive(Default)]
pub struct ImportDetector;

impl ImportDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for ImportDetector {
    fn name(&self) -> &'static str {
        "import"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn supports_symbol_extraction(&self) -> bool {
        true
    }

    fn detect(&mut self, node: Node, ctx: &AnalysisContext) -> Vec<Relationship> {
        if conditional_guard(node, ctx).is_some() {
            return Vec::new();
        }
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
                rel = rel.with_metadata("module", binding.module_dotted.clone());
                if binding.is_wildcard {
                    rel = rel.with_metadata("wildcard", "true");
                }
                if binding.is_relative {
                    rel = rel.with_metadata("relative_level", binding.relative_level.to_string());
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
        let bindings = match node.kind() {
            "import_statement" => parse_import_statement(node, ctx),
            "import_from_statement" => parse_import_from_statement(node, ctx),
            _ => return (Vec::new(), Vec::new()),
        };
        let line = ctx.line_of(node);
        let is_conditional = conditional_guard(node, ctx).is_some();

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
                r.is_conditional = is_conditional;
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
    use std::path::Path;

    fn detect_in(source: &str, file: &Path, root: &Path) -> Vec<Relationship> {
        let mut registry = DetectorRegistry::with_detector(ImportDetector::new());
        registry.analyze_source(source, file, root).0
    }

    #[test]
    fn resolves_project_local_import() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("utils.py"), "").unwrap();
        let a = dir.path().join("a.py");
        let rels = detect_in("import utils\n", &a, dir.path());
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].relationship_type, RelationshipType::Import);
        assert_eq!(rels[0].line_number, 1);
        assert_eq!(rels[0].target_file, dir.path().join("utils.py").to_string_lossy());
    }

    #[test]
    fn wildcard_import_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let rels = detect_in("from os import *\n", &a, dir.path());
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].metadata.get("wildcard").map(String::as_str), Some("true"));
    }
}
