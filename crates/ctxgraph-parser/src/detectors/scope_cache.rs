use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use crate::import_parsing::{parse_import_from_statement, parse_import_statement};

use super::AnalysisContext;

/// Per-detector "local definitions" and "imported name -> resolved target"
/// cache, keyed by the file it was built for. Detectors that resolve names
/// (function call, class inheritance) hold one of these and call
/// [`FileScopeCache::ensure_for`] before every lookup: if `ctx.file` differs
/// from the file this cache was built for, both maps are rebuilt from the
/// module root. Stale caches across files are the exact regression this
/// guards against.
#[derive(Default)]
pub struct FileScopeCache {
    current_file: Option<String>,
    local_definitions: HashSet<String>,
    import_map: HashMap<String, String>,
}

impl FileScopeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_for(&mut self, root: Node, ctx: &AnalysisContext) {
        if self.current_file.as_deref() == Some(ctx.file) {
            return;
        }
        self.current_file = Some(ctx.file.to_string());
        self.local_definitions.clear();
        self.import_map.clear();
        self.rebuild(root, ctx);
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.local_definitions.contains(name)
    }

    pub fn resolve_import(&self, name: &str) -> Option<&str> {
        self.import_map.get(name).map(|s| s.as_str())
    }

    fn rebuild(&mut self, root: Node, ctx: &AnalysisContext) {
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                "function_definition" | "class_definition" => {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        self.local_definitions
                            .insert(ctx.text(name_node).to_string());
                    }
                }
                "import_statement" => {
                    for binding in parse_import_statement(child, ctx) {
                        self.import_map
                            .insert(binding.bound_name, binding.resolved_target);
                    }
                }
                "import_from_statement" => {
                    for binding in parse_import_from_statement(child, ctx) {
                        if !binding.is_wildcard {
                            self.import_map
                                .insert(binding.bound_name, binding.resolved_target);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}
