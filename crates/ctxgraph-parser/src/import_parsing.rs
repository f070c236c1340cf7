//! Shared tree-sitter-python import-statement parsing, used by both the
//! import detector (to emit relationships) and the per-file scope cache
//! (to build the "imported name -> resolved target" map that the function
//! call and class inheritance detectors consult).

use tree_sitter::Node;

use crate::detectors::AnalysisContext;
use crate::resolution::resolve_module;

#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub bound_name: String,
    pub resolved_target: String,
    pub is_wildcard: bool,
    pub module_dotted: String,
    pub imported_symbol: Option<String>,
    pub is_relative: bool,
    pub relative_level: u32,
}

/// Parses a plain `import a.b.c [as x]` (each comma-separated clause is a
/// separate binding).
pub fn parse_import_statement(node: Node, ctx: &AnalysisContext) -> Vec<ImportBinding> {
    let mut bindings = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "dotted_name" => {
                let dotted = ctx.text(child).to_string();
                let bound = dotted.split('.').next().unwrap_or(&dotted).to_string();
                push_binding(&mut bindings, ctx, &dotted, &bound, None, false, 0);
            }
            "aliased_import" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let dotted = ctx.text(name_node).to_string();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|a| ctx.text(a).to_string())
                        .unwrap_or_else(|| dotted.clone());
                    push_binding(&mut bindings, ctx, &dotted, &alias, None, false, 0);
                }
            }
            _ => {}
        }
    }
    bindings
}

/// Parses `from <module> import a, b as c, *`.
pub fn parse_import_from_statement(node: Node, ctx: &AnalysisContext) -> Vec<ImportBinding> {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return Vec::new();
    };
    let (module_dotted, is_relative, level) = parse_module_reference(module_node, ctx);

    let mut bindings = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "wildcard_import" => {
                push_binding(
                    &mut bindings,
                    ctx,
                    &module_dotted,
                    &module_dotted,
                    None,
                    true,
                    level,
                );
                if let Some(last) = bindings.last_mut() {
                    last.is_relative = is_relative;
                }
            }
            "dotted_name" => {
                let symbol = ctx.text(child).to_string();
                push_binding(
                    &mut bindings,
                    ctx,
                    &module_dotted,
                    &symbol,
                    Some(symbol.clone()),
                    false,
                    level,
                );
                if let Some(last) = bindings.last_mut() {
                    last.is_relative = is_relative;
                }
            }
            "aliased_import" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    let symbol = ctx.text(name_node).to_string();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|a| ctx.text(a).to_string())
                        .unwrap_or_else(|| symbol.clone());
                    push_binding(
                        &mut bindings,
                        ctx,
                        &module_dotted,
                        &alias,
                        Some(symbol),
                        false,
                        level,
                    );
                    if let Some(last) = bindings.last_mut() {
                        last.is_relative = is_relative;
                    }
                }
            }
            _ => {}
        }
    }
    bindings
}

/// If `node` (an `import_statement`/`import_from_statement`) sits directly
/// in the body of an `if TYPE_CHECKING:` or `if sys.version_info <op> (...)`
/// block, returns the condition type name. Only the *immediate* parent
/// `if` is considered — a nested `if` inside the conditional body is not
/// descended into, so an import two levels down is treated as a normal
/// (unconditional) import by the plain import detector.
pub fn conditional_guard(node: Node, ctx: &AnalysisContext) -> Option<&'static str> {
    let block = node.parent()?;
    if block.kind() != "block" {
        return None;
    }
    let if_stmt = block.parent()?;
    if if_stmt.kind() != "if_statement" {
        return None;
    }
    let consequence = if_stmt.child_by_field_name("consequence")?;
    if consequence.id() != block.id() {
        return None;
    }
    let condition = if_stmt.child_by_field_name("condition")?;
    let condition_text = ctx.text(condition);
    if condition_text.contains("TYPE_CHECKING") {
        Some("TYPE_CHECKING")
    } else if condition_text.contains("version_info") {
        Some("version_check")
    } else {
        None
    }
}

fn parse_module_reference(node: Node, ctx: &AnalysisContext) -> (String, bool, u32) {
    match node.kind() {
        "relative_import" => {
            let mut level = 0u32;
            let mut dotted = String::new();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "import_prefix" => {
                        level = ctx.text(child).chars().filter(|c| *c == '.').count() as u32;
                    }
                    "dotted_name" => {
                        dotted = ctx.text(child).to_string();
                    }
                    _ => {}
                }
            }
            (dotted, true, level.max(1))
        }
        _ => (ctx.text(node).to_string(), false, 0),
    }
}

#[allow(clippy::too_many_arguments)]
fn push_binding(
    bindings: &mut Vec<ImportBinding>,
    ctx: &AnalysisContext,
    module_dotted: &str,
    bound_name: &str,
    imported_symbol: Option<String>,
    is_wildcard: bool,
    relative_level: u32,
) {
    let resolved_target = resolve_module(
        module_dotted,
        &ctx.current_file_path(),
        ctx.project_root,
        relative_level,
    );
    bindings.push(ImportBinding {
        bound_name: bound_name.to_string(),
        resolved_target,
        is_wildcard,
        module_dotted: module_dotted.to_string(),
        imported_symbol,
        is_relative: relative_level > 0,
        relative_level,
    });
}
