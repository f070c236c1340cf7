//! Structural extraction of [`SymbolDefinition`]s from `function_definition`
//! / `class_definition` nodes. Unlike the pattern detectors in this module,
//! this isn't gated behind the `Detector` trait — the Analyzer's two-phase
//! pipeline (§2, "two-phase symbol extraction") owns it directly, since
//! every definition is needed regardless of which relationship/warning
//! detectors are registered.

use ctxgraph_core::{SymbolDefinition, SymbolKind};
use tree_sitter::Node;

use super::AnalysisContext;
use crate::ast::walk_capped;

pub fn extract_definitions<'a>(
    root: Node<'a>,
    ctx: &AnalysisContext<'a>,
) -> Vec<SymbolDefinition> {
    let mut out = Vec::new();
    walk_capped(root, |node| match node.kind() {
        "function_definition" => {
            if let Some(def) = build_function(node, ctx) {
                out.push(def);
            }
        }
        "class_definition" => {
            if let Some(def) = build_class(node, ctx) {
                out.push(def);
            }
        }
        _ => {}
    });
    out
}

fn build_function(node: Node, ctx: &AnalysisContext) -> Option<SymbolDefinition> {
    let name_node = node.child_by_field_name("name")?;
    let name = ctx.text(name_node).to_string();
    let kind = if enclosing_container(node).map(|(k, _)| k) == Some("class_definition") {
        SymbolKind::Method
    } else {
        SymbolKind::Function
    };
    let line_start = ctx.line_of(node);
    let line_end = node.end_position().row as u32 + 1;

    let signature = node
        .child_by_field_name("parameters")
        .map(|p| format!("{}{}", name, ctx.text(p)));

    let mut def = SymbolDefinition::new(name, kind, line_start, line_end);
    def.signature = signature;
    def.docstring = extract_docstring(node, ctx);
    def.decorators = extract_decorators(node, ctx);
    if let Some((kind, container)) = enclosing_container(node) {
        if kind == "class_definition" {
            if let Some(class_name) = container.child_by_field_name("name") {
                def.parent_class = Some(ctx.text(class_name).to_string());
            }
        }
    }
    Some(def)
}

fn build_class(node: Node, ctx: &AnalysisContext) -> Option<SymbolDefinition> {
    let name_node = node.child_by_field_name("name")?;
    let name = ctx.text(name_node).to_string();
    let line_start = ctx.line_of(node);
    let line_end = node.end_position().row as u32 + 1;

    let mut def = SymbolDefinition::new(name, SymbolKind::Class, line_start, line_end);
    def.docstring = extract_docstring(node, ctx);
    def.decorators = extract_decorators(node, ctx);
    def.bases = extract_base_names(node, ctx);
    if let Some((kind, container)) = enclosing_container(node) {
        if kind == "class_definition" {
            if let Some(class_name) = container.child_by_field_name("name") {
                def.parent_class = Some(ctx.text(class_name).to_string());
            }
        }
    }
    Some(def)
}

fn extract_base_names(node: Node, ctx: &AnalysisContext) -> Vec<String> {
    let Some(superclasses) = node.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    let mut cursor = superclasses.walk();
    superclasses
        .children(&mut cursor)
        .filter(|c| c.kind() == "identifier" || c.kind() == "attribute")
        .map(|c| ctx.text(c).to_string())
        .collect()
}

fn extract_docstring(node: Node, ctx: &AnalysisContext) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let mut inner_cursor = first.walk();
    let string_node = first
        .named_children(&mut inner_cursor)
        .find(|c| c.kind() == "string")?;
    Some(ctx.text(string_node).trim_matches(['"', '\'']).to_string())
}

/// Walks up from `node` (the definition itself, not the optional wrapping
/// `decorated_definition`) collecting sibling `decorator` nodes.
fn extract_decorators(node: Node, ctx: &AnalysisContext) -> Vec<String> {
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    if parent.kind() != "decorated_definition" {
        return Vec::new();
    }
    let mut cursor = parent.walk();
    parent
        .children(&mut cursor)
        .filter(|c| c.kind() == "decorator")
        .filter_map(|d| {
            let mut c2 = d.walk();
            d.named_children(&mut c2).next().map(|e| ctx.text(e).to_string())
        })
        .collect()
}

/// The nearest enclosing `function_definition`/`class_definition` ancestor,
/// used to classify a function as a `Method` (directly inside a class body)
/// versus a free `Function`, and to attach a definition's `parent_class`.
fn enclosing_container<'a>(node: Node<'a>) -> Option<(&'static str, Node<'a>)> {
    let mut current = node.parent();
    while let Some(n) = current {
        match n.kind() {
            "class_definition" => return Some(("class_definition", n)),
            "function_definition" => return Some(("function_definition", n)),
            _ => current = n.parent(),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{parse_with_timeout, ParseOutcome};

    fn definitions_for(source: &str) -> Vec<SymbolDefinition> {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py").to_string_lossy().to_string();
        let ParseOutcome::Ok(tree) = parse_with_timeout(source.as_bytes().to_vec()) else {
            panic!("expected clean parse");
        };
        let ctx = AnalysisContext {
            file: &file,
            project_root: dir.path(),
            source: source.as_bytes(),
        };
        extract_definitions(tree.root_node(), &ctx)
    }

    #[test]
    fn classifies_method_vs_function() {
        let defs = definitions_for("def free():\n    pass\n\nclass Foo:\n    def method(self):\n        pass\n");
        let free = defs.iter().find(|d| d.name == "free").unwrap();
        let method = defs.iter().find(|d| d.name == "method").unwrap();
        assert_eq!(free.kind, SymbolKind::Function);
        assert_eq!(method.kind, SymbolKind::Method);
        assert_eq!(method.parent_class.as_deref(), Some("Foo"));
    }

    #[test]
    fn extracts_docstring_and_bases() {
        let defs = definitions_for("class Foo(Base):\n    \"\"\"doc\"\"\"\n    pass\n");
        let foo = &defs[0];
        assert_eq!(foo.docstring.as_deref(), Some("doc"));
        assert_eq!(foo.bases, vec!["Base".to_string()]);
    }
}
