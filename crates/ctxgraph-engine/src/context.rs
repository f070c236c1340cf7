//! §6 `read_with_context`: assembling a textual context string out of a
//! file's dependencies and dependents, with resolved target lines, cached
//! snippets, and a soft token budget.

use ctxgraph_cache::WorkingMemoryCache;
use ctxgraph_core::{is_sentinel, Relationship};
use std::path::Path;

const SNIPPET_CONTEXT_LINES: u32 = 2;

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub budget_exceeded: bool,
    pub token_estimate: usize,
}

/// A crude but deterministic token estimate (whitespace-separated word
/// count). Good enough for a soft budget check; exact tokenizer behaviour
/// is the host agent's concern, not this engine's (§1 out of scope: the
/// wire-level request protocol).
fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

fn snippet_for(cache: &WorkingMemoryCache, target_file: &str, target_line: Option<u32>) -> Option<String> {
    if is_sentinel(target_file) {
        return None;
    }
    let path = Path::new(target_file);
    let line = target_line?;
    let start = line.saturating_sub(SNIPPET_CONTEXT_LINES).max(1);
    let end = line + SNIPPET_CONTEXT_LINES;
    cache.get(path, Some((start, end)), None).ok()
}

fn format_dependency(cache: &WorkingMemoryCache, r: &Relationship) -> String {
    let mut line = format!(
        "  -> {} [{}] (line {})",
        r.target_file, r.relationship_type, r.line_number
    );
    if let Some(symbol) = &r.target_symbol {
        line.push_str(&format!(" :: {symbol}"));
    }
    if let Some(target_line) = r.target_line {
        line.push_str(&format!(" @L{target_line}"));
    }
    if let Some(snippet) = snippet_for(cache, &r.target_file, r.target_line) {
        for snippet_line in snippet.lines() {
            line.push_str(&format!("\n       | {snippet_line}"));
        }
    }
    line
}

fn format_dependent(r: &Relationship) -> String {
    match &r.target_symbol {
        Some(symbol) => format!("  <- {} references {} (line {})", r.source_file, symbol, r.line_number),
        None => format!("  <- {} (line {})", r.source_file, r.line_number),
    }
}

/// Builds the context text for `path` from its pre-fetched dependencies and
/// dependents. Entries are sorted by file path for deterministic output.
/// The budget is advisory: everything is assembled in full, and
/// `budget_exceeded` simply records whether the token estimate came in over
/// `token_limit` — per §6, the context is never truncated aggressively.
pub fn assemble(
    cache: &WorkingMemoryCache,
    path: &str,
    mut dependencies: Vec<Relationship>,
    mut dependents: Vec<Relationship>,
    token_limit: usize,
) -> AssembledContext {
    dependencies.sort_by(|a, b| (a.target_file.as_str(), a.line_number).cmp(&(b.target_file.as_str(), b.line_number)));
    dependents.sort_by(|a, b| (a.source_file.as_str(), a.line_number).cmp(&(b.source_file.as_str(), b.line_number)));

    let mut text = format!("# context for {path}\n\n");

    text.push_str("## dependencies\n");
    if dependencies.is_empty() {
        text.push_str("  (none)\n");
    } else {
        for r in &dependencies {
            text.push_str(&format_dependency(cache, r));
            text.push('\n');
        }
    }

    text.push_str("\n## dependents\n");
    if dependents.is_empty() {
        text.push_str("  (none)\n");
    } else {
        for r in &dependents {
            text.push_str(&format_dependent(r));
            text.push('\n');
        }
    }

    let token_estimate = estimate_tokens(&text);
    AssembledContext {
        text,
        budget_exceeded: token_estimate > token_limit,
        token_estimate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxgraph_core::RelationshipType;

    #[test]
    fn empty_deps_and_dependents_render_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WorkingMemoryCache::new(1024);
        let ctx = assemble(&cache, "a.py", Vec::new(), Vec::new(), 500);
        assert!(ctx.text.contains("(none)"));
        assert!(!ctx.budget_exceeded);
        let _ = dir;
    }

    #[test]
    fn budget_flag_set_without_truncating() {
        let cache = WorkingMemoryCache::new(1024);
        let deps: Vec<Relationship> = (0..50)
            .map(|i| {
                Relationship::new("a.py", format!("<unresolved:mod{i}>"), RelationshipType::Import, 1)
                    .unwrap()
            })
            .collect();
        let ctx = assemble(&cache, "a.py", deps, Vec::new(), 10);
        assert!(ctx.budget_exceeded);
        assert!(ctx.text.contains("mod0"));
        assert!(ctx.text.contains("mod49"));
    }

    #[test]
    fn sentinel_targets_have_no_snippet() {
        let cache = WorkingMemoryCache::new(1024);
        let deps = vec![Relationship::new("a.py", "<stdlib:os>", RelationshipType::Import, 1).unwrap()];
        let ctx = assemble(&cache, "a.py", deps, Vec::new(), 500);
        assert!(ctx.text.contains("<stdlib:os>"));
        assert!(!ctx.text.contains("|"));
    }
}
