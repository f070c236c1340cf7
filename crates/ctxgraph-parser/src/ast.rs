//! AST construction with a wall-clock timeout, delegated to a one-shot
//! worker thread so the graph thread is never blocked past the deadline
//! (§5: "no operation on the graph or its indexes may suspend; only the
//! analyzer's read/parse may").

use std::time::Duration;

use crossbeam_channel::unbounded;

use tree_sitter::{Parser, Tree};

pub const PARSE_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_RECURSION_DEPTH: usize = 100;

#[derive(Debug)]
pub enum ParseOutcome {
    Ok(Tree),
    SyntaxError(Tree),
    Timeout,
}

fn python_language() -> tree_sitter::Language {
    tree_sitter::Language::from(tree_sitter_python::LANGUAGE)
}

/// Parses `source` on a dedicated worker thread and waits up to
/// [`PARSE_TIMEOUT`]. If the worker hasn't produced a tree in time, the
/// partial result is discarded (the thread is abandoned; it will finish on
/// its own and its result is dropped) and [`ParseOutcome::Timeout`] is
/// returned.
pub fn parse_with_timeout(source: Vec<u8>) -> ParseOutcome {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        let mut parser = Parser::new();
        if parser.set_language(&python_language()).is_err() {
            let _ = tx.send(None);
            return;
        }
        let tree = parser.parse(&source, None);
        let _ = tx.send(tree);
    });

    match rx.recv_timeout(PARSE_TIMEOUT) {
        Ok(Some(tree)) => {
            if tree.root_node().has_error() {
                ParseOutcome::SyntaxError(tree)
            } else {
                ParseOutcome::Ok(tree)
            }
        }
        Ok(None) => ParseOutcome::Timeout,
        Err(_) => ParseOutcome::Timeout,
    }
}

/// Depth-first walk with a hard recursion cap (§4.4 step 3). `visit` is
/// called once per node in pre-order; traversal below [`MAX_RECURSION_DEPTH`]
/// is silently truncated rather than overflowing the stack.
pub fn walk_capped<'a>(root: tree_sitter::Node<'a>, mut visit: impl FnMut(tree_sitter::Node<'a>)) {
    fn recurse<'a>(
        node: tree_sitter::Node<'a>,
        depth: usize,
        visit: &mut dyn FnMut(tree_sitter::Node<'a>),
    ) {
        visit(node);
        if depth >= MAX_RECURSION_DEPTH {
            return;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            recurse(child, depth + 1, visit);
        }
    }
    recurse(root, 0, &mut visit);
}
