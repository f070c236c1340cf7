use std::collections::{HashMap, HashSet};

use ctxgraph_core::is_sentinel;

use crate::graph::RelationshipGraph;

/// Ports the topological-sort staleness resolution algorithm: when a target
/// file is read, every stale file in its transitive dependency chain is
/// re-analyzed in dependency order, and files that merely depend on a stale
/// file have their relationships restored once the stale file settles.
///
/// Handles diamond dependency patterns (`A -> B, A -> C, B -> D, C -> D`),
/// transitive staleness, and partial staleness correctly by operating on a
/// snapshot of the dependency graph taken before any mutation.
pub struct StalenessResolver<'g> {
    graph: &'g mut RelationshipGraph,
}

impl<'g> StalenessResolver<'g> {
    pub fn new(graph: &'g mut RelationshipGraph) -> Self {
        Self { graph }
    }

    /// Resolves staleness for `target_file` and everything it transitively
    /// depends on. `needs_analysis` decides whether a given file is stale;
    /// `analyze_file` re-analyzes a stale file in place (it is expected to
    /// remove and re-add that file's relationships on the graph it's given).
    ///
    /// Returns `true` if every stale file analyzed successfully. Processing
    /// continues through failures so callers see the maximum recoverable
    /// state rather than stopping at the first error.
    pub fn resolve_staleness(
        &mut self,
        target_file: &str,
        needs_analysis: impl Fn(&str) -> bool,
        mut analyze_file: impl FnMut(&mut RelationshipGraph, &str) -> bool,
    ) -> bool {
        tracing::debug!(target_file, "starting staleness resolution");

        let dependency_graph = self.graph.snapshot();

        let stale_files = self.find_stale_files(target_file, &dependency_graph, &needs_analysis);
        if stale_files.is_empty() {
            tracing::debug!(target_file, "no stale files in dependency chain");
            return true;
        }
        tracing::debug!(count = stale_files.len(), "found stale files");

        let sorted_stale = self.topological_sort_restricted(&stale_files, &dependency_graph);

        self.remove_relationships_and_mark_pending(&sorted_stale);

        let files_to_process =
            self.files_to_process(target_file, &stale_files, &dependency_graph);

        self.process_files(&files_to_process, &stale_files, &mut analyze_file)
    }

    fn find_stale_files(
        &self,
        target_file: &str,
        dependency_graph: &HashMap<String, HashSet<String>>,
        needs_analysis: &impl Fn(&str) -> bool,
    ) -> HashSet<String> {
        let mut stale = HashSet::new();
        if needs_analysis(target_file) {
            stale.insert(target_file.to_string());
        }
        for dep in self.graph.transitive_dependencies(target_file, dependency_graph) {
            if is_sentinel(&dep) {
                continue;
            }
            if needs_analysis(&dep) {
                stale.insert(dep);
            }
        }
        stale
    }

    /// Kahn's algorithm restricted to `candidates`, using transitive
    /// reachability in `dependency_graph` to build in-candidate edges. The
    /// queue is sorted at each step for deterministic output order.
    fn topological_sort_restricted(
        &self,
        candidates: &HashSet<String>,
        dependency_graph: &HashMap<String, HashSet<String>>,
    ) -> Vec<String> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut deps: HashMap<String, HashSet<String>> = candidates
            .iter()
            .map(|f| (f.clone(), HashSet::new()))
            .collect();
        for file in candidates {
            for dep in self.graph.transitive_dependencies(file, dependency_graph) {
                if candidates.contains(&dep) {
                    deps.get_mut(file).unwrap().insert(dep);
                }
            }
        }

        let mut in_degree: HashMap<String, usize> =
            deps.iter().map(|(f, d)| (f.clone(), d.len())).collect();

        let mut queue: Vec<String> = candidates
            .iter()
            .filter(|f| in_degree[*f] == 0)
            .cloned()
            .collect();
        let mut result = Vec::new();
        let mut in_result: HashSet<String> = HashSet::new();

        while !queue.is_empty() {
            queue.sort();
            let current = queue.remove(0);
            in_result.insert(current.clone());
            result.push(current.clone());

            for file in candidates {
                if deps[file].contains(&current) {
                    let degree = in_degree.get_mut(file).unwrap();
                    *degree -= 1;
                    if *degree == 0 && !in_result.contains(file) && !queue.contains(file) {
                        queue.push(file.clone());
                    }
                }
            }
        }

        if result.len() != candidates.len() {
            let mut remaining: Vec<String> = candidates
                .iter()
                .filter(|f| !in_result.contains(*f))
                .cloned()
                .collect();
            tracing::warn!(?remaining, "cycle detected among stale files");
            remaining.sort();
            result.extend(remaining);
        }

        result
    }

    /// For each stale file, snapshot and clear its outgoing edges, then mark
    /// its direct dependents pending and snapshot theirs too (Issue #133
    /// fix: a dependent's edge into the stale file would otherwise be lost
    /// when the stale file's relationships are wiped during re-analysis).
    fn remove_relationships_and_mark_pending(&mut self, sorted_stale: &[String]) {
        for filepath in sorted_stale {
            let stored = self.graph.store_pending(filepath);

            let dependents: HashSet<String> = self
                .graph
                .dependents(filepath)
                .into_iter()
                .map(|r| r.source_file)
                .collect();

            for dependent in &dependents {
                if is_sentinel(dependent) {
                    continue;
                }
                if !self.graph.has_pending(dependent) {
                    self.graph.store_pending(dependent);
                } else {
                    self.graph.mark_pending(dependent);
                }
            }

            tracing::debug!(
                file = filepath.as_str(),
                removed = stored.len(),
                dependents = dependents.len(),
                "removed relationships and marked dependents pending"
            );
        }
    }

    fn files_to_process(
        &self,
        target_file: &str,
        stale_files: &HashSet<String>,
        dependency_graph: &HashMap<String, HashSet<String>>,
    ) -> Vec<String> {
        let pending: HashSet<String> = self.graph.files_with_pending().into_iter().collect();
        let all_to_process: HashSet<String> = stale_files.union(&pending).cloned().collect();

        let mut reachable = self.graph.transitive_dependencies(target_file, dependency_graph);
        reachable.insert(target_file.to_string());

        let restricted: HashSet<String> =
            all_to_process.intersection(&reachable).cloned().collect();

        self.topological_sort_restricted(&restricted, dependency_graph)
    }

    /// Stale files are re-analyzed; everything else in the processing list
    /// is a pending-only file whose relationships are restored verbatim.
    /// The pending flag is cleared for every processed file either way.
    fn process_files(
        &mut self,
        files_to_process: &[String],
        stale_files: &HashSet<String>,
        analyze_file: &mut impl FnMut(&mut RelationshipGraph, &str) -> bool,
    ) -> bool {
        let mut success = true;

        for filepath in files_to_process {
            if stale_files.contains(filepath) {
                tracing::debug!(file = filepath.as_str(), "re-analyzing stale file");
                if !analyze_file(self.graph, filepath) {
                    tracing::warn!(file = filepath.as_str(), "failed to analyze stale file");
                    success = false;
                }
            } else {
                tracing::debug!(file = filepath.as_str(), "restoring pending relationships");
                let _ = self.graph.restore_pending(filepath);
            }
            self.graph.clear_pending(filepath);
        }

        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxgraph_core::{Relationship, RelationshipType};
    use std::cell::RefCell;

    fn rel(src: &str, dst: &str) -> Relationship {
        Relationship::new(src, dst, RelationshipType::Import, 1).unwrap()
    }

    #[test]
    fn no_stale_files_is_a_noop() {
        let mut graph = RelationshipGraph::new();
        graph.add(rel("a.py", "b.py")).unwrap();
        let mut resolver = StalenessResolver::new(&mut graph);
        let ok = resolver.resolve_staleness("a.py", |_| false, |_, _| true);
        assert!(ok);
    }

    #[test]
    fn diamond_dependency_reanalyzes_stale_leaf_and_restores_others() {
        // A -> B, A -> C, B -> D, C -> D ; D is stale.
        let mut graph = RelationshipGraph::new();
        graph.add(rel("a.py", "b.py")).unwrap();
        graph.add(rel("a.py", "c.py")).unwrap();
        graph.add(rel("b.py", "d.py")).unwrap();
        graph.add(rel("c.py", "d.py")).unwrap();

        let analyzed = RefCell::new(Vec::new());
        let mut resolver = StalenessResolver::new(&mut graph);
        let ok = resolver.resolve_staleness(
            "a.py",
            |f| f == "d.py",
            |g, f| {
                analyzed.borrow_mut().push(f.to_string());
                g.remove_all_for(f);
                true
            },
        );
        assert!(ok);
        assert_eq!(analyzed.into_inner(), vec!["d.py".to_string()]);

        // b.py -> d.py and c.py -> d.py were restored since d.py's
        // re-analysis only removed its own edges (none were added back,
        // so the edges into d.py from b/c survive as pending-restored).
        assert!(!graph.has_pending("b.py"));
        assert!(!graph.has_pending("c.py"));
        assert!(!graph.has_pending("d.py"));
    }

    #[test]
    fn failed_analysis_is_reported_but_does_not_abort() {
        let mut graph = RelationshipGraph::new();
        graph.add(rel("a.py", "b.py")).unwrap();
        let mut resolver = StalenessResolver::new(&mut graph);
        let ok = resolver.resolve_staleness("a.py", |f| f == "b.py", |_, _| false);
        assert!(!ok);
        assert!(!graph.has_pending("a.py"));
    }
}
