use std::collections::{HashMap, HashSet};

use ctxgraph_core::{is_sentinel, FileMetadata, Relationship, Result};
use serde::{Deserialize, Serialize};

/// The central data structure: an in-memory store of [`Relationship`]s with
/// bidirectional indexes, deduplication, and pending-relationship storage
/// for the staleness resolver's rollback support.
///
/// Ownership: the graph exclusively owns its indexes. Relationships are
/// value-copied in and out; callers never hold a reference across a
/// mutating call.
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    forward: HashMap<String, Vec<Relationship>>,
    reverse: HashMap<String, Vec<Relationship>>,
    metadata: HashMap<String, FileMetadata>,
    pending: HashMap<String, Vec<Relationship>>,
}

/// A structural dump of the graph, suitable for external inspection.
/// `export` then reconstructing via `RelationshipGraph::import` is the
/// identity round-trip required by the testable properties (§8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub relationships: Vec<Relationship>,
    pub metadata: Vec<FileMetadata>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `r` into both indexes unless an equal relationship already
    /// exists under `r.source_file` (full required+optional field
    /// comparison). Returns `true` if inserted, `false` if it was a no-op.
    pub fn add(&mut self, r: Relationship) -> Result<bool> {
        let bucket = self.forward.entry(r.source_file.clone()).or_default();
        if bucket.iter().any(|existing| existing == &r) {
            return Ok(false);
        }
        bucket.push(r.clone());
        self.reverse
            .entry(r.target_file.clone())
            .or_default()
            .push(r.clone());

        let meta = self
            .metadata
            .entry(r.source_file.clone())
            .or_insert_with(|| FileMetadata::new(r.source_file.clone(), 0.0));
        meta.relationship_count = self
            .forward
            .get(&r.source_file)
            .map(|v| v.len())
            .unwrap_or(0);
        Ok(true)
    }

    /// Drops every relationship where `file` is either the source or the
    /// target side. Used by the analyzer before re-storing a file's
    /// relationships.
    pub fn remove_all_for(&mut self, file: &str) {
        self.remove_outgoing(file);
        if let Some(incoming) = self.reverse.remove(file) {
            for r in incoming {
                if let Some(bucket) = self.forward.get_mut(&r.source_file) {
                    bucket.retain(|existing| existing != &r);
                }
            }
        }
    }

    /// Drops only the forward set for `file`; incoming references are left
    /// intact.
    pub fn remove_outgoing(&mut self, file: &str) {
        if let Some(outgoing) = self.forward.remove(file) {
            for r in outgoing {
                if let Some(bucket) = self.reverse.get_mut(&r.target_file) {
                    bucket.retain(|existing| existing != &r);
                }
            }
        }
        if let Some(meta) = self.metadata.get_mut(file) {
            meta.relationship_count = 0;
        }
    }

    pub fn dependencies(&self, file: &str) -> Vec<Relationship> {
        self.forward.get(file).cloned().unwrap_or_default()
    }

    pub fn dependents(&self, file: &str) -> Vec<Relationship> {
        self.reverse.get(file).cloned().unwrap_or_default()
    }

    /// Depth-first traversal over a caller-supplied snapshot (see
    /// [`RelationshipGraph::snapshot`]). Cycles terminate via a visited
    /// set; sentinel targets are skipped (never traversed further).
    pub fn transitive_dependencies(
        &self,
        file: &str,
        snapshot: &HashMap<String, HashSet<String>>,
    ) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut stack = vec![file.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(deps) = snapshot.get(&current) {
                for dep in deps {
                    if is_sentinel(dep) {
                        continue;
                    }
                    if visited.insert(dep.clone()) {
                        stack.push(dep.clone());
                    }
                }
            }
        }
        visited
    }

    /// A deep copy of the forward index, reduced to path adjacency only
    /// (sufficient for the staleness resolver's reachability walk).
    pub fn snapshot(&self) -> HashMap<String, HashSet<String>> {
        self.forward
            .iter()
            .map(|(file, rels)| {
                (
                    file.clone(),
                    rels.iter().map(|r| r.target_file.clone()).collect(),
                )
            })
            .collect()
    }

    /// Snapshots `file`'s current outgoing relationships into the pending
    /// store, removes them from the live indexes, and marks the file
    /// pending. Returns the stored relationships.
    pub fn store_pending(&mut self, file: &str) -> Vec<Relationship> {
        let stored = self.dependencies(file);
        self.remove_outgoing(file);
        self.pending.insert(file.to_string(), stored.clone());
        self.mark_pending(file);
        stored
    }

    /// Restores `file`'s relationships from the pending store verbatim.
    /// Does not clear the pending flag — callers call [`clear_pending`]
    /// explicitly once restoration (or re-analysis) is complete.
    pub fn restore_pending(&mut self, file: &str) -> Result<()> {
        if let Some(stored) = self.pending.remove(file) {
            for r in stored {
                self.add(r)?;
            }
        }
        Ok(())
    }

    pub fn has_pending(&self, file: &str) -> bool {
        self.metadata
            .get(file)
            .map(|m| m.pending_relationships)
            .unwrap_or(false)
    }

    pub fn mark_pending(&mut self, file: &str) {
        let meta = self
            .metadata
            .entry(file.to_string())
            .or_insert_with(|| FileMetadata::new(file.to_string(), 0.0));
        meta.pending_relationships = true;
    }

    pub fn clear_pending(&mut self, file: &str) {
        if let Some(meta) = self.metadata.get_mut(file) {
            meta.pending_relationships = false;
        }
        self.pending.remove(file);
    }

    pub fn files_with_pending(&self) -> Vec<String> {
        self.metadata
            .iter()
            .filter(|(_, m)| m.pending_relationships)
            .map(|(f, _)| f.clone())
            .collect()
    }

    pub fn set_metadata(&mut self, file: &str, meta: FileMetadata) {
        self.metadata.insert(file.to_string(), meta);
    }

    pub fn get_metadata(&self, file: &str) -> Option<FileMetadata> {
        self.metadata.get(file).cloned()
    }

    pub fn export(&self) -> GraphExport {
        let mut relationships: Vec<Relationship> =
            self.forward.values().flatten().cloned().collect();
        relationships.sort_by(|a, b| {
            (a.source_file.as_str(), a.line_number)
                .cmp(&(b.source_file.as_str(), b.line_number))
        });
        let mut metadata: Vec<FileMetadata> = self.metadata.values().cloned().collect();
        metadata.sort_by(|a, b| a.filepath.cmp(&b.filepath));
        GraphExport {
            relationships,
            metadata,
        }
    }

    pub fn import(export: GraphExport) -> Result<Self> {
        let mut graph = Self::new();
        for r in export.relationships {
            graph.add(r)?;
        }
        for m in export.metadata {
            let filepath = m.filepath.clone();
            graph.set_metadata(&filepath, m);
        }
        Ok(graph)
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxgraph_core::RelationshipType;

    fn rel(src: &str, dst: &str, line: u32) -> Relationship {
        Relationship::new(src, dst, RelationshipType::Import, line).unwrap()
    }

    #[test]
    fn add_is_bidirectionally_consistent() {
        let mut g = RelationshipGraph::new();
        g.add(rel("a.py", "b.py", 1)).unwrap();
        assert_eq!(g.dependencies("a.py").len(), 1);
        assert_eq!(g.dependents("b.py").len(), 1);
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut g = RelationshipGraph::new();
        assert!(g.add(rel("a.py", "b.py", 1)).unwrap());
        assert!(!g.add(rel("a.py", "b.py", 1)).unwrap());
        assert_eq!(g.dependencies("a.py").len(), 1);
    }

    #[test]
    fn relationship_count_matches_forward_set_size() {
        let mut g = RelationshipGraph::new();
        g.add(rel("a.py", "b.py", 1)).unwrap();
        g.add(rel("a.py", "c.py", 2)).unwrap();
        assert_eq!(g.get_metadata("a.py").unwrap().relationship_count, 2);
    }

    #[test]
    fn remove_all_for_drops_both_sides() {
        let mut g = RelationshipGraph::new();
        g.add(rel("a.py", "b.py", 1)).unwrap();
        g.remove_all_for("b.py");
        assert!(g.dependencies("a.py").is_empty());
        assert!(g.dependents("b.py").is_empty());
    }

    #[test]
    fn remove_outgoing_preserves_incoming() {
        let mut g = RelationshipGraph::new();
        g.add(rel("a.py", "b.py", 1)).unwrap();
        g.add(rel("c.py", "a.py", 1)).unwrap();
        g.remove_outgoing("a.py");
        assert!(g.dependencies("a.py").is_empty());
        assert_eq!(g.dependents("a.py").len(), 1);
    }

    #[test]
    fn self_dependency_is_indexed() {
        let mut g = RelationshipGraph::new();
        g.add(rel("a.py", "a.py", 1)).unwrap();
        assert_eq!(g.dependencies("a.py").len(), 1);
        assert_eq!(g.dependents("a.py").len(), 1);
    }

    #[test]
    fn transitive_dependencies_stop_at_sentinels_and_cycles() {
        let mut g = RelationshipGraph::new();
        g.add(rel("a.py", "b.py", 1)).unwrap();
        g.add(rel("b.py", "a.py", 1)).unwrap();
        g.add(Relationship::new("b.py", "<stdlib:os>", RelationshipType::Import, 2).unwrap())
            .unwrap();
        let snap = g.snapshot();
        let deps = g.transitive_dependencies("a.py", &snap);
        assert!(deps.contains("b.py"));
        assert!(!deps.contains("<stdlib:os>"));
    }

    #[test]
    fn store_and_restore_pending_round_trips() {
        let mut g = RelationshipGraph::new();
        g.add(rel("a.py", "b.py", 1)).unwrap();
        let before = g.export();
        g.store_pending("a.py");
        assert!(g.dependencies("a.py").is_empty());
        assert!(g.has_pending("a.py"));
        g.restore_pending("a.py").unwrap();
        g.clear_pending("a.py");
        let after = g.export();
        assert_eq!(before.relationships, after.relationships);
        assert!(!g.has_pending("a.py"));
    }

    #[test]
    fn export_import_round_trips() {
        let mut g = RelationshipGraph::new();
        g.add(rel("a.py", "b.py", 1)).unwrap();
        g.add(rel("a.py", "c.py", 2)).unwrap();
        let exported = g.export();
        let reimported = RelationshipGraph::import(exported.clone()).unwrap();
        assert_eq!(reimported.export().relationships, exported.relationships);
    }
}
