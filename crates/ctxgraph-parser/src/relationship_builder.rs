//! Phase 2 of two-phase analysis (§4.5): joins per-file symbol data across
//! files to emit relationships whose `target_line` points at the actual
//! definition, something a single-file pass can't know.

use std::collections::HashMap;

use ctxgraph_core::{
    is_sentinel, sentinel, FileSymbolData, ReferenceKind, Relationship, RelationshipType,
    SentinelKind, SymbolDefinition,
};

/// Holds every file's `FileSymbolData` plus a reverse index from symbol
/// name to every `(filepath, definition)` pair with that name, so a
/// reference in one file can be matched against a definition in another.
#[derive(Default)]
pub struct RelationshipBuilder {
    files: HashMap<String, FileSymbolData>,
    by_name: HashMap<String, Vec<(String, SymbolDefinition)>>,
}

impl RelationshipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, data: FileSymbolData) {
        self.remove_file(&data.filepath);
        for def in &data.definitions {
            self.by_name
                .entry(def.name.clone())
                .or_default()
                .push((data.filepath.clone(), def.clone()));
        }
        self.files.insert(data.filepath.clone(), data);
    }

    pub fn remove_file(&mut self, file: &str) {
        if self.files.remove(file).is_none() {
            return;
        }
        for defs in self.by_name.values_mut() {
            defs.retain(|(filepath, _)| filepath != file);
        }
        self.by_name.retain(|_, defs| !defs.is_empty());
    }

    pub fn has_file(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }

    /// Resolution precedence: exact `(name, filepath)` match; else the
    /// unique definition for `name` across all known files; else `None`.
    fn lookup(&self, name: &str, filepath: Option<&str>) -> Option<u32> {
        if let Some(filepath) = filepath {
            if is_sentinel(filepath) {
                return None;
            }
            if let Some(defs) = self.by_name.get(name) {
                if let Some((_, def)) = defs.iter().find(|(f, _)| f == filepath) {
                    return Some(def.line_start);
                }
            }
            return None;
        }
        match self.by_name.get(name) {
            Some(defs) if defs.len() == 1 => Some(defs[0].1.line_start),
            _ => None,
        }
    }

    /// Emits one relationship per reference in `file`'s symbol data.
    pub fn build_for(&self, file: &str) -> Vec<Relationship> {
        let Some(data) = self.files.get(file) else {
            return Vec::new();
        };

        data.references
            .iter()
            .filter_map(|reference| {
                let target_file = reference
                    .resolved_module
                    .clone()
                    .unwrap_or_else(|| sentinel(SentinelKind::Unresolved, &reference.name));

                let relationship_type = match reference.kind {
                    ReferenceKind::Import => RelationshipType::Import,
                    ReferenceKind::FunctionCall => RelationshipType::FunctionCall,
                    ReferenceKind::ClassReference => RelationshipType::ClassInheritance,
                };

                let mut rel = Relationship::new(
                    file,
                    target_file.clone(),
                    relationship_type,
                    reference.line_number,
                )
                .ok()?;

                if let Some(symbol) = &reference.resolved_symbol {
                    rel = rel.with_target_symbol(symbol.clone());
                    let line = self
                        .lookup(symbol, Some(&target_file))
                        .or_else(|| self.lookup(symbol, None));
                    if let Some(line) = line {
                        rel = rel.with_target_line(line);
                    }
                }
                if reference.is_wildcard {
                    rel = rel.with_metadata("wildcard", "true");
                }
                if reference.is_conditional {
                    rel = rel.with_metadata("conditional", "true");
                }
                if reference.is_method_call {
                    rel = rel.with_metadata("is_method_call", "true");
                }
                if let Some(module) = &reference.module_name {
                    rel = rel.with_metadata("module", module.clone());
                }
                Some(rel)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxgraph_core::{ReferenceKind, SymbolDefinition, SymbolKind, SymbolReference};

    #[test]
    fn resolves_target_line_across_files() {
        let mut builder = RelationshipBuilder::new();

        let mut util_data = FileSymbolData::new("util.py");
        util_data
            .definitions
            .push(SymbolDefinition::new("helper", SymbolKind::Function, 10, 12));
        builder.add_file(util_data);

        let mut main_data = FileSymbolData::new("main.py");
        let mut reference = SymbolReference::new("helper", ReferenceKind::FunctionCall, 3);
        reference.resolved_module = Some("util.py".to_string());
        reference.resolved_symbol = Some("helper".to_string());
        main_data.references.push(reference);
        builder.add_file(main_data);

        let rels = builder.build_for("main.py");
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target_line, Some(10));
    }

    #[test]
    fn remove_file_drops_its_definitions_from_the_index() {
        let mut builder = RelationshipBuilder::new();
        let mut data = FileSymbolData::new("a.py");
        data.definitions
            .push(SymbolDefinition::new("X", SymbolKind::Class, 1, 5));
        builder.add_file(data);
        builder.remove_file("a.py");
        assert!(!builder.has_file("a.py"));
        assert_eq!(builder.lookup("X", None), None);
    }

    #[test]
    fn sentinel_target_never_gets_a_line() {
        let mut builder = RelationshipBuilder::new();
        let mut data = FileSymbolData::new("a.py");
        let mut reference = SymbolReference::new("os", ReferenceKind::Import, 1);
        reference.resolved_module = Some("<stdlib:os>".to_string());
        reference.resolved_symbol = Some("os".to_string());
        data.references.push(reference);
        builder.add_file(data);

        let rels = builder.build_for("a.py");
        assert_eq!(rels[0].target_line, None);
    }
}
