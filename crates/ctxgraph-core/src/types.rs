use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{CtxGraphError, Result};
use crate::sentinel::is_sentinel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    Import,
    FunctionCall,
    ClassInheritance,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipType::Import => "import",
            RelationshipType::FunctionCall => "function_call",
            RelationshipType::ClassInheritance => "class_inheritance",
        };
        write!(f, "{}", s)
    }
}

/// An immutable, value-typed edge between two files.
///
/// Construct via [`Relationship::new`], which enforces the invariants in
/// the data model: non-empty paths, no parent-reference (`..`) segments in
/// real (non-sentinel) paths, and a positive `line_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_file: String,
    pub target_file: String,
    pub relationship_type: RelationshipType,
    pub line_number: u32,
    pub source_symbol: Option<String>,
    pub target_symbol: Option<String>,
    pub target_line: Option<u32>,
    pub metadata: HashMap<String, String>,
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(CtxGraphError::InvalidInput(
            "path must not be empty".to_string(),
        ));
    }
    if !is_sentinel(path) && path.split('/').any(|segment| segment == "..") {
        return Err(CtxGraphError::InvalidInput(format!(
            "path must not contain parent-reference segments: {path}"
        )));
    }
    Ok(())
}

impl Relationship {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_file: impl Into<String>,
        target_file: impl Into<String>,
        relationship_type: RelationshipType,
        line_number: u32,
    ) -> Result<Self> {
        let source_file = source_file.into();
        let target_file = target_file.into();
        validate_path(&source_file)?;
        validate_path(&target_file)?;
        if line_number == 0 {
            return Err(CtxGraphError::InvalidInput(
                "line_number must be positive".to_string(),
            ));
        }
        Ok(Self {
            source_file,
            target_file,
            relationship_type,
            line_number,
            source_symbol: None,
            target_symbol: None,
            target_line: None,
            metadata: HashMap::new(),
        })
    }

    pub fn with_source_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.source_symbol = Some(symbol.into());
        self
    }

    pub fn with_target_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.target_symbol = Some(symbol.into());
        self
    }

    pub fn with_target_line(mut self, line: u32) -> Self {
        self.target_line = Some(line);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDefinition {
    pub name: String,
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub decorators: Vec<String>,
    pub bases: Vec<String>,
    pub parent_class: Option<String>,
}

impl SymbolDefinition {
    pub fn new(name: impl Into<String>, kind: SymbolKind, line_start: u32, line_end: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            line_start,
            line_end: line_end.max(line_start),
            signature: None,
            docstring: None,
            decorators: Vec::new(),
            bases: Vec::new(),
            parent_class: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    Import,
    FunctionCall,
    ClassReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolReference {
    pub name: String,
    pub kind: ReferenceKind,
    pub line_number: u32,
    pub resolved_module: Option<String>,
    pub resolved_symbol: Option<String>,
    pub module_name: Option<String>,
    pub is_relative: bool,
    pub relative_level: u32,
    pub alias: Option<String>,
    pub is_wildcard: bool,
    pub is_conditional: bool,
    pub is_method_call: bool,
    pub caller_context: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl SymbolReference {
    pub fn new(name: impl Into<String>, kind: ReferenceKind, line_number: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            line_number,
            resolved_module: None,
            resolved_symbol: None,
            module_name: None,
            is_relative: false,
            relative_level: 0,
            alias: None,
            is_wildcard: false,
            is_conditional: false,
            is_method_call: false,
            caller_context: None,
            metadata: HashMap::new(),
        }
    }
}

/// Output of Phase 1 of analysis: per-file symbol data, before cross-file
/// resolution by the relationship builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSymbolData {
    pub filepath: String,
    pub definitions: Vec<SymbolDefinition>,
    pub references: Vec<SymbolReference>,
    pub parse_time_secs: f64,
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub has_dynamic_patterns: bool,
    pub dynamic_pattern_types: Vec<String>,
}

impl FileSymbolData {
    pub fn new(filepath: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            definitions: Vec::new(),
            references: Vec::new(),
            parse_time_secs: 0.0,
            is_valid: true,
            error_message: None,
            has_dynamic_patterns: false,
            dynamic_pattern_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filepath: String,
    pub last_analyzed: f64,
    pub relationship_count: usize,
    pub has_dynamic_patterns: bool,
    pub dynamic_pattern_types: Vec<String>,
    pub is_unparseable: bool,
    pub deleted: bool,
    pub deletion_time: Option<f64>,
    /// Outgoing relationships for this file are currently stored off to the
    /// side (by the staleness resolver) and must be restored or re-analyzed.
    pub pending_relationships: bool,
}

impl FileMetadata {
    pub fn new(filepath: impl Into<String>, last_analyzed: f64) -> Self {
        Self {
            filepath: filepath.into(),
            last_analyzed,
            relationship_count: 0,
            has_dynamic_patterns: false,
            dynamic_pattern_types: Vec::new(),
            is_unparseable: false,
            deleted: false,
            deletion_time: None,
            pending_relationships: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_paths() {
        assert!(Relationship::new("", "b.py", RelationshipType::Import, 1).is_err());
    }

    #[test]
    fn rejects_traversal_segments() {
        assert!(Relationship::new("a.py", "../b.py", RelationshipType::Import, 1).is_err());
    }

    #[test]
    fn rejects_nonpositive_line() {
        assert!(Relationship::new("a.py", "b.py", RelationshipType::Import, 0).is_err());
    }

    #[test]
    fn sentinel_targets_are_allowed() {
        let r = Relationship::new("a.py", "<stdlib:os>", RelationshipType::Import, 1);
        assert!(r.is_ok());
    }

    #[test]
    fn self_dependency_is_legal() {
        let r = Relationship::new("a.py", "a.py", RelationshipType::FunctionCall, 3);
        assert!(r.is_ok());
    }
}
