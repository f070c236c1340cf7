pub mod analyzer;
pub mod ast;
pub mod detectors;
pub mod file_io;
pub mod import_parsing;
pub mod relationship_builder;
pub mod resolution;
pub mod symbol_cache;

pub use analyzer::{Analyzer, AnalyzerConfig};
pub use detectors::DetectorRegistry;
pub use relationship_builder::RelationshipBuilder;
pub use symbol_cache::SymbolDataCache;
