pub mod config;
pub mod error;
pub mod sentinel;
pub mod traits;
pub mod types;
pub mod warnings;

pub use config::Config;
pub use error::{CtxGraphError, Result};
pub use sentinel::{is_sentinel, parse_sentinel, sentinel, SentinelKind};
pub use traits::{Clock, InvalidationCallback, SystemClock};
pub use types::{
    FileMetadata, FileSymbolData, ReferenceKind, Relationship, RelationshipType, SymbolDefinition,
    SymbolKind, SymbolReference,
};
pub use warnings::{Severity, Warning, WarningKind};
