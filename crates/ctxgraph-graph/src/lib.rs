pub mod file_watcher;
pub mod graph;
pub mod graph_updater;
pub mod staleness_resolver;

pub use file_watcher::{ChangeEvent, FileWatcher};
pub use graph::{GraphExport, RelationshipGraph};
pub use graph_updater::{FileAnalyzer, GraphUpdater, ProcessStats};
pub use staleness_resolver::StalenessResolver;
