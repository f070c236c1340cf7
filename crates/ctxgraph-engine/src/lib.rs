//! Wires `ctxgraph-core`, `ctxgraph-graph`, `ctxgraph-parser`, and
//! `ctxgraph-cache` into the single external surface a host process embeds:
//! [`Engine`]. Grounded on the teacher's `codegraph-api::state::AppState` —
//! one `Arc`-shareable struct owning every subsystem, constructed once.

pub mod context;
pub mod engine;
pub mod logging;
pub mod two_phase_analyzer;

pub use context::AssembledContext;
pub use engine::{DirectoryAnalysisStats, Engine, ReadWithContextResult};
pub use logging::{LogCategory, LogSink};
pub use two_phase_analyzer::TwoPhaseAnalyzer;
