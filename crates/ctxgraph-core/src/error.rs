use thiserror::Error;

/// Error kinds surfaced by the cross-file context engine.
///
/// Per the error handling design: `InvalidInput` and IO errors for the
/// specific requested path are the only variants that should ever reach a
/// caller as a hard failure. `ParseFailed`, `DetectorFailed`, `FileTooLarge`,
/// `LineCountExceeded`, and `BrokenReference` are logged/recorded as
/// warnings by the components that produce them and are not meant to abort
/// the calling operation.
#[derive(Error, Debug)]
pub enum CtxGraphError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("file too large: {path} ({size} bytes)")]
    FileTooLarge { path: String, size: u64 },

    #[error("line count exceeded: {path} ({lines} lines)")]
    LineCountExceeded { path: String, lines: usize },

    #[error("parse failed for {file}:{line}: {message}")]
    ParseFailed {
        file: String,
        line: u32,
        message: String,
    },

    #[error("detector '{detector}' failed on {file}: {message}")]
    DetectorFailed {
        detector: String,
        file: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("broken reference: {0}")]
    BrokenReference(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, CtxGraphError>;
