//! §4.4 step 1: reading a file under the analyzer's size/line guards, with
//! a lossy-decode fallback instead of a hard failure on invalid UTF-8.

use std::path::Path;

use ctxgraph_core::{CtxGraphError, Result};

pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_LINES: usize = 10_000;

pub struct ReadResult {
    pub content: String,
    pub lossy: bool,
}

/// Reads `path`, rejecting files over the size/line hard limits and falling
/// back to a lossy decode (and a caller-visible flag) on invalid UTF-8
/// rather than failing outright.
pub fn read_source_file(path: &Path) -> Result<ReadResult> {
    let metadata = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
    if metadata.len() > MAX_FILE_BYTES {
        return Err(CtxGraphError::FileTooLarge {
            path: path.display().to_string(),
            size: metadata.len(),
        });
    }

    let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
    let (content, lossy) = match String::from_utf8(bytes) {
        Ok(s) => (s, false),
        Err(e) => (String::from_utf8_lossy(e.as_bytes()).into_owned(), true),
    };

    if lossy {
        tracing::warn!(file = %path.display(), "file is not valid UTF-8, decoded lossily");
    }

    let line_count = content.lines().count();
    if line_count > MAX_LINES {
        return Err(CtxGraphError::LineCountExceeded {
            path: path.display().to_string(),
            lines: line_count,
        });
    }

    Ok(ReadResult { content, lossy })
}

fn io_error(path: &Path, e: std::io::Error) -> CtxGraphError {
    match e.kind() {
        std::io::ErrorKind::NotFound => CtxGraphError::FileNotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            CtxGraphError::PermissionDenied(path.display().to_string())
        }
        _ => CtxGraphError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_file() {
        let result = read_source_file(Path::new("/nonexistent/path.py"));
        assert!(matches!(result, Err(CtxGraphError::FileNotFound(_))));
    }

    #[test]
    fn reads_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "import os\n").unwrap();
        let result = read_source_file(&file).unwrap();
        assert_eq!(result.content, "import os\n");
        assert!(!result.lossy);
    }

    #[test]
    fn falls_back_to_lossy_decode_on_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, [b'x', b'=', 0xff, 0xfe]).unwrap();
        let result = read_source_file(&file).unwrap();
        assert!(result.lossy);
    }
}
