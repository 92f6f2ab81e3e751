use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum MillError {
    #[error("path escapes workspace: {path}")]
    PathEscape { path: String },
    #[error("file not found: {path}")]
    NotFound { path: String },
    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error("missing document content: {detail}")]
    MissingContent { detail: &'static str },
    #[error("unsafe action: {action}")]
    UnsafeAction { action: String },
    #[error("unsafe selector: {selector}")]
    UnsafeSelector { selector: String },
    #[error("operation timed out after {timeout_s}s")]
    Timeout { timeout_s: u64 },
    #[error("execution failed: {detail}")]
    ExecutionFailed { detail: String },
    #[error("export missing: engine produced no file at {path}")]
    ExportMissing { path: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> MillError {
    MillError::Io {
        path: path.display().to_string(),
        source,
    }
}
