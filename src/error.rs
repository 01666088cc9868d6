use thiserror::Error;

/// Main error type for the feature extraction pipeline
#[derive(Error, Debug)]
pub enum SiftError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("degenerate input: {reason} (buffer length {len})")]
    DegenerateInput { reason: &'static str, len: usize },

    #[error("invalid chunk size {chunk_size} for an object of {object_len} byte(s)")]
    InvalidChunkSize { chunk_size: usize, object_len: usize },

    #[error("invalid train/test ratio {0}: must be strictly between 0 and 1")]
    InvalidRatio(f64),

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("corrupt feature data: {0}")]
    CorruptData(String),

    #[error("entry {hash} is missing feature {feature}")]
    MissingFeature { hash: String, feature: String },

    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("extraction task failed: {0}")]
    TaskFailure(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, SiftError>;
