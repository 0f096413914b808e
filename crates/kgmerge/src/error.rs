use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("schema probe error: {0}")]
    SchemaProbe(String),

    #[error("load error: {0}")]
    Load(String),

    #[error("aggregation error: {0}")]
    Aggregation(String),

    #[error("batch write error: {0}")]
    BatchWrite(String),

    #[error("report error: {0}")]
    Report(String),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;
