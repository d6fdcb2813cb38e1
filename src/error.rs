use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Bundled asset missing: {0}")]
    Asset(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AssembleError>;
