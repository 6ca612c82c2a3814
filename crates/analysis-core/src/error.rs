use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Insufficient sample: {0}")]
    InsufficientSample(String),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
