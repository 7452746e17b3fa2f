use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The classifier artifact failed to load at startup.
    #[error("prediction model is not loaded")]
    ModelUnavailable,

    #[error("invalid model artifact: {0}")]
    InvalidModel(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("store operation failed: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("invalid report payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
