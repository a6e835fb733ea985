use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShareError {
    #[error("stage error: {0}")]
    Stage(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("storage error: {0}")]
    Storage(String),
}
