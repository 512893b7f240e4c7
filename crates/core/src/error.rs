#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Malformed job body: {0}")]
    MalformedJob(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}
