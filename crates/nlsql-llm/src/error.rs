use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM response did not match the requested schema: {0}")]
    SchemaMismatch(serde_json::Error),

    #[error("LLM call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("LLM provider returned an empty completion")]
    EmptyCompletion,
}

pub type Result<T> = std::result::Result<T, Error>;
