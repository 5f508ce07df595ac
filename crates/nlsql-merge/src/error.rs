use thiserror::Error;

/// Failures raised while resolving a list-merge strategy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("unknown list merge strategy {0:?}")]
    UnknownStrategy(String),

    #[error("by_id list merge requires an id_key")]
    MissingIdKey,

    #[error("by_id list merge requires object items, found {0}")]
    NonObjectItem(&'static str),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
