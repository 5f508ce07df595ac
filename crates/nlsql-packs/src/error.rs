use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no system pack found under {0}")]
    NoSystemPack(PathBuf),

    #[error("manifest validation failed: {0}")]
    PackValidation(String),

    #[error("slot {slot:?} not found in effective tree for pack {pack:?}")]
    SlotNotFound { pack: String, slot: String },

    #[error("overlay merge failed at {path:?}: {source}")]
    Overlay {
        path: String,
        #[source]
        source: nlsql_merge::ConfigError,
    },

    #[error("template render failed for slot {slot:?}: {source}")]
    Render {
        slot: String,
        #[source]
        source: tera::Error,
    },

    #[error("provider {provider:?} failed for slot {slot:?}: {message}")]
    ProviderFailed {
        provider: String,
        slot: String,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed YAML/JSON at {path:?}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yml::Error,
    },

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
