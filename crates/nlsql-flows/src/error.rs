use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Store(#[from] nlsql_store::Error),

    #[error(transparent)]
    Llm(#[from] nlsql_llm::Error),

    #[error(transparent)]
    Warehouse(#[from] nlsql_warehouse::Error),

    #[error(transparent)]
    Assembler(#[from] nlsql_packs::Error),

    #[error(transparent)]
    Broker(#[from] nlsql_broker::Error),

    #[error("structured response from the LLM did not match the expected shape: {0}")]
    MalformedStructuredResponse(String),

    #[error("unknown flow for (flow={flow:?}, model={model}, db={db})")]
    UnknownFlow {
        flow: nlsql_model::FlowType,
        model: String,
        db: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
