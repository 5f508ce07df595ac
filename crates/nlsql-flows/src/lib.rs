//! Flow state machines: the async functions that turn a dequeued
//! `WorkerRequest` into a finished one. Each flow only ever reads and
//! mutates the `WorkerRequest` it's handed; persisting the result onto the
//! `Request` row, and dispatching any follow-up task, is `FlowRunner`'s
//! job (see `runner`), mirroring the separation between flow logic and
//! worker glue this crate is modeled on.

pub mod error;
mod context;
mod data_only;
mod flex;
mod interactive;
mod langgraph;
mod multistep;
mod runner;
mod simple;
mod validate;

use std::sync::Arc;

use async_trait::async_trait;
use nlsql_llm::LLMClient;
use nlsql_packs::PromptAssembler;
use nlsql_store::RequestStore;
use nlsql_warehouse::WarehouseClient;

pub use error::{Error, Result};
pub use runner::FlowRunner;

/// Out-of-scope collaborator for chart rendering (spec explicitly treats
/// this as an opaque external service): given embedded chart code, returns
/// a URL the flow can reference.
#[async_trait]
pub trait ChartService: Send + Sync {
    async fn render(&self, code: &str) -> std::result::Result<String, String>;
}

/// A `ChartService` that always fails; charts are then simply omitted,
/// which every flow's chart handling treats as non-fatal.
pub struct NullChartService;

#[async_trait]
impl ChartService for NullChartService {
    async fn render(&self, _code: &str) -> std::result::Result<String, String> {
        Err("chart rendering is not configured".to_string())
    }
}

/// The shared collaborators every flow is handed: persistence, the LLM,
/// the warehouse, the prompt assembler for the active pack, and the chart
/// renderer. Constructed once per process and cloned (cheaply, via `Arc`)
/// into each `FlowRunner`.
#[derive(Clone)]
pub struct FlowContext {
    pub store: Arc<dyn RequestStore>,
    pub llm: Arc<dyn LLMClient>,
    pub warehouse: Arc<dyn WarehouseClient>,
    pub assembler: Arc<PromptAssembler>,
    pub chart: Arc<dyn ChartService>,
    pub max_steps: u32,
}

/// One flow: a finite async state machine over the collaborators in
/// `FlowContext`. Implementations never return an `Err` — failures are
/// folded into the returned request's `status`/`err` fields, since a
/// flow's failure is a valid terminal outcome for the request it's
/// processing, not a defect in the flow itself.
#[async_trait]
pub trait Flow: Send + Sync {
    async fn run(&self, request: nlsql_model::WorkerRequest, ctx: &FlowContext) -> nlsql_model::WorkerRequest;
}

pub use data_only::DataOnlyFlow;
pub use flex::FlexFlow;
pub use interactive::InteractiveFlow;
pub use langgraph::LangGraphFlow;
pub use multistep::MultistepFlow;
pub use simple::SimpleFlow;
