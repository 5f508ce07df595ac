//! Domain model shared by every crate in the workspace: identifiers,
//! sessions, requests, queries and the top-level error taxonomy.

pub mod error;
pub mod ids;
pub mod query;
pub mod request;
pub mod session;

pub use error::{Error, Result};
pub use ids::{QueryId, RequestId, SessionId, TaskId};
pub use query::{ColumnDescriptor, CreateQueryFields, Query, QueryMetadata, SortOrder, View};
pub use request::{
    AddLinkedRequest, AddRequest, DbType, FlowType, IntentAnalysis, InteractiveRequestType,
    ModelType, Request, RequestStatus, StructuredResponse, UpdateRequestFields, WorkerRequest,
};
pub use session::{SelectionRefs, Session};
