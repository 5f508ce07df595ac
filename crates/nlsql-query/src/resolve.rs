use nlsql_model::{QueryId, RequestId, SessionId, View};
use nlsql_store::RequestStore;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Which entity the id passed to `/data/{id}` actually named. A stored
/// `View` is only ever attached to a `Request` or a `Session`; a bare
/// `Query` row is immutable once created.
#[derive(Clone, Copy, Debug)]
pub enum SqlSource {
    Query(QueryId),
    Request(RequestId),
    Session(SessionId),
}

pub struct ResolvedSql {
    pub sql: String,
    pub view: Option<View>,
    pub source: SqlSource,
}

/// Resolves SQL for a `/data/{id}` lookup: a persisted `Query` row first,
/// then a `Request`'s linked query or inline SQL, then a `Session`'s
/// metadata. The first of these that exists and carries SQL wins.
pub async fn resolve_sql(store: &dyn RequestStore, id: Uuid) -> Result<ResolvedSql> {
    if let Ok(query) = store.get_query_by_id(QueryId::from_uuid(id)).await {
        return Ok(ResolvedSql {
            sql: query.sql,
            view: None,
            source: SqlSource::Query(query.query_id),
        });
    }

    if let Ok(request) = store.get_request_by_id(RequestId::from_uuid(id)).await {
        if let Some(query_id) = request.query_id {
            let query = store.get_query_by_id(query_id).await?;
            return Ok(ResolvedSql {
                sql: query.sql,
                view: request.view,
                source: SqlSource::Request(request.request_id),
            });
        }
        if let Some(sql) = request.sql {
            return Ok(ResolvedSql {
                sql,
                view: request.view,
                source: SqlSource::Request(request.request_id),
            });
        }
    }

    if let Ok(session) = store.get_session(SessionId::from_uuid(id)).await {
        if let Some(sql) = session.metadata.as_ref().and_then(|m| m.sql.clone()) {
            return Ok(ResolvedSql {
                sql,
                view: None,
                source: SqlSource::Session(session.id),
            });
        }
    }

    Err(Error::NoSqlResolved(QueryId::from_uuid(id)))
}
