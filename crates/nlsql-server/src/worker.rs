//! Spawns `worker_concurrency` copies of `FlowRunner::serve` as background
//! tasks, each blocking on the broker's `wrk_add_request` queue.

use std::sync::Arc;

use nlsql_flows::FlowContext;
use tokio::task::JoinHandle;

use crate::state::ADD_REQUEST_TASK;

pub fn spawn(ctx: FlowContext, broker: Arc<dyn nlsql_broker::TaskBroker>, concurrency: u32) -> Vec<JoinHandle<()>> {
    (0..concurrency.max(1))
        .map(|worker_index| {
            let runner = nlsql_flows::FlowRunner::new(ctx.clone(), broker.clone(), ADD_REQUEST_TASK);
            tokio::spawn(async move {
                tracing::info!(worker_index, "flow worker starting");
                loop {
                    match runner.run_once().await {
                        Ok(()) => crate::metrics::record_flow_task(ADD_REQUEST_TASK, "ok"),
                        Err(err) => {
                            tracing::error!(worker_index, error = %err, "flow runner iteration failed");
                            crate::metrics::record_flow_task(ADD_REQUEST_TASK, "error");
                        }
                    }
                }
            })
        })
        .collect()
}
