//! Control handler for a running courier instance
//!
//! Implements [`CommandHandler`] over the engine's query surface so the
//! control socket can inspect the queue and drive passes.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use courier_control::{
    ControlError, QueueCommand, Request, RequestCommand, Response, SystemCommand,
    protocol::{QueuedTask, ResponseData, SystemStatus},
    server::CommandHandler,
};
use courier_reconcile::ReconcileQueryService;
use tracing::info;

/// Handler for control commands
pub struct CourierControlHandler {
    service: Arc<dyn ReconcileQueryService>,
    start_time: Instant,
}

impl CourierControlHandler {
    #[must_use]
    pub fn new(service: Arc<dyn ReconcileQueryService>) -> Self {
        Self {
            service,
            start_time: Instant::now(),
        }
    }

    fn handle_system_command(&self, command: &SystemCommand) -> Response {
        match command {
            SystemCommand::Ping => Response::ok(),
            SystemCommand::Status => Response::data(ResponseData::SystemStatus(SystemStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.start_time.elapsed().as_secs(),
                queue_size: self.service.queue_len(),
                scheduler: self.service.state(),
            })),
        }
    }

    async fn handle_queue_command(
        &self,
        command: QueueCommand,
    ) -> courier_control::Result<Response> {
        match command {
            QueueCommand::List => {
                let tasks = self
                    .service
                    .tasks()
                    .into_iter()
                    .map(QueuedTask::from)
                    .collect();
                Ok(Response::data(ResponseData::QueueList(tasks)))
            }

            QueueCommand::Stats => Ok(Response::data(ResponseData::QueueStats(
                self.service.queue_stats(),
            ))),

            QueueCommand::Remove { external_id } => {
                let message = if self.service.remove_task(&external_id).is_some() {
                    info!(%external_id, "Task removed via control socket");
                    format!("Stopped tracking {external_id}")
                } else {
                    format!("{external_id} is not queued")
                };
                Ok(Response::data(ResponseData::Message(message)))
            }

            QueueCommand::ProcessNow => {
                info!("Reconciliation pass requested via control socket");
                let outcome = self.service.trigger_now().await;
                Ok(Response::data(ResponseData::Pass(outcome)))
            }

            QueueCommand::Bootstrap => {
                let added = self
                    .service
                    .bootstrap()
                    .await
                    .map_err(|e| ControlError::ServerError(format!("Bootstrap failed: {e}")))?;
                Ok(Response::data(ResponseData::Bootstrapped(added)))
            }
        }
    }
}

#[async_trait]
impl CommandHandler for CourierControlHandler {
    async fn handle_request(&self, request: Request) -> courier_control::Result<Response> {
        match request.command {
            RequestCommand::System(command) => Ok(self.handle_system_command(&command)),
            RequestCommand::Queue(command) => self.handle_queue_command(command).await,
        }
    }
}
