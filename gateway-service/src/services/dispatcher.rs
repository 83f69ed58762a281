//! Background task dispatcher.
//!
//! Polls the queue for due actions and routes each one to its owner:
//! scheduler page and action hooks by name suffix, status checks to the
//! checker. One action per tick; failures mark the action failed and
//! never take the loop down.

use serde::Deserialize;
use serde_json::Value;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::orchestrator::Orchestrator;
use super::queue::{QueuedAction, TaskQueue};
use super::scheduler::SchedulerSet;
use super::status_checker::{StatusChecker, STATUS_CHECK_HOOK};

#[derive(Deserialize)]
struct PageArgs {
    page: u64,
}

#[derive(Deserialize)]
struct RecordArgs {
    record_id: Uuid,
}

#[derive(Deserialize)]
struct StatusCheckArgs {
    payment_id: Uuid,
    attempt: u32,
}

pub struct TaskDispatcher {
    queue: Arc<dyn TaskQueue>,
    schedulers: Arc<SchedulerSet>,
    checker: Arc<StatusChecker>,
    orchestrator: Arc<Orchestrator>,
}

impl TaskDispatcher {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        schedulers: Arc<SchedulerSet>,
        checker: Arc<StatusChecker>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            queue,
            schedulers,
            checker,
            orchestrator,
        }
    }

    /// Poll-and-dispatch loop. Sleeps `poll_interval` when the queue has
    /// nothing due.
    pub async fn run(&self, poll_interval: Duration) {
        tracing::info!(poll_ms = poll_interval.as_millis() as u64, "Task dispatcher running");
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(poll_interval).await,
                Err(err) => {
                    tracing::error!(error = %err, "Dispatcher tick failed");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    /// Claim and run at most one due action. Returns whether one ran.
    pub async fn tick(&self) -> Result<bool, AppError> {
        let Some(action) = self.queue.claim_due().await? else {
            return Ok(false);
        };

        let action_id = action.id;
        let hook = action.hook.clone();
        match self.dispatch(action).await {
            Ok(()) => {
                self.queue.complete(action_id).await?;
                tracing::debug!(action_id = %action_id, hook = %hook, "Action complete");
            }
            Err(err) => {
                tracing::error!(action_id = %action_id, hook = %hook, error = %err, "Action failed");
                self.queue.fail(action_id).await?;
            }
        }
        Ok(true)
    }

    async fn dispatch(&self, action: QueuedAction) -> Result<(), AppError> {
        if action.hook == STATUS_CHECK_HOOK {
            let args: StatusCheckArgs = parse_args(action.args)?;
            return self
                .checker
                .process(&self.orchestrator, args.payment_id, args.attempt)
                .await;
        }

        if let Some(scheduler) = self.schedulers.for_page_hook(&action.hook) {
            let args: PageArgs = parse_args(action.args)?;
            scheduler.schedule_actions(args.page).await?;
            return Ok(());
        }

        if let Some(scheduler) = self.schedulers.for_action_hook(&action.hook) {
            let args: RecordArgs = parse_args(action.args)?;
            return scheduler.process_action(args.record_id).await;
        }

        Err(AppError::InternalError(anyhow::anyhow!(
            "no handler for hook {}",
            action.hook
        )))
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, AppError> {
    serde_json::from_value(args)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("malformed action args: {}", e)))
}
