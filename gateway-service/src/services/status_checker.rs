//! Scheduled status checks.
//!
//! Providers do not reliably push status changes, so every started payment
//! gets a ladder of delayed re-checks: 15 minutes, 30 minutes, 1 hour,
//! 1 day. A check on a payment that is already terminal is a no-op, and a
//! non-terminal payment re-schedules the next rung. The ladder ends after
//! the one-day check.

use mongodb::bson::DateTime;
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Payment;

use super::orchestrator::{Orchestrator, RunContext};
use super::queue::{ActionId, TaskQueue};

pub const STATUS_CHECK_HOOK: &str = "payment_status_check";

const QUEUE_GROUP: &str = "status_checker";

/// Delay before the given 1-based attempt, or `None` once the ladder is
/// exhausted.
fn delay_for(attempt: u32) -> Option<chrono::Duration> {
    match attempt {
        1 => Some(chrono::Duration::minutes(15)),
        2 => Some(chrono::Duration::minutes(30)),
        3 => Some(chrono::Duration::hours(1)),
        4 => Some(chrono::Duration::days(1)),
        _ => None,
    }
}

pub struct StatusChecker {
    queue: Arc<dyn TaskQueue>,
}

impl StatusChecker {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Kick off the check ladder for a payment. Terminal payments are
    /// skipped unless `force_retry` restarts the ladder anyway.
    pub async fn schedule_event(
        &self,
        payment: &Payment,
        force_retry: bool,
    ) -> Result<Option<ActionId>, AppError> {
        if payment.status.is_terminal() && !force_retry {
            tracing::debug!(
                payment_id = %payment.id,
                status = payment.status.as_str(),
                "Payment already terminal, no status check scheduled"
            );
            return Ok(None);
        }
        self.schedule_attempt(payment.id, 1, force_retry).await
    }

    /// Enqueue one rung of the ladder. A pending check for the same
    /// payment and attempt is not duplicated unless forced.
    pub async fn schedule_attempt(
        &self,
        payment_id: Uuid,
        attempt: u32,
        force: bool,
    ) -> Result<Option<ActionId>, AppError> {
        let Some(delay) = delay_for(attempt) else {
            tracing::debug!(payment_id = %payment_id, attempt = attempt, "Status check ladder exhausted");
            return Ok(None);
        };

        let args = json!({ "payment_id": payment_id, "attempt": attempt });
        if !force
            && self
                .queue
                .find_pending(STATUS_CHECK_HOOK, &args, QUEUE_GROUP)
                .await?
                .is_some()
        {
            return Ok(None);
        }

        let run_at = DateTime::from_chrono(chrono::Utc::now() + delay);
        let action_id = self
            .queue
            .enqueue(STATUS_CHECK_HOOK, args, QUEUE_GROUP, Some(run_at))
            .await?;
        tracing::info!(
            payment_id = %payment_id,
            attempt = attempt,
            action_id = %action_id,
            "Status check scheduled"
        );
        Ok(Some(action_id))
    }

    /// Run one rung: refresh the payment's status at the provider, then
    /// schedule the next rung if the payment is still undecided. A
    /// provider failure does not break the ladder.
    pub async fn process(
        &self,
        orchestrator: &Orchestrator,
        payment_id: Uuid,
        attempt: u32,
    ) -> Result<(), AppError> {
        let Some(payment) = orchestrator.store().get_payment(payment_id).await? else {
            tracing::warn!(payment_id = %payment_id, "Status check for unknown payment, dropping");
            return Ok(());
        };
        if payment.status.is_terminal() {
            return Ok(());
        }

        let (updated, _) = orchestrator
            .update_payment(payment_id, RunContext::Background, false)
            .await?;
        if updated.status.is_terminal() {
            return Ok(());
        }

        self.schedule_attempt(payment_id, attempt + 1, false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_finite_and_increasing() {
        let mut previous = chrono::Duration::zero();
        let mut attempt = 1;
        while let Some(delay) = delay_for(attempt) {
            assert!(delay > previous);
            previous = delay;
            attempt += 1;
        }
        assert_eq!(attempt, 5);
    }
}
