//! Bulk action scheduler.
//!
//! Applies one action to every record matching a query, at scale, without
//! loading the full result set and without double-scheduling a record
//! whose action is still pending. Three fan-out levels, each a queued
//! action itself:
//!
//! 1. schedule_pages: learn the page count, enqueue one page task per
//!    page, last page first;
//! 2. schedule_actions: re-run the query for one page, enqueue one action
//!    per record on it;
//! 3. process_action: clear the record's marker, run the callback.
//!
//! Idempotency is structural, not retry-based: a per-record marker meta
//! key suppresses duplicate scheduling, and the enqueue wrapper skips
//! when an equivalent action is already in the queue. Re-running any
//! level after a crash is safe. Retries belong to the queue's
//! at-least-once delivery; callbacks must themselves be idempotent.

use async_trait::async_trait;
use serde_json::{json, Value};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::RecordQuery;

use super::metrics;
use super::queue::{ActionId, TaskQueue};
use super::store::RecordStore;

/// The callback a scheduler applies to each record.
#[async_trait]
pub trait RecordAction: Send + Sync {
    async fn run(&self, record_id: Uuid) -> Result<(), AppError>;
}

pub struct QueryActionsScheduler {
    name: String,
    query: RecordQuery,
    page_size: u64,
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn TaskQueue>,
    action: Arc<dyn RecordAction>,
}

impl QueryActionsScheduler {
    pub fn new(
        name: &str,
        query: RecordQuery,
        page_size: u64,
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn TaskQueue>,
        action: Arc<dyn RecordAction>,
    ) -> Self {
        Self {
            name: name.to_string(),
            query,
            page_size,
            store,
            queue,
            action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_hook(&self) -> String {
        format!("{}_schedule_page", self.name)
    }

    pub fn action_hook(&self) -> String {
        format!("{}_schedule_action", self.name)
    }

    /// Meta key recording the pending queue action for a record.
    fn marker_key(&self) -> String {
        format!("{}_action_id", self.name)
    }

    /// Level 1: enqueue one page task per result page, descending.
    pub async fn schedule_pages(&self) -> Result<Vec<ActionId>, AppError> {
        let first = self.store.query_ids(&self.query, 1, self.page_size).await?;

        let mut scheduled = Vec::new();
        for page in (1..=first.total_pages).rev() {
            if let Some(action_id) = self
                .enqueue_async_action(&self.page_hook(), json!({ "page": page }))
                .await?
            {
                scheduled.push(action_id);
            }
        }

        metrics::observe_scheduler(&self.name, "pages");
        tracing::info!(
            scheduler = %self.name,
            total_pages = first.total_pages,
            scheduled = scheduled.len(),
            "Page fan-out scheduled"
        );
        Ok(scheduled)
    }

    /// Level 2: re-run the query for one page and schedule each record.
    pub async fn schedule_actions(&self, page: u64) -> Result<Vec<ActionId>, AppError> {
        let ids = self
            .store
            .query_ids(&self.query, page, self.page_size)
            .await?
            .ids;

        let mut scheduled = Vec::new();
        for record_id in ids {
            if let Some(action_id) = self.schedule_action(record_id).await? {
                scheduled.push(action_id);
            }
        }

        tracing::debug!(
            scheduler = %self.name,
            page = page,
            scheduled = scheduled.len(),
            "Page records scheduled"
        );
        Ok(scheduled)
    }

    /// Schedule one record's action, gated by the idempotency marker.
    /// A record with a pending marker keeps its existing action id and
    /// gets no duplicate.
    pub async fn schedule_action(&self, record_id: Uuid) -> Result<Option<ActionId>, AppError> {
        let record_type = self.query.record_type();
        let marker_key = self.marker_key();

        if let Some(existing) = self
            .store
            .get_meta(record_type, record_id, &marker_key)
            .await?
        {
            if !existing.is_empty() {
                match Uuid::parse_str(&existing) {
                    Ok(action_id) => {
                        tracing::debug!(
                            scheduler = %self.name,
                            record_id = %record_id,
                            action_id = %action_id,
                            "Action already scheduled, skipping"
                        );
                        return Ok(Some(action_id));
                    }
                    Err(_) => {
                        tracing::warn!(
                            scheduler = %self.name,
                            record_id = %record_id,
                            marker = %existing,
                            "Unparseable action marker, rescheduling"
                        );
                    }
                }
            }
        }

        let args = json!({ "record_id": record_id });
        let Some(action_id) = self.enqueue_async_action(&self.action_hook(), args).await? else {
            return Ok(None);
        };

        self.store
            .set_meta(record_type, record_id, &marker_key, &action_id.to_string())
            .await?;
        metrics::observe_scheduler(&self.name, "action");
        Ok(Some(action_id))
    }

    /// Level 3: clear the marker, then run the callback. The marker is
    /// cleared first so a callback failure never strands it.
    pub async fn process_action(&self, record_id: Uuid) -> Result<(), AppError> {
        self.store
            .delete_meta(self.query.record_type(), record_id, &self.marker_key())
            .await?;
        metrics::observe_scheduler(&self.name, "process");
        self.action.run(record_id).await
    }

    /// Queue-level idempotency guard around the enqueue primitive: an
    /// equivalent pending action means no new one. Independent of the
    /// record marker, which can go stale out of band.
    async fn enqueue_async_action(
        &self,
        hook: &str,
        args: Value,
    ) -> Result<Option<ActionId>, AppError> {
        if self
            .queue
            .find_pending(hook, &args, &self.name)
            .await?
            .is_some()
        {
            return Ok(None);
        }
        let action_id = self.queue.enqueue(hook, args, &self.name, None).await?;
        Ok(Some(action_id))
    }
}

/// The named schedulers this service runs, routable by hook.
#[derive(Default)]
pub struct SchedulerSet {
    schedulers: HashMap<String, Arc<QueryActionsScheduler>>,
}

impl SchedulerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scheduler: Arc<QueryActionsScheduler>) {
        self.schedulers
            .insert(scheduler.name().to_string(), scheduler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<QueryActionsScheduler>> {
        self.schedulers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schedulers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn for_page_hook(&self, hook: &str) -> Option<Arc<QueryActionsScheduler>> {
        hook.strip_suffix("_schedule_page").and_then(|n| self.get(n))
    }

    pub fn for_action_hook(&self, hook: &str) -> Option<Arc<QueryActionsScheduler>> {
        hook.strip_suffix("_schedule_action")
            .and_then(|n| self.get(n))
    }
}
