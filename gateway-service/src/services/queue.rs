//! Async task queue.
//!
//! The scheduler and status checker only need two primitives: enqueue a
//! named action with arguments, and ask whether an equivalent action is
//! already pending. Delivery is at-least-once; consumers claim due actions
//! one at a time. The Mongo backend persists actions across restarts; the
//! in-memory backend is for tests and local development.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson, DateTime};
use mongodb::options::FindOneAndUpdateOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::error::AppError;
use std::sync::Mutex;
use uuid::Uuid;

pub type ActionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// A named action waiting in (or finished with) the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedAction {
    #[serde(rename = "_id")]
    pub id: ActionId,
    pub hook: String,
    pub args: Value,
    pub group: String,
    pub run_at: DateTime,
    pub status: ActionStatus,
    pub created_at: DateTime,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a named action. `run_at` defaults to now.
    async fn enqueue(
        &self,
        hook: &str,
        args: Value,
        group: &str,
        run_at: Option<DateTime>,
    ) -> Result<ActionId, AppError>;

    /// Identifier of a pending action with the same hook, arguments and
    /// group, if one is already queued.
    async fn find_pending(
        &self,
        hook: &str,
        args: &Value,
        group: &str,
    ) -> Result<Option<ActionId>, AppError>;

    /// Claim the next due pending action, marking it running.
    async fn claim_due(&self) -> Result<Option<QueuedAction>, AppError>;

    async fn complete(&self, id: ActionId) -> Result<(), AppError>;

    async fn fail(&self, id: ActionId) -> Result<(), AppError>;
}

// ---------------------------------------------------------------------------
// MongoDB implementation
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MongoTaskQueue {
    actions: Collection<QueuedAction>,
}

impl MongoTaskQueue {
    pub fn new(db: &Database) -> Self {
        Self {
            actions: db.collection("queued_actions"),
        }
    }
}

#[async_trait]
impl TaskQueue for MongoTaskQueue {
    async fn enqueue(
        &self,
        hook: &str,
        args: Value,
        group: &str,
        run_at: Option<DateTime>,
    ) -> Result<ActionId, AppError> {
        let action = QueuedAction {
            id: Uuid::new_v4(),
            hook: hook.to_string(),
            args,
            group: group.to_string(),
            run_at: run_at.unwrap_or_else(DateTime::now),
            status: ActionStatus::Pending,
            created_at: DateTime::now(),
        };
        self.actions.insert_one(&action, None).await?;
        tracing::debug!(action_id = %action.id, hook = %action.hook, "Action enqueued");
        Ok(action.id)
    }

    async fn find_pending(
        &self,
        hook: &str,
        args: &Value,
        group: &str,
    ) -> Result<Option<ActionId>, AppError> {
        let filter = doc! {
            "hook": hook,
            "group": group,
            "status": "pending",
            "args": to_bson(args).map_err(|e| AppError::InternalError(e.into()))?,
        };
        let cursor = self.actions.find(filter, None).await?;
        let found: Vec<QueuedAction> = cursor.try_collect().await?;
        Ok(found.into_iter().next().map(|a| a.id))
    }

    async fn claim_due(&self) -> Result<Option<QueuedAction>, AppError> {
        let filter = doc! {
            "status": "pending",
            "run_at": { "$lte": DateTime::now() },
        };
        let update = doc! { "$set": { "status": "running" } };
        let options = FindOneAndUpdateOptions::builder()
            .sort(doc! { "run_at": 1 })
            .build();
        let claimed = self
            .actions
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(claimed.map(|mut action| {
            action.status = ActionStatus::Running;
            action
        }))
    }

    async fn complete(&self, id: ActionId) -> Result<(), AppError> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! { "$set": { "status": "complete" } };
        self.actions.update_one(filter, update, None).await?;
        Ok(())
    }

    async fn fail(&self, id: ActionId) -> Result<(), AppError> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! { "$set": { "status": "failed" } };
        self.actions.update_one(filter, update, None).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Vec-backed queue for tests and local development. Preserves enqueue
/// order, which tests rely on to assert scheduling order.
#[derive(Default)]
pub struct MemoryTaskQueue {
    actions: Mutex<Vec<QueuedAction>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every action ever enqueued, in enqueue order.
    pub fn actions(&self) -> Vec<QueuedAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.status == ActionStatus::Pending)
            .count()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(
        &self,
        hook: &str,
        args: Value,
        group: &str,
        run_at: Option<DateTime>,
    ) -> Result<ActionId, AppError> {
        let action = QueuedAction {
            id: Uuid::new_v4(),
            hook: hook.to_string(),
            args,
            group: group.to_string(),
            run_at: run_at.unwrap_or_else(DateTime::now),
            status: ActionStatus::Pending,
            created_at: DateTime::now(),
        };
        let id = action.id;
        self.actions.lock().unwrap().push(action);
        Ok(id)
    }

    async fn find_pending(
        &self,
        hook: &str,
        args: &Value,
        group: &str,
    ) -> Result<Option<ActionId>, AppError> {
        Ok(self
            .actions
            .lock()
            .unwrap()
            .iter()
            .find(|a| {
                a.status == ActionStatus::Pending
                    && a.hook == hook
                    && a.group == group
                    && a.args == *args
            })
            .map(|a| a.id))
    }

    async fn claim_due(&self) -> Result<Option<QueuedAction>, AppError> {
        let now = DateTime::now();
        let mut actions = self.actions.lock().unwrap();
        let due = actions
            .iter_mut()
            .filter(|a| a.status == ActionStatus::Pending && a.run_at <= now)
            .min_by_key(|a| a.run_at);
        Ok(due.map(|action| {
            action.status = ActionStatus::Running;
            action.clone()
        }))
    }

    async fn complete(&self, id: ActionId) -> Result<(), AppError> {
        let mut actions = self.actions.lock().unwrap();
        if let Some(action) = actions.iter_mut().find(|a| a.id == id) {
            action.status = ActionStatus::Complete;
        }
        Ok(())
    }

    async fn fail(&self, id: ActionId) -> Result<(), AppError> {
        let mut actions = self.actions.lock().unwrap();
        if let Some(action) = actions.iter_mut().find(|a| a.id == id) {
            action.status = ActionStatus::Failed;
        }
        Ok(())
    }
}
