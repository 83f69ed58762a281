pub mod dispatcher;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod risk;
pub mod scheduler;
pub mod status_checker;
pub mod store;

pub use dispatcher::TaskDispatcher;
pub use orchestrator::{ConfigSelector, Orchestrator, RequestOrigin, RunContext, StartOutcome};
pub use queue::{ActionId, ActionStatus, MemoryTaskQueue, MongoTaskQueue, QueuedAction, TaskQueue};
pub use risk::RiskClient;
pub use scheduler::{QueryActionsScheduler, RecordAction, SchedulerSet};
pub use status_checker::StatusChecker;
pub use store::{MemoryRecordStore, MongoRecordStore, RecordStore};
