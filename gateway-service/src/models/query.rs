//! Record query descriptors for the bulk action scheduler.
//!
//! A query names a record collection and a filter; the record store turns
//! it into a paginated id listing. Page membership is re-derived on every
//! run, so concurrent inserts and deletes are tolerated at the level a
//! periodic maintenance task needs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PaymentStatus, SubscriptionStatus};

/// Record collections the scheduler can fan out over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Payment,
    Subscription,
}

impl RecordType {
    pub fn collection(&self) -> &'static str {
        match self {
            RecordType::Payment => "payments",
            RecordType::Subscription => "subscriptions",
        }
    }
}

/// A filtered query over one record collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordQuery {
    Payments { status: Option<PaymentStatus> },
    Subscriptions { status: Option<SubscriptionStatus> },
}

impl RecordQuery {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordQuery::Payments { .. } => RecordType::Payment,
            RecordQuery::Subscriptions { .. } => RecordType::Subscription,
        }
    }
}

/// One page of record ids plus the total page count for the full query.
#[derive(Debug, Clone)]
pub struct IdPage {
    pub ids: Vec<Uuid>,
    pub total_pages: u64,
}
