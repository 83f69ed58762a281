//! Subscription model.
//!
//! A subscription is a recurring obligation composed of ordered,
//! non-overlapping phases. Settled billing periods are counted against
//! their phase; when every phase has all its periods the subscription is
//! complete.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    OnHold,
    Cancelled,
    Completed,
    Failed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::OnHold => "on_hold",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Completed => "completed",
            SubscriptionStatus::Failed => "failed",
        }
    }
}

/// Unit of a phase's billing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseIntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

/// Billing interval of a phase, e.g. every 1 month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseInterval {
    pub unit: PhaseIntervalUnit,
    pub count: u32,
}

impl PhaseInterval {
    pub fn new(unit: PhaseIntervalUnit, count: u32) -> Self {
        Self { unit, count }
    }
}

/// One billing-term segment of a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub seq: u32,
    pub start_date: DateTime,
    pub interval: PhaseInterval,
    pub amount_minor: i64,
    /// None means the phase runs forever.
    pub total_periods: Option<u32>,
    pub periods_created: u32,
}

impl Phase {
    pub fn all_periods_created(&self) -> bool {
        self.total_periods
            .is_some_and(|total| self.periods_created >= total)
    }
}

/// A subscription record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub status: SubscriptionStatus,
    pub currency: String,
    /// Ordered, non-overlapping phases.
    pub phases: Vec<Phase>,
    /// Start of the next un-paid period. Monotonically non-decreasing.
    pub next_payment_date: DateTime,
    pub meta: HashMap<String, String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Subscription {
    pub fn new(currency: &str, phases: Vec<Phase>) -> Self {
        let now = DateTime::now();
        let next_payment_date = phases.first().map(|p| p.start_date).unwrap_or(now);
        Self {
            id: Uuid::new_v4(),
            status: SubscriptionStatus::Active,
            currency: currency.to_string(),
            phases,
            next_payment_date,
            meta: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The first phase that still has periods to create.
    pub fn current_phase(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| !p.all_periods_created())
    }

    /// Count one settled period against its phase. When that exhausts
    /// every phase the subscription is completed. An already-exhausted
    /// phase absorbs the confirm.
    pub fn confirm_period(&mut self, phase_seq: u32) {
        if let Some(phase) = self.phases.iter_mut().find(|p| p.seq == phase_seq) {
            if !phase.all_periods_created() {
                phase.periods_created += 1;
            }
        }
        if !self.phases.is_empty() && self.current_phase().is_none() {
            self.status = SubscriptionStatus::Completed;
        }
        self.updated_at = DateTime::now();
    }

    /// Advance `next_payment_date` to `candidate` if that is later.
    /// Never moves the date backwards. Returns whether it moved.
    pub fn ratchet_next_payment_date(&mut self, candidate: DateTime) -> bool {
        if candidate > self.next_payment_date {
            self.next_payment_date = candidate;
            self.updated_at = DateTime::now();
            true
        } else {
            false
        }
    }
}
