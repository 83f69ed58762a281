//! Payment model.
//!
//! A payment is one transaction attempt against a provider gateway. Amounts
//! are integer minor units (paise, cents) throughout; the currency code says
//! which.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::GatewayMode;

/// Payment status.
///
/// `Open` can move to any other status. `OnHold` and `Authorized` are
/// holding states that can still resolve to `Success`, `Failure` or
/// `Cancelled`. Everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Open,
    Success,
    Cancelled,
    Expired,
    Failure,
    OnHold,
    Authorized,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Open => "open",
            PaymentStatus::Success => "success",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Failure => "failure",
            PaymentStatus::OnHold => "on_hold",
            PaymentStatus::Authorized => "authorized",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Success
                | PaymentStatus::Cancelled
                | PaymentStatus::Expired
                | PaymentStatus::Failure
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        if *self == next {
            return false;
        }
        match self {
            PaymentStatus::Open => true,
            PaymentStatus::OnHold | PaymentStatus::Authorized => matches!(
                next,
                PaymentStatus::Success | PaymentStatus::Failure | PaymentStatus::Cancelled
            ),
            _ => false,
        }
    }
}

/// Customer attached to a payment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub locale: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Billing or shipping address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    pub name: Option<String>,
    pub email: Option<String>,
    pub line_1: Option<String>,
    pub line_2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Consumer bank account details, as reported back by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankAccountDetails {
    pub name: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
}

/// One line item on a payment, back-referencing its owning payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLine {
    pub id: Uuid,
    pub payment_id: Option<Uuid>,
    pub description: String,
    pub quantity: u32,
    pub unit_amount_minor: i64,
    pub total_amount_minor: i64,
}

/// A refund against a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub provider_refund_id: Option<String>,
    pub created_at: DateTime,
}

impl Refund {
    pub fn new(payment_id: Uuid, amount_minor: i64, currency: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            amount_minor,
            currency: currency.to_string(),
            description: None,
            provider_refund_id: None,
            created_at: DateTime::now(),
        }
    }
}

/// Reference to one pending subscription period this payment settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodRef {
    pub subscription_id: Uuid,
    pub phase_seq: u32,
    pub start_date: DateTime,
    pub end_date: DateTime,
}

/// A payment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Opaque callback key, immutable once set. Authorizes return-URL
    /// callbacks for this payment.
    pub key: Option<String>,
    pub status: PaymentStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    /// Where the payment originated (page URL or referer).
    pub origin: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<String>,
    /// Bound gateway configuration, resolved at or before the first
    /// gateway call.
    pub config_id: Option<Uuid>,
    pub mode: Option<GatewayMode>,
    pub method: Option<String>,
    pub issuer: Option<String>,
    pub customer: Option<Customer>,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    pub consumer_bank_details: Option<BankAccountDetails>,
    pub lines: Vec<PaymentLine>,
    pub refunds: Vec<Refund>,
    pub refunded_amount_minor: i64,
    pub periods: Vec<PeriodRef>,
    pub notes: Vec<String>,
    pub meta: HashMap<String, String>,
    /// Software version that created the payment.
    pub version: Option<String>,
    /// Provider URL the payer is sent to.
    pub action_url: Option<String>,
    /// Where the payer lands after the return-URL callback reconciled.
    pub return_redirect_url: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Payment {
    pub fn new(amount_minor: i64, currency: &str) -> Self {
        let now = DateTime::now();
        Self {
            id: Uuid::new_v4(),
            key: None,
            status: PaymentStatus::Open,
            amount_minor,
            currency: currency.to_string(),
            description: None,
            origin: None,
            source: None,
            source_id: None,
            config_id: None,
            mode: None,
            method: None,
            issuer: None,
            customer: None,
            billing_address: None,
            shipping_address: None,
            consumer_bank_details: None,
            lines: Vec::new(),
            refunds: Vec::new(),
            refunded_amount_minor: 0,
            periods: Vec::new(),
            notes: Vec::new(),
            meta: HashMap::new(),
            version: None,
            action_url: None,
            return_redirect_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a human-readable note.
    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Apply a status transition if the state machine allows it.
    /// Returns whether the status changed.
    pub fn transition(&mut self, next: PaymentStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            self.updated_at = DateTime::now();
            true
        } else {
            false
        }
    }

    /// Exact-match check of the opaque callback key.
    pub fn key_matches(&self, candidate: &str) -> bool {
        self.key.as_deref() == Some(candidate)
    }
}
