use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Payment, PaymentLine, Refund};

#[derive(Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(range(min = 1))]
    pub amount_minor: i64,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub description: Option<String>,
    pub method: Option<String>,
    pub issuer: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<String>,
    /// Explicit gateway configuration; omitted means the default applies.
    pub config_id: Option<Uuid>,
    /// Where the payer lands after the return callback reconciled.
    pub redirect_url: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub lines: Vec<PaymentLineRequest>,
}

#[derive(Deserialize, Validate)]
pub struct PaymentLineRequest {
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub unit_amount_minor: i64,
}

impl CreatePaymentRequest {
    pub fn into_payment(self) -> Payment {
        let mut payment = Payment::new(self.amount_minor, &self.currency);
        payment.description = self.description;
        payment.method = self.method;
        payment.issuer = self.issuer;
        payment.source = self.source;
        payment.source_id = self.source_id;
        payment.config_id = self.config_id;
        payment.return_redirect_url = self.redirect_url;
        payment.lines = self
            .lines
            .into_iter()
            .map(|line| PaymentLine {
                id: Uuid::new_v4(),
                payment_id: None,
                description: line.description,
                quantity: line.quantity,
                unit_amount_minor: line.unit_amount_minor,
                total_amount_minor: line.unit_amount_minor * i64::from(line.quantity),
            })
            .collect();
        payment
    }
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub method: Option<String>,
    pub mode: Option<String>,
    pub action_url: Option<String>,
    pub refunded_amount_minor: i64,
    pub refunds: Vec<RefundResponse>,
    pub notes: Vec<String>,
    pub created_at_ms: i64,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            status: payment.status.as_str().to_string(),
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            description: payment.description,
            method: payment.method,
            mode: payment.mode.map(|m| m.as_str().to_string()),
            action_url: payment.action_url,
            refunded_amount_minor: payment.refunded_amount_minor,
            refunds: payment.refunds.into_iter().map(RefundResponse::from).collect(),
            notes: payment.notes,
            created_at_ms: payment.created_at.timestamp_millis(),
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct CreateRefundRequest {
    #[validate(range(min = 1))]
    pub amount_minor: i64,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub provider_refund_id: Option<String>,
}

impl From<Refund> for RefundResponse {
    fn from(refund: Refund) -> Self {
        Self {
            id: refund.id,
            payment_id: refund.payment_id,
            amount_minor: refund.amount_minor,
            currency: refund.currency,
            description: refund.description,
            provider_refund_id: refund.provider_refund_id,
        }
    }
}

#[derive(Deserialize)]
pub struct ReturnQuery {
    #[serde(default)]
    pub key: String,
}

/// Body of `POST /schedulers/:name/schedule`. No page means full fan-out.
#[derive(Deserialize, Default)]
pub struct ScheduleRequest {
    pub page: Option<u64>,
}

#[derive(Deserialize, Validate)]
pub struct RunActionsRequest {
    #[validate(length(min = 1))]
    pub record_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct ScheduleResponse {
    pub scheduler: String,
    pub scheduled: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct RunActionsResponse {
    pub scheduler: String,
    pub processed: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct SchedulerListResponse {
    pub schedulers: Vec<String>,
}
