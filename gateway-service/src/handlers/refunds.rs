//! Refund handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{CreateRefundRequest, RefundResponse},
    AppState,
};

pub async fn create_refund(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<RefundResponse>), AppError> {
    payload.validate()?;

    let refund = state
        .orchestrator
        .create_refund(payment_id, payload.amount_minor, payload.description)
        .await?;

    Ok((StatusCode::CREATED, Json(RefundResponse::from(refund))))
}
