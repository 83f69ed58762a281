//! Payment lifecycle handlers.
//!
//! `POST /payments` ends in the gateway's hand-off action: a 303 to the
//! provider or an auto-submitting form page. The return callback is the
//! only route a payer hits directly; it authorizes itself with the
//! payment's opaque key and reconciles before redirecting onward.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{CreatePaymentRequest, PaymentResponse, ReturnQuery},
    gateways::RedirectAction,
    services::{RequestOrigin, RunContext},
    AppState,
};

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn request_origin(headers: &HeaderMap) -> RequestOrigin {
    RequestOrigin {
        page_url: None,
        referer: header_value(headers, "referer"),
        remote_ip: header_value(headers, "x-forwarded-for")
            .map(|list| list.split(',').next().unwrap_or("").trim().to_string())
            .filter(|ip| !ip.is_empty()),
        user_agent: header_value(headers, "user-agent"),
    }
}

fn render_redirect(action: RedirectAction) -> Response {
    match action {
        RedirectAction::HttpRedirect(url) => Redirect::to(&url).into_response(),
        RedirectAction::HtmlForm(html) => (StatusCode::OK, Html(html)).into_response(),
    }
}

/// Create and start a payment. The response is the provider hand-off
/// itself; the payment id travels in the `x-payment-id` header.
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let mut payment = payload.into_payment();
    let origin = request_origin(&headers);
    state.orchestrator.complement_payment(&mut payment, &origin);

    let outcome = state.orchestrator.start_payment(payment).await?;

    let mut response = match outcome.redirect {
        Some(action) => render_redirect(action),
        None => (
            StatusCode::CREATED,
            Json(PaymentResponse::from(outcome.payment.clone())),
        )
            .into_response(),
    };
    if let Ok(value) = outcome.payment.id.to_string().parse() {
        response.headers_mut().insert("x-payment-id", value);
    }
    Ok(response)
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .orchestrator
        .store()
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;
    Ok(Json(PaymentResponse::from(payment)))
}

/// Return-URL callback. A missing payment or a key mismatch sends the
/// payer to the site root without touching the payment.
pub async fn return_callback(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Query(query): Query<ReturnQuery>,
) -> Result<Response, AppError> {
    let site_root = state.config.site_url.clone();

    let Some(payment) = state.orchestrator.store().get_payment(payment_id).await? else {
        tracing::warn!(payment_id = %payment_id, "Return callback for unknown payment");
        return Ok(Redirect::to(&site_root).into_response());
    };
    if !payment.key_matches(&query.key) {
        tracing::warn!(payment_id = %payment_id, "Return callback key mismatch");
        return Ok(Redirect::to(&site_root).into_response());
    }

    let (_, redirect) = state
        .orchestrator
        .update_payment(payment_id, RunContext::Http, true)
        .await?;

    match redirect {
        Some(action) => Ok(render_redirect(action)),
        None => Ok(Redirect::to(&site_root).into_response()),
    }
}

/// Force a fresh status-check ladder for a payment.
pub async fn force_status_check(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let payment = state
        .orchestrator
        .store()
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    state
        .orchestrator
        .checker()
        .schedule_event(&payment, true)
        .await?;
    Ok(StatusCode::ACCEPTED)
}
