//! Administrative scheduler routes.
//!
//! The operational entry points for the bulk schedulers: list what is
//! registered, kick off a full or single-page fan-out, or run the action
//! for explicit records straight through the idempotency guard.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        RunActionsRequest, RunActionsResponse, ScheduleRequest, ScheduleResponse,
        SchedulerListResponse,
    },
    services::QueryActionsScheduler,
    AppState,
};

use std::sync::Arc;

fn scheduler_by_name(
    state: &AppState,
    name: &str,
) -> Result<Arc<QueryActionsScheduler>, AppError> {
    state
        .schedulers
        .get(name)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Scheduler {} not found", name)))
}

pub async fn list_schedulers(State(state): State<AppState>) -> Json<SchedulerListResponse> {
    Json(SchedulerListResponse {
        schedulers: state.schedulers.names(),
    })
}

/// Fan out the scheduler: all pages, or just one when the body names it.
pub async fn schedule(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), AppError> {
    let scheduler = scheduler_by_name(&state, &name)?;

    let scheduled = match payload.page {
        Some(page) => scheduler.schedule_actions(page).await?,
        None => scheduler.schedule_pages().await?,
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(ScheduleResponse {
            scheduler: name,
            scheduled,
        }),
    ))
}

/// Run the action for explicit records right now, bypassing the queue
/// and any pending markers. This is the escape hatch for records whose
/// marker went stale.
pub async fn run_actions(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<RunActionsRequest>,
) -> Result<(StatusCode, Json<RunActionsResponse>), AppError> {
    payload.validate()?;
    let scheduler = scheduler_by_name(&state, &name)?;

    let mut processed = Vec::new();
    for record_id in payload.record_ids {
        scheduler.process_action(record_id).await?;
        processed.push(record_id);
    }

    Ok((
        StatusCode::OK,
        Json(RunActionsResponse {
            scheduler: name,
            processed,
        }),
    ))
}
