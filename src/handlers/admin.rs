// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    config::Config,
    engine::Services,
    error::AppError,
    models::session::{SessionFilter, SessionStatus, UpdateStatusRequest},
};

/// Every user's sessions, filtered by user, status and start time.
pub async fn list_sessions(
    State(services): State<Services>,
    Query(filter): Query<SessionFilter>,
) -> Result<impl IntoResponse, AppError> {
    let page = services.sessions.list_sessions(&filter).await?;
    Ok(Json(page))
}

/// Moves a session along the regular transition table.
pub async fn update_status(
    State(services): State<Services>,
    Path(code): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let to = SessionStatus::try_from(payload.status)?;
    let session = services.sessions.update_status(&code, to).await?;
    Ok(Json(session))
}

/// Completes a session whatever its status.
pub async fn force_complete(
    State(services): State<Services>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = services.sessions.force_complete(&code).await?;
    Ok(Json(session))
}

/// Flags an in-progress session as interrupted so its owner can resume it once.
pub async fn mark_abnormal_exit(
    State(services): State<Services>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = services.sessions.mark_abnormal_exit(&code).await?;
    Ok(Json(session))
}

/// Runs the timeout sweep now instead of waiting for the next tick.
pub async fn run_sweep(
    State(services): State<Services>,
    State(config): State<Config>,
) -> Result<impl IntoResponse, AppError> {
    let lookback = chrono::Duration::hours(config.sweep_lookback_hours);
    let timed_out = services.sessions.sweep(lookback).await?;
    Ok(Json(json!({ "timed_out": timed_out })))
}
