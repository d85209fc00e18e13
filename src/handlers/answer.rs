// src/handlers/answer.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::Services,
    error::AppError,
    models::answer_record::{AnswerInput, BatchSubmitRequest},
    utils::jwt::Claims,
};

/// Submits one answer.
///
/// Re-submitting an answered question returns the stored record unchanged,
/// so clients may retry freely.
pub async fn submit_answer(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
    Json(payload): Json<AnswerInput>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let record = services
        .submissions
        .submit(&code, claims.user_id()?, &payload)
        .await?;
    Ok(Json(record))
}

pub async fn submit_batch(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
    Json(payload): Json<BatchSubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let records = services
        .submissions
        .submit_batch(&code, claims.user_id()?, &payload.answers)
        .await?;
    Ok(Json(records))
}

/// The caller's answers in this session, in submission order.
pub async fn list_answers(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let records = services
        .submissions
        .records_for_session(&code, claims.user_id()?)
        .await?;
    Ok(Json(records))
}

pub async fn answer_stats(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stats = services
        .submissions
        .answer_stats(&code, claims.user_id()?)
        .await?;
    Ok(Json(stats))
}
