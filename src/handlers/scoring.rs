// src/handlers/scoring.rs

//! Grading endpoints. Examiner or admin only.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    engine::Services,
    error::AppError,
    models::scoring_record::{
        BatchGradeRequest, GradeRequest, PendingParams, RegradeRequest, StatsParams, UnscoredParams,
    },
    utils::jwt::Claims,
};

/// Essay answers in closed sessions still waiting for a grade.
pub async fn pending(
    State(services): State<Services>,
    Query(params): Query<PendingParams>,
) -> Result<impl IntoResponse, AppError> {
    let records = services
        .scoring
        .pending_scoring(params.limit, params.offset)
        .await?;
    Ok(Json(records))
}

pub async fn grade(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<GradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let record = services.scoring.grade(&payload, claims.user_id()?).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Grades several answers; nothing is written unless every item passes
/// its checks.
pub async fn grade_batch(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<BatchGradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let records = services
        .scoring
        .grade_batch(&payload.items, claims.user_id()?)
        .await?;
    Ok((StatusCode::CREATED, Json(records)))
}

pub async fn regrade(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<RegradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let record = services
        .scoring
        .regrade(id, payload.score, payload.comment.as_deref(), claims.user_id()?)
        .await?;
    Ok(Json(record))
}

pub async fn delete_grade(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    services.scoring.delete(id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Scoring records written by the caller.
pub async fn my_grades(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let records = services
        .scoring
        .scoring_records_by_grader(claims.user_id()?)
        .await?;
    Ok(Json(records))
}

pub async fn session_records(
    State(services): State<Services>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let records = services.scoring.scoring_records_for_session(session_id).await?;
    Ok(Json(records))
}

/// Re-runs automatic grading over a session's stored answers.
pub async fn auto_score(
    State(services): State<Services>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let changed = services.submissions.batch_auto_score(session_id).await?;
    Ok(Json(json!({
        "session_id": session_id,
        "changed": changed,
    })))
}

pub async fn complete_scoring(
    State(services): State<Services>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = services.scoring.complete_session_scoring(session_id).await?;
    Ok(Json(session))
}

/// Count, average and range of scores, by session and/or grader.
pub async fn statistics(
    State(services): State<Services>,
    Query(params): Query<StatsParams>,
) -> Result<impl IntoResponse, AppError> {
    let stats = services
        .scoring
        .statistics(params.session_id, params.grader_id)
        .await?;
    Ok(Json(stats))
}

pub async fn scoring_detail(
    State(services): State<Services>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = services.scoring.scoring_record_detail(id).await?;
    Ok(Json(detail))
}

/// An answer record with all of its grades.
pub async fn record_detail(
    State(services): State<Services>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = services.submissions.record_detail(id).await?;
    Ok(Json(detail))
}

pub async fn unscored(
    State(services): State<Services>,
    Path(session_id): Path<i64>,
    Query(params): Query<UnscoredParams>,
) -> Result<impl IntoResponse, AppError> {
    let records = services
        .scoring
        .unscored_records(session_id, params.grader_id)
        .await?;
    Ok(Json(records))
}

pub async fn session_answer_stats(
    State(services): State<Services>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let stats = services.submissions.answer_stats_by_id(session_id).await?;
    Ok(Json(stats))
}
