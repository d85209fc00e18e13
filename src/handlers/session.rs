// src/handlers/session.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::Services,
    error::AppError,
    models::session::{ExtendSessionRequest, SessionFilter, StartSessionRequest},
    utils::jwt::Claims,
};

/// Starts a new answer session for the caller.
///
/// Any session the caller still has in progress is abandoned.
pub async fn start_session(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let session = services
        .sessions
        .start(
            claims.user_id()?,
            &payload.question_types,
            payload.question_count,
            payload.timeout_minutes,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// The caller's in-progress session, or `null`.
pub async fn current_session(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let session = services.sessions.current_session(claims.user_id()?).await?;
    Ok(Json(session))
}

/// The caller's sessions, newest first, optionally filtered by status and
/// start time.
pub async fn my_sessions(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<SessionFilter>,
) -> Result<impl IntoResponse, AppError> {
    let page = services
        .sessions
        .sessions_for_user(claims.user_id()?, &filter)
        .await?;
    Ok(Json(page))
}

pub async fn my_stats(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let stats = services.sessions.user_stats(claims.user_id()?).await?;
    Ok(Json(stats))
}

pub async fn get_session(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = services.sessions.session_for(&code, claims.user_id()?).await?;
    Ok(Json(session))
}

pub async fn session_status(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = services.sessions.status_view(&code, claims.user_id()?).await?;
    Ok(Json(view))
}

pub async fn next_question(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let question = services.submissions.next_question(&code, claims.user_id()?).await?;
    Ok(Json(question))
}

pub async fn question_at(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((code, index)): Path<(String, usize)>,
) -> Result<impl IntoResponse, AppError> {
    let question = services
        .sessions
        .question_at(&code, claims.user_id()?, index)
        .await?;
    Ok(Json(question))
}

pub async fn finish_session(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = services.sessions.finish(&code, claims.user_id()?).await?;
    Ok(Json(session))
}

pub async fn abandon_session(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = services.sessions.abandon(&code, claims.user_id()?).await?;
    Ok(Json(session))
}

pub async fn extend_session(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
    Json(payload): Json<ExtendSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = services
        .sessions
        .extend(&code, claims.user_id()?, payload.minutes)
        .await?;
    Ok(Json(session))
}

/// Resumes a session after an abnormal exit. Allowed once.
pub async fn resume_session(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = services.sessions.resume(&code, claims.user_id()?).await?;
    Ok(Json(session))
}
