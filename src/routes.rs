// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, answer, scoring, session},
    state::AppState,
    utils::jwt::{auth_middleware, examiner_middleware},
};

/// Assembles the main application router.
///
/// * Every route requires a bearer token.
/// * Scoring and admin routes additionally require the examiner or admin role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let session_routes = Router::new()
        .route("/", post(session::start_session))
        .route("/current", get(session::current_session))
        .route("/mine", get(session::my_sessions))
        .route("/stats", get(session::my_stats))
        .route("/{code}", get(session::get_session))
        .route("/{code}/status", get(session::session_status))
        .route("/{code}/next-question", get(session::next_question))
        .route("/{code}/questions/{index}", get(session::question_at))
        .route(
            "/{code}/answers",
            get(answer::list_answers).post(answer::submit_answer),
        )
        .route("/{code}/answers/batch", post(answer::submit_batch))
        .route("/{code}/answer-stats", get(answer::answer_stats))
        .route("/{code}/finish", post(session::finish_session))
        .route("/{code}/abandon", post(session::abandon_session))
        .route("/{code}/extend", post(session::extend_session))
        .route("/{code}/resume", post(session::resume_session))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let scoring_routes = Router::new()
        .route("/", post(scoring::grade))
        .route("/pending", get(scoring::pending))
        .route("/batch", post(scoring::grade_batch))
        .route("/mine", get(scoring::my_grades))
        .route("/statistics", get(scoring::statistics))
        .route(
            "/{id}",
            get(scoring::scoring_detail)
                .put(scoring::regrade)
                .delete(scoring::delete_grade),
        )
        .route("/records/{id}", get(scoring::record_detail))
        .route("/sessions/{id}/records", get(scoring::session_records))
        .route("/sessions/{id}/unscored", get(scoring::unscored))
        .route("/sessions/{id}/answer-stats", get(scoring::session_answer_stats))
        .route("/sessions/{id}/auto-score", post(scoring::auto_score))
        .route("/sessions/{id}/complete", post(scoring::complete_scoring))
        // Auth first, then the role check
        .layer(middleware::from_fn(examiner_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/sessions", get(admin::list_sessions))
        .route("/sessions/{code}/status", put(admin::update_status))
        .route("/sessions/{code}/force-complete", post(admin::force_complete))
        .route("/sessions/{code}/abnormal-exit", post(admin::mark_abnormal_exit))
        .route("/sweep", post(admin::run_sweep))
        .layer(middleware::from_fn(examiner_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/sessions", session_routes)
        .nest("/api/scoring", scoring_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
