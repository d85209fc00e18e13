// tests/api_tests.rs

use std::sync::Arc;

use axum::{body::Body, http::Request};
use questionnaire::{
    config::Config,
    engine::clock::SystemClock,
    models::question::{Question, QuestionType},
    routes,
    state::AppState,
    store::{MemoryCatalog, MemoryStore},
    utils::jwt::{ROLE_EXAMINER, ROLE_USER, sign_jwt},
};
use serde_json::{Value, json};
use sqlx::types::Json;
use tower::ServiceExt;

const SECRET: &str = "test_secret_for_integration_tests";

fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        sweep_interval_secs: 300,
        sweep_lookback_hours: 24,
        default_timeout_minutes: 60,
    }
}

/// Two single choice questions (answer "A") and one essay.
fn bank() -> Vec<Question> {
    let question = |id: i64, kind: QuestionType, answer: Option<&str>, score: i32| Question {
        id,
        title: format!("Question {id}"),
        content: "Pick one".to_string(),
        question_type: kind.code(),
        options: Json(vec!["Yes".to_string(), "No".to_string()]),
        correct_answer: answer.map(str::to_string),
        explanation: None,
        score,
        priority: 1,
        enabled: true,
    };
    vec![
        question(1, QuestionType::SingleChoice, Some("A"), 5),
        question(2, QuestionType::SingleChoice, Some("A"), 5),
        question(3, QuestionType::Essay, None, 10),
    ]
}

fn test_state() -> AppState {
    AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCatalog::new(bank())),
        Arc::new(SystemClock),
        test_config(),
    )
}

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    let app = routes::create_router(test_state());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn token(user_id: i64, role: &str) -> String {
    sign_jwt(user_id, role, SECRET, 600).expect("Failed to sign token")
}

async fn start_session(client: &reqwest::Client, address: &str, bearer: &str) -> Value {
    let response = client
        .post(format!("{}/api/sessions", address))
        .bearer_auth(bearer)
        .json(&json!({ "question_types": [1, 4], "question_count": 3 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.expect("Failed to parse session json")
}

#[tokio::test]
async fn health_check_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = routes::create_router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sessions/current")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn start_fails_validation() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act: no question types at all
    let response = client
        .post(format!("{}/api/sessions", address))
        .bearer_auth(token(1, ROLE_USER))
        .json(&json!({ "question_types": [], "question_count": 3 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn insufficient_questions_is_unprocessable() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/sessions", address))
        .bearer_auth(token(1, ROLE_USER))
        .json(&json!({ "question_types": [1], "question_count": 50 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 422);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 6206);
    assert_eq!(body["kind"], "capacity");
}

#[tokio::test]
async fn other_users_cannot_read_a_session() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let session = start_session(&client, &address, &token(1, ROLE_USER)).await;
    let code = session["session_code"].as_str().unwrap();

    let response = client
        .get(format!("{}/api/sessions/{}", address, code))
        .bearer_auth(token(2, ROLE_USER))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 6202);
}

#[tokio::test]
async fn plain_users_cannot_grade() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/scoring/pending", address))
        .bearer_auth(token(1, ROLE_USER))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn test_answer_and_grading_flow() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let user = token(1, ROLE_USER);
    let examiner = token(50, ROLE_EXAMINER);

    // 1. Start
    let session = start_session(&client, &address, &user).await;
    let code = session["session_code"].as_str().unwrap().to_string();
    let session_id = session["id"].as_i64().unwrap();
    assert_eq!(session["status"], 1);
    assert_eq!(session["total_score"], 20);

    // 2. Answer every question in the order the server hands them out
    for _ in 0..3 {
        let question: Value = client
            .get(format!("{}/api/sessions/{}/next-question", address, code))
            .bearer_auth(&user)
            .send()
            .await
            .expect("Next question failed")
            .json()
            .await
            .unwrap();
        let question_id = question["id"].as_i64().unwrap();
        assert!(question.get("correct_answer").is_none());

        let answer = if question_id == 3 { "A short essay" } else { "A" };
        let response = client
            .post(format!("{}/api/sessions/{}/answers", address, code))
            .bearer_auth(&user)
            .json(&json!({
                "question_id": question_id,
                "user_answer": answer,
                "time_spent_seconds": 7
            }))
            .send()
            .await
            .expect("Submit failed");
        assert_eq!(response.status().as_u16(), 200);
    }

    let response = client
        .get(format!("{}/api/sessions/{}/next-question", address, code))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);

    // 3. Status and finish
    let status: Value = client
        .get(format!("{}/api/sessions/{}/status", address, code))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["answered"], 3);

    let finished: Value = client
        .post(format!("{}/api/sessions/{}/finish", address, code))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(finished["status"], 2);
    assert_eq!(finished["auto_score"], 10);
    assert_eq!(finished["scoring_status"], 1);

    // 4. The examiner picks up the essay
    let pending: Vec<Value> = client
        .get(format!("{}/api/scoring/pending", address))
        .bearer_auth(&examiner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    let essay_id = pending[0]["id"].as_i64().unwrap();

    let response = client
        .post(format!("{}/api/scoring", address))
        .bearer_auth(&examiner)
        .json(&json!({ "answer_record_id": essay_id, "score": 8, "max_score": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let completed: Value = client
        .post(format!("{}/api/scoring/sessions/{}/complete", address, session_id))
        .bearer_auth(&examiner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(completed["scoring_status"], 2);
    assert_eq!(completed["final_score"], 18);
    assert_eq!(completed["manual_score"], 8);
}

#[tokio::test]
async fn session_listings_and_stats() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let user = token(1, ROLE_USER);
    let examiner = token(50, ROLE_EXAMINER);

    start_session(&client, &address, &user).await;
    let latest = start_session(&client, &address, &user).await;
    start_session(&client, &address, &token(2, ROLE_USER)).await;

    let mine: Value = client
        .get(format!("{}/api/sessions/mine?status=1", address))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["items"][0]["session_code"], latest["session_code"]);

    let stats: Value = client
        .get(format!("{}/api/sessions/stats", address))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_sessions"], 2);
    assert_eq!(stats["abandoned"], 1);
    assert_eq!(stats["in_progress"], 1);

    let everyone: Value = client
        .get(format!("{}/api/admin/sessions?limit=2", address))
        .bearer_auth(&examiner)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(everyone["total"], 3);
    assert_eq!(everyone["items"].as_array().unwrap().len(), 2);

    let response = client
        .get(format!("{}/api/admin/sessions", address))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn status_updates_take_known_codes_only() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let examiner = token(50, ROLE_EXAMINER);
    let session = start_session(&client, &address, &token(1, ROLE_USER)).await;
    let code = session["session_code"].as_str().unwrap();

    let response = client
        .put(format!("{}/api/admin/sessions/{}/status", address, code))
        .bearer_auth(&examiner)
        .json(&json!({ "status": 9 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let updated: Value = client
        .put(format!("{}/api/admin/sessions/{}/status", address, code))
        .bearer_auth(&examiner)
        .json(&json!({ "status": 5 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["status"], 5);
}

#[tokio::test]
async fn scoring_statistics_endpoint() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let stats: Value = client
        .get(format!("{}/api/scoring/statistics?grader_id=50", address))
        .bearer_auth(token(50, ROLE_EXAMINER))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_count"], 0);
    assert!(stats["average_score"].is_null());
}
