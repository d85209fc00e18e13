// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use questionnaire::{
    engine::{Services, clock::ManualClock},
    models::question::{Question, QuestionType},
    store::{MemoryCatalog, MemoryStore},
};
use sqlx::types::Json;

pub const USER: i64 = 100;
pub const OTHER_USER: i64 = 200;
pub const GRADER: i64 = 900;
pub const SECOND_GRADER: i64 = 901;

pub fn question(
    id: i64,
    kind: QuestionType,
    correct_answer: Option<&str>,
    options: &[&str],
    score: i32,
) -> Question {
    Question {
        id,
        title: format!("Question {id}"),
        content: format!("Body of question {id}"),
        question_type: kind.code(),
        options: Json(options.iter().map(|o| o.to_string()).collect()),
        correct_answer: correct_answer.map(str::to_string),
        explanation: None,
        score,
        priority: 1,
        enabled: true,
    }
}

/// `n` single choice questions, ids starting at `first_id`. The answer is
/// always "A" (Paris).
pub fn single_choices(first_id: i64, n: i64) -> Vec<Question> {
    (first_id..first_id + n)
        .map(|id| question(id, QuestionType::SingleChoice, Some("A"), &["Paris", "London", "Rome"], 5))
        .collect()
}

/// `n` essay questions worth 10 points each, ids starting at `first_id`.
pub fn essays(first_id: i64, n: i64) -> Vec<Question> {
    (first_id..first_id + n)
        .map(|id| question(id, QuestionType::Essay, None, &[], 10))
        .collect()
}

pub struct Harness {
    pub services: Services,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(bank: Vec<Question>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(MemoryCatalog::new(bank));
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let services = Services::new(store.clone(), catalog.clone(), clock.clone(), 60);
    Harness { services, store, catalog, clock }
}
