// src/models/answer_record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::models::{question::QuestionType, scoring_record::ScoringRecord};

/// Represents the 'answer_records' table in the database.
///
/// The `question_*`, `correct_answer` and `max_score` columns are a snapshot
/// taken at submission time. Later edits to the bank never change them.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AnswerRecord {
    pub id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub question_type: i16,

    /// Title and content joined by a newline.
    pub question_content: String,
    pub question_options: Json<Vec<String>>,
    pub correct_answer: Option<String>,
    /// Point value of the question when it was answered.
    pub max_score: i32,

    /// The submitted answer before any type-specific parsing.
    pub user_answer: String,

    /// `None` for types that are never auto-graded.
    pub is_correct: Option<bool>,
    pub auto_score: i32,
    pub manual_score: Option<i32>,
    pub final_score: i32,

    pub time_spent_seconds: i32,
    /// 1-based submission order within the session.
    pub sequence_number: i32,
    pub answered_at: DateTime<Utc>,
}

impl AnswerRecord {
    /// Whether this answer waits for a human grader. Unknown type codes never do.
    pub fn is_manually_graded(&self) -> bool {
        QuestionType::try_from(self.question_type)
            .map(QuestionType::is_manually_graded)
            .unwrap_or(false)
    }
}

/// Values for an answer record about to be inserted. The store assigns
/// `id` and `sequence_number`.
#[derive(Debug, Clone)]
pub struct NewAnswerRecord {
    pub session_id: i64,
    pub question_id: i64,
    pub question_type: i16,
    pub question_content: String,
    pub question_options: Vec<String>,
    pub correct_answer: Option<String>,
    pub max_score: i32,
    pub user_answer: String,
    pub is_correct: Option<bool>,
    pub auto_score: i32,
    pub time_spent_seconds: i32,
    pub answered_at: DateTime<Utc>,
}

/// Result of an insert that may collide with an existing (session, question) row.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(AnswerRecord),
    Existing(AnswerRecord),
}

impl InsertOutcome {
    pub fn into_record(self) -> AnswerRecord {
        match self {
            InsertOutcome::Inserted(r) | InsertOutcome::Existing(r) => r,
        }
    }
}

/// A fresh automatic grade for a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoScore {
    pub record_id: i64,
    pub is_correct: Option<bool>,
    pub auto_score: i32,
}

/// Answer counts of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerStats {
    pub session_id: i64,
    pub total_count: usize,
    /// Answers that need a human grader.
    pub subjective_count: usize,
    /// Subjective answers that have a manual score.
    pub scored_count: usize,
    pub total_score: i32,
}

impl AnswerStats {
    pub fn of(session_id: i64, records: &[AnswerRecord]) -> Self {
        let subjective: Vec<&AnswerRecord> =
            records.iter().filter(|r| r.is_manually_graded()).collect();
        AnswerStats {
            session_id,
            total_count: records.len(),
            subjective_count: subjective.len(),
            scored_count: subjective.iter().filter(|r| r.manual_score.is_some()).count(),
            total_score: records.iter().map(|r| r.final_score).sum(),
        }
    }
}

/// An answer record together with every grade given to it.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecordDetail {
    #[serde(flatten)]
    pub record: AnswerRecord,
    pub scoring_records: Vec<ScoringRecord>,
}

/// One answer in a submission.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnswerInput {
    pub question_id: i64,
    /// Free text, a letter, or a comma separated list of letters.
    #[serde(default)]
    #[validate(length(max = 10000))]
    pub user_answer: Option<String>,
    /// Multi-select answers as a list; joined with commas when present.
    #[serde(default)]
    pub user_answer_list: Option<Vec<String>>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub time_spent_seconds: i32,
}

impl AnswerInput {
    pub fn new(question_id: i64, answer: impl Into<String>, time_spent_seconds: i32) -> Self {
        AnswerInput {
            question_id,
            user_answer: Some(answer.into()),
            user_answer_list: None,
            time_spent_seconds,
        }
    }

    /// The raw answer string stored on the record.
    pub fn raw_answer(&self) -> String {
        match &self.user_answer_list {
            Some(list) if !list.is_empty() => list.join(","),
            _ => self.user_answer.clone().unwrap_or_default(),
        }
    }
}

/// DTO for submitting several answers at once.
#[derive(Debug, Deserialize, Validate)]
pub struct BatchSubmitRequest {
    #[validate(length(min = 1, max = 200), nested)]
    pub answers: Vec<AnswerInput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_list_wins_over_text() {
        let input = AnswerInput {
            question_id: 1,
            user_answer: Some("ignored".to_string()),
            user_answer_list: Some(vec!["A".to_string(), "C".to_string()]),
            time_spent_seconds: 3,
        };
        assert_eq!(input.raw_answer(), "A,C");
    }

    #[test]
    fn missing_answer_is_empty() {
        let input = AnswerInput {
            question_id: 1,
            user_answer: None,
            user_answer_list: Some(Vec::new()),
            time_spent_seconds: 0,
        };
        assert_eq!(input.raw_answer(), "");
    }
}
