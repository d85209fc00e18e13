// src/models/scoring_record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'scoring_records' table: one manual grading action.
///
/// Unique per (answer record, grader).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ScoringRecord {
    pub id: i64,
    pub answer_record_id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub grader_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub comment: Option<String>,
    pub scored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScoringRecord {
    pub answer_record_id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub grader_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub comment: Option<String>,
    pub scored_at: DateTime<Utc>,
}

/// DTO for grading one answer record.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GradeRequest {
    pub answer_record_id: i64,
    #[validate(range(min = 0))]
    pub score: i32,
    #[validate(range(min = 1))]
    pub max_score: i32,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

/// DTO for changing an existing grade.
#[derive(Debug, Deserialize, Validate)]
pub struct RegradeRequest {
    #[validate(range(min = 0))]
    pub score: i32,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchGradeRequest {
    #[validate(length(min = 1, max = 100), nested)]
    pub items: Vec<GradeRequest>,
}

/// Query parameters for paging through records awaiting a grader.
#[derive(Debug, Deserialize)]
pub struct PendingParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Filters for grading statistics. Both are optional.
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub session_id: Option<i64>,
    pub grader_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnscoredParams {
    /// Restrict to answers this grader has not scored yet.
    pub grader_id: Option<i64>,
}

/// Aggregates over a set of scoring records.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ScoringStats {
    pub total_count: i64,
    pub average_score: Option<f64>,
    pub highest_score: Option<i32>,
    pub lowest_score: Option<i32>,
}

/// A scoring record with the answer it grades.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringRecordDetail {
    #[serde(flatten)]
    pub scoring: ScoringRecord,
    /// Owner of the graded session.
    pub user_id: i64,
    pub question_content: String,
    pub user_answer: String,
}
