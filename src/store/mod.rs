// src/store/mod.rs

//! Repository contracts consumed by the engine.
//!
//! Each method is one atomic unit of work. Implementations enforce the
//! uniqueness rules the engine relies on:
//! * at most one `InProgress` session per user,
//! * one answer record per (session, question),
//! * one scoring record per (answer record, grader).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    answer_record::{AnswerRecord, AutoScore, InsertOutcome, NewAnswerRecord},
    page::Page,
    question::{Question, QuestionType},
    scoring_record::{NewScoringRecord, ScoringRecord, ScoringStats},
    session::{NewSession, Session, SessionQuery, SessionStatus, UserStats},
};

pub use memory::{MemoryCatalog, MemoryStore};
pub use postgres::{PgCatalog, PgStore};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate row: {0}")]
    Duplicate(String),

    /// A row the write depends on vanished.
    #[error("row not found: {0}")]
    Missing(String),

    /// The session stopped accepting answers before the write got its lock.
    #[error("session is closed (status {0:?})")]
    SessionClosed(SessionStatus),

    /// The session is still marked in progress but its time ran out.
    #[error("session ran out of time")]
    SessionExpired,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of closing the grading phase of a session.
#[derive(Debug, Clone)]
pub enum ScoringCompletion {
    Completed(Session),
    /// Essay answers still without any scoring record.
    Remaining(usize),
}

/// Read contract of the question bank.
#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    /// Up to `count` distinct enabled questions of the given types, drawn at
    /// random weighted by priority. May return fewer than asked for.
    async fn sample_questions(&self, types: &[QuestionType], count: usize) -> StoreResult<Vec<Question>>;

    async fn question_by_id(&self, id: i64) -> StoreResult<Option<Question>>;
}

/// Persistence for sessions, answer records and scoring records.
///
/// Every write that touches a session's answer or scoring records takes the
/// session's lock first and recomputes the session totals before releasing
/// it, so the totals always match the records.
#[async_trait]
pub trait Store: Send + Sync {
    // Sessions

    /// Abandons the user's `InProgress` session, if any, and inserts the new
    /// one. Returns the new session and the abandoned one.
    async fn start_session(&self, new: NewSession) -> StoreResult<(Session, Option<Session>)>;

    async fn session_by_code(&self, code: &str) -> StoreResult<Option<Session>>;

    async fn session_by_id(&self, id: i64) -> StoreResult<Option<Session>>;

    async fn active_session(&self, user_id: i64) -> StoreResult<Option<Session>>;

    /// Newest first.
    async fn find_sessions(&self, query: &SessionQuery) -> StoreResult<Page<Session>>;

    async fn user_stats(&self, user_id: i64) -> StoreResult<UserStats>;

    /// Compare-and-set status change. Returns `None` when the session's
    /// current status is not in `from`. Sets `resumed` when `mark_resumed`.
    /// Moving a session to `InProgress` while its user has another one in
    /// progress fails with `Duplicate`.
    async fn transition_session(
        &self,
        id: i64,
        from: &[SessionStatus],
        to: SessionStatus,
        ended_at: Option<DateTime<Utc>>,
        mark_resumed: bool,
    ) -> StoreResult<Option<Session>>;

    /// Adds minutes to an `InProgress` session's budget. `None` if it is not
    /// in progress.
    async fn extend_session(&self, id: i64, minutes: i32) -> StoreResult<Option<Session>>;

    /// `InProgress` sessions started at or after `since`.
    async fn in_progress_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Session>>;

    // Answer records

    /// Inserts with the next sequence number, or returns the existing row for
    /// the same (session, question). Under the session lock the session must
    /// still be `InProgress` and within its budget at `answered_at`.
    async fn insert_answer_record(&self, new: NewAnswerRecord) -> StoreResult<InsertOutcome>;

    async fn answer_record(&self, id: i64) -> StoreResult<Option<AnswerRecord>>;

    async fn answer_record_for(&self, session_id: i64, question_id: i64) -> StoreResult<Option<AnswerRecord>>;

    /// Ordered by sequence number.
    async fn answer_records_for_session(&self, session_id: i64) -> StoreResult<Vec<AnswerRecord>>;

    /// Rewrites the automatic part of several records (final = auto + manual).
    async fn rescore_records(&self, session_id: i64, scores: &[AutoScore]) -> StoreResult<Session>;

    /// Essay records with no manual score in terminal sessions, oldest first.
    async fn records_needing_scoring(&self, limit: i64, offset: i64) -> StoreResult<Vec<AnswerRecord>>;

    // Scoring records

    /// Inserts the grade and makes it the answer's manual score.
    async fn record_grade(&self, new: NewScoringRecord) -> StoreResult<(ScoringRecord, Session)>;

    /// Changes a grade. The answer's manual score moves by the difference.
    async fn revise_grade(
        &self,
        id: i64,
        score: i32,
        comment: Option<String>,
        scored_at: DateTime<Utc>,
    ) -> StoreResult<(ScoringRecord, Session)>;

    /// Deletes a grade. The answer falls back to its newest remaining grade,
    /// or to no manual score.
    async fn remove_grade(&self, id: i64) -> StoreResult<(ScoringRecord, Session)>;

    /// Marks scoring complete unless an essay answer is still ungraded.
    async fn complete_scoring(&self, session_id: i64) -> StoreResult<ScoringCompletion>;

    async fn scoring_record(&self, id: i64) -> StoreResult<Option<ScoringRecord>>;

    async fn scoring_record_for(&self, answer_record_id: i64, grader_id: i64) -> StoreResult<Option<ScoringRecord>>;

    /// Newest first.
    async fn scoring_records_for_answer(&self, answer_record_id: i64) -> StoreResult<Vec<ScoringRecord>>;

    async fn scoring_records_for_session(&self, session_id: i64) -> StoreResult<Vec<ScoringRecord>>;

    async fn scoring_records_by_grader(&self, grader_id: i64) -> StoreResult<Vec<ScoringRecord>>;

    async fn scoring_stats(&self, session_id: Option<i64>, grader_id: Option<i64>) -> StoreResult<ScoringStats>;
}
