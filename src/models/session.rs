// src/models/session.rs

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::{FromRow, types::Json};
use validator::Validate;

use crate::{engine::error::QuizError, models::answer_record::AnswerRecord};

/// Lifecycle status of an answer session. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i16)]
pub enum SessionStatus {
    NotStarted = 0,
    InProgress = 1,
    Completed = 2,
    TimedOut = 3,
    Abandoned = 4,
    AbnormalExit = 5,
}

impl SessionStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    /// Terminal statuses stamp `ended_at`. `AbnormalExit` counts as terminal
    /// even though it may be resumed once.
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::NotStarted | SessionStatus::InProgress)
    }

    /// The regular transition table. Force-complete bypasses it.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (NotStarted, InProgress)
                | (InProgress, Completed)
                | (InProgress, TimedOut)
                | (InProgress, Abandoned)
                | (InProgress, AbnormalExit)
                | (AbnormalExit, InProgress)
                | (AbnormalExit, TimedOut)
        )
    }
}

impl TryFrom<i16> for SessionStatus {
    type Error = QuizError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        use SessionStatus::*;
        [NotStarted, InProgress, Completed, TimedOut, Abandoned, AbnormalExit]
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| QuizError::InvalidArgument(format!("unknown session status {code}")))
    }
}

impl Serialize for SessionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.code())
    }
}

/// How much manual grading a session still needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i16)]
pub enum ScoringStatus {
    None = 0,
    Partial = 1,
    Complete = 2,
}

impl ScoringStatus {
    pub fn code(self) -> i16 {
        self as i16
    }
}

impl Serialize for ScoringStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.code())
    }
}

/// Represents the 'answer_sessions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Session {
    pub id: i64,

    /// Opaque, globally unique code handed to clients.
    pub session_code: String,

    pub user_id: i64,

    /// Question types requested at start.
    pub question_types: Json<Vec<i16>>,

    /// Assigned question ids, fixed at creation.
    pub question_ids: Json<Vec<i64>>,

    /// Planned number of questions. Always equals `question_ids.len()`.
    pub total_count: i32,

    pub timeout_minutes: i32,

    /// Theoretical maximum: sum of the assigned questions' point values.
    pub total_score: i32,

    pub auto_score: i32,

    /// `None` until any manual grading has happened.
    pub manual_score: Option<i32>,

    /// Always the sum of the session's answer records' final scores.
    pub final_score: i32,

    pub status: SessionStatus,

    pub scoring_status: ScoringStatus,

    /// Set once the session has come back from `AbnormalExit`.
    pub resumed: bool,

    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds()
    }

    pub fn timeout_seconds(&self) -> i64 {
        i64::from(self.timeout_minutes) * 60
    }

    /// Elapsed time strictly exceeds the timeout budget.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_seconds(now) > self.timeout_seconds()
    }
}

/// Values for a session about to be inserted.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_code: String,
    pub user_id: i64,
    pub question_types: Vec<i16>,
    pub question_ids: Vec<i64>,
    pub timeout_minutes: i32,
    pub total_score: i32,
    pub started_at: DateTime<Utc>,
}

/// Recomputed score columns written back to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTotals {
    pub auto_score: i32,
    pub manual_score: Option<i32>,
    pub final_score: i32,
    pub scoring_status: ScoringStatus,
}

impl SessionTotals {
    /// Folds a session's answer records into its score columns.
    ///
    /// `graded` holds the ids of answer records with at least one scoring
    /// record.
    pub fn tally(records: &[AnswerRecord], graded: &HashSet<i64>) -> Self {
        let auto_score: i32 = records.iter().map(|r| r.auto_score).sum();
        let final_score: i32 = records.iter().map(|r| r.final_score).sum();
        let manual_score = records
            .iter()
            .filter_map(|r| r.manual_score)
            .reduce(|a, b| a + b);

        let manual: Vec<&AnswerRecord> = records.iter().filter(|r| r.is_manually_graded()).collect();
        let scoring_status = if manual.is_empty() {
            ScoringStatus::None
        } else if manual.iter().all(|r| graded.contains(&r.id)) {
            ScoringStatus::Complete
        } else {
            ScoringStatus::Partial
        };

        SessionTotals { auto_score, manual_score, final_score, scoring_status }
    }
}

/// Progress snapshot for the answering client.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusView {
    pub session_code: String,
    pub status: SessionStatus,
    pub scoring_status: ScoringStatus,
    pub total_questions: i32,
    pub answered: i32,
    pub remaining_seconds: i64,
    pub timeout_minutes: i32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// DTO for starting a session.
#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, max = 5, message = "Pick between 1 and 5 question types."))]
    pub question_types: Vec<i16>,
    #[validate(range(min = 1, max = 200))]
    pub question_count: i32,
    #[validate(range(min = 1, max = 1440))]
    pub timeout_minutes: Option<i32>,
}

/// DTO for extending a session's time budget.
#[derive(Debug, Deserialize)]
pub struct ExtendSessionRequest {
    pub minutes: i32,
}

/// DTO for an elevated status change. `status` is the raw code.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: i16,
}

/// Query parameters for listing sessions. Every filter is optional.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SessionFilter {
    pub user_id: Option<i64>,
    /// Raw status code.
    pub status: Option<i16>,
    pub started_from: Option<DateTime<Utc>>,
    pub started_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A checked [`SessionFilter`], as handed to the store. Newest first.
#[derive(Debug, Clone)]
pub struct SessionQuery {
    pub user_id: Option<i64>,
    pub status: Option<SessionStatus>,
    /// Inclusive.
    pub started_from: Option<DateTime<Utc>>,
    /// Exclusive.
    pub started_to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl SessionQuery {
    pub fn matches(&self, session: &Session) -> bool {
        self.user_id.is_none_or(|id| session.user_id == id)
            && self.status.is_none_or(|status| session.status == status)
            && self.started_from.is_none_or(|from| session.started_at >= from)
            && self.started_to.is_none_or(|to| session.started_at < to)
    }
}

/// One user's session history in numbers.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct UserStats {
    pub total_sessions: i64,
    pub completed: i64,
    pub in_progress: i64,
    pub timed_out: i64,
    pub abandoned: i64,
    /// Over completed sessions only.
    pub average_final_score: Option<f64>,
    pub best_final_score: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;
    use SessionStatus::*;

    #[test]
    fn status_codes_are_stable() {
        let codes: Vec<i16> = [NotStarted, InProgress, Completed, TimedOut, Abandoned, AbnormalExit]
            .into_iter()
            .map(SessionStatus::code)
            .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(ScoringStatus::None.code(), 0);
        assert_eq!(ScoringStatus::Partial.code(), 1);
        assert_eq!(ScoringStatus::Complete.code(), 2);
    }

    #[test]
    fn in_progress_reaches_every_terminal_state() {
        for next in [Completed, TimedOut, Abandoned, AbnormalExit] {
            assert!(InProgress.can_transition_to(next), "{next:?}");
        }
    }

    #[test]
    fn final_states_never_move() {
        for from in [Completed, TimedOut, Abandoned] {
            for to in [NotStarted, InProgress, Completed, TimedOut, Abandoned, AbnormalExit] {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn abnormal_exit_can_resume() {
        assert!(AbnormalExit.can_transition_to(InProgress));
        assert!(!AbnormalExit.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(NotStarted));
    }

    #[test]
    fn status_serializes_as_code() {
        let json = serde_json::to_string(&TimedOut).unwrap();
        assert_eq!(json, "3");
    }

    fn record(id: i64, question_type: QuestionType, auto: i32, manual: Option<i32>) -> AnswerRecord {
        AnswerRecord {
            id,
            session_id: 1,
            question_id: id,
            question_type: question_type.code(),
            question_content: String::new(),
            question_options: Json(Vec::new()),
            correct_answer: None,
            max_score: 10,
            user_answer: "x".to_string(),
            is_correct: None,
            auto_score: auto,
            manual_score: manual,
            final_score: auto + manual.unwrap_or(0),
            time_spent_seconds: 0,
            sequence_number: id as i32,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn no_essays_means_no_scoring() {
        let records = vec![record(1, QuestionType::SingleChoice, 5, None)];
        let totals = SessionTotals::tally(&records, &HashSet::new());
        assert_eq!(totals.scoring_status, ScoringStatus::None);
        assert_eq!(totals.manual_score, None);
        assert_eq!(totals.final_score, 5);
    }

    #[test]
    fn partial_until_every_essay_is_graded() {
        let records = vec![
            record(1, QuestionType::Essay, 0, Some(7)),
            record(2, QuestionType::Essay, 0, None),
            record(3, QuestionType::FillBlank, 3, None),
        ];
        let graded: HashSet<i64> = [1].into_iter().collect();
        let totals = SessionTotals::tally(&records, &graded);
        assert_eq!(totals.scoring_status, ScoringStatus::Partial);
        assert_eq!(totals.auto_score, 3);
        assert_eq!(totals.manual_score, Some(7));
        assert_eq!(totals.final_score, 10);

        let graded: HashSet<i64> = [1, 2].into_iter().collect();
        assert_eq!(SessionTotals::tally(&records, &graded).scoring_status, ScoringStatus::Complete);
    }

    #[test]
    fn unknown_status_codes_are_rejected() {
        assert_eq!(SessionStatus::try_from(5).unwrap(), AbnormalExit);
        assert!(matches!(SessionStatus::try_from(9), Err(QuizError::InvalidArgument(_))));
    }
}
