// src/engine/error.rs

use thiserror::Error;

use crate::{models::session::SessionStatus, store::StoreError};

/// Broad classes of engine errors, used by the HTTP boundary to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    NotFound,
    Permission,
    Capacity,
    Configuration,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Permission => "permission",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Storage => "storage",
        }
    }
}

/// Every failure the session and grading engine can report.
///
/// None of these are retried internally. Each has a stable numeric code
/// (see [`QuizError::code`]).
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("question {0} not found")]
    QuestionNotFound(i64),

    #[error("answer record {0} not found")]
    AnswerRecordNotFound(i64),

    #[error("scoring record {0} not found")]
    ScoringRecordNotFound(i64),

    #[error("user {user_id} does not own session {session_code}")]
    PermissionDenied { session_code: String, user_id: i64 },

    #[error("scoring record {scoring_record_id} belongs to another grader")]
    ScoringPermissionDenied { scoring_record_id: i64 },

    /// Submission into a session that is no longer accepting answers.
    #[error("session is closed for answers (status {status:?})")]
    SessionFinished { status: SessionStatus },

    /// Finish requested on a session that is not in progress.
    #[error("session already finished (status {status:?})")]
    AlreadyFinished { status: SessionStatus },

    #[error("session {0} has timed out")]
    SessionTimeout(String),

    #[error("session cannot be resumed (status {status:?}, resumed before: {resumed})")]
    CannotResume { status: SessionStatus, resumed: bool },

    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionStatus, to: SessionStatus },

    #[error("only essay answers can be graded manually (question type {question_type})")]
    NotSubjective { question_type: i16 },

    #[error("grader {grader_id} already graded answer record {answer_record_id}")]
    AlreadyGraded { answer_record_id: i64, grader_id: i64 },

    #[error("{remaining} subjective answer(s) still ungraded")]
    ScoringIncomplete { remaining: usize },

    #[error("batch grading stopped at answer record {answer_record_id}: {reason}")]
    ScoringBatchFailed { answer_record_id: i64, reason: String },

    #[error("not enough questions: requested {requested}, available {available}")]
    InsufficientQuestions { requested: i32, available: usize },

    #[error("all {total} questions already answered")]
    AllQuestionsCompleted { answered: usize, total: i32 },

    #[error("no unanswered question could be resolved")]
    NoMoreQuestions,

    #[error("unsupported question type {0}")]
    UnsupportedQuestionType(i16),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl QuizError {
    pub fn kind(&self) -> ErrorKind {
        use QuizError::*;
        match self {
            InvalidArgument(_) => ErrorKind::Validation,
            SessionNotFound(_)
            | QuestionNotFound(_)
            | AnswerRecordNotFound(_)
            | ScoringRecordNotFound(_) => ErrorKind::NotFound,
            PermissionDenied { .. } | ScoringPermissionDenied { .. } => ErrorKind::Permission,
            SessionFinished { .. }
            | AlreadyFinished { .. }
            | SessionTimeout(_)
            | CannotResume { .. }
            | InvalidTransition { .. }
            | NotSubjective { .. }
            | AlreadyGraded { .. }
            | ScoringIncomplete { .. }
            | ScoringBatchFailed { .. } => ErrorKind::StateConflict,
            InsufficientQuestions { .. } | AllQuestionsCompleted { .. } | NoMoreQuestions => {
                ErrorKind::Capacity
            }
            UnsupportedQuestionType(_) => ErrorKind::Configuration,
            Storage(_) => ErrorKind::Storage,
        }
    }

    /// Stable numeric code exposed to clients.
    pub fn code(&self) -> u32 {
        use QuizError::*;
        match self {
            InvalidArgument(_) => 4001,
            QuestionNotFound(_) => 6101,
            UnsupportedQuestionType(_) => 6103,
            SessionNotFound(_) => 6201,
            PermissionDenied { .. } => 6202,
            AlreadyFinished { .. } => 6203,
            SessionTimeout(_) => 6204,
            InsufficientQuestions { .. } => 6206,
            CannotResume { .. } => 6207,
            InvalidTransition { .. } => 6208,
            AnswerRecordNotFound(_) => 6301,
            SessionFinished { .. } => 6303,
            AllQuestionsCompleted { .. } => 6304,
            NoMoreQuestions => 6305,
            ScoringRecordNotFound(_) => 6401,
            ScoringPermissionDenied { .. } => 6402,
            NotSubjective { .. } => 6403,
            AlreadyGraded { .. } => 6404,
            ScoringIncomplete { .. } => 6406,
            ScoringBatchFailed { .. } => 6407,
            Storage(_) => 5001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_scoring_names_the_count() {
        let err = QuizError::ScoringIncomplete { remaining: 1 };
        assert_eq!(err.to_string(), "1 subjective answer(s) still ungraded");
        assert_eq!(err.code(), 6406);
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn capacity_errors_share_a_kind() {
        for err in [
            QuizError::InsufficientQuestions { requested: 10, available: 6 },
            QuizError::AllQuestionsCompleted { answered: 5, total: 5 },
            QuizError::NoMoreQuestions,
        ] {
            assert_eq!(err.kind(), ErrorKind::Capacity);
        }
    }

    #[test]
    fn unsupported_type_is_configuration() {
        assert_eq!(
            QuizError::UnsupportedQuestionType(7).kind(),
            ErrorKind::Configuration
        );
    }
}
