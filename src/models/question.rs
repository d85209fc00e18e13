// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::engine::error::QuizError;

/// Question type codes. The numeric values are part of the external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionType {
    SingleChoice = 1,
    MultipleChoice = 2,
    FillBlank = 3,
    Essay = 4,
    /// Graded exactly like a single choice question.
    Rating = 5,
}

impl QuestionType {
    pub const ALL: [QuestionType; 5] = [
        QuestionType::SingleChoice,
        QuestionType::MultipleChoice,
        QuestionType::FillBlank,
        QuestionType::Essay,
        QuestionType::Rating,
    ];

    pub fn code(self) -> i16 {
        self as i16
    }

    /// Whether answers of this type are scored by a human grader instead of
    /// the grading engine.
    pub fn is_manually_graded(self) -> bool {
        matches!(self, QuestionType::Essay)
    }

    pub fn label(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::FillBlank => "fill_blank",
            QuestionType::Essay => "essay",
            QuestionType::Rating => "rating",
        }
    }
}

impl TryFrom<i16> for QuestionType {
    type Error = QuizError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        QuestionType::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(QuizError::UnsupportedQuestionType(code))
    }
}

/// Represents the 'questions' table in the database.
///
/// The bank is owned outside the engine; sessions only read it through
/// [`crate::store::QuestionCatalog`].
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub title: String,

    /// Longer description shown under the title. May be empty.
    pub content: String,

    /// Raw type code. Kept raw so that a bad code in the bank surfaces as
    /// `UnsupportedQuestionType` at grading time instead of a decode error.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub question_type: i16,

    /// Option texts, in letter order (index 0 is "A").
    pub options: Json<Vec<String>>,

    /// Reference answer. `None` for essay questions.
    pub correct_answer: Option<String>,

    pub explanation: Option<String>,

    /// Points awarded for a correct answer.
    pub score: i32,

    /// Sampling weight, at least 1.
    pub priority: i32,

    pub enabled: bool,
}

impl Question {
    pub fn kind(&self) -> Result<QuestionType, QuizError> {
        QuestionType::try_from(self.question_type)
    }
}

/// DTO for sending a question to the answering user (no reference answer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: i16,
    pub title: String,
    pub content: String,
    pub options: Vec<String>,
    pub score: i32,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.question_type,
            title: q.title,
            content: q.content,
            options: q.options.0,
            score: q.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_are_stable() {
        assert_eq!(QuestionType::SingleChoice.code(), 1);
        assert_eq!(QuestionType::MultipleChoice.code(), 2);
        assert_eq!(QuestionType::FillBlank.code(), 3);
        assert_eq!(QuestionType::Essay.code(), 4);
        assert_eq!(QuestionType::Rating.code(), 5);
    }

    #[test]
    fn unknown_code_is_unsupported() {
        assert!(matches!(
            QuestionType::try_from(9),
            Err(QuizError::UnsupportedQuestionType(9))
        ));
        assert_eq!(QuestionType::try_from(5).unwrap(), QuestionType::Rating);
    }

    #[test]
    fn only_essay_is_manual() {
        let manual: Vec<_> = QuestionType::ALL
            .into_iter()
            .filter(|t| t.is_manually_graded())
            .collect();
        assert_eq!(manual, vec![QuestionType::Essay]);
    }
}
