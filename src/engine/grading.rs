// src/engine/grading.rs

//! Stateless answer comparison, one rule per question type.
//!
//! Nothing here touches storage. Every function can be replayed on a stored
//! snapshot and gives the same verdict.

use std::collections::BTreeSet;

use crate::{
    config::FILL_BLANK_TOLERANCE,
    engine::error::QuizError,
    models::{
        answer_record::AnswerRecord,
        question::{Question, QuestionType},
    },
};

/// Outcome of grading one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// `None` when the type is never auto-graded.
    pub is_correct: Option<bool>,
    pub score: i32,
}

impl Verdict {
    fn ungraded() -> Self {
        Verdict { is_correct: None, score: 0 }
    }

    fn judged(correct: bool, points: i32) -> Self {
        Verdict {
            is_correct: Some(correct),
            score: if correct { points } else { 0 },
        }
    }
}

/// What an answer is compared against.
#[derive(Debug, Clone, Copy)]
pub struct AnswerKey<'a> {
    pub reference: Option<&'a str>,
    pub options: &'a [String],
    pub points: i32,
}

/// Grades `submitted` for a raw question type code.
///
/// Unknown codes are a defect in the bank and fail with
/// `UnsupportedQuestionType` instead of scoring zero.
pub fn grade(question_type: i16, submitted: &str, key: AnswerKey<'_>) -> Result<Verdict, QuizError> {
    let kind = QuestionType::try_from(question_type)?;
    Ok(grade_kind(kind, submitted, key))
}

/// Grades a fresh submission against the live bank question.
pub fn grade_question(question: &Question, submitted: &str) -> Result<Verdict, QuizError> {
    grade(
        question.question_type,
        submitted,
        AnswerKey {
            reference: question.correct_answer.as_deref(),
            options: &question.options.0,
            points: question.score,
        },
    )
}

/// Re-grades a stored record from its own snapshot.
pub fn grade_record(record: &AnswerRecord) -> Result<Verdict, QuizError> {
    grade(
        record.question_type,
        &record.user_answer,
        AnswerKey {
            reference: record.correct_answer.as_deref(),
            options: &record.question_options.0,
            points: record.max_score,
        },
    )
}

pub fn grade_kind(kind: QuestionType, submitted: &str, key: AnswerKey<'_>) -> Verdict {
    let compare: fn(&str, &str, &[String]) -> bool = match kind {
        QuestionType::Essay => return Verdict::ungraded(),
        QuestionType::SingleChoice | QuestionType::Rating => single_choice_matches,
        QuestionType::MultipleChoice => multi_choice_matches,
        QuestionType::FillBlank => fill_blank_matches,
    };

    let reference = key.reference.unwrap_or("");
    let correct = !submitted.trim().is_empty()
        && !reference.trim().is_empty()
        && compare(submitted, reference, key.options);

    Verdict::judged(correct, key.points)
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Resolves a letter ("b") or an option text ("London") to an option index.
fn option_index(value: &str, options: &[String]) -> Option<usize> {
    let value = value.trim();
    let mut chars = value.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            let index = (c.to_ascii_uppercase() as u8 - b'A') as usize;
            if index < options.len() {
                return Some(index);
            }
        }
    }

    let wanted = normalize(value);
    options.iter().position(|option| normalize(option) == wanted)
}

fn single_choice_matches(submitted: &str, reference: &str, options: &[String]) -> bool {
    if normalize(submitted) == normalize(reference) {
        return true;
    }
    match (option_index(submitted, options), option_index(reference, options)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn split_choices(value: &str) -> Vec<&str> {
    value
        .split([',', '，'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

fn multi_choice_matches(submitted: &str, reference: &str, options: &[String]) -> bool {
    let submitted = split_choices(submitted);
    let reference = split_choices(reference);
    if submitted.is_empty() || reference.is_empty() {
        return false;
    }

    let direct = |parts: &[&str]| parts.iter().map(|p| normalize(p)).collect::<BTreeSet<_>>();
    if direct(&submitted) == direct(&reference) {
        return true;
    }

    // Mixed letters and option texts: compare by option index.
    let indexed = |parts: &[&str]| {
        parts
            .iter()
            .map(|p| option_index(p, options))
            .collect::<Option<BTreeSet<_>>>()
    };
    match (indexed(&submitted), indexed(&reference)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Delimiters separating alternative (or multi-part) blank answers.
const BLANK_DELIMITERS: [char; 7] = [',', ';', '|', '，', '；', '、', '｜'];

fn split_blanks(value: &str) -> Vec<String> {
    value
        .split(BLANK_DELIMITERS)
        .map(normalize)
        .filter(|part| !part.is_empty())
        .collect()
}

fn numbers_match(a: &str, b: &str) -> bool {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => (x - y).abs() <= FILL_BLANK_TOLERANCE,
        _ => false,
    }
}

fn fill_blank_matches(submitted: &str, reference: &str, _options: &[String]) -> bool {
    let answer = normalize(submitted);
    if answer == normalize(reference) {
        return true;
    }

    let accepted = split_blanks(reference);
    if accepted.len() > 1 {
        if accepted.contains(&answer) {
            return true;
        }
        let parts = split_blanks(submitted);
        if parts.len() > 1 {
            let given: BTreeSet<_> = parts.iter().collect();
            let expected: BTreeSet<_> = accepted.iter().collect();
            if given == expected {
                return true;
            }
        }
    }

    numbers_match(&answer, reference) || accepted.iter().any(|alt| numbers_match(&answer, alt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn check(kind: QuestionType, submitted: &str, reference: &str, options: &[String]) -> Option<bool> {
        grade_kind(
            kind,
            submitted,
            AnswerKey { reference: Some(reference), options, points: 5 },
        )
        .is_correct
    }

    #[test]
    fn single_choice_letter_or_text() {
        let options = opts(&["Paris", "London", "Rome"]);
        assert_eq!(check(QuestionType::SingleChoice, "Paris", "A", &options), Some(true));
        assert_eq!(check(QuestionType::SingleChoice, "a", "Paris", &options), Some(true));
        assert_eq!(check(QuestionType::SingleChoice, " london ", "B", &options), Some(true));
        assert_eq!(check(QuestionType::SingleChoice, "C", "A", &options), Some(false));
        assert_eq!(check(QuestionType::SingleChoice, "Berlin", "A", &options), Some(false));
    }

    #[test]
    fn single_choice_letter_outside_options_does_not_resolve() {
        let options = opts(&["Paris", "London"]);
        assert_eq!(check(QuestionType::SingleChoice, "D", "A", &options), Some(false));
    }

    #[test]
    fn rating_is_graded_like_single_choice() {
        let options = opts(&["Poor", "Fair", "Good"]);
        assert_eq!(check(QuestionType::Rating, "good", "C", &options), Some(true));
    }

    #[test]
    fn multi_choice_ignores_order() {
        let options = opts(&["1", "2", "3", "4"]);
        assert_eq!(check(QuestionType::MultipleChoice, "C,A", "A,C", &options), Some(true));
        assert_eq!(check(QuestionType::MultipleChoice, "c, a", "A,C", &options), Some(true));
    }

    #[test]
    fn multi_choice_duplicates_do_not_fill_missing_items() {
        let options = opts(&["x", "y", "z"]);
        assert_eq!(check(QuestionType::MultipleChoice, "C,A,A", "A,B,C", &options), Some(false));
        assert_eq!(check(QuestionType::MultipleChoice, "A", "A,C", &options), Some(false));
    }

    #[test]
    fn multi_choice_mixes_letters_and_text() {
        let options = opts(&["Red", "Green", "Blue"]);
        assert_eq!(check(QuestionType::MultipleChoice, "Red,C", "A,C", &options), Some(true));
        assert_eq!(check(QuestionType::MultipleChoice, "Red,Blue", "A,B", &options), Some(false));
    }

    #[test]
    fn fill_blank_rules() {
        let none: Vec<String> = Vec::new();
        assert_eq!(check(QuestionType::FillBlank, " Hello ", "hello", &none), Some(true));
        assert_eq!(check(QuestionType::FillBlank, "colour", "color;colour", &none), Some(true));
        assert_eq!(check(QuestionType::FillBlank, "北京", "北京、Beijing", &none), Some(true));
        assert_eq!(check(QuestionType::FillBlank, "b, a", "a|b", &none), Some(true));
        assert_eq!(check(QuestionType::FillBlank, "c", "a|b", &none), Some(false));
    }

    #[test]
    fn fill_blank_numeric_tolerance() {
        let none: Vec<String> = Vec::new();
        assert_eq!(check(QuestionType::FillBlank, "3", "3.0", &none), Some(true));
        assert_eq!(check(QuestionType::FillBlank, "3.10", "3.1", &none), Some(true));
        assert_eq!(check(QuestionType::FillBlank, "3.1", "3.0", &none), Some(false));
    }

    #[test]
    fn essay_is_never_auto_graded() {
        let verdict = grade_kind(
            QuestionType::Essay,
            "a long answer",
            AnswerKey { reference: Some("anything"), options: &[], points: 10 },
        );
        assert_eq!(verdict, Verdict { is_correct: None, score: 0 });
    }

    #[test]
    fn correct_answer_earns_points() {
        let options = opts(&["Yes", "No"]);
        let key = AnswerKey { reference: Some("A"), options: &options, points: 4 };
        assert_eq!(grade(1, "yes", key).unwrap(), Verdict { is_correct: Some(true), score: 4 });
        assert_eq!(grade(1, "no", key).unwrap(), Verdict { is_correct: Some(false), score: 0 });
    }

    #[test]
    fn blank_submission_is_wrong() {
        let key = AnswerKey { reference: Some("A"), options: &[], points: 4 };
        assert_eq!(grade(1, "   ", key).unwrap().is_correct, Some(false));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let key = AnswerKey { reference: Some("A"), options: &[], points: 1 };
        assert!(matches!(grade(42, "A", key), Err(QuizError::UnsupportedQuestionType(42))));
    }
}
