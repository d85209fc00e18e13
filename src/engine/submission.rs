// src/engine/submission.rs

//! SubmissionCoordinator: accepts answers, snapshots the question, grades
//! and persists.
//!
//! Re-submitting an answered question is a no-op that returns the stored
//! record. The store's (session, question) uniqueness makes this hold under
//! concurrent duplicates too. The store rechecks the session's status and
//! deadline under its lock, so an answer racing a finish or a timeout is
//! refused rather than written into a closed session.

use std::{collections::HashSet, sync::Arc};

use crate::{
    engine::{
        clock::Clock,
        error::QuizError,
        grading::{grade_question, grade_record},
        session::SessionMachine,
    },
    models::{
        answer_record::{
            AnswerInput, AnswerRecord, AnswerRecordDetail, AnswerStats, AutoScore, InsertOutcome,
            NewAnswerRecord,
        },
        question::{PublicQuestion, Question},
        session::{Session, SessionStatus},
    },
    store::{QuestionCatalog, Store, StoreError},
};

#[derive(Clone)]
pub struct SubmissionCoordinator {
    sessions: SessionMachine,
    store: Arc<dyn Store>,
    catalog: Arc<dyn QuestionCatalog>,
    clock: Arc<dyn Clock>,
}

impl SubmissionCoordinator {
    pub fn new(
        sessions: SessionMachine,
        store: Arc<dyn Store>,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        SubmissionCoordinator { sessions, store, catalog, clock }
    }

    /// The caller's session, checked to be accepting answers right now.
    async fn open_session(&self, code: &str, user_id: i64) -> Result<Session, QuizError> {
        let session = self.sessions.session_for(code, user_id).await?;
        match session.status {
            SessionStatus::InProgress => Ok(session),
            SessionStatus::TimedOut => Err(QuizError::SessionTimeout(session.session_code)),
            status => Err(QuizError::SessionFinished { status }),
        }
    }

    async fn question(&self, id: i64) -> Result<Question, QuizError> {
        self.catalog
            .question_by_id(id)
            .await?
            .ok_or(QuizError::QuestionNotFound(id))
    }

    /// Grades and stores one answer for the caller's session.
    pub async fn submit(&self, code: &str, user_id: i64, input: &AnswerInput) -> Result<AnswerRecord, QuizError> {
        check_input(input)?;
        let session = self.open_session(code, user_id).await?;

        if let Some(existing) = self.store.answer_record_for(session.id, input.question_id).await? {
            tracing::debug!(
                "Question {} already answered in session {}, returning stored record",
                input.question_id,
                session.session_code
            );
            return Ok(existing);
        }

        let question = self.question(input.question_id).await?;
        let outcome = self.record_answer(&session, &question, input).await?;
        Ok(outcome.into_record())
    }

    /// Submits answers in order. The session and every question are checked
    /// before the first record is written.
    pub async fn submit_batch(
        &self,
        code: &str,
        user_id: i64,
        inputs: &[AnswerInput],
    ) -> Result<Vec<AnswerRecord>, QuizError> {
        if inputs.is_empty() {
            return Err(QuizError::InvalidArgument("no answers submitted".to_string()));
        }
        for input in inputs {
            check_input(input)?;
        }

        let session = self.open_session(code, user_id).await?;

        let mut questions = Vec::with_capacity(inputs.len());
        for input in inputs {
            questions.push(self.question(input.question_id).await?);
        }

        let mut records = Vec::with_capacity(inputs.len());
        let mut inserted = 0;
        for (input, question) in inputs.iter().zip(&questions) {
            let outcome = self.record_answer(&session, question, input).await?;
            if matches!(outcome, InsertOutcome::Inserted(_)) {
                inserted += 1;
            }
            records.push(outcome.into_record());
        }

        tracing::info!(
            "Batch of {} answers for session {}: {} new",
            inputs.len(),
            session.session_code,
            inserted
        );
        Ok(records)
    }

    /// Snapshots `question`, grades the answer and inserts the record.
    async fn record_answer(
        &self,
        session: &Session,
        question: &Question,
        input: &AnswerInput,
    ) -> Result<InsertOutcome, QuizError> {
        if !session.question_ids.0.contains(&question.id) {
            tracing::warn!(
                "Session {} received an answer to question {}, which it was not assigned",
                session.session_code,
                question.id
            );
        }

        let user_answer = input.raw_answer();
        let verdict = grade_question(question, &user_answer)?;

        let new = NewAnswerRecord {
            session_id: session.id,
            question_id: question.id,
            question_type: question.question_type,
            question_content: format!("{}\n{}", question.title, question.content),
            question_options: question.options.0.clone(),
            correct_answer: question.correct_answer.clone(),
            max_score: question.score,
            user_answer,
            is_correct: verdict.is_correct,
            auto_score: verdict.score,
            time_spent_seconds: input.time_spent_seconds,
            answered_at: self.clock.now(),
        };

        let outcome = match self.store.insert_answer_record(new).await {
            Ok(outcome) => outcome,
            Err(StoreError::SessionClosed(SessionStatus::TimedOut)) => {
                return Err(QuizError::SessionTimeout(session.session_code.clone()));
            }
            Err(StoreError::SessionClosed(status)) => return Err(QuizError::SessionFinished { status }),
            Err(StoreError::SessionExpired) => {
                self.sessions.expire_if_due(session.clone()).await?;
                return Err(QuizError::SessionTimeout(session.session_code.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        if let InsertOutcome::Inserted(record) = &outcome {
            tracing::info!(
                "Session {} answer #{} for question {}: correct={:?}, score={}",
                session.session_code,
                record.sequence_number,
                record.question_id,
                record.is_correct,
                record.auto_score
            );
        }
        Ok(outcome)
    }

    /// The first assigned question the caller has not answered yet.
    pub async fn next_question(&self, code: &str, user_id: i64) -> Result<PublicQuestion, QuizError> {
        let session = self.open_session(code, user_id).await?;
        let answered: HashSet<i64> = self
            .store
            .answer_records_for_session(session.id)
            .await?
            .into_iter()
            .map(|r| r.question_id)
            .collect();

        if answered.len() as i32 >= session.total_count {
            return Err(QuizError::AllQuestionsCompleted {
                answered: answered.len(),
                total: session.total_count,
            });
        }

        for id in session.question_ids.0.iter().filter(|id| !answered.contains(*id)) {
            match self.catalog.question_by_id(*id).await? {
                Some(question) => return Ok(question.into()),
                None => tracing::warn!(
                    "Assigned question {} of session {} is gone from the bank",
                    id,
                    session.session_code
                ),
            }
        }
        Err(QuizError::NoMoreQuestions)
    }

    /// Re-grades every objective answer of a session from its stored
    /// snapshot. Manual scores are left alone. Returns how many records
    /// changed.
    pub async fn batch_auto_score(&self, session_id: i64) -> Result<usize, QuizError> {
        let session = self
            .store
            .session_by_id(session_id)
            .await?
            .ok_or_else(|| QuizError::SessionNotFound(session_id.to_string()))?;

        let mut changes = Vec::new();
        for record in self.store.answer_records_for_session(session.id).await? {
            if record.is_manually_graded() {
                continue;
            }
            let verdict = grade_record(&record)?;
            if verdict.is_correct != record.is_correct || verdict.score != record.auto_score {
                changes.push(AutoScore {
                    record_id: record.id,
                    is_correct: verdict.is_correct,
                    auto_score: verdict.score,
                });
            }
        }

        let session = self.store.rescore_records(session.id, &changes).await?;
        tracing::info!(
            "Auto-scored session {} again: {} records changed, final score {}",
            session.session_code,
            changes.len(),
            session.final_score
        );
        Ok(changes.len())
    }

    /// The caller's answer records, in submission order.
    pub async fn records_for_session(&self, code: &str, user_id: i64) -> Result<Vec<AnswerRecord>, QuizError> {
        let session = self.sessions.session_for(code, user_id).await?;
        Ok(self.store.answer_records_for_session(session.id).await?)
    }

    /// Answer counts of the caller's session.
    pub async fn answer_stats(&self, code: &str, user_id: i64) -> Result<AnswerStats, QuizError> {
        let session = self.sessions.session_for(code, user_id).await?;
        self.answer_stats_by_id(session.id).await
    }

    /// Answer counts of any session, for graders.
    pub async fn answer_stats_by_id(&self, session_id: i64) -> Result<AnswerStats, QuizError> {
        let records = self.store.answer_records_for_session(session_id).await?;
        if records.is_empty() && self.store.session_by_id(session_id).await?.is_none() {
            return Err(QuizError::SessionNotFound(session_id.to_string()));
        }
        Ok(AnswerStats::of(session_id, &records))
    }

    /// One answer record with every grade given to it, newest grade first.
    pub async fn record_detail(&self, record_id: i64) -> Result<AnswerRecordDetail, QuizError> {
        let record = self
            .store
            .answer_record(record_id)
            .await?
            .ok_or(QuizError::AnswerRecordNotFound(record_id))?;
        let scoring_records = self.store.scoring_records_for_answer(record.id).await?;
        Ok(AnswerRecordDetail { record, scoring_records })
    }
}

fn check_input(input: &AnswerInput) -> Result<(), QuizError> {
    if input.time_spent_seconds < 0 {
        return Err(QuizError::InvalidArgument(format!(
            "time spent on question {} is negative",
            input.question_id
        )));
    }
    Ok(())
}
