// src/engine/scoring.rs

//! ScoringReconciler: the manual grading phase.
//!
//! Every write goes through one store operation that also rebuilds the
//! session totals under the session lock, so concurrent graders of one
//! session always leave totals equal to the sum of its answer records.

use std::{collections::HashSet, sync::Arc};

use crate::{
    config::DEFAULT_PENDING_LIMIT,
    engine::{clock::Clock, error::QuizError},
    models::{
        answer_record::AnswerRecord,
        question::QuestionType,
        scoring_record::{GradeRequest, NewScoringRecord, ScoringRecord, ScoringRecordDetail, ScoringStats},
        session::Session,
    },
    store::{ScoringCompletion, Store, StoreError},
    utils::html::clean_html,
};

/// Upper bound on one page of pending answers.
const MAX_PENDING_LIMIT: i64 = 200;

fn check_score(score: i32, max_score: i32) -> Result<(), QuizError> {
    if max_score <= 0 {
        return Err(QuizError::InvalidArgument(format!(
            "max score must be positive, got {max_score}"
        )));
    }
    if !(0..=max_score).contains(&score) {
        return Err(QuizError::InvalidArgument(format!(
            "score {score} is outside 0..={max_score}"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ScoringReconciler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ScoringReconciler {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        ScoringReconciler { store, clock }
    }

    /// Records one grader's score for an essay answer.
    pub async fn grade(&self, request: &GradeRequest, grader_id: i64) -> Result<ScoringRecord, QuizError> {
        let record = self.gradable_record(request, grader_id).await?;

        let new = NewScoringRecord {
            answer_record_id: record.id,
            session_id: record.session_id,
            question_id: record.question_id,
            grader_id,
            score: request.score,
            max_score: request.max_score,
            comment: request.comment.as_deref().map(clean_html),
            scored_at: self.clock.now(),
        };
        let (scoring, session) = self.store.record_grade(new).await.map_err(|e| match e {
            StoreError::Duplicate(_) => QuizError::AlreadyGraded {
                answer_record_id: record.id,
                grader_id,
            },
            other => other.into(),
        })?;

        tracing::info!(
            "Grader {} scored answer record {} with {}/{} (session {} now {:?})",
            grader_id,
            record.id,
            request.score,
            request.max_score,
            session.session_code,
            session.scoring_status
        );
        Ok(scoring)
    }

    /// Every precondition of `grade` that does not write anything.
    async fn gradable_record(&self, request: &GradeRequest, grader_id: i64) -> Result<AnswerRecord, QuizError> {
        check_score(request.score, request.max_score)?;

        let record = self
            .store
            .answer_record(request.answer_record_id)
            .await?
            .ok_or(QuizError::AnswerRecordNotFound(request.answer_record_id))?;

        if !QuestionType::try_from(record.question_type)?.is_manually_graded() {
            return Err(QuizError::NotSubjective { question_type: record.question_type });
        }

        if self.store.scoring_record_for(record.id, grader_id).await?.is_some() {
            return Err(QuizError::AlreadyGraded { answer_record_id: record.id, grader_id });
        }

        Ok(record)
    }

    /// Changes a grader's own score. The answer's final score moves by the
    /// difference instead of being overwritten.
    pub async fn regrade(
        &self,
        scoring_record_id: i64,
        score: i32,
        comment: Option<&str>,
        grader_id: i64,
    ) -> Result<ScoringRecord, QuizError> {
        let existing = self.owned_scoring_record(scoring_record_id, grader_id).await?;
        check_score(score, existing.max_score)?;

        let (updated, _) = self
            .store
            .revise_grade(existing.id, score, comment.map(clean_html), self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::Missing(_) => QuizError::ScoringRecordNotFound(existing.id),
                other => other.into(),
            })?;

        tracing::info!(
            "Grader {} changed scoring record {} by {:+}",
            grader_id,
            existing.id,
            score - existing.score
        );
        Ok(updated)
    }

    /// Removes a grader's own score. The answer falls back to the most recent
    /// remaining grade, or to no manual score at all.
    pub async fn delete(&self, scoring_record_id: i64, grader_id: i64) -> Result<(), QuizError> {
        let existing = self.owned_scoring_record(scoring_record_id, grader_id).await?;

        let (_, session) = self.store.remove_grade(existing.id).await.map_err(|e| match e {
            StoreError::Missing(_) => QuizError::ScoringRecordNotFound(existing.id),
            other => other.into(),
        })?;

        tracing::info!(
            "Grader {} deleted scoring record {} (session {} now {:?})",
            grader_id,
            existing.id,
            session.session_code,
            session.scoring_status
        );
        Ok(())
    }

    async fn owned_scoring_record(&self, id: i64, grader_id: i64) -> Result<ScoringRecord, QuizError> {
        let record = self
            .store
            .scoring_record(id)
            .await?
            .ok_or(QuizError::ScoringRecordNotFound(id))?;
        if record.grader_id != grader_id {
            return Err(QuizError::ScoringPermissionDenied { scoring_record_id: id });
        }
        Ok(record)
    }

    /// Grades several answers. Every item is checked before the first write;
    /// the first failing item is reported by answer record id.
    pub async fn grade_batch(&self, items: &[GradeRequest], grader_id: i64) -> Result<Vec<ScoringRecord>, QuizError> {
        if items.is_empty() {
            return Err(QuizError::InvalidArgument("no grades submitted".to_string()));
        }

        let batch_failed = |item: &GradeRequest, err: QuizError| QuizError::ScoringBatchFailed {
            answer_record_id: item.answer_record_id,
            reason: err.to_string(),
        };

        let mut seen = HashSet::new();
        for item in items {
            if !seen.insert(item.answer_record_id) {
                return Err(batch_failed(
                    item,
                    QuizError::InvalidArgument("answer record listed twice".to_string()),
                ));
            }
            self.gradable_record(item, grader_id)
                .await
                .map_err(|e| batch_failed(item, e))?;
        }

        let mut graded = Vec::with_capacity(items.len());
        for item in items {
            graded.push(self.grade(item, grader_id).await.map_err(|e| batch_failed(item, e))?);
        }
        Ok(graded)
    }

    /// Closes the grading phase of a session. Fails while any essay answer
    /// has no scoring record.
    pub async fn complete_session_scoring(&self, session_id: i64) -> Result<Session, QuizError> {
        let completion = self.store.complete_scoring(session_id).await.map_err(|e| match e {
            StoreError::Missing(_) => QuizError::SessionNotFound(session_id.to_string()),
            other => other.into(),
        })?;

        match completion {
            ScoringCompletion::Remaining(remaining) => Err(QuizError::ScoringIncomplete { remaining }),
            ScoringCompletion::Completed(session) => {
                tracing::info!("Scoring completed for session {}", session.session_code);
                Ok(session)
            }
        }
    }

    /// Essay answers in closed sessions that nobody has scored yet.
    pub async fn pending_scoring(&self, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<AnswerRecord>, QuizError> {
        let limit = limit.unwrap_or(DEFAULT_PENDING_LIMIT).clamp(1, MAX_PENDING_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        Ok(self.store.records_needing_scoring(limit, offset).await?)
    }

    /// Essay answers of one session without a grade. With a grader, only the
    /// answers that grader has not scored yet.
    pub async fn unscored_records(&self, session_id: i64, grader_id: Option<i64>) -> Result<Vec<AnswerRecord>, QuizError> {
        self.store
            .session_by_id(session_id)
            .await?
            .ok_or_else(|| QuizError::SessionNotFound(session_id.to_string()))?;

        let scored: HashSet<i64> = self
            .store
            .scoring_records_for_session(session_id)
            .await?
            .into_iter()
            .filter(|s| grader_id.is_none_or(|id| s.grader_id == id))
            .map(|s| s.answer_record_id)
            .collect();

        Ok(self
            .store
            .answer_records_for_session(session_id)
            .await?
            .into_iter()
            .filter(|r| r.is_manually_graded() && !scored.contains(&r.id))
            .collect())
    }

    /// Count and spread of scores, optionally narrowed to a session or a grader.
    pub async fn statistics(&self, session_id: Option<i64>, grader_id: Option<i64>) -> Result<ScoringStats, QuizError> {
        Ok(self.store.scoring_stats(session_id, grader_id).await?)
    }

    pub async fn scoring_record_detail(&self, id: i64) -> Result<ScoringRecordDetail, QuizError> {
        let scoring = self
            .store
            .scoring_record(id)
            .await?
            .ok_or(QuizError::ScoringRecordNotFound(id))?;
        let record = self
            .store
            .answer_record(scoring.answer_record_id)
            .await?
            .ok_or(QuizError::AnswerRecordNotFound(scoring.answer_record_id))?;
        let session = self
            .store
            .session_by_id(scoring.session_id)
            .await?
            .ok_or_else(|| QuizError::SessionNotFound(scoring.session_id.to_string()))?;

        Ok(ScoringRecordDetail {
            scoring,
            user_id: session.user_id,
            question_content: record.question_content,
            user_answer: record.user_answer,
        })
    }

    pub async fn scoring_records_for_session(&self, session_id: i64) -> Result<Vec<ScoringRecord>, QuizError> {
        Ok(self.store.scoring_records_for_session(session_id).await?)
    }

    pub async fn scoring_records_by_grader(&self, grader_id: i64) -> Result<Vec<ScoringRecord>, QuizError> {
        Ok(self.store.scoring_records_by_grader(grader_id).await?)
    }
}
