// src/store/memory.rs

//! In-process store and catalog.
//!
//! A single mutex serializes every operation, which gives each method the
//! same atomicity the Postgres store gets from transactions.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::types::Json;
use tokio::sync::{Mutex, RwLock};

use super::{QuestionCatalog, ScoringCompletion, Store, StoreError, StoreResult};
use crate::models::{
    answer_record::{AnswerRecord, AutoScore, InsertOutcome, NewAnswerRecord},
    page::Page,
    question::{Question, QuestionType},
    scoring_record::{NewScoringRecord, ScoringRecord, ScoringStats},
    session::{NewSession, ScoringStatus, Session, SessionQuery, SessionStatus, SessionTotals, UserStats},
};

/// Question bank held in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    questions: RwLock<Vec<Question>>,
}

impl MemoryCatalog {
    pub fn new(questions: Vec<Question>) -> Self {
        MemoryCatalog { questions: RwLock::new(questions) }
    }

    /// Adds a question or replaces the one with the same id.
    pub async fn upsert(&self, question: Question) {
        let mut questions = self.questions.write().await;
        match questions.iter_mut().find(|q| q.id == question.id) {
            Some(existing) => *existing = question,
            None => questions.push(question),
        }
    }

    pub async fn remove(&self, id: i64) {
        self.questions.write().await.retain(|q| q.id != id);
    }
}

/// Efraimidis-Spirakis weighted sampling without replacement.
fn weighted_sample(pool: Vec<Question>, count: usize) -> Vec<Question> {
    let mut rng = rand::rng();
    let mut keyed: Vec<(f64, Question)> = pool
        .into_iter()
        .map(|q| {
            let weight = f64::from(q.priority.max(1));
            let u: f64 = rng.random_range(f64::EPSILON..1.0);
            (u.powf(1.0 / weight), q)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.into_iter().take(count).map(|(_, q)| q).collect()
}

#[async_trait]
impl QuestionCatalog for MemoryCatalog {
    async fn sample_questions(&self, types: &[QuestionType], count: usize) -> StoreResult<Vec<Question>> {
        let codes: Vec<i16> = types.iter().map(|t| t.code()).collect();
        let pool: Vec<Question> = self
            .questions
            .read()
            .await
            .iter()
            .filter(|q| q.enabled && codes.contains(&q.question_type))
            .cloned()
            .collect();
        Ok(weighted_sample(pool, count))
    }

    async fn question_by_id(&self, id: i64) -> StoreResult<Option<Question>> {
        Ok(self.questions.read().await.iter().find(|q| q.id == id).cloned())
    }
}

#[derive(Debug, Default)]
struct Tables {
    sessions: Vec<Session>,
    records: Vec<AnswerRecord>,
    scoring: Vec<ScoringRecord>,
    next_record_id: i64,
    next_scoring_id: i64,
}

impl Tables {
    fn session_mut(&mut self, id: i64) -> StoreResult<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::Missing(format!("session {id}")))
    }

    fn record_mut(&mut self, id: i64) -> StoreResult<&mut AnswerRecord> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Missing(format!("answer record {id}")))
    }

    fn scoring_mut(&mut self, id: i64) -> StoreResult<&mut ScoringRecord> {
        self.scoring
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Missing(format!("scoring record {id}")))
    }

    fn has_other_active(&self, user_id: i64, except: i64) -> bool {
        self.sessions
            .iter()
            .any(|s| s.user_id == user_id && s.id != except && s.status == SessionStatus::InProgress)
    }

    /// Newest grade of an answer, if any remain.
    fn latest_grade(&self, answer_record_id: i64) -> Option<i32> {
        self.scoring
            .iter()
            .filter(|r| r.answer_record_id == answer_record_id)
            .max_by(|a, b| a.scored_at.cmp(&b.scored_at).then(a.id.cmp(&b.id)))
            .map(|r| r.score)
    }

    fn recompute(&mut self, session_id: i64) -> StoreResult<Session> {
        let records: Vec<AnswerRecord> = self
            .records
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        let graded: HashSet<i64> = self
            .scoring
            .iter()
            .filter(|r| r.session_id == session_id)
            .map(|r| r.answer_record_id)
            .collect();
        let totals = SessionTotals::tally(&records, &graded);

        let session = self.session_mut(session_id)?;
        session.auto_score = totals.auto_score;
        session.manual_score = totals.manual_score;
        session.final_score = totals.final_score;
        session.scoring_status = totals.scoring_status;
        Ok(session.clone())
    }

    fn set_manual(&mut self, record_id: i64, manual_score: Option<i32>) -> StoreResult<i64> {
        let record = self.record_mut(record_id)?;
        record.manual_score = manual_score;
        record.final_score = record.auto_score + manual_score.unwrap_or(0);
        Ok(record.session_id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn start_session(&self, new: NewSession) -> StoreResult<(Session, Option<Session>)> {
        let mut tables = self.tables.lock().await;

        if tables.sessions.iter().any(|s| s.session_code == new.session_code) {
            return Err(StoreError::Duplicate(format!("session code {}", new.session_code)));
        }

        let abandoned = tables
            .sessions
            .iter_mut()
            .find(|s| s.user_id == new.user_id && s.status == SessionStatus::InProgress)
            .map(|s| {
                s.status = SessionStatus::Abandoned;
                s.ended_at = Some(new.started_at);
                s.clone()
            });

        let session = Session {
            id: tables.sessions.len() as i64 + 1,
            session_code: new.session_code,
            user_id: new.user_id,
            question_types: Json(new.question_types),
            total_count: new.question_ids.len() as i32,
            question_ids: Json(new.question_ids),
            timeout_minutes: new.timeout_minutes,
            total_score: new.total_score,
            auto_score: 0,
            manual_score: None,
            final_score: 0,
            status: SessionStatus::InProgress,
            scoring_status: ScoringStatus::None,
            resumed: false,
            started_at: new.started_at,
            ended_at: None,
        };
        tables.sessions.push(session.clone());

        Ok((session, abandoned))
    }

    async fn session_by_code(&self, code: &str) -> StoreResult<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.iter().find(|s| s.session_code == code).cloned())
    }

    async fn session_by_id(&self, id: i64) -> StoreResult<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn active_session(&self, user_id: i64) -> StoreResult<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.user_id == user_id && s.status == SessionStatus::InProgress)
            .cloned())
    }

    async fn find_sessions(&self, query: &SessionQuery) -> StoreResult<Page<Session>> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .iter()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));

        let total = sessions.len() as i64;
        let items = sessions
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();
        Ok(Page { items, total, limit: query.limit, offset: query.offset })
    }

    async fn user_stats(&self, user_id: i64) -> StoreResult<UserStats> {
        let tables = self.tables.lock().await;
        let sessions: Vec<&Session> = tables.sessions.iter().filter(|s| s.user_id == user_id).collect();
        let count = |status: SessionStatus| sessions.iter().filter(|s| s.status == status).count() as i64;

        let completed: Vec<i32> = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .map(|s| s.final_score)
            .collect();
        let average_final_score = (!completed.is_empty())
            .then(|| f64::from(completed.iter().sum::<i32>()) / completed.len() as f64);

        Ok(UserStats {
            total_sessions: sessions.len() as i64,
            completed: count(SessionStatus::Completed),
            in_progress: count(SessionStatus::InProgress),
            timed_out: count(SessionStatus::TimedOut),
            abandoned: count(SessionStatus::Abandoned),
            average_final_score,
            best_final_score: completed.iter().copied().max(),
        })
    }

    async fn transition_session(
        &self,
        id: i64,
        from: &[SessionStatus],
        to: SessionStatus,
        ended_at: Option<DateTime<Utc>>,
        mark_resumed: bool,
    ) -> StoreResult<Option<Session>> {
        let mut tables = self.tables.lock().await;
        let user_id = tables.session_mut(id)?.user_id;
        if to == SessionStatus::InProgress && tables.has_other_active(user_id, id) {
            return Err(StoreError::Duplicate(format!("in-progress session for user {user_id}")));
        }

        let session = tables.session_mut(id)?;
        if !from.contains(&session.status) {
            return Ok(None);
        }
        session.status = to;
        session.ended_at = ended_at;
        if mark_resumed {
            session.resumed = true;
        }
        Ok(Some(session.clone()))
    }

    async fn extend_session(&self, id: i64, minutes: i32) -> StoreResult<Option<Session>> {
        let mut tables = self.tables.lock().await;
        let session = tables.session_mut(id)?;
        if session.status != SessionStatus::InProgress {
            return Ok(None);
        }
        session.timeout_minutes += minutes;
        Ok(Some(session.clone()))
    }

    async fn in_progress_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::InProgress && s.started_at >= since)
            .cloned()
            .collect())
    }

    async fn insert_answer_record(&self, new: NewAnswerRecord) -> StoreResult<InsertOutcome> {
        let mut tables = self.tables.lock().await;

        let session = tables.session_mut(new.session_id)?;
        if session.status != SessionStatus::InProgress {
            return Err(StoreError::SessionClosed(session.status));
        }
        if session.is_expired_at(new.answered_at) {
            return Err(StoreError::SessionExpired);
        }

        if let Some(existing) = tables
            .records
            .iter()
            .find(|r| r.session_id == new.session_id && r.question_id == new.question_id)
        {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        let sequence_number = tables
            .records
            .iter()
            .filter(|r| r.session_id == new.session_id)
            .map(|r| r.sequence_number)
            .max()
            .unwrap_or(0)
            + 1;

        tables.next_record_id += 1;
        let record = AnswerRecord {
            id: tables.next_record_id,
            session_id: new.session_id,
            question_id: new.question_id,
            question_type: new.question_type,
            question_content: new.question_content,
            question_options: Json(new.question_options),
            correct_answer: new.correct_answer,
            max_score: new.max_score,
            user_answer: new.user_answer,
            is_correct: new.is_correct,
            auto_score: new.auto_score,
            manual_score: None,
            final_score: new.auto_score,
            time_spent_seconds: new.time_spent_seconds,
            sequence_number,
            answered_at: new.answered_at,
        };
        tables.records.push(record.clone());
        tables.recompute(new.session_id)?;

        Ok(InsertOutcome::Inserted(record))
    }

    async fn answer_record(&self, id: i64) -> StoreResult<Option<AnswerRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.records.iter().find(|r| r.id == id).cloned())
    }

    async fn answer_record_for(&self, session_id: i64, question_id: i64) -> StoreResult<Option<AnswerRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .records
            .iter()
            .find(|r| r.session_id == session_id && r.question_id == question_id)
            .cloned())
    }

    async fn answer_records_for_session(&self, session_id: i64) -> StoreResult<Vec<AnswerRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<AnswerRecord> = tables
            .records
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.sequence_number);
        Ok(records)
    }

    async fn rescore_records(&self, session_id: i64, scores: &[AutoScore]) -> StoreResult<Session> {
        let mut tables = self.tables.lock().await;
        for score in scores {
            let record = tables.record_mut(score.record_id)?;
            if record.session_id != session_id {
                return Err(StoreError::Missing(format!(
                    "answer record {} in session {session_id}",
                    score.record_id
                )));
            }
            record.is_correct = score.is_correct;
            record.auto_score = score.auto_score;
            record.final_score = score.auto_score + record.manual_score.unwrap_or(0);
        }
        tables.recompute(session_id)
    }

    async fn records_needing_scoring(&self, limit: i64, offset: i64) -> StoreResult<Vec<AnswerRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<AnswerRecord> = tables
            .records
            .iter()
            .filter(|r| r.question_type == QuestionType::Essay.code() && r.manual_score.is_none())
            .filter(|r| {
                tables
                    .sessions
                    .iter()
                    .any(|s| s.id == r.session_id && s.status.is_terminal())
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.answered_at.cmp(&b.answered_at).then(a.id.cmp(&b.id)));
        Ok(records
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn record_grade(&self, new: NewScoringRecord) -> StoreResult<(ScoringRecord, Session)> {
        let mut tables = self.tables.lock().await;
        tables.session_mut(new.session_id)?;

        if tables
            .scoring
            .iter()
            .any(|r| r.answer_record_id == new.answer_record_id && r.grader_id == new.grader_id)
        {
            return Err(StoreError::Duplicate(format!(
                "scoring record for answer {} by grader {}",
                new.answer_record_id, new.grader_id
            )));
        }
        tables.set_manual(new.answer_record_id, Some(new.score))?;

        tables.next_scoring_id += 1;
        let record = ScoringRecord {
            id: tables.next_scoring_id,
            answer_record_id: new.answer_record_id,
            session_id: new.session_id,
            question_id: new.question_id,
            grader_id: new.grader_id,
            score: new.score,
            max_score: new.max_score,
            comment: new.comment,
            scored_at: new.scored_at,
        };
        tables.scoring.push(record.clone());
        let session = tables.recompute(new.session_id)?;
        Ok((record, session))
    }

    async fn revise_grade(
        &self,
        id: i64,
        score: i32,
        comment: Option<String>,
        scored_at: DateTime<Utc>,
    ) -> StoreResult<(ScoringRecord, Session)> {
        let mut tables = self.tables.lock().await;
        let scoring = tables.scoring_mut(id)?;
        let delta = score - scoring.score;
        scoring.score = score;
        scoring.comment = comment;
        scoring.scored_at = scored_at;
        let scoring = scoring.clone();

        let record = tables.record_mut(scoring.answer_record_id)?;
        record.manual_score = Some(record.manual_score.unwrap_or(0) + delta);
        record.final_score += delta;

        let session = tables.recompute(scoring.session_id)?;
        Ok((scoring, session))
    }

    async fn remove_grade(&self, id: i64) -> StoreResult<(ScoringRecord, Session)> {
        let mut tables = self.tables.lock().await;
        let removed = tables.scoring_mut(id)?.clone();
        tables.scoring.retain(|r| r.id != id);

        let fallback = tables.latest_grade(removed.answer_record_id);
        tables.set_manual(removed.answer_record_id, fallback)?;
        let session = tables.recompute(removed.session_id)?;
        Ok((removed, session))
    }

    async fn complete_scoring(&self, session_id: i64) -> StoreResult<ScoringCompletion> {
        let mut tables = self.tables.lock().await;
        let session = tables.recompute(session_id)?;
        let remaining = tables
            .records
            .iter()
            .filter(|r| r.session_id == session_id && r.is_manually_graded())
            .filter(|r| !tables.scoring.iter().any(|s| s.answer_record_id == r.id))
            .count();
        if remaining > 0 {
            return Ok(ScoringCompletion::Remaining(remaining));
        }
        if session.scoring_status == ScoringStatus::Complete {
            return Ok(ScoringCompletion::Completed(session));
        }

        let session = tables.session_mut(session_id)?;
        session.scoring_status = ScoringStatus::Complete;
        Ok(ScoringCompletion::Completed(session.clone()))
    }

    async fn scoring_record(&self, id: i64) -> StoreResult<Option<ScoringRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.scoring.iter().find(|r| r.id == id).cloned())
    }

    async fn scoring_record_for(&self, answer_record_id: i64, grader_id: i64) -> StoreResult<Option<ScoringRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .scoring
            .iter()
            .find(|r| r.answer_record_id == answer_record_id && r.grader_id == grader_id)
            .cloned())
    }

    async fn scoring_records_for_answer(&self, answer_record_id: i64) -> StoreResult<Vec<ScoringRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<ScoringRecord> = tables
            .scoring
            .iter()
            .filter(|r| r.answer_record_id == answer_record_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.scored_at.cmp(&a.scored_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn scoring_records_for_session(&self, session_id: i64) -> StoreResult<Vec<ScoringRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .scoring
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn scoring_records_by_grader(&self, grader_id: i64) -> StoreResult<Vec<ScoringRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .scoring
            .iter()
            .filter(|r| r.grader_id == grader_id)
            .cloned()
            .collect())
    }

    async fn scoring_stats(&self, session_id: Option<i64>, grader_id: Option<i64>) -> StoreResult<ScoringStats> {
        let tables = self.tables.lock().await;
        let scores: Vec<i32> = tables
            .scoring
            .iter()
            .filter(|r| session_id.is_none_or(|id| r.session_id == id))
            .filter(|r| grader_id.is_none_or(|id| r.grader_id == id))
            .map(|r| r.score)
            .collect();

        Ok(ScoringStats {
            total_count: scores.len() as i64,
            average_score: (!scores.is_empty())
                .then(|| f64::from(scores.iter().sum::<i32>()) / scores.len() as f64),
            highest_score: scores.iter().copied().max(),
            lowest_score: scores.iter().copied().min(),
        })
    }
}
