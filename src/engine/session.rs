// src/engine/session.rs

//! SessionMachine: lifecycle of answer sessions, plus the timeout sweep.
//!
//! Every status change goes through a compare-and-set on the store, so a
//! transition computed from a stale read simply does not apply.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    config::{MAX_QUESTION_COUNT, MAX_TIMEOUT_MINUTES},
    engine::{clock::Clock, error::QuizError},
    models::{
        page::Page,
        question::{PublicQuestion, QuestionType},
        session::{NewSession, Session, SessionFilter, SessionQuery, SessionStatus, SessionStatusView, UserStats},
    },
    store::{QuestionCatalog, Store, StoreError},
};

/// Page size of session listings when the caller names none.
const DEFAULT_PAGE_LIMIT: i64 = 20;
const MAX_PAGE_LIMIT: i64 = 100;

/// Attempts at inserting a new session before a uniqueness clash is reported.
const START_ATTEMPTS: usize = 3;

/// "S", the start time in milliseconds, then eight random characters.
fn session_code(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("S{}{}", now.timestamp_millis(), suffix)
}

fn parse_types(codes: &[i16]) -> Result<Vec<QuestionType>, QuizError> {
    let mut types = Vec::with_capacity(codes.len());
    for &code in codes {
        let kind = QuestionType::try_from(code)
            .map_err(|_| QuizError::InvalidArgument(format!("unknown question type {code}")))?;
        if !types.contains(&kind) {
            types.push(kind);
        }
    }
    if types.is_empty() {
        return Err(QuizError::InvalidArgument("at least one question type is required".to_string()));
    }
    Ok(types)
}

#[derive(Clone)]
pub struct SessionMachine {
    store: Arc<dyn Store>,
    catalog: Arc<dyn QuestionCatalog>,
    clock: Arc<dyn Clock>,
    default_timeout_minutes: i32,
}

impl SessionMachine {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Arc<dyn Clock>,
        default_timeout_minutes: i32,
    ) -> Self {
        SessionMachine { store, catalog, clock, default_timeout_minutes }
    }

    /// Starts a new session for `user_id`, abandoning any session the user
    /// still has in progress.
    ///
    /// Questions are drawn before anything is written, so a shortage leaves
    /// the user's existing session untouched.
    pub async fn start(
        &self,
        user_id: i64,
        question_types: &[i16],
        count: i32,
        timeout_minutes: Option<i32>,
    ) -> Result<Session, QuizError> {
        let types = parse_types(question_types)?;
        if !(1..=MAX_QUESTION_COUNT).contains(&count) {
            return Err(QuizError::InvalidArgument(format!(
                "question count must be between 1 and {MAX_QUESTION_COUNT}, got {count}"
            )));
        }
        let timeout_minutes = timeout_minutes.unwrap_or(self.default_timeout_minutes);
        if !(1..=MAX_TIMEOUT_MINUTES).contains(&timeout_minutes) {
            return Err(QuizError::InvalidArgument(format!(
                "timeout must be between 1 and {MAX_TIMEOUT_MINUTES} minutes, got {timeout_minutes}"
            )));
        }

        let questions = self.catalog.sample_questions(&types, count as usize).await?;
        if questions.len() < count as usize {
            tracing::warn!(
                "User {} asked for {} questions of {:?}, only {} available",
                user_id,
                count,
                question_types,
                questions.len()
            );
            return Err(QuizError::InsufficientQuestions {
                requested: count,
                available: questions.len(),
            });
        }

        let question_ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        let total_score: i32 = questions.iter().map(|q| q.score).sum();
        let type_codes: Vec<i16> = types.iter().map(|t| t.code()).collect();

        let mut attempt = 0;
        let (session, abandoned) = loop {
            attempt += 1;
            let now = self.clock.now();
            let new = NewSession {
                session_code: session_code(now),
                user_id,
                question_types: type_codes.clone(),
                question_ids: question_ids.clone(),
                timeout_minutes,
                total_score,
                started_at: now,
            };
            match self.store.start_session(new).await {
                Ok(created) => break created,
                Err(StoreError::Duplicate(what)) if attempt < START_ATTEMPTS => {
                    tracing::warn!("Session start for user {} clashed on {}, retrying", user_id, what);
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(old) = abandoned {
            tracing::info!("Session {} abandoned by a new start", old.session_code);
        }
        tracing::info!(
            "Session {} started for user {}: {} questions, {} points, {} minutes",
            session.session_code,
            user_id,
            session.total_count,
            session.total_score,
            session.timeout_minutes
        );
        Ok(session)
    }

    /// Seconds left in the time budget, never negative. Read-only.
    pub fn time_remaining(&self, session: &Session) -> i64 {
        match session.status {
            SessionStatus::InProgress | SessionStatus::AbnormalExit => {
                (session.timeout_seconds() - session.elapsed_seconds(self.clock.now())).max(0)
            }
            _ => 0,
        }
    }

    /// Times the session out if it is in progress and over budget. Returns
    /// whether this call did so.
    pub async fn check_timeout(&self, session: &Session) -> Result<bool, QuizError> {
        let (_, timed_out) = self.expire_if_due(session.clone()).await?;
        Ok(timed_out)
    }

    /// Applies the lazy timeout check and returns the session as it now is.
    pub(crate) async fn expire_if_due(&self, session: Session) -> Result<(Session, bool), QuizError> {
        let now = self.clock.now();
        if session.status != SessionStatus::InProgress || !session.is_expired_at(now) {
            return Ok((session, false));
        }

        match self
            .store
            .transition_session(session.id, &[SessionStatus::InProgress], SessionStatus::TimedOut, Some(now), false)
            .await?
        {
            Some(updated) => {
                tracing::info!(
                    "Session {} timed out after {}s",
                    updated.session_code,
                    updated.elapsed_seconds(now)
                );
                Ok((updated, true))
            }
            None => Ok((self.reload(&session).await?, false)),
        }
    }

    async fn reload(&self, session: &Session) -> Result<Session, QuizError> {
        self.store
            .session_by_id(session.id)
            .await?
            .ok_or_else(|| QuizError::SessionNotFound(session.session_code.clone()))
    }

    /// Looks a session up by code, with no ownership check and no timeout check.
    pub async fn load(&self, code: &str) -> Result<Session, QuizError> {
        self.store
            .session_by_code(code)
            .await?
            .ok_or_else(|| QuizError::SessionNotFound(code.to_string()))
    }

    async fn load_owned(&self, code: &str, user_id: i64) -> Result<Session, QuizError> {
        let session = self.load(code).await?;
        if session.user_id != user_id {
            return Err(QuizError::PermissionDenied {
                session_code: session.session_code,
                user_id,
            });
        }
        Ok(session)
    }

    /// The caller's session, after the lazy timeout check.
    pub async fn session_for(&self, code: &str, user_id: i64) -> Result<Session, QuizError> {
        let session = self.load_owned(code, user_id).await?;
        Ok(self.expire_if_due(session).await?.0)
    }

    /// The user's in-progress session, if it has not run out of time.
    pub async fn current_session(&self, user_id: i64) -> Result<Option<Session>, QuizError> {
        let Some(session) = self.store.active_session(user_id).await? else {
            return Ok(None);
        };
        let (session, _) = self.expire_if_due(session).await?;
        Ok((session.status == SessionStatus::InProgress).then_some(session))
    }

    /// One page of sessions matching `filter`, newest first.
    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Page<Session>, QuizError> {
        let status = filter.status.map(SessionStatus::try_from).transpose()?;
        if let (Some(from), Some(to)) = (filter.started_from, filter.started_to) {
            if from > to {
                return Err(QuizError::InvalidArgument(format!(
                    "time range starts at {from} after it ends at {to}"
                )));
            }
        }

        let query = SessionQuery {
            user_id: filter.user_id,
            status,
            started_from: filter.started_from,
            started_to: filter.started_to,
            limit: filter.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
            offset: filter.offset.unwrap_or(0).max(0),
        };
        Ok(self.store.find_sessions(&query).await?)
    }

    /// The user's own sessions. Any user id in `filter` is ignored.
    pub async fn sessions_for_user(&self, user_id: i64, filter: &SessionFilter) -> Result<Page<Session>, QuizError> {
        let filter = SessionFilter { user_id: Some(user_id), ..filter.clone() };
        self.list_sessions(&filter).await
    }

    pub async fn user_stats(&self, user_id: i64) -> Result<UserStats, QuizError> {
        Ok(self.store.user_stats(user_id).await?)
    }

    /// Completes the caller's own session.
    pub async fn finish(&self, code: &str, user_id: i64) -> Result<Session, QuizError> {
        self.close(code, user_id, SessionStatus::Completed).await
    }

    /// Gives up the caller's own session.
    pub async fn abandon(&self, code: &str, user_id: i64) -> Result<Session, QuizError> {
        self.close(code, user_id, SessionStatus::Abandoned).await
    }

    async fn close(&self, code: &str, user_id: i64, to: SessionStatus) -> Result<Session, QuizError> {
        let session = self.session_for(code, user_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(QuizError::AlreadyFinished { status: session.status });
        }

        let now = self.clock.now();
        match self
            .store
            .transition_session(session.id, &[SessionStatus::InProgress], to, Some(now), false)
            .await?
        {
            Some(updated) => {
                tracing::info!("Session {} moved to {:?} by its owner", updated.session_code, to);
                Ok(updated)
            }
            None => {
                let current = self.reload(&session).await?;
                Err(QuizError::AlreadyFinished { status: current.status })
            }
        }
    }

    /// Marks a session `Completed` whatever its status. Reserved for
    /// elevated callers.
    pub async fn force_complete(&self, code: &str) -> Result<Session, QuizError> {
        let session = self.load(code).await?;
        if session.status == SessionStatus::Completed {
            return Ok(session);
        }

        use SessionStatus::*;
        let now = self.clock.now();
        let updated = self
            .store
            .transition_session(
                session.id,
                &[NotStarted, InProgress, TimedOut, Abandoned, AbnormalExit],
                Completed,
                Some(now),
                false,
            )
            .await?;

        match updated {
            Some(updated) => {
                tracing::warn!(
                    "Session {} force-completed from {:?}",
                    updated.session_code,
                    session.status
                );
                Ok(updated)
            }
            // Someone else completed it in between.
            None => self.reload(&session).await,
        }
    }

    /// Adds minutes to the caller's in-progress session.
    pub async fn extend(&self, code: &str, user_id: i64, minutes: i32) -> Result<Session, QuizError> {
        if minutes <= 0 {
            return Err(QuizError::InvalidArgument(format!(
                "extension must be a positive number of minutes, got {minutes}"
            )));
        }
        if minutes > MAX_TIMEOUT_MINUTES {
            return Err(QuizError::InvalidArgument(format!(
                "extension may not exceed {MAX_TIMEOUT_MINUTES} minutes"
            )));
        }

        let session = self.session_for(code, user_id).await?;
        match session.status {
            SessionStatus::InProgress => {}
            SessionStatus::TimedOut => return Err(QuizError::SessionTimeout(session.session_code)),
            status => return Err(QuizError::AlreadyFinished { status }),
        }

        match self.store.extend_session(session.id, minutes).await? {
            Some(updated) => {
                tracing::info!(
                    "Session {} extended by {} minutes to {}",
                    updated.session_code,
                    minutes,
                    updated.timeout_minutes
                );
                Ok(updated)
            }
            None => {
                let current = self.reload(&session).await?;
                Err(QuizError::AlreadyFinished { status: current.status })
            }
        }
    }

    /// Moves a session along the regular transition table. Leaving
    /// `AbnormalExit` for `InProgress` takes the same checks as a resume.
    pub async fn update_status(&self, code: &str, to: SessionStatus) -> Result<Session, QuizError> {
        let session = self.load(code).await?;
        let (session, _) = self.expire_if_due(session).await?;
        let from = session.status;

        if !from.can_transition_to(to) {
            return Err(QuizError::InvalidTransition { from, to });
        }
        if from == SessionStatus::AbnormalExit && to == SessionStatus::InProgress {
            return self.reopen(session).await;
        }

        let ended_at = to.is_terminal().then(|| self.clock.now());
        match self
            .store
            .transition_session(session.id, &[from], to, ended_at, false)
            .await?
        {
            Some(updated) => {
                tracing::info!("Session {} moved {:?} -> {:?}", updated.session_code, from, to);
                Ok(updated)
            }
            None => {
                let current = self.reload(&session).await?;
                Err(QuizError::InvalidTransition { from: current.status, to })
            }
        }
    }

    /// Flags an in-progress session as interrupted so its owner may resume it.
    pub async fn mark_abnormal_exit(&self, code: &str) -> Result<Session, QuizError> {
        self.update_status(code, SessionStatus::AbnormalExit).await
    }

    /// Brings an interrupted session back. Allowed once, for its owner, and
    /// only while its time budget lasts.
    pub async fn resume(&self, code: &str, user_id: i64) -> Result<Session, QuizError> {
        let session = self.load_owned(code, user_id).await?;
        let updated = self.reopen(session).await?;
        tracing::info!("Session {} resumed by user {}", updated.session_code, user_id);
        Ok(updated)
    }

    /// `AbnormalExit` -> `InProgress`, at most once per session, never past
    /// the deadline and never next to another in-progress session.
    async fn reopen(&self, session: Session) -> Result<Session, QuizError> {
        let cannot_resume = |s: &Session| QuizError::CannotResume { status: s.status, resumed: s.resumed };
        if session.status != SessionStatus::AbnormalExit || session.resumed {
            return Err(cannot_resume(&session));
        }

        let now = self.clock.now();
        if session.is_expired_at(now) {
            self.store
                .transition_session(
                    session.id,
                    &[SessionStatus::AbnormalExit],
                    SessionStatus::TimedOut,
                    Some(now),
                    false,
                )
                .await?;
            tracing::info!("Session {} expired before it could be resumed", session.session_code);
            return Err(QuizError::SessionTimeout(session.session_code));
        }

        if let Some(active) = self.store.active_session(session.user_id).await? {
            tracing::warn!(
                "Refusing to resume {} while {} is in progress",
                session.session_code,
                active.session_code
            );
            return Err(cannot_resume(&session));
        }

        match self
            .store
            .transition_session(session.id, &[SessionStatus::AbnormalExit], SessionStatus::InProgress, None, true)
            .await
        {
            Ok(Some(updated)) => Ok(updated),
            Ok(None) => Err(cannot_resume(&self.reload(&session).await?)),
            // Another session of the same user went in progress in between.
            Err(StoreError::Duplicate(what)) => {
                tracing::warn!("Resume of {} lost to {}", session.session_code, what);
                Err(cannot_resume(&session))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Progress snapshot of the caller's session.
    pub async fn status_view(&self, code: &str, user_id: i64) -> Result<SessionStatusView, QuizError> {
        let session = self.session_for(code, user_id).await?;
        let answered = self.store.answer_records_for_session(session.id).await?.len() as i32;
        Ok(SessionStatusView {
            remaining_seconds: self.time_remaining(&session),
            session_code: session.session_code,
            status: session.status,
            scoring_status: session.scoring_status,
            total_questions: session.total_count,
            answered,
            timeout_minutes: session.timeout_minutes,
            started_at: session.started_at,
            ended_at: session.ended_at,
        })
    }

    /// The assigned question at `index` (0-based), without its answer.
    pub async fn question_at(&self, code: &str, user_id: i64, index: usize) -> Result<PublicQuestion, QuizError> {
        let session = self.session_for(code, user_id).await?;
        let id = *session.question_ids.0.get(index).ok_or_else(|| {
            QuizError::InvalidArgument(format!(
                "question index {index} out of range (session has {})",
                session.question_ids.0.len()
            ))
        })?;
        let question = self
            .catalog
            .question_by_id(id)
            .await?
            .ok_or(QuizError::QuestionNotFound(id))?;
        Ok(question.into())
    }

    /// Times out every expired in-progress session started within
    /// `lookback`. A failure on one session is logged and skipped.
    pub async fn sweep(&self, lookback: Duration) -> Result<usize, QuizError> {
        let since = self.clock.now() - lookback;
        let candidates = self.store.in_progress_since(since).await?;
        let scanned = candidates.len();

        let mut timed_out = 0;
        for session in candidates {
            let code = session.session_code.clone();
            match self.expire_if_due(session).await {
                Ok((_, true)) => timed_out += 1,
                Ok((_, false)) => {}
                Err(e) => tracing::warn!("Timeout sweep skipped session {}: {}", code, e),
            }
        }

        tracing::info!("Timeout sweep: {} scanned, {} timed out", scanned, timed_out);
        Ok(timed_out)
    }
}
