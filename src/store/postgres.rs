// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, types::Json};

use super::{QuestionCatalog, ScoringCompletion, Store, StoreError, StoreResult};
use crate::models::{
    answer_record::{AnswerRecord, AutoScore, InsertOutcome, NewAnswerRecord},
    page::Page,
    question::{Question, QuestionType},
    scoring_record::{NewScoringRecord, ScoringRecord, ScoringStats},
    session::{NewSession, ScoringStatus, Session, SessionQuery, SessionStatus, UserStats},
};

const QUESTION_COLUMNS: &str =
    "id, title, content, type, options, correct_answer, explanation, score, priority, enabled";

const SESSION_COLUMNS: &str = "id, session_code, user_id, question_types, question_ids, \
     total_count, timeout_minutes, total_score, auto_score, manual_score, final_score, \
     status, scoring_status, resumed, started_at, ended_at";

const RECORD_COLUMNS: &str = "id, session_id, question_id, question_type, question_content, \
     question_options, correct_answer, max_score, user_answer, is_correct, auto_score, \
     manual_score, final_score, time_spent_seconds, sequence_number, answered_at";

const SCORING_COLUMNS: &str = "id, answer_record_id, session_id, question_id, grader_id, \
     score, max_score, comment, scored_at";

/// Maps unique violations to `StoreError::Duplicate`.
fn unique_or_db(err: sqlx::Error, what: String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(what),
        _ => StoreError::Database(err),
    }
}

/// Question bank backed by the 'questions' table.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        PgCatalog { pool }
    }
}

#[async_trait]
impl QuestionCatalog for PgCatalog {
    async fn sample_questions(&self, types: &[QuestionType], count: usize) -> StoreResult<Vec<Question>> {
        let codes: Vec<i16> = types.iter().map(|t| t.code()).collect();
        // Efraimidis-Spirakis: the smallest -ln(u)/w keys form a weighted sample.
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions \
             WHERE enabled AND type = ANY($1) \
             ORDER BY -LN(1.0 - RANDOM()) / GREATEST(priority, 1) \
             LIMIT $2"
        );
        let questions = sqlx::query_as::<_, Question>(&sql)
            .bind(codes)
            .bind(count as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(questions)
    }

    async fn question_by_id(&self, id: i64) -> StoreResult<Option<Question>> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        let question = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(question)
    }
}

/// Sessions, answer records and scoring records in Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

/// Takes the session's row lock for the rest of the transaction. Every write
/// to a session's answer or scoring records goes through here first.
async fn lock_session(conn: &mut PgConnection, id: i64) -> StoreResult<Session> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM answer_sessions WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, Session>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| StoreError::Missing(format!("session {id}")))
}

/// Rebuilds the session's score columns from its answer records in one
/// statement. Caller holds the session lock.
async fn recompute(conn: &mut PgConnection, id: i64) -> StoreResult<Session> {
    let sql = format!(
        "UPDATE answer_sessions s \
         SET auto_score = t.auto_sum, manual_score = t.manual_sum, final_score = t.final_sum, \
             scoring_status = CASE WHEN t.essays = 0 THEN $2 WHEN t.ungraded = 0 THEN $3 ELSE $4 END \
         FROM ( \
             SELECT COALESCE(SUM(r.auto_score), 0)::INT AS auto_sum, \
                    SUM(r.manual_score)::INT AS manual_sum, \
                    COALESCE(SUM(r.final_score), 0)::INT AS final_sum, \
                    COUNT(*) FILTER (WHERE r.question_type = $5) AS essays, \
                    COUNT(*) FILTER (WHERE r.question_type = $5 AND NOT EXISTS \
                        (SELECT 1 FROM scoring_records sr WHERE sr.answer_record_id = r.id)) AS ungraded \
             FROM answer_records r WHERE r.session_id = $1 \
         ) t \
         WHERE s.id = $1 \
         RETURNING {}",
        session_columns_of("s")
    );
    sqlx::query_as::<_, Session>(&sql)
        .bind(id)
        .bind(ScoringStatus::None)
        .bind(ScoringStatus::Complete)
        .bind(ScoringStatus::Partial)
        .bind(QuestionType::Essay.code())
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| StoreError::Missing(format!("session {id}")))
}

/// `SESSION_COLUMNS` qualified by a table alias.
fn session_columns_of(alias: &str) -> String {
    SESSION_COLUMNS
        .split(", ")
        .map(|column| format!("{alias}.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn scoring_session_id(pool: &PgPool, id: i64) -> StoreResult<i64> {
    sqlx::query_scalar::<_, i64>("SELECT session_id FROM scoring_records WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| StoreError::Missing(format!("scoring record {id}")))
}

#[async_trait]
impl Store for PgStore {
    async fn start_session(&self, new: NewSession) -> StoreResult<(Session, Option<Session>)> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent starts for the same user.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(new.user_id)
            .execute(&mut *tx)
            .await?;

        let abandon_sql = format!(
            "UPDATE answer_sessions SET status = $1, ended_at = $2 \
             WHERE user_id = $3 AND status = $4 \
             RETURNING {SESSION_COLUMNS}"
        );
        let abandoned = sqlx::query_as::<_, Session>(&abandon_sql)
            .bind(SessionStatus::Abandoned)
            .bind(new.started_at)
            .bind(new.user_id)
            .bind(SessionStatus::InProgress)
            .fetch_optional(&mut *tx)
            .await?;

        let insert_sql = format!(
            "INSERT INTO answer_sessions \
             (session_code, user_id, question_types, question_ids, total_count, timeout_minutes, \
              total_score, status, scoring_status, started_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {SESSION_COLUMNS}"
        );
        let session = sqlx::query_as::<_, Session>(&insert_sql)
            .bind(&new.session_code)
            .bind(new.user_id)
            .bind(Json(&new.question_types))
            .bind(Json(&new.question_ids))
            .bind(new.question_ids.len() as i32)
            .bind(new.timeout_minutes)
            .bind(new.total_score)
            .bind(SessionStatus::InProgress)
            .bind(ScoringStatus::None)
            .bind(new.started_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| unique_or_db(e, format!("active session for user {}", new.user_id)))?;

        tx.commit().await?;
        Ok((session, abandoned))
    }

    async fn session_by_code(&self, code: &str) -> StoreResult<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM answer_sessions WHERE session_code = $1");
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn session_by_id(&self, id: i64) -> StoreResult<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM answer_sessions WHERE id = $1");
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn active_session(&self, user_id: i64) -> StoreResult<Option<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM answer_sessions \
             WHERE user_id = $1 AND status = $2 \
             ORDER BY started_at DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(user_id)
            .bind(SessionStatus::InProgress)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_sessions(&self, query: &SessionQuery) -> StoreResult<Page<Session>> {
        const FILTER: &str = "($1::BIGINT IS NULL OR user_id = $1) \
             AND ($2::SMALLINT IS NULL OR status = $2) \
             AND ($3::TIMESTAMPTZ IS NULL OR started_at >= $3) \
             AND ($4::TIMESTAMPTZ IS NULL OR started_at < $4)";
        let status = query.status.map(SessionStatus::code);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM answer_sessions WHERE {FILTER}"))
            .bind(query.user_id)
            .bind(status)
            .bind(query.started_from)
            .bind(query.started_to)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM answer_sessions WHERE {FILTER} \
             ORDER BY started_at DESC, id DESC LIMIT $5 OFFSET $6"
        );
        let items = sqlx::query_as::<_, Session>(&sql)
            .bind(query.user_id)
            .bind(status)
            .bind(query.started_from)
            .bind(query.started_to)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page { items, total, limit: query.limit, offset: query.offset })
    }

    async fn user_stats(&self, user_id: i64) -> StoreResult<UserStats> {
        let stats = sqlx::query_as::<_, UserStats>(
            "SELECT COUNT(*) AS total_sessions, \
                    COUNT(*) FILTER (WHERE status = $2) AS completed, \
                    COUNT(*) FILTER (WHERE status = $3) AS in_progress, \
                    COUNT(*) FILTER (WHERE status = $4) AS timed_out, \
                    COUNT(*) FILTER (WHERE status = $5) AS abandoned, \
                    CAST(AVG(final_score) FILTER (WHERE status = $2) AS FLOAT8) AS average_final_score, \
                    MAX(final_score) FILTER (WHERE status = $2) AS best_final_score \
             FROM answer_sessions WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(SessionStatus::Completed)
        .bind(SessionStatus::InProgress)
        .bind(SessionStatus::TimedOut)
        .bind(SessionStatus::Abandoned)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn transition_session(
        &self,
        id: i64,
        from: &[SessionStatus],
        to: SessionStatus,
        ended_at: Option<DateTime<Utc>>,
        mark_resumed: bool,
    ) -> StoreResult<Option<Session>> {
        let from: Vec<i16> = from.iter().map(|s| s.code()).collect();
        let sql = format!(
            "UPDATE answer_sessions \
             SET status = $2, ended_at = $3, resumed = resumed OR $4 \
             WHERE id = $1 AND status = ANY($5) \
             RETURNING {SESSION_COLUMNS}"
        );
        // The partial unique index on active sessions rejects a second InProgress row.
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(id)
            .bind(to)
            .bind(ended_at)
            .bind(mark_resumed)
            .bind(from)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unique_or_db(e, format!("active session for session {id}")))?)
    }

    async fn extend_session(&self, id: i64, minutes: i32) -> StoreResult<Option<Session>> {
        let sql = format!(
            "UPDATE answer_sessions SET timeout_minutes = timeout_minutes + $2 \
             WHERE id = $1 AND status = $3 \
             RETURNING {SESSION_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(id)
            .bind(minutes)
            .bind(SessionStatus::InProgress)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn in_progress_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM answer_sessions \
             WHERE status = $1 AND started_at >= $2 \
             ORDER BY started_at"
        );
        Ok(sqlx::query_as::<_, Session>(&sql)
            .bind(SessionStatus::InProgress)
            .bind(since)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_answer_record(&self, new: NewAnswerRecord) -> StoreResult<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        // Sequence numbers are assigned one at a time under the session lock.
        let session = lock_session(&mut tx, new.session_id).await?;
        if session.status != SessionStatus::InProgress {
            return Err(StoreError::SessionClosed(session.status));
        }
        if session.is_expired_at(new.answered_at) {
            return Err(StoreError::SessionExpired);
        }

        let existing_sql = format!(
            "SELECT {RECORD_COLUMNS} FROM answer_records WHERE session_id = $1 AND question_id = $2"
        );
        let existing = sqlx::query_as::<_, AnswerRecord>(&existing_sql)
            .bind(new.session_id)
            .bind(new.question_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(record) = existing {
            tx.commit().await?;
            return Ok(InsertOutcome::Existing(record));
        }

        let sequence_number: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM answer_records WHERE session_id = $1",
        )
        .bind(new.session_id)
        .fetch_one(&mut *tx)
        .await?;

        let insert_sql = format!(
            "INSERT INTO answer_records \
             (session_id, question_id, question_type, question_content, question_options, \
              correct_answer, max_score, user_answer, is_correct, auto_score, final_score, \
              time_spent_seconds, sequence_number, answered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $11, $12, $13) \
             RETURNING {RECORD_COLUMNS}"
        );
        let record = sqlx::query_as::<_, AnswerRecord>(&insert_sql)
            .bind(new.session_id)
            .bind(new.question_id)
            .bind(new.question_type)
            .bind(&new.question_content)
            .bind(Json(&new.question_options))
            .bind(&new.correct_answer)
            .bind(new.max_score)
            .bind(&new.user_answer)
            .bind(new.is_correct)
            .bind(new.auto_score)
            .bind(new.time_spent_seconds)
            .bind(sequence_number)
            .bind(new.answered_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                unique_or_db(
                    e,
                    format!("answer to question {} in session {}", new.question_id, new.session_id),
                )
            })?;

        recompute(&mut tx, new.session_id).await?;
        tx.commit().await?;
        Ok(InsertOutcome::Inserted(record))
    }

    async fn answer_record(&self, id: i64) -> StoreResult<Option<AnswerRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM answer_records WHERE id = $1");
        Ok(sqlx::query_as::<_, AnswerRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn answer_record_for(&self, session_id: i64, question_id: i64) -> StoreResult<Option<AnswerRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM answer_records WHERE session_id = $1 AND question_id = $2"
        );
        Ok(sqlx::query_as::<_, AnswerRecord>(&sql)
            .bind(session_id)
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn answer_records_for_session(&self, session_id: i64) -> StoreResult<Vec<AnswerRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM answer_records WHERE session_id = $1 ORDER BY sequence_number"
        );
        Ok(sqlx::query_as::<_, AnswerRecord>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn rescore_records(&self, session_id: i64, scores: &[AutoScore]) -> StoreResult<Session> {
        let mut tx = self.pool.begin().await?;
        lock_session(&mut tx, session_id).await?;

        for score in scores {
            let updated = sqlx::query(
                "UPDATE answer_records \
                 SET is_correct = $3, auto_score = $4, final_score = $4 + COALESCE(manual_score, 0) \
                 WHERE id = $1 AND session_id = $2",
            )
            .bind(score.record_id)
            .bind(session_id)
            .bind(score.is_correct)
            .bind(score.auto_score)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                return Err(StoreError::Missing(format!(
                    "answer record {} in session {session_id}",
                    score.record_id
                )));
            }
        }

        let session = recompute(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok(session)
    }

    async fn records_needing_scoring(&self, limit: i64, offset: i64) -> StoreResult<Vec<AnswerRecord>> {
        let open: Vec<i16> = vec![SessionStatus::NotStarted.code(), SessionStatus::InProgress.code()];
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM answer_records \
             WHERE question_type = $1 AND manual_score IS NULL \
               AND session_id IN (SELECT id FROM answer_sessions WHERE status <> ALL($2)) \
             ORDER BY answered_at, id \
             LIMIT $3 OFFSET $4"
        );
        Ok(sqlx::query_as::<_, AnswerRecord>(&sql)
            .bind(QuestionType::Essay.code())
            .bind(open)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn record_grade(&self, new: NewScoringRecord) -> StoreResult<(ScoringRecord, Session)> {
        let mut tx = self.pool.begin().await?;
        lock_session(&mut tx, new.session_id).await?;

        let sql = format!(
            "INSERT INTO scoring_records \
             (answer_record_id, session_id, question_id, grader_id, score, max_score, comment, scored_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {SCORING_COLUMNS}"
        );
        let scoring = sqlx::query_as::<_, ScoringRecord>(&sql)
            .bind(new.answer_record_id)
            .bind(new.session_id)
            .bind(new.question_id)
            .bind(new.grader_id)
            .bind(new.score)
            .bind(new.max_score)
            .bind(&new.comment)
            .bind(new.scored_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                unique_or_db(
                    e,
                    format!(
                        "scoring record for answer {} by grader {}",
                        new.answer_record_id, new.grader_id
                    ),
                )
            })?;

        sqlx::query(
            "UPDATE answer_records SET manual_score = $2, final_score = auto_score + $2 WHERE id = $1",
        )
        .bind(new.answer_record_id)
        .bind(new.score)
        .execute(&mut *tx)
        .await?;

        let session = recompute(&mut tx, new.session_id).await?;
        tx.commit().await?;
        Ok((scoring, session))
    }

    async fn revise_grade(
        &self,
        id: i64,
        score: i32,
        comment: Option<String>,
        scored_at: DateTime<Utc>,
    ) -> StoreResult<(ScoringRecord, Session)> {
        let session_id = scoring_session_id(&self.pool, id).await?;
        let mut tx = self.pool.begin().await?;
        lock_session(&mut tx, session_id).await?;

        let previous: i32 = sqlx::query_scalar("SELECT score FROM scoring_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::Missing(format!("scoring record {id}")))?;

        let sql = format!(
            "UPDATE scoring_records SET score = $2, comment = $3, scored_at = $4 \
             WHERE id = $1 RETURNING {SCORING_COLUMNS}"
        );
        let scoring = sqlx::query_as::<_, ScoringRecord>(&sql)
            .bind(id)
            .bind(score)
            .bind(comment)
            .bind(scored_at)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE answer_records \
             SET manual_score = COALESCE(manual_score, 0) + $2, final_score = final_score + $2 \
             WHERE id = $1",
        )
        .bind(scoring.answer_record_id)
        .bind(score - previous)
        .execute(&mut *tx)
        .await?;

        let session = recompute(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok((scoring, session))
    }

    async fn remove_grade(&self, id: i64) -> StoreResult<(ScoringRecord, Session)> {
        let session_id = scoring_session_id(&self.pool, id).await?;
        let mut tx = self.pool.begin().await?;
        lock_session(&mut tx, session_id).await?;

        let sql = format!("DELETE FROM scoring_records WHERE id = $1 RETURNING {SCORING_COLUMNS}");
        let removed = sqlx::query_as::<_, ScoringRecord>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::Missing(format!("scoring record {id}")))?;

        sqlx::query(
            "UPDATE answer_records r \
             SET manual_score = latest.score, final_score = r.auto_score + COALESCE(latest.score, 0) \
             FROM (SELECT (SELECT score FROM scoring_records WHERE answer_record_id = $1 \
                           ORDER BY scored_at DESC, id DESC LIMIT 1) AS score) latest \
             WHERE r.id = $1",
        )
        .bind(removed.answer_record_id)
        .execute(&mut *tx)
        .await?;

        let session = recompute(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok((removed, session))
    }

    async fn complete_scoring(&self, session_id: i64) -> StoreResult<ScoringCompletion> {
        let mut tx = self.pool.begin().await?;
        lock_session(&mut tx, session_id).await?;
        let session = recompute(&mut tx, session_id).await?;

        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM answer_records r \
             WHERE r.session_id = $1 AND r.question_type = $2 \
               AND NOT EXISTS (SELECT 1 FROM scoring_records sr WHERE sr.answer_record_id = r.id)",
        )
        .bind(session_id)
        .bind(QuestionType::Essay.code())
        .fetch_one(&mut *tx)
        .await?;

        let completion = if remaining > 0 {
            ScoringCompletion::Remaining(remaining as usize)
        } else if session.scoring_status == ScoringStatus::Complete {
            ScoringCompletion::Completed(session)
        } else {
            let sql = format!(
                "UPDATE answer_sessions SET scoring_status = $2 WHERE id = $1 RETURNING {SESSION_COLUMNS}"
            );
            let session = sqlx::query_as::<_, Session>(&sql)
                .bind(session_id)
                .bind(ScoringStatus::Complete)
                .fetch_one(&mut *tx)
                .await?;
            ScoringCompletion::Completed(session)
        };

        tx.commit().await?;
        Ok(completion)
    }

    async fn scoring_record(&self, id: i64) -> StoreResult<Option<ScoringRecord>> {
        let sql = format!("SELECT {SCORING_COLUMNS} FROM scoring_records WHERE id = $1");
        Ok(sqlx::query_as::<_, ScoringRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn scoring_record_for(&self, answer_record_id: i64, grader_id: i64) -> StoreResult<Option<ScoringRecord>> {
        let sql = format!(
            "SELECT {SCORING_COLUMNS} FROM scoring_records WHERE answer_record_id = $1 AND grader_id = $2"
        );
        Ok(sqlx::query_as::<_, ScoringRecord>(&sql)
            .bind(answer_record_id)
            .bind(grader_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn scoring_records_for_answer(&self, answer_record_id: i64) -> StoreResult<Vec<ScoringRecord>> {
        let sql = format!(
            "SELECT {SCORING_COLUMNS} FROM scoring_records \
             WHERE answer_record_id = $1 ORDER BY scored_at DESC, id DESC"
        );
        Ok(sqlx::query_as::<_, ScoringRecord>(&sql)
            .bind(answer_record_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn scoring_records_for_session(&self, session_id: i64) -> StoreResult<Vec<ScoringRecord>> {
        let sql = format!(
            "SELECT {SCORING_COLUMNS} FROM scoring_records WHERE session_id = $1 ORDER BY scored_at DESC"
        );
        Ok(sqlx::query_as::<_, ScoringRecord>(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn scoring_records_by_grader(&self, grader_id: i64) -> StoreResult<Vec<ScoringRecord>> {
        let sql = format!(
            "SELECT {SCORING_COLUMNS} FROM scoring_records WHERE grader_id = $1 ORDER BY scored_at DESC"
        );
        Ok(sqlx::query_as::<_, ScoringRecord>(&sql)
            .bind(grader_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn scoring_stats(&self, session_id: Option<i64>, grader_id: Option<i64>) -> StoreResult<ScoringStats> {
        let stats = sqlx::query_as::<_, ScoringStats>(
            "SELECT COUNT(*) AS total_count, \
                    CAST(AVG(score) AS FLOAT8) AS average_score, \
                    MAX(score) AS highest_score, \
                    MIN(score) AS lowest_score \
             FROM scoring_records \
             WHERE ($1::BIGINT IS NULL OR session_id = $1) \
               AND ($2::BIGINT IS NULL OR grader_id = $2)",
        )
        .bind(session_id)
        .bind(grader_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}
