use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{FinalizeOutcome, Finalization, SessionStore, StartStamp};
use crate::error::{Error, Result};
use crate::models::answer::{upsert_answer, Answer};
use crate::models::candidate::Candidate;
use crate::models::question::Question;
use crate::models::result::{QuestionOutcome, SessionResult};
use crate::models::session::TestSession;
use crate::models::test::AptitudeTest;
use crate::models::violation::{NewViolation, Violation};

const SESSION_COLUMNS: &str = r#"
    id, candidate_id, test_id, college_id, cohort_tag, status, submission_type,
    created_at, started_at, duration_minutes, ends_at, passing_percentage,
    completed_at, client_end_time, questions_snapshot, answers
"#;

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    candidate_id: Uuid,
    test_id: Uuid,
    college_id: Uuid,
    cohort_tag: Option<String>,
    status: String,
    submission_type: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    duration_minutes: Option<i32>,
    ends_at: Option<DateTime<Utc>>,
    passing_percentage: Option<i32>,
    completed_at: Option<DateTime<Utc>>,
    client_end_time: Option<DateTime<Utc>>,
    questions_snapshot: Json<Vec<Question>>,
    answers: Json<Vec<Answer>>,
}

impl TryFrom<SessionRow> for TestSession {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(TestSession {
            id: row.id,
            candidate_id: row.candidate_id,
            test_id: row.test_id,
            college_id: row.college_id,
            cohort_tag: row.cohort_tag,
            status: row.status.parse().map_err(Error::Internal)?,
            submission_type: row
                .submission_type
                .map(|s| s.parse())
                .transpose()
                .map_err(Error::Internal)?,
            created_at: row.created_at,
            started_at: row.started_at,
            duration_minutes: row.duration_minutes,
            ends_at: row.ends_at,
            passing_percentage: row.passing_percentage,
            completed_at: row.completed_at,
            client_end_time: row.client_end_time,
            questions_snapshot: row.questions_snapshot.0,
            answers: row.answers.0,
        })
    }
}

#[derive(Debug, FromRow)]
struct TestRow {
    id: Uuid,
    college_id: Uuid,
    name: String,
    instructions: Option<String>,
    rules: Json<Vec<String>>,
    duration_minutes: i32,
    passing_percentage: Option<i32>,
    question_count: i32,
    has_expiry: bool,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
    link_expires_at: Option<DateTime<Utc>>,
    max_attempts: Option<i32>,
    is_active: bool,
}

impl From<TestRow> for AptitudeTest {
    fn from(row: TestRow) -> Self {
        AptitudeTest {
            id: row.id,
            college_id: row.college_id,
            name: row.name,
            instructions: row.instructions,
            rules: row.rules.0,
            duration_minutes: row.duration_minutes,
            passing_percentage: row.passing_percentage,
            question_count: row.question_count,
            has_expiry: row.has_expiry,
            window_start: row.window_start,
            window_end: row.window_end,
            link_expires_at: row.link_expires_at,
            max_attempts: row.max_attempts,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, FromRow)]
struct QuestionRow {
    id: Uuid,
    test_id: Uuid,
    text: String,
    options: Json<Vec<String>>,
    correct_answer: String,
    explanation: Option<String>,
    category: String,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question {
            id: row.id,
            test_id: row.test_id,
            text: row.text,
            options: row.options.0,
            correct_answer: row.correct_answer,
            explanation: row.explanation,
            category: row.category,
        }
    }
}

#[derive(Debug, FromRow)]
struct ResultRow {
    session_id: Uuid,
    score: i32,
    total_questions: i32,
    percentage: i32,
    passed: bool,
    passing_percentage: i32,
    submission_type: String,
    total_time_spent_seconds: i32,
    breakdown: Json<Vec<QuestionOutcome>>,
    computed_at: DateTime<Utc>,
}

impl TryFrom<ResultRow> for SessionResult {
    type Error = Error;

    fn try_from(row: ResultRow) -> Result<Self> {
        Ok(SessionResult {
            session_id: row.session_id,
            score: row.score,
            total_questions: row.total_questions,
            percentage: row.percentage,
            passed: row.passed,
            passing_percentage: row.passing_percentage,
            submission_type: row.submission_type.parse().map_err(Error::Internal)?,
            total_time_spent_seconds: row.total_time_spent_seconds,
            breakdown: row.breakdown.0,
            computed_at: row.computed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ViolationRow {
    id: Uuid,
    session_id: Uuid,
    violation_type: String,
    occurred_at: DateTime<Utc>,
    client_count: i32,
    server_sequence: i32,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<ViolationRow> for Violation {
    type Error = Error;

    fn try_from(row: ViolationRow) -> Result<Self> {
        Ok(Violation {
            id: row.id,
            session_id: row.session_id,
            violation_type: row.violation_type.parse().map_err(Error::Internal)?,
            occurred_at: row.occurred_at,
            client_count: row.client_count,
            server_sequence: row.server_sequence,
            recorded_at: row.recorded_at,
        })
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_open_session(&self, candidate_id: Uuid, test_id: Uuid) -> Result<Option<TestSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM test_sessions
             WHERE candidate_id = $1 AND test_id = $2 AND status IN ('created', 'in_progress')",
            SESSION_COLUMNS
        ))
        .bind(candidate_id)
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TestSession::try_from).transpose()
    }
}

impl SessionStore for PgSessionStore {
    async fn find_candidate(&self, id: Uuid) -> Result<Option<Candidate>> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, String)>(
            r#"SELECT id, college_id, name, email FROM candidates WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, college_id, name, email)| Candidate {
            id,
            college_id,
            name,
            email,
        }))
    }

    async fn find_test(&self, id: Uuid) -> Result<Option<AptitudeTest>> {
        let row = sqlx::query_as::<_, TestRow>(
            r#"SELECT
                id, college_id, name, instructions, rules, duration_minutes,
                passing_percentage, question_count, has_expiry, window_start, window_end,
                link_expires_at, max_attempts, is_active
            FROM aptitude_tests WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AptitudeTest::from))
    }

    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"SELECT id, test_id, text, options, correct_answer, explanation, category
               FROM bank_questions WHERE test_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Question::from).collect())
    }

    async fn insert_session(&self, session: &TestSession) -> Result<TestSession> {
        let inserted = sqlx::query_as::<_, SessionRow>(&format!(
            r#"INSERT INTO test_sessions (id, candidate_id, test_id, college_id, cohort_tag, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT DO NOTHING
               RETURNING {}"#,
            SESSION_COLUMNS
        ))
        .bind(session.id)
        .bind(session.candidate_id)
        .bind(session.test_id)
        .bind(session.college_id)
        .bind(&session.cohort_tag)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => TestSession::try_from(row),
            None => self
                .find_open_session(session.candidate_id, session.test_id)
                .await?
                .ok_or_else(|| Error::Internal("Session insert conflicted without an open session".into())),
        }
    }

    async fn count_finished_sessions(&self, candidate_id: Uuid, test_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM test_sessions
               WHERE candidate_id = $1 AND test_id = $2
                 AND status IN ('completed', 'expired', 'auto_submitted')"#,
        )
        .bind(candidate_id)
        .bind(test_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<TestSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM test_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TestSession::try_from).transpose()
    }

    async fn begin_session(&self, id: Uuid, stamp: &StartStamp) -> Result<Option<TestSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"UPDATE test_sessions
               SET status = 'in_progress', started_at = $2, duration_minutes = $3, ends_at = $4,
                   passing_percentage = $5, questions_snapshot = $6, updated_at = NOW()
               WHERE id = $1 AND status = 'created'
               RETURNING {}"#,
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(stamp.started_at)
        .bind(stamp.duration_minutes)
        .bind(stamp.ends_at)
        .bind(stamp.passing_percentage)
        .bind(Json(&stamp.snapshot))
        .fetch_optional(&self.pool)
        .await?;
        row.map(TestSession::try_from).transpose()
    }

    async fn save_answer(&self, id: Uuid, answer: &Answer) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, (Json<Vec<Answer>>,)>(
            r#"SELECT answers FROM test_sessions WHERE id = $1 AND status = 'in_progress' FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((Json(mut answers),)) = current else {
            tx.rollback().await?;
            return Ok(false);
        };
        upsert_answer(&mut answers, answer.clone());

        sqlx::query(r#"UPDATE test_sessions SET answers = $2, updated_at = NOW() WHERE id = $1"#)
            .bind(id)
            .bind(Json(&answers))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn finalize_session(&self, id: Uuid, finalization: &Finalization) -> Result<FinalizeOutcome> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"UPDATE test_sessions
               SET status = $2, submission_type = $3, completed_at = $4, client_end_time = $5,
                   answers = $6, updated_at = NOW()
               WHERE id = $1 AND status = 'in_progress'"#,
        )
        .bind(id)
        .bind(finalization.status.as_str())
        .bind(finalization.submission_type.as_str())
        .bind(finalization.completed_at)
        .bind(finalization.client_end_time)
        .bind(Json(&finalization.answers))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(FinalizeOutcome::Lost);
        }

        if let Some(result) = &finalization.result {
            sqlx::query(
                r#"INSERT INTO session_results (
                    session_id, score, total_questions, percentage, passed, passing_percentage,
                    submission_type, total_time_spent_seconds, breakdown, computed_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (session_id) DO NOTHING"#,
            )
            .bind(id)
            .bind(result.score)
            .bind(result.total_questions)
            .bind(result.percentage)
            .bind(result.passed)
            .bind(result.passing_percentage)
            .bind(result.submission_type.as_str())
            .bind(result.total_time_spent_seconds)
            .bind(Json(&result.breakdown))
            .bind(result.computed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(FinalizeOutcome::Applied)
    }

    async fn find_result(&self, session_id: Uuid) -> Result<Option<SessionResult>> {
        let row = sqlx::query_as::<_, ResultRow>(
            r#"SELECT session_id, score, total_questions, percentage, passed, passing_percentage,
                      submission_type, total_time_spent_seconds, breakdown, computed_at
               FROM session_results WHERE session_id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SessionResult::try_from).transpose()
    }

    async fn append_violation(&self, violation: &NewViolation) -> Result<Violation> {
        let mut tx = self.pool.begin().await?;

        // serializes sequence assignment per session
        let locked: Option<Uuid> =
            sqlx::query_scalar(r#"SELECT id FROM test_sessions WHERE id = $1 FOR UPDATE"#)
                .bind(violation.session_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Err(Error::NotFound("Session not found".into()));
        }

        let row = sqlx::query_as::<_, ViolationRow>(
            r#"INSERT INTO session_violations (
                id, session_id, violation_type, occurred_at, client_count, server_sequence, recorded_at
            )
            SELECT $1, $2, $3, $4, $5, COALESCE(MAX(server_sequence), 0) + 1, $6
            FROM session_violations WHERE session_id = $2
            RETURNING id, session_id, violation_type, occurred_at, client_count, server_sequence, recorded_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(violation.session_id)
        .bind(violation.violation_type.as_str())
        .bind(violation.occurred_at)
        .bind(violation.client_count)
        .bind(violation.recorded_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Violation::try_from(row)
    }

    async fn count_violations(&self, session_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar(r#"SELECT COUNT(*) FROM session_violations WHERE session_id = $1"#)
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_overdue_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM test_sessions WHERE status = 'in_progress' AND ends_at < $1",
            SESSION_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TestSession::try_from).collect()
    }
}
