pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use std::future::Future;
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::Answer;
use crate::models::candidate::Candidate;
use crate::models::question::Question;
use crate::models::result::SessionResult;
use crate::models::session::{SessionStatus, SubmissionType, TestSession};
use crate::models::test::AptitudeTest;
use crate::models::violation::{NewViolation, Violation};

pub use memory::MemoryStore;
pub use postgres::PgSessionStore;

#[derive(Debug, Clone)]
pub struct StartStamp {
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub ends_at: DateTime<Utc>,
    pub passing_percentage: i32,
    pub snapshot: Vec<Question>,
}

#[derive(Debug, Clone)]
pub struct Finalization {
    pub status: SessionStatus,
    pub submission_type: SubmissionType,
    pub completed_at: DateTime<Utc>,
    pub client_end_time: Option<DateTime<Utc>>,
    pub answers: Vec<Answer>,
    /// `None` finalizes without writing a result row.
    pub result: Option<SessionResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Applied,
    /// The session was no longer in progress; someone else finalized it first.
    Lost,
}

/// Persistence seam for the session engine.
///
/// Every state change is conditional on the current status so that duplicate
/// or racing requests cannot move a session twice.
pub trait SessionStore: Clone + Send + Sync + 'static {
    fn find_candidate(&self, id: Uuid) -> impl Future<Output = Result<Option<Candidate>>> + Send;

    fn find_test(&self, id: Uuid) -> impl Future<Output = Result<Option<AptitudeTest>>> + Send;

    fn list_questions(&self, test_id: Uuid) -> impl Future<Output = Result<Vec<Question>>> + Send;

    /// Returns the already-open session when one exists for the same candidate and test.
    fn insert_session(&self, session: &TestSession) -> impl Future<Output = Result<TestSession>> + Send;

    fn count_finished_sessions(
        &self,
        candidate_id: Uuid,
        test_id: Uuid,
    ) -> impl Future<Output = Result<i64>> + Send;

    fn find_session(&self, id: Uuid) -> impl Future<Output = Result<Option<TestSession>>> + Send;

    /// `created -> in_progress`; `None` when the session was not in `created`.
    fn begin_session(
        &self,
        id: Uuid,
        stamp: &StartStamp,
    ) -> impl Future<Output = Result<Option<TestSession>>> + Send;

    /// Upserts by question id; `false` when the session is not in progress.
    fn save_answer(&self, id: Uuid, answer: &Answer) -> impl Future<Output = Result<bool>> + Send;

    fn finalize_session(
        &self,
        id: Uuid,
        finalization: &Finalization,
    ) -> impl Future<Output = Result<FinalizeOutcome>> + Send;

    fn find_result(&self, session_id: Uuid) -> impl Future<Output = Result<Option<SessionResult>>> + Send;

    /// Appends and assigns the next per-session sequence number.
    fn append_violation(&self, violation: &NewViolation) -> impl Future<Output = Result<Violation>> + Send;

    fn count_violations(&self, session_id: Uuid) -> impl Future<Output = Result<i64>> + Send;

    /// In-progress sessions whose end time is before `cutoff`.
    fn list_overdue_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<TestSession>>> + Send;
}
