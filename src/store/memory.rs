use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{FinalizeOutcome, Finalization, SessionStore, StartStamp};
use crate::error::Result;
use crate::models::answer::{upsert_answer, Answer};
use crate::models::candidate::Candidate;
use crate::models::question::Question;
use crate::models::result::SessionResult;
use crate::models::session::{SessionStatus, TestSession};
use crate::models::test::AptitudeTest;
use crate::models::violation::{NewViolation, Violation};

/// Fixture data loaded into a [`MemoryStore`] at startup.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub tests: Vec<AptitudeTest>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Default)]
struct MemoryState {
    candidates: HashMap<Uuid, Candidate>,
    tests: HashMap<Uuid, AptitudeTest>,
    questions: Vec<Question>,
    sessions: HashMap<Uuid, TestSession>,
    results: HashMap<Uuid, SessionResult>,
    violations: Vec<Violation>,
}

/// Process-local store with the same conditional-update semantics as Postgres.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let store = Self::new();
        for candidate in seed.candidates {
            store.put_candidate(candidate);
        }
        for test in seed.tests {
            store.put_test(test);
        }
        for question in seed.questions {
            store.put_question(question);
        }
        store
    }

    pub fn load_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let seed: SeedData = serde_json::from_str(&raw)?;
        Ok(Self::from_seed(seed))
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn put_candidate(&self, candidate: Candidate) {
        self.lock().candidates.insert(candidate.id, candidate);
    }

    pub fn put_test(&self, test: AptitudeTest) {
        self.lock().tests.insert(test.id, test);
    }

    /// Inserts or replaces a bank question; started sessions keep their snapshot.
    pub fn put_question(&self, question: Question) {
        let mut state = self.lock();
        match state.questions.iter().position(|q| q.id == question.id) {
            Some(pos) => state.questions[pos] = question,
            None => state.questions.push(question),
        }
    }

    pub fn put_session(&self, session: TestSession) {
        self.lock().sessions.insert(session.id, session);
    }

    pub fn violations(&self, session_id: Uuid) -> Vec<Violation> {
        self.lock()
            .violations
            .iter()
            .filter(|v| v.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn result_count(&self) -> usize {
        self.lock().results.len()
    }
}

impl SessionStore for MemoryStore {
    async fn find_candidate(&self, id: Uuid) -> Result<Option<Candidate>> {
        Ok(self.lock().candidates.get(&id).cloned())
    }

    async fn find_test(&self, id: Uuid) -> Result<Option<AptitudeTest>> {
        Ok(self.lock().tests.get(&id).cloned())
    }

    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        Ok(self
            .lock()
            .questions
            .iter()
            .filter(|q| q.test_id == test_id)
            .cloned()
            .collect())
    }

    async fn insert_session(&self, session: &TestSession) -> Result<TestSession> {
        let mut state = self.lock();
        let open = state.sessions.values().find(|s| {
            s.candidate_id == session.candidate_id
                && s.test_id == session.test_id
                && !s.status.is_terminal()
        });
        if let Some(existing) = open {
            return Ok(existing.clone());
        }
        state.sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn count_finished_sessions(&self, candidate_id: Uuid, test_id: Uuid) -> Result<i64> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|s| {
                s.candidate_id == candidate_id && s.test_id == test_id && s.status.is_terminal()
            })
            .count() as i64)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<TestSession>> {
        Ok(self.lock().sessions.get(&id).cloned())
    }

    async fn begin_session(&self, id: Uuid, stamp: &StartStamp) -> Result<Option<TestSession>> {
        let mut state = self.lock();
        let Some(session) = state.sessions.get_mut(&id) else {
            return Ok(None);
        };
        if session.status != SessionStatus::Created {
            return Ok(None);
        }
        session.status = SessionStatus::InProgress;
        session.started_at = Some(stamp.started_at);
        session.duration_minutes = Some(stamp.duration_minutes);
        session.ends_at = Some(stamp.ends_at);
        session.passing_percentage = Some(stamp.passing_percentage);
        session.questions_snapshot = stamp.snapshot.clone();
        Ok(Some(session.clone()))
    }

    async fn save_answer(&self, id: Uuid, answer: &Answer) -> Result<bool> {
        let mut state = self.lock();
        match state.sessions.get_mut(&id) {
            Some(session) if session.status == SessionStatus::InProgress => {
                upsert_answer(&mut session.answers, answer.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finalize_session(&self, id: Uuid, finalization: &Finalization) -> Result<FinalizeOutcome> {
        let mut state = self.lock();
        let applied = match state.sessions.get_mut(&id) {
            Some(session) if session.status == SessionStatus::InProgress => {
                session.status = finalization.status;
                session.submission_type = Some(finalization.submission_type);
                session.completed_at = Some(finalization.completed_at);
                session.client_end_time = finalization.client_end_time;
                session.answers = finalization.answers.clone();
                true
            }
            _ => false,
        };
        if !applied {
            return Ok(FinalizeOutcome::Lost);
        }
        if let Some(result) = &finalization.result {
            state.results.entry(id).or_insert_with(|| result.clone());
        }
        Ok(FinalizeOutcome::Applied)
    }

    async fn find_result(&self, session_id: Uuid) -> Result<Option<SessionResult>> {
        Ok(self.lock().results.get(&session_id).cloned())
    }

    async fn append_violation(&self, violation: &NewViolation) -> Result<Violation> {
        let mut state = self.lock();
        let sequence = state
            .violations
            .iter()
            .filter(|v| v.session_id == violation.session_id)
            .count() as i32
            + 1;
        let stored = Violation {
            id: Uuid::new_v4(),
            session_id: violation.session_id,
            violation_type: violation.violation_type,
            occurred_at: violation.occurred_at,
            client_count: violation.client_count,
            server_sequence: sequence,
            recorded_at: violation.recorded_at,
        };
        state.violations.push(stored.clone());
        Ok(stored)
    }

    async fn count_violations(&self, session_id: Uuid) -> Result<i64> {
        Ok(self
            .lock()
            .violations
            .iter()
            .filter(|v| v.session_id == session_id)
            .count() as i64)
    }

    async fn list_overdue_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestSession>> {
        Ok(self
            .lock()
            .sessions
            .values()
            .filter(|s| {
                s.status == SessionStatus::InProgress && s.ends_at.map(|e| e < cutoff).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}
