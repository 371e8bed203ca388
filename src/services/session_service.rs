use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::dto::session_dto::{
    CreateSessionRequest, InstructionsResponse, ReportViolationRequest, ResumeSessionResponse,
    SessionRefs, SessionStatusResponse, StartSessionResponse, SubmitSessionRequest,
    SubmitSessionResponse, ViolationAck,
};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::question::ClientQuestion;
use crate::models::result::SessionResult;
use crate::models::session::{SessionStatus, SubmissionType, TestSession};
use crate::models::test::{AptitudeTest, DEFAULT_PASSING_PERCENTAGE};
use crate::models::violation::NewViolation;
use crate::services::notification_service::{NotificationPort, SessionEvent};
use crate::services::question_selection::select_questions;
use crate::services::scoring_service::ScoringService;
use crate::services::window::check_window;
use crate::store::{FinalizeOutcome, Finalization, SessionStore, StartStamp};
use crate::utils::time::Clock;

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_violations: u32,
    /// Slack after `ends_at` for submissions and answer saves still in flight.
    pub submit_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_violations: 10,
            submit_grace: Duration::seconds(30),
        }
    }
}

#[derive(Clone)]
pub struct SessionService<S> {
    store: S,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl<S: SessionStore> SessionService<S> {
    pub fn new(
        store: S,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    pub async fn create_session(
        &self,
        candidate_id: Uuid,
        req: CreateSessionRequest,
    ) -> Result<TestSession> {
        let candidate = self
            .store
            .find_candidate(candidate_id)
            .await?
            .ok_or(Error::Unauthenticated)?;
        if candidate.college_id != req.college_id {
            return Err(Error::Forbidden("Candidate is not enrolled in this college".into()));
        }

        let test = self.find_test_for_college(req.test_id, req.college_id).await?;
        let now = self.clock.now();
        if let Some(expired_at) = test.link_expires_at.filter(|_| test.link_expired(now)) {
            return Err(Error::AlreadyExpiredLink { expired_at });
        }

        if let Some(max_attempts) = test.max_attempts {
            let finished = self
                .store
                .count_finished_sessions(candidate_id, test.id)
                .await?;
            if finished >= max_attempts as i64 {
                return Err(Error::Conflict(format!(
                    "Attempt limit of {} reached for this test",
                    max_attempts
                )));
            }
        }

        let draft = TestSession::new(candidate_id, test.id, req.college_id, req.cohort_tag, now);
        let session = self.store.insert_session(&draft).await?;
        if session.id == draft.id {
            tracing::info!(session_id = %session.id, %candidate_id, test_id = %test.id, "Session created");
        } else {
            tracing::info!(session_id = %session.id, %candidate_id, "Reusing open session");
        }
        Ok(session)
    }

    pub async fn get_instructions(
        &self,
        candidate_id: Uuid,
        session_id: Uuid,
        refs: SessionRefs,
    ) -> Result<InstructionsResponse> {
        let session = self.load_owned(candidate_id, session_id, Some(refs)).await?;
        let test = self.find_test_for_college(session.test_id, session.college_id).await?;
        let now = self.clock.now();
        let window = check_window(&test, now);

        let total_questions = if test.question_count > 0 {
            test.question_count
        } else {
            self.store.list_questions(test.id).await?.len() as i32
        };

        Ok(InstructionsResponse {
            session_id: session.id,
            session_status: session.status,
            test_name: test.name.clone(),
            instructions: test.instructions.clone(),
            rules: test.rules.clone(),
            duration_minutes: test.duration_minutes,
            total_questions,
            passing_percentage: test.passing_percentage(),
            max_violations: self.settings.max_violations,
            window,
        })
    }

    pub async fn start_session(
        &self,
        candidate_id: Uuid,
        session_id: Uuid,
        refs: SessionRefs,
    ) -> Result<StartSessionResponse> {
        let session = self.load_owned(candidate_id, session_id, Some(refs)).await?;
        ensure_startable(session.status)?;

        let test = self.find_test_for_college(session.test_id, session.college_id).await?;
        let now = self.clock.now();
        if let Some(expired_at) = test.link_expires_at.filter(|_| test.link_expired(now)) {
            return Err(Error::AlreadyExpiredLink { expired_at });
        }
        // time may have passed since the instructions were fetched
        check_window(&test, now).into_result()?;

        let bank = self.store.list_questions(test.id).await?;
        let snapshot = {
            let mut rng = rand::thread_rng();
            select_questions(&bank, test.question_count, &mut rng)
        };
        if snapshot.is_empty() {
            tracing::warn!(%session_id, test_id = %test.id, "Starting session with an empty question bank");
        }

        let stamp = StartStamp {
            started_at: now,
            duration_minutes: test.duration_minutes,
            ends_at: now + Duration::minutes(test.duration_minutes as i64),
            passing_percentage: test.passing_percentage(),
            snapshot,
        };

        let Some(started) = self.store.begin_session(session_id, &stamp).await? else {
            // lost a race with another start or a submit
            let current = self.store.find_session(session_id).await?;
            return Err(match current.map(|s| s.status) {
                Some(status) => ensure_startable(status)
                    .err()
                    .unwrap_or(Error::Conflict("Session changed state concurrently".into())),
                None => Error::NotFound("Session not found".into()),
            });
        };

        tracing::info!(
            %session_id,
            %candidate_id,
            questions = started.questions_snapshot.len(),
            ends_at = %stamp.ends_at,
            "Session started"
        );

        Ok(StartSessionResponse {
            session_id: started.id,
            status: started.status,
            started_at: stamp.started_at,
            duration_minutes: stamp.duration_minutes,
            ends_at: stamp.ends_at,
            questions: started.questions_snapshot.iter().map(ClientQuestion::from).collect(),
        })
    }

    pub async fn save_answer(
        &self,
        candidate_id: Uuid,
        session_id: Uuid,
        answer: Answer,
    ) -> Result<DateTime<Utc>> {
        let session = self.load_owned(candidate_id, session_id, None).await?;
        let now = self.clock.now();
        ensure_accepting_answers(&session, now, self.settings.submit_grace)?;
        if !session.contains_question(answer.question_id) {
            return Err(Error::BadRequest("Question is not part of this session".into()));
        }

        if !self.store.save_answer(session_id, &answer).await? {
            return Err(Error::AlreadySubmitted);
        }
        tracing::debug!(%session_id, question_id = %answer.question_id, "Answer checkpointed");
        Ok(now)
    }

    pub async fn report_violation(
        &self,
        candidate_id: Uuid,
        session_id: Uuid,
        report: ReportViolationRequest,
    ) -> Result<ViolationAck> {
        let session = self.load_owned(candidate_id, session_id, None).await?;
        let violation = self
            .store
            .append_violation(&NewViolation {
                session_id,
                violation_type: report.violation_type,
                occurred_at: report.timestamp,
                client_count: report.running_count,
                recorded_at: self.clock.now(),
            })
            .await?;

        tracing::info!(
            %session_id,
            violation = violation.violation_type.as_str(),
            server_count = violation.server_sequence,
            client_count = violation.client_count,
            "Integrity violation recorded"
        );

        let limit = self.settings.max_violations as i32;
        if session.status == SessionStatus::InProgress && violation.server_sequence == limit {
            tracing::warn!(%session_id, %candidate_id, "Violation limit reached");
            self.notifier.broadcast(SessionEvent::ViolationLimitReached {
                session_id,
                candidate_id,
                count: violation.server_sequence,
            });
        }

        Ok(ViolationAck {
            recorded: true,
            server_count: violation.server_sequence,
            max_violations: self.settings.max_violations,
        })
    }

    pub async fn submit_session(
        &self,
        candidate_id: Uuid,
        session_id: Uuid,
        req: SubmitSessionRequest,
    ) -> Result<SubmitSessionResponse> {
        let session = self.load_owned(candidate_id, session_id, None).await?;

        if session.status.is_terminal() {
            return self.already_submitted(&session).await;
        }
        if session.status == SessionStatus::Created {
            return Err(Error::Conflict("Session has not been started".into()));
        }
        if session.questions_snapshot.is_empty() {
            return Err(Error::Invalid("Session has no questions to grade".into()));
        }

        let now = self.clock.now();
        let late = session.is_overdue(now, self.settings.submit_grace);
        let (status, answers) = if late {
            tracing::warn!(%session_id, "Late submission, grading checkpointed answers only");
            (SessionStatus::Expired, merge_answers(&session, &[]))
        } else {
            let submitted: Vec<Answer> = req.answers.iter().map(Answer::from).collect();
            (req.submission_type.final_status(), merge_answers(&session, &submitted))
        };

        let result = ScoringService::score(
            session.id,
            &session.questions_snapshot,
            &answers,
            session.passing_percentage.unwrap_or(DEFAULT_PASSING_PERCENTAGE),
            req.submission_type,
            now,
        );

        let finalization = Finalization {
            status,
            submission_type: req.submission_type,
            completed_at: now,
            client_end_time: req.end_time,
            answers,
            result: Some(result.clone()),
        };

        match self.store.finalize_session(session_id, &finalization).await? {
            FinalizeOutcome::Applied => {
                tracing::info!(
                    %session_id,
                    status = status.as_str(),
                    submission = req.submission_type.as_str(),
                    score = result.score,
                    percentage = result.percentage,
                    passed = result.passed,
                    "Session graded"
                );
                self.notifier.notify(
                    candidate_id,
                    SessionEvent::SessionSubmitted {
                        session_id,
                        test_id: session.test_id,
                        status,
                        score: result.score,
                        percentage: result.percentage,
                        passed: result.passed,
                    },
                );
                Ok(SubmitSessionResponse {
                    session_id,
                    status,
                    already_submitted: false,
                    result,
                })
            }
            FinalizeOutcome::Lost => {
                let current = self
                    .store
                    .find_session(session_id)
                    .await?
                    .ok_or_else(|| Error::NotFound("Session not found".into()))?;
                self.already_submitted(&current).await
            }
        }
    }

    pub async fn get_status(&self, candidate_id: Uuid, session_id: Uuid) -> Result<SessionStatusResponse> {
        let session = self.load_owned(candidate_id, session_id, None).await?;
        let now = self.clock.now();
        let violation_count = self.store.count_violations(session_id).await?;
        let time_remaining_seconds = match session.status {
            SessionStatus::InProgress => session.time_remaining(now).map(|d| d.num_seconds()),
            _ => None,
        };

        Ok(SessionStatusResponse {
            session_id,
            status: session.status,
            started_at: session.started_at,
            ends_at: session.ends_at,
            time_remaining_seconds,
            questions_answered: session
                .answers
                .iter()
                .filter(|a| a.selected_answer >= 0)
                .count() as i32,
            total_questions: session.questions_snapshot.len() as i32,
            violation_count,
        })
    }

    pub async fn resume_session(&self, candidate_id: Uuid, session_id: Uuid) -> Result<ResumeSessionResponse> {
        let session = self.load_owned(candidate_id, session_id, None).await?;
        match session.status {
            SessionStatus::InProgress => {}
            SessionStatus::Created => {
                return Err(Error::Conflict("Session has not been started".into()))
            }
            _ => return Err(Error::AlreadySubmitted),
        }

        let now = self.clock.now();
        let ends_at = session
            .ends_at
            .ok_or_else(|| Error::Internal("In-progress session without end time".into()))?;
        Ok(ResumeSessionResponse {
            session_id,
            test_id: session.test_id,
            ends_at,
            time_remaining_seconds: session.time_remaining(now).map(|d| d.num_seconds()).unwrap_or(0),
            questions: session.questions_snapshot.iter().map(ClientQuestion::from).collect(),
            answers: session.answers,
        })
    }

    pub async fn get_result(&self, candidate_id: Uuid, session_id: Uuid) -> Result<SessionResult> {
        let session = self.load_owned(candidate_id, session_id, None).await?;
        if !session.status.is_terminal() {
            return Err(Error::Conflict("Session has not been submitted".into()));
        }
        self.store
            .find_result(session_id)
            .await?
            .ok_or_else(|| Error::NotFound("Result not found".into()))
    }

    /// Finalizes in-progress sessions whose time ran out without a submission.
    pub async fn expire_overdue(&self) -> Result<usize> {
        let now = self.clock.now();
        let overdue = self
            .store
            .list_overdue_sessions(now - self.settings.submit_grace)
            .await?;

        let mut expired = 0;
        for session in overdue {
            let answers = merge_answers(&session, &[]);
            // nothing to grade: close the session without a result row
            let result = if session.questions_snapshot.is_empty() {
                tracing::warn!(session_id = %session.id, "Expiring session with no questions, no result recorded");
                None
            } else {
                Some(ScoringService::score(
                    session.id,
                    &session.questions_snapshot,
                    &answers,
                    session.passing_percentage.unwrap_or(DEFAULT_PASSING_PERCENTAGE),
                    SubmissionType::Timeout,
                    now,
                ))
            };
            let finalization = Finalization {
                status: SessionStatus::Expired,
                submission_type: SubmissionType::Timeout,
                completed_at: now,
                client_end_time: None,
                answers,
                result,
            };
            if self.store.finalize_session(session.id, &finalization).await? != FinalizeOutcome::Applied {
                continue;
            }
            expired += 1;
            if let Some(result) = &finalization.result {
                self.notifier.notify(
                    session.candidate_id,
                    SessionEvent::SessionExpired {
                        session_id: session.id,
                        test_id: session.test_id,
                        score: result.score,
                        percentage: result.percentage,
                    },
                );
            }
        }

        if expired > 0 {
            tracing::info!(count = expired, "Expired overdue sessions");
        }
        Ok(expired)
    }

    async fn already_submitted(&self, session: &TestSession) -> Result<SubmitSessionResponse> {
        let result = self
            .store
            .find_result(session.id)
            .await?
            .ok_or(Error::AlreadySubmitted)?;
        tracing::info!(session_id = %session.id, "Duplicate submit, returning stored result");
        Ok(SubmitSessionResponse {
            session_id: session.id,
            status: session.status,
            already_submitted: true,
            result,
        })
    }

    async fn load_owned(
        &self,
        candidate_id: Uuid,
        session_id: Uuid,
        refs: Option<SessionRefs>,
    ) -> Result<TestSession> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound("Session not found".into()))?;
        if session.candidate_id != candidate_id {
            tracing::warn!(%session_id, %candidate_id, "Session accessed by another candidate");
            return Err(Error::Forbidden("Session belongs to another candidate".into()));
        }
        if let Some(refs) = refs {
            if refs.test_id != session.test_id || refs.college_id != session.college_id {
                return Err(Error::NotFound("Session does not match test or college".into()));
            }
        }
        Ok(session)
    }

    async fn find_test_for_college(&self, test_id: Uuid, college_id: Uuid) -> Result<AptitudeTest> {
        match self.store.find_test(test_id).await? {
            Some(test) if test.college_id == college_id && test.is_active => Ok(test),
            _ => Err(Error::NotFound("Test not found".into())),
        }
    }
}

fn ensure_startable(status: SessionStatus) -> Result<()> {
    match status {
        SessionStatus::Created => Ok(()),
        SessionStatus::InProgress => Err(Error::AlreadyStarted),
        _ => Err(Error::AlreadySubmitted),
    }
}

fn ensure_accepting_answers(session: &TestSession, now: DateTime<Utc>, grace: Duration) -> Result<()> {
    match session.status {
        SessionStatus::InProgress if !session.is_overdue(now, grace) => Ok(()),
        SessionStatus::InProgress => Err(Error::Conflict("Session time is over".into())),
        SessionStatus::Created => Err(Error::Conflict("Session has not been started".into())),
        _ => Err(Error::AlreadySubmitted),
    }
}

/// Checkpointed answers overlaid with the submitted ones, restricted to the snapshot.
fn merge_answers(session: &TestSession, submitted: &[Answer]) -> Vec<Answer> {
    let mut merged: HashMap<Uuid, Answer> = HashMap::new();
    for answer in session.answers.iter().chain(submitted.iter()) {
        merged.insert(answer.question_id, answer.clone());
    }
    session
        .questions_snapshot
        .iter()
        .filter_map(|q| merged.remove(&q.id))
        .collect()
}
