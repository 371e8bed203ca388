use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::answer::Answer;
use crate::models::question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    InProgress,
    Completed,
    Expired,
    AutoSubmitted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
            SessionStatus::AutoSubmitted => "auto_submitted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Expired | SessionStatus::AutoSubmitted
        )
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(SessionStatus::Created),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "expired" => Ok(SessionStatus::Expired),
            "auto_submitted" => Ok(SessionStatus::AutoSubmitted),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    Manual,
    Auto,
    Timeout,
}

impl SubmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::Manual => "manual",
            SubmissionType::Auto => "auto",
            SubmissionType::Timeout => "timeout",
        }
    }

    /// Status a timely submission of this kind finalizes into.
    pub fn final_status(&self) -> SessionStatus {
        match self {
            SubmissionType::Manual => SessionStatus::Completed,
            SubmissionType::Auto | SubmissionType::Timeout => SessionStatus::AutoSubmitted,
        }
    }
}

impl FromStr for SubmissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SubmissionType::Manual),
            "auto" => Ok(SubmissionType::Auto),
            "timeout" => Ok(SubmissionType::Timeout),
            other => Err(format!("unknown submission type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub test_id: Uuid,
    pub college_id: Uuid,
    pub cohort_tag: Option<String>,
    pub status: SessionStatus,
    pub submission_type: Option<SubmissionType>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub ends_at: Option<DateTime<Utc>>,
    pub passing_percentage: Option<i32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub client_end_time: Option<DateTime<Utc>>,
    pub questions_snapshot: Vec<Question>,
    pub answers: Vec<Answer>,
}

impl TestSession {
    pub fn new(
        candidate_id: Uuid,
        test_id: Uuid,
        college_id: Uuid,
        cohort_tag: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_id,
            test_id,
            college_id,
            cohort_tag,
            status: SessionStatus::Created,
            submission_type: None,
            created_at: now,
            started_at: None,
            duration_minutes: None,
            ends_at: None,
            passing_percentage: None,
            completed_at: None,
            client_end_time: None,
            questions_snapshot: Vec::new(),
            answers: Vec::new(),
        }
    }

    /// Remaining time derived from the stored end time; `None` until started.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.ends_at
            .map(|end| (end - now).max(Duration::zero()))
    }

    pub fn is_overdue(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        match self.ends_at {
            Some(end) => now > end + grace,
            None => false,
        }
    }

    pub fn contains_question(&self, question_id: Uuid) -> bool {
        self.questions_snapshot.iter().any(|q| q.id == question_id)
    }
}
