use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::Answer;
use crate::models::question::ClientQuestion;
use crate::models::result::SessionResult;
use crate::models::session::{SessionStatus, SubmissionType};
use crate::models::violation::ViolationType;
use crate::services::window::WindowVerdict;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSessionRequest {
    pub test_id: Uuid,
    pub college_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub cohort_tag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

/// Test and college the caller believes the session belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionRefs {
    pub test_id: Uuid,
    pub college_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionsResponse {
    pub session_id: Uuid,
    pub session_status: SessionStatus,
    pub test_name: String,
    pub instructions: Option<String>,
    pub rules: Vec<String>,
    pub duration_minutes: i32,
    pub total_questions: i32,
    pub passing_percentage: i32,
    pub max_violations: u32,
    pub window: WindowVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub ends_at: DateTime<Utc>,
    pub questions: Vec<ClientQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaveAnswerRequest {
    pub question_id: Uuid,
    #[validate(range(min = -1))]
    pub selected_answer: i32,
    #[validate(range(min = 0, max = 86_400))]
    pub time_spent_seconds: i32,
}

impl From<&SaveAnswerRequest> for Answer {
    fn from(req: &SaveAnswerRequest) -> Self {
        Answer {
            question_id: req.question_id,
            selected_answer: req.selected_answer,
            time_spent_seconds: req.time_spent_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub question_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitSessionRequest {
    #[validate(nested)]
    pub answers: Vec<SaveAnswerRequest>,
    pub submission_type: SubmissionType,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub already_submitted: bool,
    pub result: SessionResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReportViolationRequest {
    pub violation_type: ViolationType,
    pub timestamp: DateTime<Utc>,
    #[validate(range(min = 1))]
    pub running_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationAck {
    pub recorded: bool,
    pub server_count: i32,
    pub max_violations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub time_remaining_seconds: Option<i64>,
    pub questions_answered: i32,
    pub total_questions: i32,
    pub violation_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeSessionResponse {
    pub session_id: Uuid,
    pub test_id: Uuid,
    pub ends_at: DateTime<Utc>,
    pub time_remaining_seconds: i64,
    pub questions: Vec<ClientQuestion>,
    pub answers: Vec<Answer>,
}
