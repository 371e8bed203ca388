use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::session::SubmissionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub score: i32,
    pub total_questions: i32,
    pub percentage: i32,
    pub passed: bool,
    pub passing_percentage: i32,
    pub submission_type: SubmissionType,
    pub total_time_spent_seconds: i32,
    pub breakdown: Vec<QuestionOutcome>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: Uuid,
    pub selected_answer: i32,
    pub time_spent_seconds: i32,
    pub is_correct: bool,
    pub correct_answer: i32,
    pub explanation: Option<String>,
}
