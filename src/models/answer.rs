use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const UNANSWERED: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: Uuid,
    pub selected_answer: i32,
    #[serde(default)]
    pub time_spent_seconds: i32,
}

/// Inserts or replaces the answer for its question id.
pub fn upsert_answer(answers: &mut Vec<Answer>, answer: Answer) {
    if let Some(pos) = answers.iter().position(|a| a.question_id == answer.question_id) {
        answers[pos] = answer;
    } else {
        answers.push(answer);
    }
}
