use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A question as stored in the bank and frozen into a session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

impl Question {
    /// Index of the option whose text matches the stored correct answer.
    pub fn correct_index(&self) -> Option<usize> {
        let expected = self.correct_answer.trim();
        self.options.iter().position(|opt| opt.trim() == expected)
    }
}

/// What the candidate sees while the session is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientQuestion {
    pub id: Uuid,
    pub text: String,
    pub options: Vec<String>,
    pub category: String,
}

impl From<&Question> for ClientQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
            category: q.category.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: &str) -> Question {
        Question {
            id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            text: "Which is prime?".into(),
            options: vec!["4".into(), " 7 ".into(), "9".into()],
            correct_answer: correct.into(),
            explanation: Some("7 has no divisors but 1 and itself".into()),
            category: "numeric".into(),
        }
    }

    #[test]
    fn correct_index_matches_trimmed_text() {
        assert_eq!(question("7").correct_index(), Some(1));
        assert_eq!(question("11").correct_index(), None);
    }

    #[test]
    fn client_question_has_no_answer_fields() {
        let q = question("7");
        let value = serde_json::to_value(ClientQuestion::from(&q)).unwrap();
        assert!(value.get("correct_answer").is_none());
        assert!(value.get("explanation").is_none());
        assert_eq!(value["options"].as_array().map(|o| o.len()), Some(3));
    }
}
