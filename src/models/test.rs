use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PASSING_PERCENTAGE: i32 = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AptitudeTest {
    pub id: Uuid,
    pub college_id: Uuid,
    pub name: String,
    pub instructions: Option<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    pub duration_minutes: i32,
    pub passing_percentage: Option<i32>,
    /// Questions drawn per session; zero or less draws the whole bank.
    #[serde(default)]
    pub question_count: i32,
    #[serde(default)]
    pub has_expiry: bool,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub link_expires_at: Option<DateTime<Utc>>,
    pub max_attempts: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl AptitudeTest {
    pub fn passing_percentage(&self) -> i32 {
        self.passing_percentage.unwrap_or(DEFAULT_PASSING_PERCENTAGE)
    }

    pub fn link_expired(&self, now: DateTime<Utc>) -> bool {
        self.link_expires_at.map(|at| at < now).unwrap_or(false)
    }
}
