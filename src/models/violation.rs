use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    TabSwitch,
    FullscreenExit,
    ShortcutAttempt,
    RightClick,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::FullscreenExit => "fullscreen_exit",
            ViolationType::ShortcutAttempt => "shortcut_attempt",
            ViolationType::RightClick => "right_click",
        }
    }
}

impl FromStr for ViolationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tab_switch" => Ok(ViolationType::TabSwitch),
            "fullscreen_exit" => Ok(ViolationType::FullscreenExit),
            "shortcut_attempt" => Ok(ViolationType::ShortcutAttempt),
            "right_click" => Ok(ViolationType::RightClick),
            other => Err(format!("unknown violation type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: Uuid,
    pub session_id: Uuid,
    pub violation_type: ViolationType,
    pub occurred_at: DateTime<Utc>,
    pub client_count: i32,
    pub server_sequence: i32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewViolation {
    pub session_id: Uuid,
    pub violation_type: ViolationType,
    pub occurred_at: DateTime<Utc>,
    pub client_count: i32,
    pub recorded_at: DateTime<Utc>,
}
