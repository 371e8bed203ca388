use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::test::AptitudeTest;

/// Outcome of checking a scheduled test window against the server clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowVerdict {
    Ready,
    NotYetOpen {
        opens_at: DateTime<Utc>,
    },
    WindowClosed {
        closed_at: DateTime<Utc>,
    },
    InsufficientRemainingTime {
        closes_at: DateTime<Utc>,
        remaining_minutes: i64,
        required_minutes: i64,
    },
}

impl WindowVerdict {
    pub fn is_ready(&self) -> bool {
        matches!(self, WindowVerdict::Ready)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            WindowVerdict::Ready => Ok(()),
            WindowVerdict::NotYetOpen { opens_at } => Err(Error::NotYetOpen { opens_at }),
            WindowVerdict::WindowClosed { closed_at } => Err(Error::WindowClosed { closed_at }),
            WindowVerdict::InsufficientRemainingTime {
                closes_at,
                remaining_minutes,
                required_minutes,
            } => Err(Error::InsufficientRemainingTime {
                closes_at,
                remaining_minutes,
                required_minutes,
            }),
        }
    }
}

/// Both window boundaries are inclusive; a session may start at `end - duration` exactly.
pub fn check_window(test: &AptitudeTest, now: DateTime<Utc>) -> WindowVerdict {
    if !test.has_expiry {
        return WindowVerdict::Ready;
    }

    if let Some(opens_at) = test.window_start {
        if now < opens_at {
            return WindowVerdict::NotYetOpen { opens_at };
        }
    }

    if let Some(closes_at) = test.window_end {
        if now > closes_at {
            return WindowVerdict::WindowClosed {
                closed_at: closes_at,
            };
        }

        let remaining = closes_at - now;
        let required = Duration::minutes(test.duration_minutes as i64);
        if remaining < required {
            return WindowVerdict::InsufficientRemainingTime {
                closes_at,
                remaining_minutes: remaining.num_minutes(),
                required_minutes: required.num_minutes(),
            };
        }
    }

    WindowVerdict::Ready
}
