use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

const RESUME_KEY: &str = "aptitude_session";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    pub session_id: Uuid,
    pub test_id: Uuid,
    pub time_remaining_seconds: i64,
}

/// String key/value storage that outlives a page reload.
pub trait ResumeStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryResumeStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl ResumeStorage for MemoryResumeStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

pub struct ResumeCache<S> {
    storage: S,
}

impl<S: ResumeStorage> ResumeCache<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn save(&self, state: &ResumeState) {
        match serde_json::to_string(state) {
            Ok(raw) => self.storage.set(RESUME_KEY, raw),
            Err(e) => tracing::warn!(error = ?e, "Could not persist resume state"),
        }
    }

    /// Unreadable entries are dropped rather than surfaced.
    pub fn load(&self) -> Option<ResumeState> {
        let raw = self.storage.get(RESUME_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(error = ?e, "Discarding corrupt resume state");
                self.storage.remove(RESUME_KEY);
                None
            }
        }
    }

    pub fn clear(&self) {
        self.storage.remove(RESUME_KEY);
    }
}
