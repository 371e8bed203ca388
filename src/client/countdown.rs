use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::utils::time::{format_mm_ss, Clock};

pub const TICK: Duration = Duration::from_secs(1);

/// Display-only countdown towards the server-issued `ends_at`.
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    ends_at: DateTime<Utc>,
}

impl Countdown {
    pub fn new(ends_at: DateTime<Utc>) -> Self {
        Self { ends_at }
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        (self.ends_at - now).num_seconds().max(0) as u64
    }

    pub fn display(&self, now: DateTime<Utc>) -> String {
        format_mm_ss(self.remaining_seconds(now))
    }

    /// Ticks every second until time runs out, then calls `on_expire` once.
    pub async fn run<T, E>(self, clock: Arc<dyn Clock>, mut on_tick: T, on_expire: E)
    where
        T: FnMut(u64) + Send,
        E: FnOnce() + Send,
    {
        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            let remaining = self.remaining_seconds(clock.now());
            on_tick(remaining);
            if remaining == 0 {
                break;
            }
        }
        on_expire();
    }
}

const IDLE: u8 = 0;
const IN_FLIGHT: u8 = 1;
const DONE: u8 = 2;

/// Lets at most one submit run at a time; a successful one closes the guard.
#[derive(Debug, Clone, Default)]
pub struct SubmitGuard {
    state: Arc<AtomicU8>,
}

impl SubmitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another submit is in flight or after one succeeded.
    pub fn try_begin(&self) -> Option<SubmitPermit> {
        self.state
            .compare_exchange(IDLE, IN_FLIGHT, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubmitPermit {
                state: self.state.clone(),
                completed: false,
            })
    }

    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }
}

/// Dropping a permit without completing it reopens the guard for a retry.
#[derive(Debug)]
pub struct SubmitPermit {
    state: Arc<AtomicU8>,
    completed: bool,
}

impl SubmitPermit {
    pub fn complete(mut self) {
        self.completed = true;
        self.state.store(DONE, Ordering::Release);
    }
}

impl Drop for SubmitPermit {
    fn drop(&mut self) {
        if !self.completed {
            self.state.store(IDLE, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    #[test]
    fn remaining_is_clamped() {
        let now: DateTime<Utc> = "2024-01-01T10:00:00Z".parse().unwrap();
        let countdown = Countdown::new(now + chrono::Duration::seconds(125));
        assert_eq!(countdown.display(now), "02:05");
        assert_eq!(countdown.remaining_seconds(now + chrono::Duration::minutes(5)), 0);
    }

    #[tokio::test]
    async fn expired_countdown_fires_once() {
        let now: DateTime<Utc> = "2024-01-01T10:00:00Z".parse().unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let ticks = Mutex::new(Vec::new());
        let expired = AtomicBool::new(false);

        Countdown::new(now)
            .run(clock, |s| ticks.lock().unwrap().push(s), || expired.store(true, Ordering::SeqCst))
            .await;

        assert_eq!(*ticks.lock().unwrap(), vec![0]);
        assert!(expired.load(Ordering::SeqCst));
    }

    #[test]
    fn second_submit_is_suppressed() {
        let guard = SubmitGuard::new();
        let permit = guard.try_begin().unwrap();
        assert!(guard.clone().try_begin().is_none());
        permit.complete();
        assert!(guard.is_done());
        assert!(guard.try_begin().is_none());
    }

    #[test]
    fn failed_submit_allows_retry() {
        let guard = SubmitGuard::new();
        drop(guard.try_begin().unwrap());
        assert!(!guard.is_done());
        assert!(guard.try_begin().is_some());
    }
}
