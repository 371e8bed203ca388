use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::dto::session_dto::ReportViolationRequest;
use crate::models::session::SubmissionType;
use crate::models::violation::ViolationType;

/// Server default; prefer the `max_violations` reported with the instructions.
pub const DEFAULT_MAX_VIOLATIONS: u32 = 10;
pub const VIOLATION_COOLDOWN_MS: i64 = 2_000;
pub const FULLSCREEN_REENTRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

/// Fire-and-forget delivery of accepted violations to the server.
#[cfg_attr(test, mockall::automock)]
pub trait ViolationReporter: Send + Sync {
    fn report(&self, session_id: Uuid, report: ReportViolationRequest);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl KeyChord {
    pub fn plain(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ctrl: false,
            meta: false,
            shift: false,
        }
    }

    pub fn ctrl(key: &str) -> Self {
        Self {
            ctrl: true,
            ..Self::plain(key)
        }
    }

    pub fn ctrl_shift(key: &str) -> Self {
        Self {
            shift: true,
            ..Self::ctrl(key)
        }
    }

    /// Devtools, view-source, save, select-all and clipboard shortcuts.
    pub fn is_blocked(&self) -> bool {
        if self.key.eq_ignore_ascii_case("F12") {
            return true;
        }
        if !(self.ctrl || self.meta) {
            return false;
        }
        let key = self.key.to_ascii_lowercase();
        if self.shift && matches!(key.as_str(), "i" | "j" | "c") {
            return true;
        }
        matches!(key.as_str(), "u" | "s" | "a" | "c" | "v" | "x")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    VisibilityHidden,
    FullscreenChanged { is_fullscreen: bool },
    KeyDown(KeyChord),
    ContextMenu,
    FullscreenReentryFailed,
}

/// What the host environment should do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorAction {
    PreventDefault,
    Warn {
        violation: ViolationType,
        count: u32,
        max: u32,
    },
    RequestFullscreen { after: std::time::Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Detached,
    Armed,
    Escalated,
}

type EscalationHook = Box<dyn FnMut(SubmissionType) + Send>;

pub struct ViolationMonitor<R> {
    session_id: Uuid,
    reporter: R,
    on_escalate: EscalationHook,
    max_violations: u32,
    state: MonitorState,
    count: u32,
    last_accepted: Option<DateTime<Utc>>,
}

impl<R: ViolationReporter> ViolationMonitor<R> {
    /// `max_violations` should come from the server's instructions response
    /// so both sides escalate at the same count.
    pub fn new(session_id: Uuid, max_violations: u32, reporter: R, on_escalate: EscalationHook) -> Self {
        Self {
            session_id,
            reporter,
            on_escalate,
            max_violations: max_violations.max(1),
            state: MonitorState::Detached,
            count: 0,
            last_accepted: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_violations(&self) -> u32 {
        self.max_violations
    }

    pub fn attach(&mut self) {
        if self.state == MonitorState::Detached {
            self.state = if self.count >= self.max_violations {
                MonitorState::Escalated
            } else {
                MonitorState::Armed
            };
        }
    }

    pub fn detach(&mut self) {
        self.state = MonitorState::Detached;
    }

    pub fn handle(&mut self, event: MonitorEvent, at: DateTime<Utc>) -> Vec<MonitorAction> {
        if self.state == MonitorState::Detached {
            return Vec::new();
        }

        let mut actions = Vec::new();
        let violation = match event {
            MonitorEvent::VisibilityHidden => Some(ViolationType::TabSwitch),
            MonitorEvent::FullscreenChanged { is_fullscreen: true } => None,
            MonitorEvent::FullscreenChanged { is_fullscreen: false } => {
                actions.push(MonitorAction::RequestFullscreen {
                    after: FULLSCREEN_REENTRY_DELAY,
                });
                Some(ViolationType::FullscreenExit)
            }
            MonitorEvent::KeyDown(chord) if chord.is_blocked() => {
                actions.push(MonitorAction::PreventDefault);
                Some(ViolationType::ShortcutAttempt)
            }
            MonitorEvent::KeyDown(_) => None,
            MonitorEvent::ContextMenu => {
                actions.push(MonitorAction::PreventDefault);
                Some(ViolationType::RightClick)
            }
            MonitorEvent::FullscreenReentryFailed => {
                tracing::debug!(session_id = %self.session_id, "Fullscreen re-entry refused");
                None
            }
        };

        if let Some(violation) = violation {
            if let Some(warning) = self.accept(violation, at) {
                actions.push(warning);
            }
        }
        actions
    }

    fn accept(&mut self, violation: ViolationType, at: DateTime<Utc>) -> Option<MonitorAction> {
        if let Some(last) = self.last_accepted {
            if at - last < Duration::milliseconds(VIOLATION_COOLDOWN_MS) {
                return None;
            }
        }
        self.last_accepted = Some(at);
        self.count += 1;

        self.reporter.report(
            self.session_id,
            ReportViolationRequest {
                violation_type: violation,
                timestamp: at,
                running_count: self.count as i32,
            },
        );
        tracing::warn!(
            session_id = %self.session_id,
            violation = violation.as_str(),
            count = self.count,
            max = self.max_violations,
            "Violation detected"
        );

        if self.count >= self.max_violations && self.state == MonitorState::Armed {
            self.state = MonitorState::Escalated;
            (self.on_escalate)(SubmissionType::Auto);
        }

        Some(MonitorAction::Warn {
            violation,
            count: self.count,
            max: self.max_violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn t0() -> DateTime<Utc> {
        "2024-01-01T10:00:00Z".parse().unwrap()
    }

    fn recorder() -> (EscalationHook, Arc<Mutex<Vec<SubmissionType>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        (Box::new(move |kind| sink.lock().unwrap().push(kind)), fired)
    }

    fn armed(reporter: MockViolationReporter) -> (ViolationMonitor<MockViolationReporter>, Arc<Mutex<Vec<SubmissionType>>>) {
        let (hook, fired) = recorder();
        let mut monitor = ViolationMonitor::new(Uuid::nil(), DEFAULT_MAX_VIOLATIONS, reporter, hook);
        monitor.attach();
        (monitor, fired)
    }

    #[test]
    fn blocked_chords() {
        assert!(KeyChord::plain("F12").is_blocked());
        assert!(KeyChord::ctrl_shift("I").is_blocked());
        assert!(KeyChord::ctrl("u").is_blocked());
        assert!(KeyChord::ctrl("v").is_blocked());
        assert!(KeyChord { meta: true, ..KeyChord::plain("c") }.is_blocked());
        assert!(!KeyChord::plain("a").is_blocked());
        assert!(!KeyChord::ctrl("z").is_blocked());
    }

    #[test]
    fn detached_monitor_ignores_events() {
        let (hook, _) = recorder();
        let mut monitor = ViolationMonitor::new(Uuid::nil(), DEFAULT_MAX_VIOLATIONS, MockViolationReporter::new(), hook);
        assert!(monitor.handle(MonitorEvent::VisibilityHidden, t0()).is_empty());
        assert_eq!(monitor.count(), 0);
    }

    #[test]
    fn rapid_events_are_debounced() {
        let mut reporter = MockViolationReporter::new();
        reporter.expect_report().times(2).return_const(());
        let (mut monitor, _) = armed(reporter);

        monitor.handle(MonitorEvent::VisibilityHidden, t0());
        monitor.handle(MonitorEvent::VisibilityHidden, t0() + Duration::milliseconds(500));
        monitor.handle(MonitorEvent::VisibilityHidden, t0() + Duration::milliseconds(1999));
        monitor.handle(MonitorEvent::VisibilityHidden, t0() + Duration::milliseconds(2000));
        assert_eq!(monitor.count(), 2);
    }

    #[test]
    fn debounced_shortcut_is_still_prevented() {
        let mut reporter = MockViolationReporter::new();
        reporter.expect_report().times(1).return_const(());
        let (mut monitor, _) = armed(reporter);

        monitor.handle(MonitorEvent::VisibilityHidden, t0());
        let actions = monitor.handle(MonitorEvent::KeyDown(KeyChord::ctrl("c")), t0() + Duration::seconds(1));
        assert_eq!(actions, vec![MonitorAction::PreventDefault]);
        assert_eq!(monitor.count(), 1);
    }

    #[test]
    fn fullscreen_exit_requests_reentry_and_failure_is_not_counted() {
        let mut reporter = MockViolationReporter::new();
        reporter
            .expect_report()
            .withf(|_, r| r.violation_type == ViolationType::FullscreenExit && r.running_count == 1)
            .times(1)
            .return_const(());
        let (mut monitor, _) = armed(reporter);

        let actions = monitor.handle(MonitorEvent::FullscreenChanged { is_fullscreen: false }, t0());
        assert_eq!(actions[0], MonitorAction::RequestFullscreen { after: FULLSCREEN_REENTRY_DELAY });
        assert!(monitor
            .handle(MonitorEvent::FullscreenReentryFailed, t0() + Duration::seconds(5))
            .is_empty());
        assert_eq!(monitor.count(), 1);
    }

    #[test]
    fn tenth_violation_escalates_once() {
        let mut reporter = MockViolationReporter::new();
        reporter.expect_report().times(12).return_const(());
        let (mut monitor, fired) = armed(reporter);

        for i in 0..12 {
            monitor.handle(MonitorEvent::ContextMenu, t0() + Duration::seconds(3 * i));
            if i == 8 {
                assert!(fired.lock().unwrap().is_empty());
            }
        }
        assert_eq!(monitor.count(), 12);
        assert_eq!(monitor.state(), MonitorState::Escalated);
        assert_eq!(*fired.lock().unwrap(), vec![SubmissionType::Auto]);
    }

    #[test]
    fn escalates_at_the_server_threshold() {
        let mut reporter = MockViolationReporter::new();
        reporter.expect_report().times(3).return_const(());
        let (hook, fired) = recorder();
        let mut monitor = ViolationMonitor::new(Uuid::nil(), 3, reporter, hook);
        monitor.attach();

        monitor.handle(MonitorEvent::ContextMenu, t0());
        monitor.handle(MonitorEvent::ContextMenu, t0() + Duration::seconds(3));
        assert!(fired.lock().unwrap().is_empty());
        let actions = monitor.handle(MonitorEvent::ContextMenu, t0() + Duration::seconds(6));
        assert!(actions.contains(&MonitorAction::Warn {
            violation: ViolationType::RightClick,
            count: 3,
            max: 3,
        }));
        assert_eq!(monitor.state(), MonitorState::Escalated);
        assert_eq!(*fired.lock().unwrap(), vec![SubmissionType::Auto]);
    }

    #[test]
    fn zero_threshold_is_clamped_to_one() {
        let (hook, _) = recorder();
        let monitor = ViolationMonitor::new(Uuid::nil(), 0, MockViolationReporter::new(), hook);
        assert_eq!(monitor.max_violations(), 1);
    }

    #[test]
    fn detach_stops_counting() {
        let mut reporter = MockViolationReporter::new();
        reporter.expect_report().times(1).return_const(());
        let (mut monitor, _) = armed(reporter);
        monitor.handle(MonitorEvent::VisibilityHidden, t0());
        monitor.detach();
        monitor.handle(MonitorEvent::VisibilityHidden, t0() + Duration::seconds(10));
        assert_eq!(monitor.count(), 1);
        assert_eq!(monitor.state(), MonitorState::Detached);
    }
}
