//! Per-session state owned by the monitor.

use crate::domain::SessionState;
use crate::logout::LogoutOutcome;
use crate::tracker::{ActivityTracker, Timeouts};
use tokio::time::Instant;

/// One authenticated session: its activity tracker and whether the forced
/// logout has already run.
#[derive(Debug)]
pub struct Session {
    tracker: ActivityTracker,
    logout_performed: bool,
    outcome: Option<LogoutOutcome>,
}

impl Session {
    /// Start a session that logged in at `now`.
    pub fn new(timeouts: Timeouts, now: Instant) -> Self {
        Self {
            tracker: ActivityTracker::new(timeouts, now),
            logout_performed: false,
            outcome: None,
        }
    }

    /// Reinitialize for a new login.
    pub fn login(&mut self, now: Instant) {
        self.tracker.login(now);
        self.logout_performed = false;
        self.outcome = None;
    }

    /// Returns true the first time it is called in this session.
    pub fn take_logout(&mut self) -> bool {
        !std::mem::replace(&mut self.logout_performed, true)
    }

    pub fn logout_performed(&self) -> bool {
        self.logout_performed
    }

    /// Remember what the forced logout did to the session.
    pub fn record_logout(&mut self, outcome: LogoutOutcome) {
        self.outcome = Some(outcome);
    }

    /// After a lock, the user being active again means they unlocked:
    /// start a new session at `now`. Returns true if the session was re-armed.
    pub fn rearm_if_locked(&mut self, now: Instant) -> bool {
        if self.outcome != Some(LogoutOutcome::Locked)
            || self.tracker.state(now) != SessionState::Expired
        {
            return false;
        }
        self.login(now);
        true
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ActivityTracker {
        &mut self.tracker
    }
}
