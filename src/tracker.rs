//! Inactivity state machine.
//!
//! Tracks the last user activity and derives the session phase from it:
//! - `Active` until the idle threshold elapses with no activity
//! - `Warning` for the grace period, publishing a countdown
//! - `Expired` once the grace period runs out (terminal until the next login)
//!
//! The tracker never reads the clock itself; every operation takes `now`,
//! so the async driver and the tests decide what time it is.

use crate::domain::{EndReason, InactivityEvent, SessionState};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Durations that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Time without activity before the warning is shown.
    pub idle_threshold: Duration,
    /// Countdown length once the warning is shown.
    pub grace_period: Duration,
    /// Interval between countdown re-publications. Zero disables ticks.
    pub tick_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(1800),
            grace_period: Duration::from_secs(60),
            tick_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Warning {
        /// When the idle threshold elapsed; ticks are anchored here.
        started_at: Instant,
        expires_at: Instant,
        next_tick: Instant,
    },
    Expired,
}

/// Activity state for one authenticated session.
#[derive(Debug)]
pub struct ActivityTracker {
    timeouts: Timeouts,
    last_activity: Instant,
    phase: Phase,
}

impl ActivityTracker {
    /// Create a tracker for a session that logged in at `now`.
    pub fn new(timeouts: Timeouts, now: Instant) -> Self {
        Self {
            timeouts,
            last_activity: now,
            phase: Phase::Active,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Time of the most recent recorded activity.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Reinitialize for a new login.
    pub fn login(&mut self, now: Instant) {
        debug!("Session (re)started, tracker reset to active");
        self.last_activity = now;
        self.phase = Phase::Active;
    }

    /// Record user activity at `now`.
    ///
    /// Returns `WarningEnded { Dismissed }` if a warning was active.
    /// Activity after expiry is ignored until the next login.
    pub fn record_activity(&mut self, now: Instant) -> Option<InactivityEvent> {
        match self.phase {
            Phase::Expired => {
                trace!("Ignoring activity on expired session");
                None
            }
            Phase::Active => {
                self.last_activity = now;
                None
            }
            Phase::Warning { .. } => {
                self.last_activity = now;
                self.phase = Phase::Active;
                debug!("Activity during warning, back to active");
                Some(InactivityEvent::WarningEnded {
                    reason: EndReason::Dismissed,
                })
            }
        }
    }

    /// Explicit "stay logged in" request.
    pub fn stay_logged_in(&mut self, now: Instant) -> Option<InactivityEvent> {
        self.record_activity(now)
    }

    /// Next instant at which `advance` has work to do, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Active => Some(self.last_activity + self.timeouts.idle_threshold),
            Phase::Warning {
                expires_at,
                next_tick,
                ..
            } => Some(next_tick.min(expires_at)),
            Phase::Expired => None,
        }
    }

    /// Process every deadline that has passed at `now`.
    ///
    /// Missed ticks are coalesced into a single event carrying the current
    /// remaining time.
    pub fn advance(&mut self, now: Instant) -> Vec<InactivityEvent> {
        let mut events = Vec::new();

        loop {
            match self.phase {
                Phase::Active => {
                    let started_at = self.last_activity + self.timeouts.idle_threshold;
                    if now < started_at {
                        break;
                    }

                    let expires_at = started_at + self.timeouts.grace_period;
                    let remaining_seconds = remaining_seconds(expires_at, now);
                    debug!(
                        "Idle for {:?}, warning started ({}s remaining)",
                        self.timeouts.idle_threshold, remaining_seconds
                    );

                    self.phase = Phase::Warning {
                        started_at,
                        expires_at,
                        next_tick: self.tick_after(started_at, now, expires_at),
                    };
                    events.push(InactivityEvent::WarningStarted { remaining_seconds });
                }
                Phase::Warning {
                    started_at,
                    expires_at,
                    next_tick,
                } => {
                    if now >= expires_at {
                        debug!("Grace period elapsed, session expired");
                        self.phase = Phase::Expired;
                        events.push(InactivityEvent::WarningEnded {
                            reason: EndReason::Expired,
                        });
                        break;
                    }

                    if now < next_tick {
                        break;
                    }

                    let remaining_seconds = remaining_seconds(expires_at, now);
                    trace!("Warning countdown: {}s remaining", remaining_seconds);

                    self.phase = Phase::Warning {
                        started_at,
                        expires_at,
                        next_tick: self.tick_after(started_at, now, expires_at),
                    };
                    events.push(InactivityEvent::WarningTick { remaining_seconds });
                }
                Phase::Expired => break,
            }
        }

        events
    }

    /// Current state as seen at `now`.
    ///
    /// Does not apply pending transitions; call `advance` first.
    pub fn state(&self, now: Instant) -> SessionState {
        match self.phase {
            Phase::Active => SessionState::Active,
            Phase::Warning { expires_at, .. } => SessionState::Warning {
                remaining_seconds: remaining_seconds(expires_at, now),
            },
            Phase::Expired => SessionState::Expired,
        }
    }

    /// First tick strictly after `now`, anchored at `anchor`, capped at expiry.
    fn tick_after(&self, anchor: Instant, now: Instant, expires_at: Instant) -> Instant {
        let interval = self.timeouts.tick_interval;
        if interval.is_zero() {
            return expires_at;
        }

        let mut tick = anchor + interval;
        while tick <= now && tick < expires_at {
            tick += interval;
        }
        tick.min(expires_at)
    }
}

/// Whole seconds left until `deadline`, rounded up.
fn remaining_seconds(deadline: Instant, now: Instant) -> u64 {
    let left = deadline.saturating_duration_since(now);
    left.as_secs() + u64::from(left.subsec_nanos() > 0)
}
