//! Inactivity monitor task.
//!
//! A single task owns the [`Session`] and reacts to two things: commands from
//! [`MonitorHandle`]s (activity, "stay logged in", login) and the tracker's
//! next deadline. The deadline is recomputed on every loop iteration, so a
//! reset always replaces the previously scheduled timer.

use crate::channel::EventChannel;
use crate::domain::{ActivityKind, EndReason, InactivityEvent, SessionState};
use crate::logout::LogoutHandler;
use crate::session::Session;
use crate::tracker::Timeouts;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Pending commands buffered per monitor.
const COMMAND_BUFFER: usize = 64;

/// Errors returned by [`MonitorHandle`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorError {
    #[error("inactivity monitor has stopped")]
    Stopped,
}

#[derive(Debug)]
enum Command {
    Activity(ActivityKind),
    StayLoggedIn,
    Login,
    State(oneshot::Sender<SessionState>),
}

/// Cloneable handle for feeding the monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
}

impl MonitorHandle {
    /// Report user activity.
    pub async fn record_activity(&self, kind: ActivityKind) -> Result<(), MonitorError> {
        self.send(Command::Activity(kind)).await
    }

    /// Explicit "stay logged in": dismiss an active warning and reset the idle deadline.
    pub async fn stay_logged_in(&self) -> Result<(), MonitorError> {
        self.send(Command::StayLoggedIn).await
    }

    /// Start a new session, e.g. after a forced logout.
    pub async fn login(&self) -> Result<(), MonitorError> {
        self.send(Command::Login).await
    }

    /// Current session state, with any passed deadlines applied.
    pub async fn state(&self) -> Result<SessionState, MonitorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State(reply)).await?;
        rx.await.map_err(|_| MonitorError::Stopped)
    }

    async fn send(&self, command: Command) -> Result<(), MonitorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MonitorError::Stopped)
    }
}

/// The monitor task state. Consumed by [`InactivityMonitor::run`].
pub struct InactivityMonitor {
    session: Session,
    channel: EventChannel,
    logout: Arc<dyn LogoutHandler>,
    commands: mpsc::Receiver<Command>,
}

impl InactivityMonitor {
    /// Create a monitor whose session starts now.
    pub fn new(
        timeouts: Timeouts,
        channel: EventChannel,
        logout: Arc<dyn LogoutHandler>,
    ) -> (Self, MonitorHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let monitor = Self {
            session: Session::new(timeouts, Instant::now()),
            channel,
            logout,
            commands: rx,
        };
        (monitor, MonitorHandle { commands: tx })
    }

    /// Run until cancelled or until every handle is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        let timeouts = self.session.tracker().timeouts();
        info!(
            "Inactivity monitor started (idle threshold {:?}, grace period {:?}, tick {:?})",
            timeouts.idle_threshold, timeouts.grace_period, timeouts.tick_interval
        );

        loop {
            let deadline = self.session.tracker().next_deadline();

            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!("Inactivity monitor stopping");
                    break;
                }

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All monitor handles dropped, stopping");
                        break;
                    };
                    self.handle_command(command).await;
                }

                () = sleep_until(deadline) => {
                    self.advance(Instant::now()).await;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        // Deadlines that passed while the command was queued come first.
        self.advance(now).await;

        match command {
            Command::Activity(kind) => {
                trace!("Activity: {}", kind);
                if self.session.rearm_if_locked(now) {
                    info!("Activity ({}) after lock, new session started", kind);
                }
                if let Some(event) = self.session.tracker_mut().record_activity(now) {
                    info!("Activity ({}) during warning, logout cancelled", kind);
                    self.emit(event).await;
                }
            }
            Command::StayLoggedIn => {
                debug!("Stay logged in requested");
                if self.session.rearm_if_locked(now) {
                    info!("Stay logged in after lock, new session started");
                }
                if let Some(event) = self.session.tracker_mut().stay_logged_in(now) {
                    info!("Warning dismissed, staying logged in");
                    self.emit(event).await;
                }
            }
            Command::Login => {
                let was_warning = matches!(
                    self.session.tracker().state(now),
                    SessionState::Warning { .. }
                );
                info!("Login, session reset");
                self.session.login(now);
                if was_warning {
                    self.emit(InactivityEvent::WarningEnded {
                        reason: EndReason::Dismissed,
                    })
                    .await;
                }
            }
            Command::State(reply) => {
                let _ = reply.send(self.session.tracker().state(now));
            }
        }
    }

    async fn advance(&mut self, now: Instant) {
        let events = self.session.tracker_mut().advance(now);
        for event in events {
            self.emit(event).await;
        }
    }

    async fn emit(&mut self, event: InactivityEvent) {
        match event {
            InactivityEvent::WarningStarted { remaining_seconds } => {
                info!("Inactivity warning: logout in {}s", remaining_seconds);
            }
            InactivityEvent::WarningTick { remaining_seconds } => {
                debug!("Logout in {}s", remaining_seconds);
            }
            InactivityEvent::WarningEnded { reason } => {
                debug!("Warning ended: {:?}", reason);
            }
        }

        if event.is_expiry() && self.session.take_logout() {
            info!("Grace period elapsed, forcing logout");
            match self.logout.force_logout().await {
                Ok(outcome) => {
                    info!("Forced logout done: {:?}", outcome);
                    self.session.record_logout(outcome);
                }
                Err(e) => error!("Forced logout failed: {}", e),
            }
        }

        let delivered = self.channel.publish(&event);
        trace!("Delivered {:?} to {} subscriber(s)", event, delivered);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logout::{LogoutError, LogoutOutcome};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct CountingLogout {
        calls: AtomicUsize,
        fail: bool,
        outcome: LogoutOutcome,
    }

    #[async_trait]
    impl LogoutHandler for CountingLogout {
        async fn force_logout(&self) -> Result<LogoutOutcome, LogoutError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LogoutError::Logind("no session".to_string()));
            }
            Ok(self.outcome)
        }
    }

    struct Harness {
        handle: MonitorHandle,
        events: Arc<Mutex<Vec<InactivityEvent>>>,
        logout: Arc<CountingLogout>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn start(idle: u64, grace: u64, fail_logout: bool) -> Self {
            Self::start_with(idle, grace, fail_logout, LogoutOutcome::Terminated)
        }

        fn start_with(idle: u64, grace: u64, fail_logout: bool, outcome: LogoutOutcome) -> Self {
            let timeouts = Timeouts {
                idle_threshold: Duration::from_secs(idle),
                grace_period: Duration::from_secs(grace),
                tick_interval: Duration::from_secs(1),
            };
            let channel = EventChannel::new();
            let events = Arc::new(Mutex::new(Vec::new()));
            let logout = Arc::new(CountingLogout {
                calls: AtomicUsize::new(0),
                fail: fail_logout,
                outcome,
            });

            let sink = Arc::clone(&events);
            channel
                .subscribe(move |event| {
                    sink.lock().unwrap().push(*event);
                    Ok(())
                })
                .detach();

            let (monitor, handle) = InactivityMonitor::new(timeouts, channel, logout.clone());
            let cancel = CancellationToken::new();
            let task = tokio::spawn(monitor.run(cancel.clone()));

            Self {
                handle,
                events,
                logout,
                cancel,
                task,
            }
        }

        fn events(&self) -> Vec<InactivityEvent> {
            self.events.lock().unwrap().clone()
        }

        fn logout_calls(&self) -> usize {
            self.logout.calls.load(Ordering::SeqCst)
        }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_warning_then_forced_logout() {
        let h = Harness::start(1800, 60, false);

        sleep_ms(1_799_500).await;
        assert!(h.events().is_empty());

        sleep_ms(1_000).await; // t = 1800.5s
        assert_eq!(
            h.events(),
            vec![InactivityEvent::WarningStarted {
                remaining_seconds: 60
            }]
        );
        assert_eq!(
            h.handle.state().await.unwrap(),
            SessionState::Warning {
                remaining_seconds: 60
            }
        );
        assert_eq!(h.logout_calls(), 0);

        sleep_ms(60_000).await; // t = 1860.5s
        let events = h.events();
        assert_eq!(events.len(), 61);
        assert_eq!(
            events[1],
            InactivityEvent::WarningTick {
                remaining_seconds: 59
            }
        );
        assert_eq!(
            events[59],
            InactivityEvent::WarningTick {
                remaining_seconds: 1
            }
        );
        assert_eq!(
            events[60],
            InactivityEvent::WarningEnded {
                reason: EndReason::Expired
            }
        );
        assert_eq!(events[60].remaining_seconds(), None);
        assert_eq!(h.logout_calls(), 1);

        // Nothing further happens on an expired session
        sleep_ms(3_600_000).await;
        h.handle.record_activity(ActivityKind::Key).await.unwrap();
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Expired);
        assert_eq!(h.events().len(), 61);
        assert_eq!(h.logout_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regular_activity_never_warns() {
        let h = Harness::start(10, 5, false);

        for _ in 0..50 {
            sleep_ms(9_900).await;
            h.handle.record_activity(ActivityKind::Pointer).await.unwrap();
        }

        assert_eq!(h.handle.state().await.unwrap(), SessionState::Active);
        assert!(h.events().is_empty());
        assert_eq!(h.logout_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stay_logged_in_dismisses_warning() {
        let h = Harness::start(10, 5, false);

        sleep_ms(11_500).await;
        assert_eq!(h.events().len(), 2); // started + one tick

        h.handle.stay_logged_in().await.unwrap();
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Active);

        let dismissals = h
            .events()
            .iter()
            .filter(|e| {
                **e == InactivityEvent::WarningEnded {
                    reason: EndReason::Dismissed,
                }
            })
            .count();
        assert_eq!(dismissals, 1);

        // Idle deadline restarted at 11.5s; next warning is due at 21.5s
        sleep_ms(9_000).await;
        assert_eq!(h.events().len(), 3);

        sleep_ms(1_100).await;
        assert_eq!(
            h.events().last(),
            Some(&InactivityEvent::WarningStarted {
                remaining_seconds: 5
            })
        );
        assert_eq!(h.logout_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_during_warning_dismisses_once() {
        let h = Harness::start(10, 5, false);

        sleep_ms(10_500).await;
        h.handle.record_activity(ActivityKind::Scroll).await.unwrap();
        h.handle.record_activity(ActivityKind::Key).await.unwrap();
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Active);

        assert_eq!(
            h.events(),
            vec![
                InactivityEvent::WarningStarted {
                    remaining_seconds: 5
                },
                InactivityEvent::WarningEnded {
                    reason: EndReason::Dismissed
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_failure_still_publishes_end() {
        let h = Harness::start(10, 2, true);

        sleep_ms(12_500).await;
        assert_eq!(h.logout_calls(), 1);
        assert_eq!(
            h.events().last(),
            Some(&InactivityEvent::WarningEnded {
                reason: EndReason::Expired
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_after_expiry_starts_new_session() {
        let h = Harness::start(10, 2, false);

        sleep_ms(12_500).await;
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Expired);

        h.handle.login().await.unwrap();
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Active);

        sleep_ms(12_500).await;
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Expired);
        assert_eq!(h.logout_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_after_lock_rearms_session() {
        let h = Harness::start_with(10, 2, false, LogoutOutcome::Locked);

        sleep_ms(12_500).await;
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Expired);
        assert_eq!(h.logout_calls(), 1);

        // User unlocks and moves the mouse; no explicit login() call
        h.handle.record_activity(ActivityKind::Pointer).await.unwrap();
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Active);

        sleep_ms(10_500).await;
        assert_eq!(
            h.events().last(),
            Some(&InactivityEvent::WarningStarted {
                remaining_seconds: 2
            })
        );

        sleep_ms(2_000).await;
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Expired);
        assert_eq!(h.logout_calls(), 2);
        let expiries = h.events().iter().filter(|e| e.is_expiry()).count();
        assert_eq!(expiries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lock_does_not_rearm() {
        let h = Harness::start_with(10, 2, true, LogoutOutcome::Locked);

        sleep_ms(12_500).await;
        h.handle.record_activity(ActivityKind::Key).await.unwrap();
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Expired);
        assert_eq!(h.logout_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_during_warning_ends_warning() {
        let h = Harness::start(10, 5, false);

        sleep_ms(10_500).await;
        h.handle.login().await.unwrap();
        assert_eq!(h.handle.state().await.unwrap(), SessionState::Active);
        assert_eq!(
            h.events().last(),
            Some(&InactivityEvent::WarningEnded {
                reason: EndReason::Dismissed
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_monitor() {
        let h = Harness::start(10, 5, false);

        h.cancel.cancel();
        h.task.await.unwrap();
        assert_eq!(
            h.handle.record_activity(ActivityKind::Key).await,
            Err(MonitorError::Stopped)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handles_stops_monitor() {
        let Harness { handle, task, .. } = Harness::start(10, 5, false);

        drop(handle);
        task.await.unwrap();
    }
}
