//! User activity sources.
//!
//! A source turns some ambient input stream into [`ActivityKind`]s; `forward`
//! pumps a source into the monitor and `supervise` keeps the daemon alive
//! after the source is gone.

mod hyprland;
mod line;

use crate::domain::ActivityKind;
use crate::monitor::MonitorHandle;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use hyprland::HyprlandSource;
pub use line::LineSource;

/// Trait for activity sources.
#[async_trait]
pub trait ActivitySource: Send {
    /// Wait for the next user activity.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    async fn next_activity(&mut self) -> Result<Option<ActivityKind>, ActivityError>;
}

/// Errors that can occur while reading activity.
#[derive(Error, Debug)]
pub enum ActivityError {
    #[error("Socket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Socket path not found: {0}")]
    SocketNotFound(String),

    #[error("Failed to read activity input: {0}")]
    Read(#[from] std::io::Error),
}

/// Feed activity from `source` into the monitor.
///
/// Returns when the source ends, the monitor stops, or `cancel` fires.
pub async fn forward<S>(
    source: &mut S,
    handle: &MonitorHandle,
    cancel: &CancellationToken,
) -> Result<(), ActivityError>
where
    S: ActivitySource + ?Sized,
{
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            next = source.next_activity() => next?,
        };

        let Some(kind) = next else {
            info!("Activity source closed");
            return Ok(());
        };

        if handle.record_activity(kind).await.is_err() {
            debug!("Monitor stopped, no longer forwarding activity");
            return Ok(());
        }
    }
}

/// Forward activity until shutdown.
///
/// Losing the source never stops the monitor: once the source ends or fails
/// the idle countdown keeps running until `cancel` fires. The source's error,
/// if any, is returned after shutdown.
pub async fn supervise<S>(
    source: &mut S,
    handle: &MonitorHandle,
    cancel: &CancellationToken,
) -> Result<(), ActivityError>
where
    S: ActivitySource + ?Sized,
{
    let forwarded = forward(source, handle, cancel).await;
    match &forwarded {
        Ok(()) if cancel.is_cancelled() => return forwarded,
        Ok(()) => warn!("Activity source ended; idle countdown continues until shutdown"),
        Err(e) => error!(
            "Activity source failed: {}; idle countdown continues until shutdown",
            e
        ),
    }

    cancel.cancelled().await;
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::EventChannel;
    use crate::domain::SessionState;
    use crate::logout::CommandLogout;
    use crate::monitor::InactivityMonitor;
    use crate::tracker::Timeouts;
    use std::sync::Arc;
    use std::time::Duration;

    /// Source whose connection is gone for good.
    struct BrokenSource;

    #[async_trait]
    impl ActivitySource for BrokenSource {
        async fn next_activity(&mut self) -> Result<Option<ActivityKind>, ActivityError> {
            Err(ActivityError::ConnectionFailed("connection refused".to_string()))
        }
    }

    fn short_timeouts() -> Timeouts {
        Timeouts {
            idle_threshold: Duration::from_secs(10),
            grace_period: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forward_until_source_ends() {
        let logout = Arc::new(CommandLogout::new(Vec::new(), None, true));
        let (monitor, handle) =
            InactivityMonitor::new(short_timeouts(), EventChannel::new(), logout);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(monitor.run(cancel.clone()));

        let mut source = LineSource::new(&b"key\npointer\nnonsense\n\nscroll\n"[..]);
        forward(&mut source, &handle, &cancel).await.unwrap();
        assert_eq!(handle.state().await.unwrap(), SessionState::Active);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_forward_stops_when_monitor_gone() {
        let logout = Arc::new(CommandLogout::new(Vec::new(), None, true));
        let (monitor, handle) =
            InactivityMonitor::new(Timeouts::default(), EventChannel::new(), logout);
        drop(monitor);

        let mut source = LineSource::new(&b"key\nkey\n"[..]);
        forward(&mut source, &handle, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forward_cancelled() {
        let logout = Arc::new(CommandLogout::new(Vec::new(), None, true));
        let (_monitor, handle) =
            InactivityMonitor::new(Timeouts::default(), EventChannel::new(), logout);
        let cancel = CancellationToken::new();
        cancel.cancel();

        // A reader that never yields a line
        let (_writer, reader) = tokio::io::duplex(64);
        let mut source = LineSource::new(tokio::io::BufReader::new(reader));
        forward(&mut source, &handle, &cancel).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_source_keeps_countdown_running() {
        let logout = Arc::new(CommandLogout::new(Vec::new(), None, true));
        let (monitor, handle) =
            InactivityMonitor::new(short_timeouts(), EventChannel::new(), logout);
        let cancel = CancellationToken::new();
        let monitor_task = tokio::spawn(monitor.run(cancel.clone()));

        let supervisor = {
            let handle = handle.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { supervise(&mut BrokenSource, &handle, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(15_500)).await;
        assert_eq!(handle.state().await.unwrap(), SessionState::Expired);
        assert!(!supervisor.is_finished());

        cancel.cancel();
        let result = supervisor.await.unwrap();
        assert!(matches!(result, Err(ActivityError::ConnectionFailed(_))));
        monitor_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervise_waits_for_shutdown_after_eof() {
        let logout = Arc::new(CommandLogout::new(Vec::new(), None, true));
        let (monitor, handle) =
            InactivityMonitor::new(short_timeouts(), EventChannel::new(), logout);
        let cancel = CancellationToken::new();
        let monitor_task = tokio::spawn(monitor.run(cancel.clone()));

        let supervisor = {
            let handle = handle.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut source = LineSource::new(&b"key\n"[..]);
                supervise(&mut source, &handle, &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(
            handle.state().await.unwrap(),
            SessionState::Warning {
                remaining_seconds: 5
            }
        );
        assert!(!supervisor.is_finished());

        cancel.cancel();
        supervisor.await.unwrap().unwrap();
        monitor_task.await.unwrap();
    }
}
