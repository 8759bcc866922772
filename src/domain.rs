//! Domain types shared by the tracker, the event channel and the monitor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of user interaction that counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Pointer,
    Key,
    Scroll,
    /// Window or workspace focus change reported by the compositor.
    Focus,
}

impl ActivityKind {
    /// Get the activity kind as it appears in line-oriented input.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pointer => "pointer",
            Self::Key => "key",
            Self::Scroll => "scroll",
            Self::Focus => "focus",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a word does not name an [`ActivityKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown activity kind: {0}")]
pub struct UnknownActivity(pub String);

impl FromStr for ActivityKind {
    type Err = UnknownActivity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pointer" | "mouse" | "click" => Ok(Self::Pointer),
            "key" | "keyboard" => Ok(Self::Key),
            "scroll" => Ok(Self::Scroll),
            "focus" => Ok(Self::Focus),
            other => Err(UnknownActivity(other.to_string())),
        }
    }
}

/// Why a warning countdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The user acted (or chose to stay logged in) before the grace period ran out.
    Dismissed,
    /// The grace period ran out and the session was logged out.
    Expired,
}

/// Notification published on the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InactivityEvent {
    /// The idle threshold elapsed; a warning is now active.
    WarningStarted { remaining_seconds: u64 },
    /// Countdown update while the warning is active.
    WarningTick { remaining_seconds: u64 },
    /// The warning is no longer active.
    WarningEnded { reason: EndReason },
}

impl InactivityEvent {
    /// Seconds left before forced logout, or `None` once the warning has ended.
    pub fn remaining_seconds(&self) -> Option<u64> {
        match self {
            Self::WarningStarted { remaining_seconds }
            | Self::WarningTick { remaining_seconds } => Some(*remaining_seconds),
            Self::WarningEnded { .. } => None,
        }
    }

    /// Returns true if this event marks the forced end of the session.
    pub fn is_expiry(&self) -> bool {
        matches!(
            self,
            Self::WarningEnded {
                reason: EndReason::Expired
            }
        )
    }
}

/// Externally visible state of a monitored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Warning { remaining_seconds: u64 },
    Expired,
}
