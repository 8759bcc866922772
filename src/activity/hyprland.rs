//! Hyprland IPC socket2 activity source.
//!
//! Window, workspace and monitor focus events on socket2 only happen when the
//! user is interacting with the desktop, so each of them counts as activity.

use super::{ActivityError, ActivitySource};
use crate::domain::ActivityKind;
use async_trait::async_trait;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, info, trace, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Hyprland activity source.
///
/// Once connected, a lost socket is retried forever with exponential backoff,
/// so a compositor restart never ends the source.
pub struct HyprlandSource {
    socket_path: PathBuf,
    reader: Option<BufReader<UnixStream>>,
    backoff: Duration,
}

impl HyprlandSource {
    /// Connect to the running Hyprland instance.
    pub async fn connect() -> Result<Self, ActivityError> {
        Self::connect_to(get_socket2_path()?).await
    }

    /// Connect to a socket2 at an explicit path.
    pub async fn connect_to(socket_path: PathBuf) -> Result<Self, ActivityError> {
        info!("Connecting to Hyprland socket2: {}", socket_path.display());

        let stream = open(&socket_path).await?;

        info!("Connected to Hyprland socket2");

        Ok(Self {
            socket_path,
            reader: Some(BufReader::new(stream)),
            backoff: INITIAL_BACKOFF,
        })
    }

    /// Get diagnostic information about the Hyprland environment.
    pub fn get_diagnostics() -> Vec<String> {
        let mut diags = Vec::new();

        for var in ["XDG_RUNTIME_DIR", "HYPRLAND_INSTANCE_SIGNATURE"] {
            match env::var(var) {
                Ok(v) => diags.push(format!("{var}={v}")),
                Err(_) => diags.push(format!("{var}: NOT SET")),
            }
        }

        match get_socket2_path() {
            Ok(path) => diags.push(format!("Socket2 path: {} (exists)", path.display())),
            Err(_) => diags.push("Socket2 path: NOT FOUND".to_string()),
        }

        diags
    }

    /// Reconnect to the Hyprland socket, retrying until it succeeds.
    async fn reconnect(&mut self) {
        loop {
            warn!("Socket2 connection lost. Retrying in {:?}...", self.backoff);

            tokio::time::sleep(self.backoff).await;
            self.backoff = std::cmp::min(self.backoff * 2, MAX_BACKOFF);

            match open(&self.socket_path).await {
                Ok(stream) => {
                    info!("Reconnected to Hyprland socket2");
                    self.reader = Some(BufReader::new(stream));
                    self.backoff = INITIAL_BACKOFF;
                    return;
                }
                Err(e) => warn!("Reconnect failed: {}", e),
            }
        }
    }
}

#[async_trait]
impl ActivitySource for HyprlandSource {
    async fn next_activity(&mut self) -> Result<Option<ActivityKind>, ActivityError> {
        loop {
            let reader = match &mut self.reader {
                Some(r) => r,
                None => {
                    self.reconnect().await;
                    continue;
                }
            };

            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    warn!("Socket2 stream ended (EOF)");
                    self.reader = None;
                }
                Ok(_) => {
                    trace!("Received line: {}", line.trim());
                    if let Some(kind) = classify_event_line(&line) {
                        return Ok(Some(kind));
                    }
                }
                Err(e) => {
                    warn!("Read error: {}", e);
                    self.reader = None;
                }
            }
        }
    }
}

async fn open(socket_path: &Path) -> Result<UnixStream, ActivityError> {
    UnixStream::connect(socket_path)
        .await
        .map_err(|e| ActivityError::ConnectionFailed(e.to_string()))
}

/// Get the path to Hyprland's socket2.
fn get_socket2_path() -> Result<PathBuf, ActivityError> {
    let xdg_runtime_dir = env::var("XDG_RUNTIME_DIR")
        .map_err(|_| ActivityError::EnvVarNotSet("XDG_RUNTIME_DIR".to_string()))?;

    let hyprland_sig = env::var("HYPRLAND_INSTANCE_SIGNATURE")
        .map_err(|_| ActivityError::EnvVarNotSet("HYPRLAND_INSTANCE_SIGNATURE".to_string()))?;

    let socket_path = PathBuf::from(&xdg_runtime_dir)
        .join("hypr")
        .join(&hyprland_sig)
        .join(".socket2.sock");

    if !socket_path.exists() {
        return Err(ActivityError::SocketNotFound(
            socket_path.display().to_string(),
        ));
    }

    Ok(socket_path)
}

/// Map a socket2 line (`EVENT>>DATA`) to the activity it implies.
fn classify_event_line(line: &str) -> Option<ActivityKind> {
    let line = line.trim_end();

    let Some((event_name, _data)) = line.split_once(">>") else {
        trace!("Ignoring malformed line (no >>): {}", line);
        return None;
    };

    match event_name {
        // v2 variants follow their v1 event, so only the v1 one counts
        "activewindow" | "workspace" | "focusedmon" | "activespecial" => {
            Some(ActivityKind::Focus)
        }
        "openwindow" | "closewindow" | "movewindow" | "changefloatingmode" | "fullscreen" => {
            Some(ActivityKind::Pointer)
        }
        "submap" => Some(ActivityKind::Key),
        _ => {
            debug!("Ignoring event: {}", event_name);
            None
        }
    }
}
