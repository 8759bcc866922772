//! Forced logout handlers.
//!
//! A forced logout clears the stored credential and then ends the session,
//! either by running a configured command or by asking systemd-logind.

mod logind;

use crate::config::{Config, LogoutMethod};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, trace};

pub use logind::{LogindAction, LogindLogout};

/// Errors that can occur while forcing a logout.
#[derive(Error, Debug)]
pub enum LogoutError {
    #[error("Failed to remove credentials file {path}: {source}")]
    Credentials { path: PathBuf, source: io::Error },

    #[error("Failed to spawn logout command '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("Logout command exited with code {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("logind request failed: {0}")]
    Logind(String),
}

/// What a successful forced logout did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The session is gone; a new login starts a new monitor session.
    Terminated,
    /// The session was only locked; the user coming back is a new login.
    Locked,
}

/// The "log out" collaborator invoked when the grace period runs out.
#[async_trait]
pub trait LogoutHandler: Send + Sync {
    /// Clear credentials and end (or lock) the session.
    async fn force_logout(&self) -> Result<LogoutOutcome, LogoutError>;
}

/// Remove a stored credential. A file that is already gone is not an error.
pub(crate) fn clear_credentials(path: Option<&PathBuf>, dry_run: bool) -> Result<(), LogoutError> {
    let Some(path) = path else {
        return Ok(());
    };

    if dry_run {
        info!("[DRY RUN] Would remove credentials file {}", path.display());
        return Ok(());
    }

    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Removed credentials file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Credentials file {} already absent", path.display());
            Ok(())
        }
        Err(source) => Err(LogoutError::Credentials {
            path: path.clone(),
            source,
        }),
    }
}

/// Logs out by running an external command (e.g. `loginctl lock-session`).
#[derive(Debug, Clone)]
pub struct CommandLogout {
    /// Program followed by its arguments.
    argv: Vec<String>,

    /// Stored credential to delete before running the command.
    credentials_file: Option<PathBuf>,

    /// Dry run mode: log instead of acting.
    dry_run: bool,

    /// What the command does to the session.
    outcome: LogoutOutcome,
}

impl CommandLogout {
    /// Create a handler for a command that locks the session.
    pub fn new(argv: Vec<String>, credentials_file: Option<PathBuf>, dry_run: bool) -> Self {
        Self {
            argv,
            credentials_file,
            dry_run,
            outcome: LogoutOutcome::Locked,
        }
    }

    /// Declare what the command does to the session.
    #[must_use]
    pub fn with_outcome(mut self, outcome: LogoutOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

#[async_trait]
impl LogoutHandler for CommandLogout {
    async fn force_logout(&self) -> Result<LogoutOutcome, LogoutError> {
        clear_credentials(self.credentials_file.as_ref(), self.dry_run)?;

        let Some((program, args)) = self.argv.split_first() else {
            debug!("No logout command configured");
            return Ok(self.outcome);
        };

        if self.dry_run {
            info!("[DRY RUN] Would execute: {}", self.argv.join(" "));
            return Ok(self.outcome);
        }

        debug!("Running logout command: {}", self.argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LogoutError::Spawn {
                program: program.clone(),
                source,
            })?
            .wait_with_output()
            .await
            .map_err(|source| LogoutError::Spawn {
                program: program.clone(),
                source,
            })?;

        if output.status.success() {
            trace!("Logout command succeeded");
            Ok(self.outcome)
        } else {
            Err(LogoutError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Build the logout handler selected by the configuration.
pub fn from_config(config: &Config) -> Arc<dyn LogoutHandler> {
    let logout = &config.logout;
    match logout.method {
        LogoutMethod::Command => {
            let outcome = if logout.session_survives {
                LogoutOutcome::Locked
            } else {
                LogoutOutcome::Terminated
            };
            Arc::new(
                CommandLogout::new(
                    logout.command.clone(),
                    logout.credentials_file.clone(),
                    config.dry_run,
                )
                .with_outcome(outcome),
            )
        }
        LogoutMethod::LogindLock => Arc::new(LogindLogout::new(
            LogindAction::Lock,
            logout.credentials_file.clone(),
            config.dry_run,
        )),
        LogoutMethod::LogindTerminate => Arc::new(LogindLogout::new(
            LogindAction::Terminate,
            logout.credentials_file.clone(),
            config.dry_run,
        )),
    }
}
