//! Forced logout via the systemd-logind `DBus` interface.
//!
//! Resolves the current session object and calls `Lock` or `Terminate` on it.

use super::{LogoutError, LogoutHandler, LogoutOutcome, clear_credentials};
use async_trait::async_trait;
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};
use zbus::Connection;

/// `DBus` service and path for login1.
const LOGIND_SERVICE: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";
const SESSION_INTERFACE: &str = "org.freedesktop.login1.Session";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Session method to call on logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogindAction {
    /// Lock the screen; the session survives.
    Lock,
    /// End the session and all its processes.
    Terminate,
}

impl LogindAction {
    /// Name of the `org.freedesktop.login1.Session` method.
    pub fn method(self) -> &'static str {
        match self {
            Self::Lock => "Lock",
            Self::Terminate => "Terminate",
        }
    }

    /// What the call leaves behind.
    pub fn outcome(self) -> LogoutOutcome {
        match self {
            Self::Lock => LogoutOutcome::Locked,
            Self::Terminate => LogoutOutcome::Terminated,
        }
    }
}

/// Logout handler backed by systemd-logind.
#[derive(Debug, Clone)]
pub struct LogindLogout {
    action: LogindAction,
    credentials_file: Option<PathBuf>,
    dry_run: bool,
}

impl LogindLogout {
    pub fn new(action: LogindAction, credentials_file: Option<PathBuf>, dry_run: bool) -> Self {
        Self {
            action,
            credentials_file,
            dry_run,
        }
    }
}

#[async_trait]
impl LogoutHandler for LogindLogout {
    async fn force_logout(&self) -> Result<LogoutOutcome, LogoutError> {
        clear_credentials(self.credentials_file.as_ref(), self.dry_run)?;

        if self.dry_run {
            info!(
                "[DRY RUN] Would call {}.{} on current session",
                SESSION_INTERFACE,
                self.action.method()
            );
            return Ok(self.action.outcome());
        }

        let conn = Connection::system()
            .await
            .map_err(|e| LogoutError::Logind(format!("Failed to connect to system DBus: {e}")))?;

        let session_path = resolve_session_path(&conn).await?;
        info!(
            "Calling {} on session {}",
            self.action.method(),
            session_path
        );

        let proxy = zbus::Proxy::new(&conn, LOGIND_SERVICE, session_path.as_str(), SESSION_INTERFACE)
            .await
            .map_err(|e| LogoutError::Logind(format!("Failed to create Session proxy: {e}")))?;

        proxy
            .call_method(self.action.method(), &())
            .await
            .map_err(|e| LogoutError::Logind(format!("{} call failed: {e}", self.action.method())))?;

        Ok(self.action.outcome())
    }
}

/// Resolve the session object path for the current session.
async fn resolve_session_path(conn: &Connection) -> Result<String, LogoutError> {
    if let Ok(session_id) = env::var("XDG_SESSION_ID") {
        debug!("Using XDG_SESSION_ID: {}", session_id);

        let proxy = zbus::Proxy::new(conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
            .await
            .map_err(|e| LogoutError::Logind(format!("Failed to create Manager proxy: {e}")))?;

        let path: zbus::zvariant::OwnedObjectPath = proxy
            .call("GetSession", &(&session_id,))
            .await
            .map_err(|e| LogoutError::Logind(format!("GetSession call failed: {e}")))?;

        return Ok(path.to_string());
    }

    debug!("XDG_SESSION_ID not set, trying session/self and session/auto");

    for alias in ["self", "auto"] {
        let path = format!("{LOGIND_PATH}/session/{alias}");
        if session_exists(conn, &path).await {
            return Ok(path);
        }
    }

    Err(LogoutError::Logind(
        "Could not resolve session path. Set XDG_SESSION_ID or ensure a logind session is available."
            .to_string(),
    ))
}

/// Check a session path by reading its `Id` property.
async fn session_exists(conn: &Connection, session_path: &str) -> bool {
    let Ok(proxy) = zbus::Proxy::new(conn, LOGIND_SERVICE, session_path, PROPERTIES_INTERFACE).await
    else {
        return false;
    };

    proxy
        .call::<_, _, zbus::zvariant::OwnedValue>("Get", &(SESSION_INTERFACE, "Id"))
        .await
        .is_ok()
}
