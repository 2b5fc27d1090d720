use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::info;

use crate::pipeline::TaskSource;

use super::{ImportServices, ImportSession, SessionError, SessionOptions};

/// Opaque reference to a session, returned by [`SessionManager::start_import`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owns the one authoritative import session.
///
/// Starting an import replaces the current session. Commands addressed to a
/// replaced session's handle fail with [`SessionError::SessionNotFound`];
/// its pipeline is left to run to completion.
pub struct SessionManager {
    services: ImportServices,
    options: SessionOptions,
    current: RwLock<Option<ImportSession>>,
}

impl SessionManager {
    pub fn new(services: ImportServices, options: SessionOptions) -> Self {
        Self {
            services,
            options,
            current: RwLock::new(None),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Start importing `paths` in the background.
    pub fn start_import(&self, paths: Vec<PathBuf>) -> Result<SessionHandle, SessionError> {
        if paths.is_empty() {
            return Err(SessionError::InvalidInput("no paths given".to_string()));
        }
        let session = self.install(paths);
        let handle = SessionHandle(session.id().to_string());
        tokio::spawn(async move {
            // Outcome is recorded on the session.
            let _ = session.run().await;
        });
        Ok(handle)
    }

    /// Start a session fed from `source` instead of the filesystem.
    pub fn start_import_from(&self, paths: Vec<PathBuf>, source: TaskSource) -> SessionHandle {
        let session = self.install(paths);
        let handle = SessionHandle(session.id().to_string());
        tokio::spawn(async move {
            let _ = session.run_with_source(source).await;
        });
        handle
    }

    fn install(&self, paths: Vec<PathBuf>) -> ImportSession {
        let session = ImportSession::new(
            uuid::Uuid::new_v4().to_string(),
            paths,
            self.options.clone(),
            self.services.clone(),
        );
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = current.replace(session.clone()) {
            info!(
                previous = previous.id(),
                session = session.id(),
                "Session superseded"
            );
        }
        session
    }

    /// Look up the session behind `handle`.
    pub fn session(&self, handle: &str) -> Result<ImportSession, SessionError> {
        self.current()
            .filter(|s| s.id() == handle)
            .ok_or_else(|| SessionError::SessionNotFound(handle.to_string()))
    }

    pub fn current(&self) -> Option<ImportSession> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
