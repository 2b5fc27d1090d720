use std::sync::Arc;
use webimport_core::{Config, EventStore, Library, SanitizedConfig, SessionManager};

/// Shared application state
pub struct AppState {
    config: Config,
    sessions: SessionManager,
    library: Arc<dyn Library>,
    event_store: Arc<dyn EventStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        sessions: SessionManager,
        library: Arc<dyn Library>,
        event_store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            config,
            sessions,
            library,
            event_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn library(&self) -> &dyn Library {
        self.library.as_ref()
    }

    pub fn event_store(&self) -> &dyn EventStore {
        self.event_store.as_ref()
    }

    /// Whether task summaries carry their source paths.
    pub fn include_paths(&self) -> bool {
        self.config.server.include_paths
    }
}
