use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::Stage;

/// Contributes stages to every pipeline a session builds.
///
/// Early stages run before regular plugin stages; both run after judgment
/// and before file placement. Contributed stages never see sentinels or
/// skipped tasks.
pub trait ImportPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn early_stages(&self) -> Vec<Arc<dyn Stage>> {
        Vec::new()
    }

    fn stages(&self) -> Vec<Arc<dyn Stage>> {
        Vec::new()
    }
}

/// Observer for session lifecycle points.
#[async_trait]
pub trait TaskHook: Send + Sync {
    fn name(&self) -> &str;

    /// Called each time the session starts a pipeline, including the
    /// sub-pipelines launched by operator commands.
    async fn import_begin(&self, _session_id: &str) {}

    /// Called once the initial run over the source paths has finished.
    async fn import(&self, _session_id: &str, _paths: &[PathBuf]) {}
}
