use std::path::PathBuf;

use crate::config::{Config, ImportMode, PathTemplates};
use crate::pipeline::{ExecutionMode, DEFAULT_QUEUE_SIZE};

/// Settings a session runs with, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Never wait for an operator: duplicates cause skips.
    pub quiet: bool,
    pub execution: ExecutionMode,
    pub queue_size: usize,
    pub mode: ImportMode,
    /// Import every file as a singleton instead of grouping albums.
    pub singletons: bool,
    pub library_dir: PathBuf,
    pub templates: PathTemplates,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            quiet: false,
            execution: ExecutionMode::default(),
            queue_size: DEFAULT_QUEUE_SIZE,
            mode: ImportMode::default(),
            singletons: false,
            library_dir: PathBuf::from("music"),
            templates: PathTemplates::default(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            quiet: config.import.quiet,
            execution: ExecutionMode::from_concurrent(config.import.concurrent),
            queue_size: config.import.queue_size,
            mode: config.import.mode,
            singletons: config.import.singletons,
            library_dir: config.library.directory.clone(),
            templates: config.library.paths.clone(),
        }
    }

    pub fn sequential(mut self) -> Self {
        self.execution = ExecutionMode::Sequential;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    #[test]
    fn test_from_config() {
        let config = load_config_from_str(
            r#"
            [import]
            quiet = true
            concurrent = false
            queue_size = 4
            mode = "move"

            [library]
            directory = "/srv/music"
            "#,
        )
        .unwrap();

        let options = SessionOptions::from_config(&config);
        assert!(options.quiet);
        assert_eq!(options.execution, ExecutionMode::Sequential);
        assert_eq!(options.queue_size, 4);
        assert_eq!(options.mode, ImportMode::Move);
        assert_eq!(options.library_dir, PathBuf::from("/srv/music"));
    }
}
