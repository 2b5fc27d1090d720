//! File placement into the library directory.
//!
//! Copies or moves accepted files to their templated destinations.
//! Placement is idempotent: a destination that already holds identical
//! content is left alone, while one holding different content is an error.

mod error;
mod fs_placer;
mod path_format;
mod types;

pub use error::PlacerError;
pub use fs_placer::{FsPlacer, PlacerConfig};
pub use path_format::{destination_for, sanitize_component};
pub use types::*;

use async_trait::async_trait;
use std::path::Path;

/// A placer that can move files to their final destinations.
#[async_trait]
pub trait Placer: Send + Sync {
    /// Returns the name of this placer implementation.
    fn name(&self) -> &str;

    /// Places every file in the job. On failure, files already placed by
    /// this job are rolled back when the job asks for it.
    async fn place(&self, job: PlacementJob) -> Result<PlacementResult, PlacerError>;

    /// Removes empty directories below `root`, but not `root` itself, left by
    /// moves. Returns the number of directories removed.
    async fn prune_empty_dirs(&self, root: &Path) -> Result<usize, PlacerError>;
}
