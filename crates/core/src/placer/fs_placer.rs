//! File system placer implementation.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};

use super::error::PlacerError;
use super::types::{
    FilePlacement, PlacedFile, PlacementJob, PlacementOutcome, PlacementResult, RollbackPlan,
    TransferMode,
};
use super::Placer;
use crate::metrics;

/// Tuning knobs for [`FsPlacer`].
#[derive(Debug, Clone)]
pub struct PlacerConfig {
    pub buffer_size: usize,
    /// Try `rename` before falling back to copy + delete on moves.
    pub prefer_atomic_moves: bool,
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            prefer_atomic_moves: true,
        }
    }
}

impl PlacerConfig {
    pub fn with_atomic_moves(mut self, enabled: bool) -> Self {
        self.prefer_atomic_moves = enabled;
        self
    }
}

/// File system based placer implementation.
pub struct FsPlacer {
    config: PlacerConfig,
}

impl FsPlacer {
    pub fn new(config: PlacerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PlacerConfig::default())
    }

    /// Attempts to move a file atomically (rename).
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) => {
                // Cross-filesystem moves fail with EXDEV (18 on Linux)
                if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<u64, PlacerError> {
        let source_file = File::open(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlacerError::SourceNotFound {
                    path: source.to_path_buf(),
                }
            } else {
                PlacerError::Io(e)
            }
        })?;
        let dest_file = File::create(destination).await.map_err(|e| {
            PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        let mut reader = BufReader::with_capacity(self.config.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.config.buffer_size, dest_file);
        let mut buffer = vec![0u8; self.config.buffer_size];
        let mut total_bytes = 0u64;

        loop {
            let bytes_read = reader.read(&mut buffer).await.map_err(|e| {
                PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;
            if bytes_read == 0 {
                break;
            }
            writer.write_all(&buffer[..bytes_read]).await.map_err(|e| {
                PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;
            total_bytes += bytes_read as u64;
        }

        writer.flush().await.map_err(|e| {
            PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e)
        })?;

        Ok(total_bytes)
    }

    async fn calculate_checksum(&self, path: &Path) -> Result<String, PlacerError> {
        let checksum_err = |e| PlacerError::ChecksumCalculationFailed {
            path: path.to_path_buf(),
            source: e,
        };
        let file = File::open(path).await.map_err(checksum_err)?;
        let mut reader = BufReader::with_capacity(self.config.buffer_size, file);
        let mut buffer = vec![0u8; self.config.buffer_size];
        let mut hasher = Sha256::new();
        loop {
            let bytes_read = reader.read(&mut buffer).await.map_err(checksum_err)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Creates parent directories for a path, recording new ones.
    async fn ensure_parent_dirs(
        &self,
        path: &Path,
        plan: &mut RollbackPlan,
    ) -> Result<(), PlacerError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if parent.exists() {
            return Ok(());
        }

        let mut dirs_to_create = Vec::new();
        let mut current = parent;
        while !current.exists() {
            dirs_to_create.push(current.to_path_buf());
            current = match current.parent() {
                Some(p) => p,
                None => break,
            };
        }

        fs::create_dir_all(parent)
            .await
            .map_err(|e| PlacerError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;

        // Outermost first, so rollback can walk the list backwards.
        for dir in dirs_to_create.into_iter().rev() {
            plan.record_directory(dir);
        }
        Ok(())
    }

    /// Decide whether `placement` is already applied.
    async fn already_placed(&self, placement: &FilePlacement) -> Result<bool, PlacerError> {
        if placement.source == placement.destination {
            return Ok(true);
        }
        if !placement.destination.exists() {
            return Ok(false);
        }
        // A completed move leaves only the destination behind.
        if !placement.source.exists() {
            return Ok(true);
        }
        let source_sum = self.calculate_checksum(&placement.source).await?;
        let dest_sum = self.calculate_checksum(&placement.destination).await?;
        if source_sum == dest_sum {
            Ok(true)
        } else {
            Err(PlacerError::DestinationConflict {
                path: placement.destination.clone(),
            })
        }
    }

    async fn place_file(
        &self,
        placement: &FilePlacement,
        mode: TransferMode,
        plan: &mut RollbackPlan,
    ) -> Result<PlacedFile, PlacerError> {
        if self.already_placed(placement).await? {
            let size_bytes = fs::metadata(&placement.destination)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            debug!(destination = %placement.destination.display(), "Already in place");
            return Ok(PlacedFile {
                source: placement.source.clone(),
                destination: placement.destination.clone(),
                size_bytes,
                outcome: PlacementOutcome::Unchanged,
            });
        }

        if !placement.source.exists() {
            return Err(PlacerError::SourceNotFound {
                path: placement.source.clone(),
            });
        }

        self.ensure_parent_dirs(&placement.destination, plan).await?;

        let (size_bytes, outcome) = match mode {
            TransferMode::Copy => (
                self.copy_file(&placement.source, &placement.destination).await?,
                PlacementOutcome::Copied,
            ),
            TransferMode::Move => {
                let renamed = self.config.prefer_atomic_moves
                    && Self::try_atomic_move(&placement.source, &placement.destination)
                        .await
                        .map_err(|e| {
                            PlacerError::move_failed(
                                placement.source.clone(),
                                placement.destination.clone(),
                                e,
                            )
                        })?;
                if renamed {
                    (fs::metadata(&placement.destination).await?.len(), PlacementOutcome::Moved)
                } else {
                    let size = self.copy_file(&placement.source, &placement.destination).await?;
                    fs::remove_file(&placement.source).await.map_err(|e| {
                        PlacerError::move_failed(
                            placement.source.clone(),
                            placement.destination.clone(),
                            e,
                        )
                    })?;
                    (size, PlacementOutcome::Moved)
                }
            }
        };

        let placed = PlacedFile {
            source: placement.source.clone(),
            destination: placement.destination.clone(),
            size_bytes,
            outcome,
        };
        plan.record_placement(placed.clone());
        Ok(placed)
    }

    /// Undo the placements recorded in `plan`.
    async fn rollback(&self, plan: RollbackPlan) -> Result<(), PlacerError> {
        let mut errors = Vec::new();

        for file in plan.placed_files.iter().rev() {
            let result = match file.outcome {
                PlacementOutcome::Copied => fs::remove_file(&file.destination).await,
                PlacementOutcome::Moved => {
                    match Self::try_atomic_move(&file.destination, &file.source).await {
                        Ok(true) => Ok(()),
                        Ok(false) => match self.copy_file(&file.destination, &file.source).await {
                            Ok(_) => fs::remove_file(&file.destination).await,
                            Err(e) => Err(std::io::Error::other(e.to_string())),
                        },
                        Err(e) => Err(e),
                    }
                }
                PlacementOutcome::Unchanged => Ok(()),
            };
            if let Err(e) = result {
                errors.push(format!("{}: {}", file.destination.display(), e));
            }
        }

        for dir in plan.created_directories.iter().rev() {
            if is_empty_dir(dir).await {
                if let Err(e) = fs::remove_dir(dir).await {
                    errors.push(format!("{}: {}", dir.display(), e));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlacerError::RollbackFailed {
                reason: errors.join(", "),
            })
        }
    }
}

async fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}

#[async_trait]
impl Placer for FsPlacer {
    fn name(&self) -> &str {
        "fs"
    }

    async fn place(&self, job: PlacementJob) -> Result<PlacementResult, PlacerError> {
        let start = Instant::now();
        let mut plan = RollbackPlan::new(job.job_id.clone());
        let mut files_placed = Vec::with_capacity(job.files.len());
        let mut total_bytes = 0;

        for placement in &job.files {
            match self.place_file(placement, job.mode, &mut plan).await {
                Ok(placed) => {
                    metrics::FILES_PLACED
                        .with_label_values(&[placed.outcome.as_str()])
                        .inc();
                    total_bytes += placed.size_bytes;
                    files_placed.push(placed);
                }
                Err(e) => {
                    metrics::FILES_PLACED.with_label_values(&["failed"]).inc();
                    if job.enable_rollback && plan.has_changes() {
                        warn!(job_id = %job.job_id, error = %e, "Placement failed, rolling back");
                        self.rollback(plan).await?;
                    }
                    return Err(e);
                }
            }
        }

        Ok(PlacementResult {
            job_id: job.job_id,
            files_placed,
            total_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn prune_empty_dirs(&self, root: &Path) -> Result<usize, PlacerError> {
        if !root.is_dir() {
            return Ok(0);
        }
        // Deepest first so parents become empty before they are checked.
        // `root` itself is never removed.
        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    pending.push(entry.path());
                }
            }
            if dir != root {
                dirs.push(dir);
            }
        }
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

        let mut removed = 0;
        for dir in dirs {
            if is_empty_dir(&dir).await {
                fs::remove_dir(&dir).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
