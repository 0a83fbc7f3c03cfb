use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::checkpoint::metadata::{CheckpointMetadata, TrainingState, CHECKPOINT_VERSION};
use crate::error::CheckpointError;

const METADATA_FILE: &str = "metadata.json";
const TRAINING_STATE_FILE: &str = "training_state.json";

/// Configuration for the checkpoint manager.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CheckpointManagerConfig {
    pub checkpoint_dir: PathBuf,
    pub keep_last_n: usize,
}

impl Default for CheckpointManagerConfig {
    fn default() -> Self {
        CheckpointManagerConfig {
            checkpoint_dir: PathBuf::from("checkpoints"),
            keep_last_n: 5,
        }
    }
}

/// A checkpoint bundle read back from disk. Weights stay on disk under `path`.
#[derive(Debug)]
pub struct CheckpointData {
    pub path: PathBuf,
    pub metadata: CheckpointMetadata,
    pub training_state: TrainingState,
}

/// Manages saving, loading, listing, and pruning checkpoints.
pub struct CheckpointManager {
    config: CheckpointManagerConfig,
}

impl CheckpointManager {
    pub fn new(config: CheckpointManagerConfig) -> Self {
        CheckpointManager { config }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    /// Current UNIX time in seconds, stamped into new metadata.
    pub fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Write a bundle named after `metadata.iteration`.
    ///
    /// `write_payload` stores weights, optimizer state and pools into the
    /// temporary directory, which is renamed into place once complete.
    pub fn save<F>(
        &self,
        metadata: &CheckpointMetadata,
        training_state: &TrainingState,
        write_payload: F,
    ) -> Result<PathBuf, CheckpointError>
    where
        F: FnOnce(&Path) -> Result<(), CheckpointError>,
    {
        fs::create_dir_all(&self.config.checkpoint_dir)?;
        let dir_name = format!("checkpoint_{:07}", metadata.iteration);
        let tmp_dir = self.config.checkpoint_dir.join(format!("{}.tmp", dir_name));
        let final_dir = self.config.checkpoint_dir.join(&dir_name);

        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        write_payload(&tmp_dir)?;
        fs::write(
            tmp_dir.join(TRAINING_STATE_FILE),
            serde_json::to_string_pretty(training_state)?,
        )?;
        fs::write(
            tmp_dir.join(METADATA_FILE),
            serde_json::to_string_pretty(metadata)?,
        )?;

        // Atomic rename
        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&tmp_dir, &final_dir)?;

        self.update_latest_symlink(&dir_name)?;
        self.prune_old_checkpoints()?;

        Ok(final_dir)
    }

    /// Load a bundle's metadata and training state.
    pub fn load(&self, dir: &Path) -> Result<CheckpointData, CheckpointError> {
        if !dir.is_dir() {
            return Err(CheckpointError::DirNotFound(dir.to_path_buf()));
        }
        let metadata = read_metadata(&dir.join(METADATA_FILE))?;
        if metadata.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: metadata.version,
                expected: CHECKPOINT_VERSION,
            });
        }

        let ts_path = dir.join(TRAINING_STATE_FILE);
        let ts_json = fs::read_to_string(&ts_path).map_err(|e| CheckpointError::MetadataRead {
            path: ts_path.clone(),
            source: e,
        })?;
        let training_state: TrainingState =
            serde_json::from_str(&ts_json).map_err(|e| CheckpointError::MetadataParse {
                path: ts_path,
                source: e,
            })?;

        Ok(CheckpointData {
            path: dir.to_path_buf(),
            metadata,
            training_state,
        })
    }

    /// Load the bundle the `latest` symlink points to.
    pub fn load_latest(&self) -> Result<CheckpointData, CheckpointError> {
        let latest_link = self.config.checkpoint_dir.join("latest");
        if !latest_link.exists() {
            return Err(CheckpointError::NoLatestSymlink(
                self.config.checkpoint_dir.clone(),
            ));
        }
        let resolved = fs::read_link(&latest_link)?;
        let target = if resolved.is_relative() {
            self.config.checkpoint_dir.join(resolved)
        } else {
            resolved
        };
        self.load(&target)
    }

    /// List all checkpoints sorted by iteration (ascending).
    pub fn list_checkpoints(&self) -> Result<Vec<(PathBuf, CheckpointMetadata)>, CheckpointError> {
        let mut results = Vec::new();
        if !self.config.checkpoint_dir.is_dir() {
            return Ok(results);
        }
        for entry in fs::read_dir(&self.config.checkpoint_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || path.symlink_metadata()?.file_type().is_symlink() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if !name_str.starts_with("checkpoint_") || name_str.ends_with(".tmp") {
                continue;
            }
            let meta_path = path.join(METADATA_FILE);
            if meta_path.exists() {
                let metadata = read_metadata(&meta_path)?;
                results.push((path, metadata));
            }
        }
        results.sort_by_key(|(_, m)| m.iteration);
        Ok(results)
    }

    /// Keep only the newest `keep_last_n` bundles.
    fn prune_old_checkpoints(&self) -> Result<(), CheckpointError> {
        if self.config.keep_last_n == 0 {
            return Ok(());
        }
        let checkpoints = self.list_checkpoints()?;
        let excess = checkpoints.len().saturating_sub(self.config.keep_last_n);
        for (path, _) in checkpoints.iter().take(excess) {
            fs::remove_dir_all(path)?;
            debug!(path = %path.display(), "pruned checkpoint");
        }
        Ok(())
    }

    /// Update the `latest` symlink to point to the given checkpoint directory name.
    fn update_latest_symlink(&self, dir_name: &str) -> Result<(), CheckpointError> {
        let link_path = self.config.checkpoint_dir.join("latest");
        // Remove old symlink if it exists
        if link_path.exists() || link_path.symlink_metadata().is_ok() {
            fs::remove_file(&link_path)?;
        }
        std::os::unix::fs::symlink(dir_name, &link_path)?;
        Ok(())
    }
}

fn read_metadata(meta_path: &Path) -> Result<CheckpointMetadata, CheckpointError> {
    let meta_json = fs::read_to_string(meta_path).map_err(|e| CheckpointError::MetadataRead {
        path: meta_path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&meta_json).map_err(|e| CheckpointError::MetadataParse {
        path: meta_path.to_path_buf(),
        source: e,
    })
}
