use std::path::PathBuf;

use crate::game::{Position, Side};

/// Errors raised by the game model: topology, configuration and action ids.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("position ({}, {}) is outside the {rows}x{cols} grid", pos.row, pos.col)]
    InvalidPosition {
        pos: Position,
        rows: usize,
        cols: usize,
    },

    #[error("node id {node_id} is out of range (num_nodes: {num_nodes})")]
    InvalidNodeId { node_id: usize, num_nodes: usize },

    #[error("{side} action {action} is out of range (action space: {num_actions})")]
    InvalidAction {
        side: Side,
        action: usize,
        num_actions: usize,
    },

    #[error("illegal {side} move {action}: {reason}")]
    IllegalMove {
        side: Side,
        action: usize,
        reason: String,
    },

    #[error("episode is over, call reset() before stepping")]
    EpisodeOver,
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("no 'latest' symlink found in {0}")]
    NoLatestSymlink(PathBuf),

    #[error("failed to read metadata from {path}: {source}")]
    MetadataRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse metadata from {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to save model: {0}")]
    ModelSave(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("{side} {what} mismatch: checkpoint has {found}, environment has {expected}")]
    ShapeMismatch {
        side: Side,
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("unsupported checkpoint schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during training.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("cannot sample from an empty {0} opponent pool")]
    OpponentPoolEmpty(Side),

    #[error("opponent index {index} is out of range (pool size: {len})")]
    InvalidOpponentIndex { index: usize, len: usize },

    #[error("game error: {0}")]
    Game(#[from] GameError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
