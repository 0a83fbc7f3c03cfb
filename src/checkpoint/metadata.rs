use serde::{Deserialize, Serialize};

use crate::ai::BotKind;
use crate::error::CheckpointError;
use crate::game::Side;
use crate::training::{AlternatingScheduler, MetricsRecord};

/// Schema version of `metadata.json` and `training_state.json`.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Schema version of `pool.json`.
pub const POOL_MANIFEST_VERSION: u32 = 1;

/// Observation and action space sizes of one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceShape {
    pub observation_size: usize,
    pub num_actions: usize,
}

/// Top-level checkpoint metadata written to metadata.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub version: u32,
    pub iteration: usize,
    pub num_timesteps: u64,
    pub timestamp: u64,
    pub algorithm: String,
    pub attacker: SpaceShape,
    pub defender: SpaceShape,
    #[serde(default)]
    pub hyperparameters: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsRecord>,
}

impl CheckpointMetadata {
    pub fn shape(&self, side: Side) -> SpaceShape {
        match side {
            Side::Attacker => self.attacker,
            Side::Defender => self.defender,
        }
    }

    /// Check that a side's stored spaces match the live environment.
    pub fn validate_shape(&self, side: Side, expected: SpaceShape) -> Result<(), CheckpointError> {
        let found = self.shape(side);
        if found.observation_size != expected.observation_size {
            return Err(CheckpointError::ShapeMismatch {
                side,
                what: "observation space",
                expected: expected.observation_size,
                found: found.observation_size,
            });
        }
        if found.num_actions != expected.num_actions {
            return Err(CheckpointError::ShapeMismatch {
                side,
                what: "action space",
                expected: expected.num_actions,
                found: found.num_actions,
            });
        }
        Ok(())
    }
}

/// Trainer progress written to training_state.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub num_timesteps: u64,
    pub iteration: usize,
    pub progress_remaining: f64,
    pub total_episodes: u64,
    pub total_hacks: u64,
    pub attacker_cumulative_reward: f64,
    pub defender_cumulative_reward: f64,
    pub scheduler: AlternatingScheduler,
    /// Trainable iterations counted towards the next pool snapshot, per side
    pub attacker_pool_iterations: usize,
    pub defender_pool_iterations: usize,
    pub train_attacker: bool,
    pub train_defender: bool,
}

/// Where a restored pool entry comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolEntrySource {
    /// Snapshot weights stored next to the manifest
    Snapshot { file: String },
    Bot { bot: BotKind },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntryRecord {
    pub source: PoolEntrySource,
    pub quality: Option<f64>,
}

/// Opponent pool contents written to pool.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolManifest {
    pub version: u32,
    pub side: Side,
    pub current: Option<usize>,
    pub entries: Vec<PoolEntryRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> CheckpointMetadata {
        CheckpointMetadata {
            version: CHECKPOINT_VERSION,
            iteration: 12,
            num_timesteps: 24_576,
            timestamp: 1_700_000_000,
            algorithm: "PPO".to_string(),
            attacker: SpaceShape {
                observation_size: 44,
                num_actions: 40,
            },
            defender: SpaceShape {
                observation_size: 44,
                num_actions: 44,
            },
            hyperparameters: serde_json::json!({ "learning_rate": 3e-4 }),
            metrics: None,
        }
    }

    #[test]
    fn test_metadata_serde() {
        let json = serde_json::to_string_pretty(&metadata()).unwrap();
        let deserialized: CheckpointMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.iteration, 12);
        assert_eq!(deserialized.algorithm, "PPO");
        assert_eq!(deserialized.defender.num_actions, 44);
        assert_eq!(deserialized.hyperparameters["learning_rate"], 3e-4);
        assert!(deserialized.metrics.is_none());
    }

    #[test]
    fn test_validate_shape() {
        let meta = metadata();
        assert!(meta
            .validate_shape(
                Side::Attacker,
                SpaceShape {
                    observation_size: 44,
                    num_actions: 40
                }
            )
            .is_ok());

        let err = meta
            .validate_shape(
                Side::Defender,
                SpaceShape {
                    observation_size: 44,
                    num_actions: 48,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::ShapeMismatch {
                side: Side::Defender,
                what: "action space",
                expected: 48,
                found: 44,
            }
        ));
    }

    #[test]
    fn test_pool_manifest_json_layout() {
        let manifest = PoolManifest {
            version: POOL_MANIFEST_VERSION,
            side: Side::Defender,
            current: Some(1),
            entries: vec![
                PoolEntryRecord {
                    source: PoolEntrySource::Bot {
                        bot: BotKind::DefendMinimalValue,
                    },
                    quality: Some(1.0),
                },
                PoolEntryRecord {
                    source: PoolEntrySource::Snapshot {
                        file: "entry_1".to_string(),
                    },
                    quality: None,
                },
            ],
        };
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["side"], "defender");
        assert_eq!(value["entries"][0]["source"]["kind"], "bot");
        assert_eq!(value["entries"][0]["source"]["bot"], "defend_minimal_value");
        assert_eq!(value["entries"][1]["source"]["file"], "entry_1");

        let restored: PoolManifest = serde_json::from_value(value).unwrap();
        assert_eq!(restored, manifest);
    }
}
