use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;
use crate::game::{GameConfig, GameState, Side};

pub use crate::game::Observation;

/// Output of a stochastic forward pass: the sampled action with its value
/// estimate and log-probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyStep {
    pub action: usize,
    pub value: f32,
    pub log_prob: f32,
}

/// Universal interface for anything that maps an observation to an action.
pub trait Policy {
    /// Select an action. When `deterministic` is false the policy samples.
    fn predict(&mut self, obs: &Observation, deterministic: bool) -> usize;

    /// Sample an action and report its value and log-probability.
    fn forward(&mut self, obs: &Observation) -> PolicyStep;

    /// State-value estimate.
    fn value(&mut self, obs: &Observation) -> f32;

    fn name(&self) -> &str;
}

/// A policy that can be trained, snapshotted into an opponent pool and persisted.
pub trait Learner: Policy {
    /// Frozen, independent copy of the learner's current weights.
    type Snapshot: Policy;

    fn snapshot(&self) -> Self::Snapshot;

    fn observation_size(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Save weights and optimizer state into `dir`.
    fn save(&self, dir: &Path) -> Result<(), CheckpointError>;

    /// Restore weights and optimizer state from `dir`.
    fn load(&mut self, dir: &Path) -> Result<(), CheckpointError>;

    /// Save a snapshot to `path` (extension chosen by the recorder).
    fn save_snapshot(&self, snapshot: &Self::Snapshot, path: &Path) -> Result<(), CheckpointError>;

    fn load_snapshot(&self, path: &Path) -> Result<Self::Snapshot, CheckpointError>;
}

/// Built-in heuristic opponents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotKind {
    AttackMaximalValue,
    RandomAttack,
    DefendMinimalValue,
    RandomDefense,
}

impl BotKind {
    /// The side this bot plays
    pub fn side(self) -> Side {
        match self {
            BotKind::AttackMaximalValue | BotKind::RandomAttack => Side::Attacker,
            BotKind::DefendMinimalValue | BotKind::RandomDefense => Side::Defender,
        }
    }

    /// Baseline bots for a side, strongest first
    pub fn baselines(side: Side) -> [BotKind; 2] {
        match side {
            Side::Attacker => [BotKind::AttackMaximalValue, BotKind::RandomAttack],
            Side::Defender => [BotKind::DefendMinimalValue, BotKind::RandomDefense],
        }
    }
}

/// Scripted opponent that acts on the full game state instead of an observation.
pub trait ScriptedBot {
    fn action(&mut self, state: &GameState, config: &GameConfig) -> usize;

    fn name(&self) -> &str;

    fn kind(&self) -> BotKind;
}
