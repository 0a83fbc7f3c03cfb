use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::metrics::{MetricsRecord, RecordContext, TrainingMetrics};
use super::rollout_buffer::RolloutBuffer;
use super::schedule::{progress_remaining, Schedule};
use super::trainer::TrainerConfig;
use crate::checkpoint::{CheckpointManager, CheckpointManagerConfig};
use crate::game::Side;

/// Hyperparameters resolved for one update from the schedules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    pub learning_rate: f64,
    pub clip_range: f32,
}

/// Metrics returned from one update phase of a side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMetrics {
    pub loss: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy_loss: f32,
    pub approx_kl: f32,
    pub clip_fraction: f32,
    /// Epochs actually run, fewer than configured after a KL early stop
    pub epochs: usize,
    /// Optimizer steps applied over all epochs
    pub minibatches: usize,
    pub learning_rate: f64,
}

/// Algorithm-specific gradient update, plugged into the shared trainer loop.
pub trait UpdateStrategy<L> {
    /// Algorithm name written to checkpoint metadata
    fn algorithm(&self) -> &'static str;

    /// Hyperparameters written to checkpoint metadata
    fn hyperparameters(&self) -> serde_json::Value;

    /// Run the update epochs for one side over its filled buffer.
    fn update(
        &mut self,
        learner: &mut L,
        buffer: &RolloutBuffer,
        params: UpdateParams,
        rng: &mut StdRng,
    ) -> UpdateMetrics;
}

/// Training phase of one side within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Collecting,
    Updating,
    Idle,
}

/// Algorithm-independent trainer state: progress, schedules, metrics and
/// checkpoint storage.
pub struct TrainerCore {
    config: TrainerConfig,
    attacker_lr: Schedule,
    defender_lr: Schedule,
    clip_range: Schedule,
    pub(crate) num_timesteps: u64,
    pub(crate) iteration: usize,
    pub(crate) metrics: TrainingMetrics,
    checkpoints: CheckpointManager,
    pub(crate) rng: StdRng,
}

impl TrainerCore {
    pub fn new(
        config: TrainerConfig,
        lr_schedules: [Schedule; 2],
        clip_range: Schedule,
        checkpoint_config: CheckpointManagerConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let [attacker_lr, defender_lr] = lr_schedules;
        let metrics = TrainingMetrics::with_history_limit(config.max_history);
        TrainerCore {
            config,
            attacker_lr,
            defender_lr,
            clip_range,
            num_timesteps: 0,
            iteration: 0,
            metrics,
            checkpoints: CheckpointManager::new(checkpoint_config),
            rng,
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Goes from 1 at the start of training to 0 at `total_timesteps`.
    pub fn progress_remaining(&self) -> f64 {
        progress_remaining(self.num_timesteps, self.config.total_timesteps)
    }

    pub fn learning_rate(&self, side: Side) -> f64 {
        let schedule = match side {
            Side::Attacker => &self.attacker_lr,
            Side::Defender => &self.defender_lr,
        };
        schedule.value(self.progress_remaining())
    }

    pub fn clip_range(&self) -> f32 {
        self.clip_range.value(self.progress_remaining()) as f32
    }

    pub fn update_params(&self, side: Side) -> UpdateParams {
        UpdateParams {
            learning_rate: self.learning_rate(side),
            clip_range: self.clip_range(),
        }
    }

    /// Whether an action scheduled every `every` iterations is due now.
    pub fn is_due(&self, every: usize) -> bool {
        every > 0 && self.iteration > 0 && self.iteration % every == 0
    }

    /// Flush the metrics window into a record and log it.
    pub fn log_window(&mut self, ctx: &RecordContext) -> MetricsRecord {
        let record = self.metrics.flush(self.iteration, ctx);
        record.log();
        record
    }

    pub fn restore_progress(&mut self, num_timesteps: u64, iteration: usize) {
        self.num_timesteps = num_timesteps;
        self.iteration = iteration;
    }
}
