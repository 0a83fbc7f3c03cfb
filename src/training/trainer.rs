use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::core::{Phase, TrainerCore, UpdateStrategy};
use super::metrics::{EpisodeResult, MetricsRecord, RecordContext, TrainingMetrics};
use super::opponent_pool::{OpponentPool, OpponentPoolConfig};
use super::rollout::{CollectOutcome, NoCallback, RolloutCollector, SideContext, StepCallback};
use super::rollout_buffer::RolloutBuffer;
use super::scheduler::AlternatingScheduler;
use crate::ai::{build_bot, BotKind, Learner, PpoPolicy, PpoUpdate};
use crate::checkpoint::{
    load_pool, save_pool, CheckpointManager, CheckpointManagerConfig, CheckpointMetadata,
    SpaceShape, TrainingState, CHECKPOINT_VERSION,
};
use crate::config::AppConfig;
use crate::error::TrainingError;
use crate::game::{Environment, IdsGameEnv, JointAction, Side};

/// Trainer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub total_timesteps: u64,
    /// Log a metrics record every this many iterations
    pub log_interval: usize,
    /// Save a checkpoint every this many iterations, 0 disables checkpointing
    pub checkpoint_frequency: usize,
    /// Evaluate every this many iterations, 0 disables evaluation
    pub eval_frequency: usize,
    pub eval_episodes: usize,
    pub train_attacker: bool,
    pub train_defender: bool,
    pub alternating_optimization: bool,
    pub alternating_period: usize,
    pub num_envs: usize,
    pub seed: Option<u64>,
    /// Metrics records kept in memory, oldest dropped first, 0 keeps all
    pub max_history: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            total_timesteps: 1_000_000,
            log_interval: 1,
            checkpoint_frequency: 10,
            eval_frequency: 10,
            eval_episodes: 10,
            train_attacker: true,
            train_defender: true,
            alternating_optimization: false,
            alternating_period: 15,
            num_envs: 1,
            seed: None,
            max_history: 10_000,
        }
    }
}

/// How a call to [`Trainer::learn`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnOutcome {
    /// The step callback stopped training early
    pub aborted: bool,
    pub num_timesteps: u64,
    pub iterations: usize,
}

/// Live policy, buffer and opponent pool of one side.
pub struct SideState<L: Learner> {
    pub policy: L,
    pub buffer: RolloutBuffer,
    pub pool: Option<OpponentPool<L::Snapshot>>,
    pub phase: Phase,
    /// Trainable iterations since the last pool snapshot
    pool_iterations: usize,
}

impl<L: Learner> SideState<L> {
    fn new(
        side: Side,
        policy: L,
        capacity: usize,
        pool_config: &OpponentPoolConfig,
        seed: Option<u64>,
    ) -> Self {
        let pool = pool_config.enabled.then(|| {
            let mut pool = OpponentPool::new(side, pool_config.clone());
            if pool_config.baselines_in_pool {
                for (i, kind) in BotKind::baselines(side).into_iter().enumerate() {
                    pool.add_bot(build_bot(kind, seed.map(|s| s.wrapping_add(i as u64))));
                }
            }
            pool.add(policy.snapshot());
            pool
        });
        SideState {
            policy,
            buffer: RolloutBuffer::new(capacity),
            pool,
            phase: Phase::Idle,
            pool_iterations: 0,
        }
    }

    fn context(&mut self, side: Side, trainable: bool) -> SideContext<'_, L, L::Snapshot> {
        SideContext {
            side,
            trainable,
            policy: &mut self.policy,
            buffer: &mut self.buffer,
            pool: self.pool.as_mut(),
        }
    }

    fn pool_len(&self) -> usize {
        self.pool.as_ref().map_or(0, |p| p.len())
    }
}

/// Two-player trainer: collects rollouts for both sides, updates the
/// trainable ones with `S`, and handles pools, logging, evaluation and
/// checkpoints.
pub struct Trainer<E, L: Learner, S> {
    env: E,
    core: TrainerCore,
    strategy: S,
    attacker: SideState<L>,
    defender: SideState<L>,
    scheduler: AlternatingScheduler,
    collector: RolloutCollector,
    pool_config: OpponentPoolConfig,
    last_checkpoint: Option<usize>,
}

/// PPO self-play trainer.
pub type PpoTrainer<E = IdsGameEnv> = Trainer<E, PpoPolicy, PpoUpdate>;

impl<E, L, S> Trainer<E, L, S>
where
    E: Environment + Clone,
    L: Learner,
    S: UpdateStrategy<L>,
{
    pub fn new(
        env: E,
        attacker: L,
        defender: L,
        strategy: S,
        collector: RolloutCollector,
        core: TrainerCore,
        pool_config: OpponentPoolConfig,
    ) -> Self {
        let config = core.config().clone();
        let capacity = collector.n_rollout_steps() * config.num_envs.max(1);
        let scheduler = AlternatingScheduler::new(
            config.alternating_optimization,
            config.alternating_period,
            config.train_attacker,
            config.train_defender,
        );
        let attacker = SideState::new(Side::Attacker, attacker, capacity, &pool_config, config.seed);
        let defender = SideState::new(
            Side::Defender,
            defender,
            capacity,
            &pool_config,
            config.seed.map(|s| s.wrapping_add(2)),
        );

        Trainer {
            env,
            core,
            strategy,
            attacker,
            defender,
            scheduler,
            collector,
            pool_config,
            last_checkpoint: None,
        }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn core(&self) -> &TrainerCore {
        &self.core
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        self.core.metrics()
    }

    pub fn scheduler(&self) -> &AlternatingScheduler {
        &self.scheduler
    }

    pub fn side(&self, side: Side) -> &SideState<L> {
        match side {
            Side::Attacker => &self.attacker,
            Side::Defender => &self.defender,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideState<L> {
        match side {
            Side::Attacker => &mut self.attacker,
            Side::Defender => &mut self.defender,
        }
    }

    pub fn policy(&self, side: Side) -> &L {
        &self.side(side).policy
    }

    pub fn pool(&self, side: Side) -> Option<&OpponentPool<L::Snapshot>> {
        self.side(side).pool.as_ref()
    }

    fn shape(&self, side: Side) -> SpaceShape {
        SpaceShape {
            observation_size: self.env.observation_size(side),
            num_actions: self.env.num_actions(side),
        }
    }

    /// Train until `total_timesteps` without a step callback.
    pub fn learn_to_end(&mut self) -> Result<LearnOutcome, TrainingError> {
        self.learn(&mut NoCallback)
    }

    /// Run collection and update iterations until `total_timesteps` is reached
    /// or the callback returns `false`.
    pub fn learn<C>(&mut self, callback: &mut C) -> Result<LearnOutcome, TrainingError>
    where
        C: StepCallback + ?Sized,
    {
        let total_timesteps = self.core.config().total_timesteps;
        info!(
            algorithm = self.strategy.algorithm(),
            total_timesteps,
            n_steps = self.collector.n_rollout_steps(),
            train_attacker = self.scheduler.is_trainable(Side::Attacker),
            train_defender = self.scheduler.is_trainable(Side::Defender),
            alternating = self.scheduler.is_alternating(),
            "starting training"
        );

        while self.core.num_timesteps < total_timesteps {
            let train_attacker = self.scheduler.is_trainable(Side::Attacker);
            let train_defender = self.scheduler.is_trainable(Side::Defender);
            self.attacker.phase = if train_attacker { Phase::Collecting } else { Phase::Idle };
            self.defender.phase = if train_defender { Phase::Collecting } else { Phase::Idle };

            self.collector.set_num_timesteps(self.core.num_timesteps);
            let outcome = {
                let Trainer {
                    env,
                    core,
                    attacker,
                    defender,
                    collector,
                    ..
                } = self;
                collector.collect(
                    env,
                    attacker.context(Side::Attacker, train_attacker),
                    defender.context(Side::Defender, train_defender),
                    &mut core.metrics,
                    &mut *callback,
                    &mut core.rng,
                )?
            };
            self.core.num_timesteps = self.collector.num_timesteps();

            if outcome == CollectOutcome::Aborted {
                self.attacker.phase = Phase::Idle;
                self.defender.phase = Phase::Idle;
                info!(num_timesteps = self.core.num_timesteps, "training aborted by callback");
                return Ok(self.outcome(true));
            }
            self.core.iteration += 1;

            self.update(Side::Attacker, train_attacker);
            self.update(Side::Defender, train_defender);
            self.grow_pool(Side::Attacker, train_attacker);
            self.grow_pool(Side::Defender, train_defender);

            if self.core.is_due(self.core.config().log_interval) {
                let ctx = self.record_context();
                self.core.log_window(&ctx);
            }
            if self.core.is_due(self.core.config().eval_frequency) {
                self.evaluate()?;
            }

            if self.scheduler.tick() {
                info!(
                    iteration = self.core.iteration,
                    train_attacker = self.scheduler.is_trainable(Side::Attacker),
                    train_defender = self.scheduler.is_trainable(Side::Defender),
                    "switched trainable side"
                );
            }
            if self.core.is_due(self.core.config().checkpoint_frequency) {
                self.save_checkpoint()?;
            }
        }

        if self.core.config().checkpoint_frequency > 0
            && self.last_checkpoint != Some(self.core.iteration)
        {
            self.save_checkpoint()?;
        }
        info!(
            num_timesteps = self.core.num_timesteps,
            iterations = self.core.iteration,
            "training complete"
        );
        Ok(self.outcome(false))
    }

    fn outcome(&self, aborted: bool) -> LearnOutcome {
        LearnOutcome {
            aborted,
            num_timesteps: self.core.num_timesteps,
            iterations: self.core.iteration,
        }
    }

    fn update(&mut self, side: Side, trainable: bool) {
        if !trainable {
            return;
        }
        let params = self.core.update_params(side);
        let state = match side {
            Side::Attacker => &mut self.attacker,
            Side::Defender => &mut self.defender,
        };
        state.phase = Phase::Updating;
        let metrics = self
            .strategy
            .update(&mut state.policy, &state.buffer, params, &mut self.core.rng);
        state.phase = Phase::Idle;
        self.core.metrics.record_update(side, metrics.loss);
        debug!(
            %side,
            loss = metrics.loss,
            policy_loss = metrics.policy_loss,
            value_loss = metrics.value_loss,
            entropy_loss = metrics.entropy_loss,
            approx_kl = metrics.approx_kl,
            clip_fraction = metrics.clip_fraction,
            epochs = metrics.epochs,
            minibatches = metrics.minibatches,
            learning_rate = metrics.learning_rate,
            "update finished"
        );
    }

    /// Snapshot a side into its pool every `pool_increment_period` iterations it trained.
    fn grow_pool(&mut self, side: Side, trained: bool) {
        if !trained {
            return;
        }
        let period = self.pool_config.pool_increment_period.max(1);
        let state = self.side_mut(side);
        let Some(pool) = state.pool.as_mut() else {
            return;
        };
        state.pool_iterations += 1;
        if state.pool_iterations >= period {
            pool.add(state.policy.snapshot());
            state.pool_iterations = 0;
            debug!(%side, pool_size = pool.len(), "added snapshot to opponent pool");
        }
    }

    fn record_context(&self) -> RecordContext {
        RecordContext {
            lr_attacker: self.core.learning_rate(Side::Attacker),
            lr_defender: self.core.learning_rate(Side::Defender),
            train_attacker: self.scheduler.is_trainable(Side::Attacker),
            train_defender: self.scheduler.is_trainable(Side::Defender),
            attacker_pool_size: self.attacker.pool_len(),
            defender_pool_size: self.defender.pool_len(),
        }
    }

    /// Play `eval_episodes` episodes on a copy of the environment with both
    /// live policies acting deterministically.
    pub fn evaluate(&mut self) -> Result<MetricsRecord, TrainingError> {
        let mut env = self.env.clone();
        let mut metrics = TrainingMetrics::new();

        for _ in 0..self.core.config().eval_episodes {
            let (mut attacker_obs, mut defender_obs) = env.reset();
            let mut attacker_reward = 0.0;
            let mut defender_reward = 0.0;
            let mut length = 0;
            loop {
                let action = JointAction {
                    attacker: self.attacker.policy.predict(&attacker_obs, true),
                    defender: self.defender.policy.predict(&defender_obs, true),
                };
                let result = env.step(action, false)?;
                attacker_reward += result.attacker_reward as f64;
                defender_reward += result.defender_reward as f64;
                length += 1;
                if result.done {
                    metrics.record_episode(EpisodeResult {
                        attacker_reward,
                        defender_reward,
                        length,
                        hacked: result.info.is_success,
                    });
                    break;
                }
                attacker_obs = result.attacker_obs;
                defender_obs = result.defender_obs;
            }
        }

        let record = metrics.summarize(self.core.iteration, true, &self.record_context());
        record.log();
        self.core.metrics.push_record(record.clone());
        Ok(record)
    }

    fn training_state(&self) -> TrainingState {
        let metrics = self.core.metrics();
        TrainingState {
            num_timesteps: self.core.num_timesteps,
            iteration: self.core.iteration,
            progress_remaining: self.core.progress_remaining(),
            total_episodes: metrics.total_episodes(),
            total_hacks: metrics.total_hacks(),
            attacker_cumulative_reward: metrics.attacker_cumulative_reward(),
            defender_cumulative_reward: metrics.defender_cumulative_reward(),
            scheduler: self.scheduler.clone(),
            attacker_pool_iterations: self.attacker.pool_iterations,
            defender_pool_iterations: self.defender.pool_iterations,
            train_attacker: self.scheduler.is_trainable(Side::Attacker),
            train_defender: self.scheduler.is_trainable(Side::Defender),
        }
    }

    /// Write a checkpoint bundle for the current iteration.
    pub fn save_checkpoint(&mut self) -> Result<PathBuf, TrainingError> {
        let metadata = CheckpointMetadata {
            version: CHECKPOINT_VERSION,
            iteration: self.core.iteration,
            num_timesteps: self.core.num_timesteps,
            timestamp: CheckpointManager::timestamp(),
            algorithm: self.strategy.algorithm().to_string(),
            attacker: self.shape(Side::Attacker),
            defender: self.shape(Side::Defender),
            hyperparameters: self.strategy.hyperparameters(),
            metrics: self.core.metrics().history().back().cloned(),
        };
        let training_state = self.training_state();

        let path = self.core.checkpoints().save(&metadata, &training_state, |dir| {
            for side in Side::BOTH {
                let state = self.side(side);
                let side_dir = dir.join(side.name());
                fs::create_dir_all(&side_dir)?;
                state.policy.save(&side_dir)?;
                if let Some(pool) = &state.pool {
                    save_pool(&state.policy, pool, &side_dir.join("pool"))?;
                }
            }
            Ok(())
        })?;

        self.last_checkpoint = Some(self.core.iteration);
        info!(
            path = %path.display(),
            iteration = self.core.iteration,
            "checkpoint saved"
        );
        Ok(path)
    }

    /// Restore policies, optimizers, pools and progress from a checkpoint.
    ///
    /// `dir` is either a bundle or a checkpoint directory with a `latest`
    /// symlink. Space sizes are checked before anything is loaded.
    pub fn resume_from(&mut self, dir: &Path) -> Result<(), TrainingError> {
        let data = if dir.join("latest").exists() {
            CheckpointManager::new(CheckpointManagerConfig {
                checkpoint_dir: dir.to_path_buf(),
                ..Default::default()
            })
            .load_latest()?
        } else {
            self.core.checkpoints().load(dir)?
        };
        for side in Side::BOTH {
            data.metadata.validate_shape(side, self.shape(side))?;
        }

        let pool_config = self.pool_config.clone();
        let seed = self.core.config().seed;
        for side in Side::BOTH {
            let side_dir = data.path.join(side.name());
            let pool_dir = side_dir.join("pool");
            let state = self.side_mut(side);
            state.policy.load(&side_dir)?;
            if pool_config.enabled && pool_dir.join("pool.json").exists() {
                state.pool = Some(load_pool(
                    &state.policy,
                    side,
                    pool_config.clone(),
                    &pool_dir,
                    seed,
                )?);
            }
        }

        let ts = data.training_state;
        self.core.restore_progress(ts.num_timesteps, ts.iteration);
        self.core.metrics.restore_lifetime(
            ts.total_episodes,
            ts.total_hacks,
            ts.attacker_cumulative_reward,
            ts.defender_cumulative_reward,
        );
        self.scheduler = ts.scheduler;
        self.attacker.pool_iterations = ts.attacker_pool_iterations;
        self.defender.pool_iterations = ts.defender_pool_iterations;
        self.collector.set_num_timesteps(ts.num_timesteps);
        self.collector.reset_episode();
        self.last_checkpoint = Some(ts.iteration);

        info!(
            path = %data.path.display(),
            iteration = ts.iteration,
            num_timesteps = ts.num_timesteps,
            "resumed from checkpoint"
        );
        Ok(())
    }
}

impl Trainer<IdsGameEnv, PpoPolicy, PpoUpdate> {
    /// Build the environment, both PPO policies and the trainer from a config.
    pub fn from_config(config: &AppConfig) -> Result<Self, TrainingError> {
        let seed = config.trainer.seed;
        let mut game = config.game.clone();
        if game.seed.is_none() {
            game.seed = seed;
        }
        let env = IdsGameEnv::new(game)?;

        let policy = |side: Side, offset: u64| {
            PpoPolicy::new(
                side,
                env.observation_size(side),
                env.num_actions(side),
                &config.ppo,
                seed.map(|s| s.wrapping_add(offset)),
            )
        };
        let attacker = policy(Side::Attacker, 1);
        let defender = policy(Side::Defender, 2);

        let core = TrainerCore::new(
            config.trainer.clone(),
            [
                config.ppo.lr_schedule(Side::Attacker),
                config.ppo.lr_schedule(Side::Defender),
            ],
            config.ppo.clip_schedule(),
            config.checkpoint.clone(),
        );
        let collector = RolloutCollector::new(
            config.ppo.n_steps,
            config.ppo.gamma,
            config.ppo.gae_lambda,
            config.opponent_pool.pool_prob,
        );

        Ok(Trainer::new(
            env,
            attacker,
            defender,
            PpoUpdate::new(config.ppo.clone()),
            collector,
            core,
            config.opponent_pool.clone(),
        ))
    }
}
