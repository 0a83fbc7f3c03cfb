use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use super::metrics::{EpisodeResult, TrainingMetrics};
use super::opponent_pool::OpponentPool;
use super::rollout_buffer::RolloutBuffer;
use crate::ai::{Observation, Policy, PolicyStep};
use crate::error::TrainingError;
use crate::game::{Environment, JointAction, Side};

/// Progress reported to the step callback after every environment step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepProgress {
    pub num_timesteps: u64,
    pub done: bool,
}

/// Hook consulted after every environment step. Returning `false` aborts training.
pub trait StepCallback {
    fn on_step(&mut self, progress: &StepProgress) -> bool;
}

impl<F: FnMut(&StepProgress) -> bool> StepCallback for F {
    fn on_step(&mut self, progress: &StepProgress) -> bool {
        self(progress)
    }
}

/// Callback that never stops training.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallback;

impl StepCallback for NoCallback {
    fn on_step(&mut self, _progress: &StepProgress) -> bool {
        true
    }
}

/// Everything the collector needs to know about one side for a collection phase.
pub struct SideContext<'a, P, O> {
    pub side: Side,
    pub trainable: bool,
    pub policy: &'a mut P,
    pub buffer: &'a mut RolloutBuffer,
    /// Opponents used while the side is not trainable
    pub pool: Option<&'a mut OpponentPool<O>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    Completed,
    Aborted,
}

/// Drives the environment for a fixed horizon and fills the buffers of the
/// trainable sides. The last observations carry over between phases.
pub struct RolloutCollector {
    n_rollout_steps: usize,
    gamma: f32,
    gae_lambda: f32,
    pool_prob: f64,
    num_timesteps: u64,
    last_obs: Option<(Observation, Observation)>,
    episode_attacker_reward: f64,
    episode_defender_reward: f64,
    episode_length: usize,
}

impl RolloutCollector {
    pub fn new(n_rollout_steps: usize, gamma: f32, gae_lambda: f32, pool_prob: f64) -> Self {
        RolloutCollector {
            n_rollout_steps,
            gamma,
            gae_lambda,
            pool_prob,
            num_timesteps: 0,
            last_obs: None,
            episode_attacker_reward: 0.0,
            episode_defender_reward: 0.0,
            episode_length: 0,
        }
    }

    pub fn n_rollout_steps(&self) -> usize {
        self.n_rollout_steps
    }

    pub fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }

    pub fn set_num_timesteps(&mut self, num_timesteps: u64) {
        self.num_timesteps = num_timesteps;
    }

    /// Forget the carried-over observations so the next phase starts a new episode.
    pub fn reset_episode(&mut self) {
        self.last_obs = None;
        self.episode_attacker_reward = 0.0;
        self.episode_defender_reward = 0.0;
        self.episode_length = 0;
    }

    /// Run one collection phase of `n_rollout_steps` environment steps.
    pub fn collect<'a, E, P, O, C>(
        &mut self,
        env: &mut E,
        mut attacker: SideContext<'a, P, O>,
        mut defender: SideContext<'a, P, O>,
        metrics: &mut TrainingMetrics,
        callback: &mut C,
        rng: &mut StdRng,
    ) -> Result<CollectOutcome, TrainingError>
    where
        E: Environment,
        P: Policy,
        O: Policy,
        C: StepCallback + ?Sized,
    {
        assert_eq!(env.num_envs(), 1, "rollout collection needs exactly one environment");

        for ctx in [&mut attacker, &mut defender] {
            if ctx.trainable {
                ctx.buffer.reset();
            } else if let Some(pool) = ctx.pool.as_deref_mut() {
                pool.ensure_current(rng)?;
            }
        }

        let (mut attacker_obs, mut defender_obs) = match self.last_obs.take() {
            Some(obs) => obs,
            None => env.reset(),
        };

        for _ in 0..self.n_rollout_steps {
            let attack = act(&mut attacker, &attacker_obs, env, rng)?;
            let defense = act(&mut defender, &defender_obs, env, rng)?;

            let result = env.step(
                JointAction {
                    attacker: attack.action,
                    defender: defense.action,
                },
                true,
            )?;
            self.num_timesteps += 1;
            self.episode_length += 1;
            self.episode_attacker_reward += result.attacker_reward as f64;
            self.episode_defender_reward += result.defender_reward as f64;

            let done = result.done;
            if attacker.trainable {
                attacker.buffer.push(
                    &attacker_obs,
                    attack.action,
                    result.attacker_reward,
                    done,
                    attack.value,
                    attack.log_prob,
                );
            }
            if defender.trainable {
                defender.buffer.push(
                    &defender_obs,
                    defense.action,
                    result.defender_reward,
                    done,
                    defense.value,
                    defense.log_prob,
                );
            }

            if done {
                self.end_episode(result.info.is_success, &mut attacker, &mut defender, metrics, rng)?;
                (attacker_obs, defender_obs) = env.reset();
            } else {
                attacker_obs = result.attacker_obs;
                defender_obs = result.defender_obs;
            }

            let progress = StepProgress {
                num_timesteps: self.num_timesteps,
                done,
            };
            if !callback.on_step(&progress) {
                debug!(num_timesteps = self.num_timesteps, "collection aborted by callback");
                self.last_obs = Some((attacker_obs, defender_obs));
                return Ok(CollectOutcome::Aborted);
            }
        }

        if attacker.trainable {
            let last_value = attacker.policy.value(&attacker_obs);
            attacker
                .buffer
                .compute_returns_and_advantage(last_value, self.gamma, self.gae_lambda);
        }
        if defender.trainable {
            let last_value = defender.policy.value(&defender_obs);
            defender
                .buffer
                .compute_returns_and_advantage(last_value, self.gamma, self.gae_lambda);
        }

        self.last_obs = Some((attacker_obs, defender_obs));
        Ok(CollectOutcome::Completed)
    }

    fn end_episode<'a, P, O>(
        &mut self,
        hacked: bool,
        attacker: &mut SideContext<'a, P, O>,
        defender: &mut SideContext<'a, P, O>,
        metrics: &mut TrainingMetrics,
        rng: &mut StdRng,
    ) -> Result<(), TrainingError>
    where
        P: Policy,
        O: Policy,
    {
        metrics.record_episode(EpisodeResult {
            attacker_reward: self.episode_attacker_reward,
            defender_reward: self.episode_defender_reward,
            length: self.episode_length,
            hacked,
        });
        self.episode_attacker_reward = 0.0;
        self.episode_defender_reward = 0.0;
        self.episode_length = 0;

        // the pooled opponent of a frozen side lost this episode
        if attacker.trainable && hacked {
            lower_current_quality(defender)?;
        }
        if defender.trainable && !hacked {
            lower_current_quality(attacker)?;
        }

        for ctx in [attacker, defender] {
            if ctx.trainable {
                continue;
            }
            if let Some(pool) = ctx.pool.as_deref_mut() {
                if rng.random::<f64>() < self.pool_prob {
                    let index = pool.select(rng)?;
                    debug!(side = %ctx.side, index, "resampled opponent");
                }
            }
        }
        Ok(())
    }
}

fn lower_current_quality<P, O: Policy>(ctx: &mut SideContext<'_, P, O>) -> Result<(), TrainingError> {
    if ctx.trainable {
        return Ok(());
    }
    if let Some(pool) = ctx.pool.as_deref_mut() {
        if let Some(index) = pool.current() {
            pool.update_quality(index)?;
        }
    }
    Ok(())
}

/// Action for one side: the live policy when trainable, else the pooled
/// opponent, else the live policy acting greedily without recording anything.
fn act<E, P, O>(
    ctx: &mut SideContext<'_, P, O>,
    obs: &Observation,
    env: &E,
    rng: &mut StdRng,
) -> Result<PolicyStep, TrainingError>
where
    E: Environment,
    P: Policy,
    O: Policy,
{
    if ctx.trainable {
        return Ok(ctx.policy.forward(obs));
    }
    let action = match ctx.pool.as_deref_mut() {
        Some(pool) => pool.act(obs, env.state(), env.game_config(), rng)?,
        None => ctx.policy.predict(obs, false),
    };
    Ok(PolicyStep {
        action,
        value: 0.0,
        log_prob: 0.0,
    })
}
