use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ai::{BotKind, Observation, Policy, ScriptedBot};
use crate::error::TrainingError;
use crate::game::{GameConfig, GameState, Side};

/// Opponent pool settings, shared by both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpponentPoolConfig {
    pub enabled: bool,
    pub pool_maxsize: usize,
    /// Add a snapshot of the live policy every this many training iterations
    pub pool_increment_period: usize,
    /// Probability of drawing a new opponent at the end of an episode
    pub pool_prob: f64,
    pub quality_scores: bool,
    pub initial_quality: f64,
    pub quality_score_eta: f64,
    /// Seed each pool with the side's baseline bots
    pub baselines_in_pool: bool,
}

impl Default for OpponentPoolConfig {
    fn default() -> Self {
        OpponentPoolConfig {
            enabled: false,
            pool_maxsize: 1000,
            pool_increment_period: 50,
            pool_prob: 0.5,
            quality_scores: true,
            initial_quality: 1.0,
            quality_score_eta: 0.01,
            baselines_in_pool: false,
        }
    }
}

/// What a pool entry plays with.
pub enum OpponentHandle<P> {
    Policy(P),
    ScriptedBot(Box<dyn ScriptedBot>),
}

impl<P: Policy> OpponentHandle<P> {
    /// Pick an action for the current step.
    pub fn act(&mut self, obs: &Observation, state: &GameState, config: &GameConfig) -> usize {
        match self {
            OpponentHandle::Policy(policy) => policy.predict(obs, false),
            OpponentHandle::ScriptedBot(bot) => bot.action(state, config),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OpponentHandle::Policy(policy) => policy.name(),
            OpponentHandle::ScriptedBot(bot) => bot.name(),
        }
    }

    pub fn bot_kind(&self) -> Option<BotKind> {
        match self {
            OpponentHandle::Policy(_) => None,
            OpponentHandle::ScriptedBot(bot) => Some(bot.kind()),
        }
    }
}

pub struct OpponentEntry<P> {
    pub handle: OpponentHandle<P>,
    pub quality: Option<f64>,
}

/// Bounded pool of frozen opponents for one side with quality-score matchmaking.
pub struct OpponentPool<P> {
    side: Side,
    config: OpponentPoolConfig,
    entries: Vec<OpponentEntry<P>>,
    current: Option<usize>,
}

impl<P: Policy> OpponentPool<P> {
    pub fn new(side: Side, config: OpponentPoolConfig) -> Self {
        OpponentPool {
            side,
            config,
            entries: Vec::new(),
            current: None,
        }
    }

    /// Side whose opponents this pool holds
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[OpponentEntry<P>] {
        &self.entries
    }

    pub fn config(&self) -> &OpponentPoolConfig {
        &self.config
    }

    /// Add a frozen policy snapshot.
    pub fn add(&mut self, snapshot: P) {
        self.push(OpponentHandle::Policy(snapshot));
    }

    pub fn add_bot(&mut self, bot: Box<dyn ScriptedBot>) {
        self.push(OpponentHandle::ScriptedBot(bot));
    }

    /// Append an entry, evicting the oldest one at capacity. A new entry's
    /// quality starts at the best score currently in the pool.
    fn push(&mut self, handle: OpponentHandle<P>) {
        if self.config.pool_maxsize > 0 && self.entries.len() >= self.config.pool_maxsize {
            self.entries.remove(0);
            self.current = match self.current {
                Some(0) | None => None,
                Some(i) => Some(i - 1),
            };
        }
        let quality = self.config.quality_scores.then(|| {
            self.entries
                .iter()
                .filter_map(|e| e.quality)
                .reduce(f64::max)
                .unwrap_or(self.config.initial_quality)
        });
        self.entries.push(OpponentEntry { handle, quality });
    }

    /// Restore an entry with a known quality, used when loading a checkpoint.
    pub fn restore_entry(&mut self, handle: OpponentHandle<P>, quality: Option<f64>) {
        self.entries.push(OpponentEntry { handle, quality });
    }

    /// Draw an index: softmax over quality scores, or uniform when scores are off.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<usize, TrainingError> {
        if self.entries.is_empty() {
            return Err(TrainingError::OpponentPoolEmpty(self.side));
        }
        if !self.config.quality_scores {
            return Ok(rng.random_range(0..self.entries.len()));
        }
        let probs = softmax(&self.quality_scores());
        let r: f64 = rng.random_range(0.0..1.0);
        let mut cumulative = 0.0;
        for (i, &p) in probs.iter().enumerate() {
            cumulative += p;
            if r < cumulative {
                return Ok(i);
            }
        }
        Ok(probs.len() - 1)
    }

    /// Sample an opponent and make it the current one.
    pub fn select<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<usize, TrainingError> {
        let index = self.sample(rng)?;
        self.current = Some(index);
        Ok(index)
    }

    /// Current opponent index, selecting one first if needed.
    pub fn ensure_current<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<usize, TrainingError> {
        match self.current {
            Some(i) => Ok(i),
            None => self.select(rng),
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn set_current(&mut self, index: usize) -> Result<(), TrainingError> {
        if index >= self.entries.len() {
            return Err(TrainingError::InvalidOpponentIndex {
                index,
                len: self.entries.len(),
            });
        }
        self.current = Some(index);
        Ok(())
    }

    /// Let the current opponent act, selecting one if none is active.
    pub fn act<R: Rng + ?Sized>(
        &mut self,
        obs: &Observation,
        state: &GameState,
        config: &GameConfig,
        rng: &mut R,
    ) -> Result<usize, TrainingError> {
        let index = self.ensure_current(rng)?;
        Ok(self.entries[index].handle.act(obs, state, config))
    }

    /// Lower the quality of opponent `index` after it lost:
    /// `score[i] -= eta / (N * p_i)` with `p` the softmax over current scores.
    pub fn update_quality(&mut self, index: usize) -> Result<(), TrainingError> {
        let len = self.entries.len();
        if index >= len {
            return Err(TrainingError::InvalidOpponentIndex { index, len });
        }
        if !self.config.quality_scores {
            return Ok(());
        }
        let probs = softmax(&self.quality_scores());
        let p = probs[index].max(f64::MIN_POSITIVE);
        let eta = self.config.quality_score_eta;
        if let Some(q) = self.entries[index].quality.as_mut() {
            *q -= eta / (len as f64 * p);
        }
        Ok(())
    }

    /// Quality per entry; entries without a score count as `initial_quality`.
    pub fn quality_scores(&self) -> Vec<f64> {
        self.entries
            .iter()
            .map(|e| e.quality.unwrap_or(self.config.initial_quality))
            .collect()
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
