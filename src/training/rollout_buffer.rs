use rand::seq::SliceRandom;
use rand::Rng;

use crate::ai::Observation;

/// Fixed-capacity on-policy buffer for one side, filled during a collection
/// phase and consumed by the update epochs that follow.
#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    capacity: usize,
    pub observations: Vec<Vec<f32>>,
    pub legal_actions: Vec<Vec<bool>>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    /// Whether the episode ended on this transition
    pub dones: Vec<bool>,
    pub values: Vec<f32>,
    pub log_probs: Vec<f32>,
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

impl RolloutBuffer {
    pub fn new(capacity: usize) -> Self {
        RolloutBuffer {
            capacity,
            observations: Vec::with_capacity(capacity),
            legal_actions: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
            advantages: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.observations.clear();
        self.legal_actions.clear();
        self.actions.clear();
        self.rewards.clear();
        self.dones.clear();
        self.values.clear();
        self.log_probs.clear();
        self.advantages.clear();
        self.returns.clear();
    }

    /// Append one transition.
    pub fn push(
        &mut self,
        obs: &Observation,
        action: usize,
        reward: f32,
        done: bool,
        value: f32,
        log_prob: f32,
    ) {
        assert!(!self.is_full(), "rollout buffer is full");
        self.observations.push(obs.features.clone());
        self.legal_actions.push(obs.legal_actions.clone());
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.values.push(value);
        self.log_probs.push(log_prob);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Generalized Advantage Estimation, filling `advantages` and `returns`.
    ///
    /// `last_value` bootstraps the step after the last transition; it is
    /// ignored when that transition ended an episode.
    pub fn compute_returns_and_advantage(&mut self, last_value: f32, gamma: f32, gae_lambda: f32) {
        let n = self.len();
        self.advantages = vec![0.0; n];
        self.returns = vec![0.0; n];

        let mut gae = 0.0f32;
        for t in (0..n).rev() {
            let next_non_terminal = if self.dones[t] { 0.0 } else { 1.0 };
            let next_value = if t + 1 == n {
                last_value
            } else {
                self.values[t + 1]
            };
            let delta = self.rewards[t] + gamma * next_value * next_non_terminal - self.values[t];
            gae = delta + gamma * gae_lambda * next_non_terminal * gae;
            self.advantages[t] = gae;
        }
        for t in 0..n {
            self.returns[t] = self.advantages[t] + self.values[t];
        }
    }

    /// Shuffled index batches covering every transition exactly once.
    pub fn minibatch_indices<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);
        indices
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

/// Normalize to zero mean and unit variance.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let n = values.len();
    if n < 2 {
        return values.to_vec();
    }
    let mean: f32 = values.iter().sum::<f32>() / n as f32;
    let var: f32 = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n as f32;
    let std = var.sqrt() + 1e-8;
    values.iter().map(|v| (v - mean) / std).collect()
}
