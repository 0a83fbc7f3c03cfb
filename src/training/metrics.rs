use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::game::Side;

/// Result of a single episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeResult {
    pub attacker_reward: f64,
    pub defender_reward: f64,
    pub length: usize,
    pub hacked: bool,
}

/// Trainer state that goes into a log record besides episode statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecordContext {
    pub lr_attacker: f64,
    pub lr_defender: f64,
    pub train_attacker: bool,
    pub train_defender: bool,
    pub attacker_pool_size: usize,
    pub defender_pool_size: usize,
}

/// One structured log record per reporting interval.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub iteration: usize,
    pub eval: bool,
    pub avg_attacker_reward: f64,
    pub avg_defender_reward: f64,
    pub avg_episode_length: f64,
    /// Fraction of episodes in the window where the attacker reached DATA
    pub hack_probability: f64,
    pub cumulative_hack_probability: f64,
    pub attacker_cumulative_reward: f64,
    pub defender_cumulative_reward: f64,
    pub avg_attacker_loss: f64,
    pub avg_defender_loss: f64,
    pub lr_attacker: f64,
    pub lr_defender: f64,
    pub train_attacker: bool,
    pub train_defender: bool,
    pub attacker_pool_size: usize,
    pub defender_pool_size: usize,
    pub total_episodes: u64,
}

impl MetricsRecord {
    /// Emit the record as a structured `tracing` event.
    pub fn log(&self) {
        info!(
            iteration = self.iteration,
            eval = self.eval,
            avg_attacker_reward = format_args!("{:.3}", self.avg_attacker_reward),
            avg_defender_reward = format_args!("{:.3}", self.avg_defender_reward),
            avg_episode_length = format_args!("{:.1}", self.avg_episode_length),
            hack_probability = format_args!("{:.3}", self.hack_probability),
            cumulative_hack_probability = format_args!("{:.3}", self.cumulative_hack_probability),
            avg_attacker_loss = format_args!("{:.4}", self.avg_attacker_loss),
            avg_defender_loss = format_args!("{:.4}", self.avg_defender_loss),
            lr_attacker = self.lr_attacker,
            lr_defender = self.lr_defender,
            train_attacker = self.train_attacker,
            train_defender = self.train_defender,
            attacker_pool_size = self.attacker_pool_size,
            defender_pool_size = self.defender_pool_size,
            total_episodes = self.total_episodes,
            "{}",
            if self.eval { "evaluation" } else { "training" }
        );
    }
}

/// Episode and loss statistics. The window resets after every log record,
/// lifetime counters never do. The record history keeps at most
/// `history_limit` records, oldest dropped first; 0 keeps every record.
#[derive(Debug, Clone, Default)]
pub struct TrainingMetrics {
    window: Vec<EpisodeResult>,
    attacker_losses: Vec<f32>,
    defender_losses: Vec<f32>,
    total_episodes: u64,
    total_hacks: u64,
    attacker_cumulative_reward: f64,
    defender_cumulative_reward: f64,
    history: VecDeque<MetricsRecord>,
    history_limit: usize,
}

impl TrainingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        TrainingMetrics {
            history_limit,
            ..Self::default()
        }
    }

    pub fn record_episode(&mut self, result: EpisodeResult) {
        self.total_episodes += 1;
        if result.hacked {
            self.total_hacks += 1;
        }
        self.attacker_cumulative_reward += result.attacker_reward;
        self.defender_cumulative_reward += result.defender_reward;
        self.window.push(result);
    }

    pub fn record_update(&mut self, side: Side, loss: f32) {
        match side {
            Side::Attacker => self.attacker_losses.push(loss),
            Side::Defender => self.defender_losses.push(loss),
        }
    }

    pub fn window_episodes(&self) -> usize {
        self.window.len()
    }

    pub fn total_episodes(&self) -> u64 {
        self.total_episodes
    }

    pub fn total_hacks(&self) -> u64 {
        self.total_hacks
    }

    /// Hack rate over the current window.
    pub fn hack_probability(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().filter(|r| r.hacked).count() as f64 / self.window.len() as f64
    }

    /// Hack rate over every episode since training started.
    pub fn cumulative_hack_probability(&self) -> f64 {
        if self.total_episodes == 0 {
            return 0.0;
        }
        self.total_hacks as f64 / self.total_episodes as f64
    }

    fn window_mean(&self, f: impl Fn(&EpisodeResult) -> f64) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().map(f).sum::<f64>() / self.window.len() as f64
    }

    /// Build a record from the current window without resetting it.
    pub fn summarize(&self, iteration: usize, eval: bool, ctx: &RecordContext) -> MetricsRecord {
        MetricsRecord {
            iteration,
            eval,
            avg_attacker_reward: self.window_mean(|r| r.attacker_reward),
            avg_defender_reward: self.window_mean(|r| r.defender_reward),
            avg_episode_length: self.window_mean(|r| r.length as f64),
            hack_probability: self.hack_probability(),
            cumulative_hack_probability: self.cumulative_hack_probability(),
            attacker_cumulative_reward: self.attacker_cumulative_reward,
            defender_cumulative_reward: self.defender_cumulative_reward,
            avg_attacker_loss: mean(&self.attacker_losses),
            avg_defender_loss: mean(&self.defender_losses),
            lr_attacker: ctx.lr_attacker,
            lr_defender: ctx.lr_defender,
            train_attacker: ctx.train_attacker,
            train_defender: ctx.train_defender,
            attacker_pool_size: ctx.attacker_pool_size,
            defender_pool_size: ctx.defender_pool_size,
            total_episodes: self.total_episodes,
        }
    }

    /// Summarize the window, keep the record in the history and start a new window.
    pub fn flush(&mut self, iteration: usize, ctx: &RecordContext) -> MetricsRecord {
        let record = self.summarize(iteration, false, ctx);
        self.push_record(record.clone());
        self.reset_window();
        record
    }

    /// Keep an externally built record, e.g. an evaluation summary.
    pub fn push_record(&mut self, record: MetricsRecord) {
        if self.history_limit > 0 && self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    pub fn reset_window(&mut self) {
        self.window.clear();
        self.attacker_losses.clear();
        self.defender_losses.clear();
    }

    pub fn history(&self) -> &VecDeque<MetricsRecord> {
        &self.history
    }

    /// Restore lifetime counters from a checkpoint.
    pub fn restore_lifetime(&mut self, episodes: u64, hacks: u64, attacker_reward: f64, defender_reward: f64) {
        self.total_episodes = episodes;
        self.total_hacks = hacks;
        self.attacker_cumulative_reward = attacker_reward;
        self.defender_cumulative_reward = defender_reward;
    }

    pub fn attacker_cumulative_reward(&self) -> f64 {
        self.attacker_cumulative_reward
    }

    pub fn defender_cumulative_reward(&self) -> f64 {
        self.defender_cumulative_reward
    }
}

fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(hacked: bool, length: usize) -> EpisodeResult {
        EpisodeResult {
            attacker_reward: if hacked { 1.0 } else { -1.0 },
            defender_reward: if hacked { -1.0 } else { 1.0 },
            length,
            hacked,
        }
    }

    #[test]
    fn test_hack_probability() {
        let mut m = TrainingMetrics::new();
        for _ in 0..3 {
            m.record_episode(episode(true, 4));
        }
        m.record_episode(episode(false, 8));
        assert!((m.hack_probability() - 0.75).abs() < 1e-12);
        assert!((m.cumulative_hack_probability() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_flush_resets_window_not_lifetime() {
        let mut m = TrainingMetrics::new();
        m.record_episode(episode(true, 2));
        m.record_episode(episode(false, 4));
        m.record_update(Side::Attacker, 0.5);
        let record = m.flush(1, &RecordContext::default());
        assert!((record.avg_episode_length - 3.0).abs() < 1e-12);
        assert!((record.avg_attacker_loss - 0.5).abs() < 1e-12);
        assert_eq!(record.total_episodes, 2);

        m.record_episode(episode(false, 6));
        assert_eq!(m.window_episodes(), 1);
        assert_eq!(m.hack_probability(), 0.0);
        assert_eq!(m.total_episodes(), 3);
        assert!((m.cumulative_hack_probability() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.history().len(), 1);
    }

    #[test]
    fn test_history_drops_oldest_past_limit() {
        let mut m = TrainingMetrics::with_history_limit(3);
        for iteration in 1..=5 {
            m.record_episode(episode(iteration % 2 == 0, 2));
            m.flush(iteration, &RecordContext::default());
        }
        let iterations: Vec<usize> = m.history().iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![3, 4, 5]);
        assert_eq!(m.total_episodes(), 5);

        let mut unbounded = TrainingMetrics::new();
        for iteration in 1..=5 {
            unbounded.flush(iteration, &RecordContext::default());
        }
        assert_eq!(unbounded.history().len(), 5);
    }

    #[test]
    fn test_empty_window_summary() {
        let m = TrainingMetrics::new();
        let record = m.summarize(0, true, &RecordContext::default());
        assert!(record.eval);
        assert_eq!(record.avg_attacker_reward, 0.0);
        assert_eq!(record.hack_probability, 0.0);
    }

    #[test]
    fn test_cumulative_rewards() {
        let mut m = TrainingMetrics::new();
        m.record_episode(episode(true, 2));
        m.record_episode(episode(true, 2));
        m.record_episode(episode(false, 2));
        assert!((m.attacker_cumulative_reward() - 1.0).abs() < 1e-12);
        assert!((m.defender_cumulative_reward() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_context_copied_into_record() {
        let m = TrainingMetrics::new();
        let ctx = RecordContext {
            lr_attacker: 1e-3,
            lr_defender: 5e-4,
            train_attacker: true,
            train_defender: false,
            attacker_pool_size: 3,
            defender_pool_size: 7,
        };
        let record = m.summarize(12, false, &ctx);
        assert_eq!(record.iteration, 12);
        assert_eq!(record.lr_defender, 5e-4);
        assert!(record.train_attacker && !record.train_defender);
        assert_eq!(record.defender_pool_size, 7);
    }
}
