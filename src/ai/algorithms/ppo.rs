use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{DefaultRecorder, Recorder};
use burn::tensor::TensorData;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ai::agent::{Learner, Observation, Policy, PolicyStep};
use crate::ai::networks::{ActorCritic, ActorCriticConfig};
use crate::error::CheckpointError;
use crate::game::Side;
use crate::training::{
    normalize, RolloutBuffer, Schedule, ScheduleKind, UpdateMetrics, UpdateParams, UpdateStrategy,
};

pub type InferBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<InferBackend>;

type PpoOptimizer = OptimizerAdaptor<Adam, ActorCritic<TrainBackend>, TrainBackend>;

const NETWORK_FILE: &str = "actor_critic";
const OPTIMIZER_FILE: &str = "optimizer";

/// PPO hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    pub learning_rate: f64,
    /// Defender learning rate, `learning_rate` when unset
    pub defender_learning_rate: Option<f64>,
    pub lr_schedule: ScheduleKind,
    /// Learning rate reached at the end of training with a linear schedule
    pub final_learning_rate: f64,
    /// Transitions collected per side before each update
    pub n_steps: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub gamma: f32,
    pub gae_lambda: f32,
    pub clip_range: f32,
    pub clip_range_schedule: ScheduleKind,
    pub final_clip_range: f32,
    /// Clip the value prediction around the old value, unclipped when unset
    pub clip_range_vf: Option<f32>,
    pub ent_coef: f32,
    pub vf_coef: f32,
    pub max_grad_norm: f32,
    /// Stop after an epoch whose mean approximate KL exceeds 1.5x this
    pub target_kl: Option<f32>,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
}

impl Default for PpoConfig {
    fn default() -> Self {
        PpoConfig {
            learning_rate: 3e-4,
            defender_learning_rate: None,
            lr_schedule: ScheduleKind::Constant,
            final_learning_rate: 0.0,
            n_steps: 2048,
            batch_size: 64,
            n_epochs: 10,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            clip_range_schedule: ScheduleKind::Constant,
            final_clip_range: 0.0,
            clip_range_vf: None,
            ent_coef: 0.0,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            target_kl: None,
            hidden_size: 64,
            num_hidden_layers: 2,
        }
    }
}

impl PpoConfig {
    pub fn initial_learning_rate(&self, side: Side) -> f64 {
        match side {
            Side::Attacker => self.learning_rate,
            Side::Defender => self.defender_learning_rate.unwrap_or(self.learning_rate),
        }
    }

    pub fn lr_schedule(&self, side: Side) -> Schedule {
        Schedule::new(
            self.lr_schedule,
            self.initial_learning_rate(side),
            self.final_learning_rate,
        )
    }

    pub fn clip_schedule(&self) -> Schedule {
        Schedule::new(
            self.clip_range_schedule,
            self.clip_range as f64,
            self.final_clip_range as f64,
        )
    }

    pub fn network_config(&self, obs_dim: usize, action_dim: usize) -> ActorCriticConfig {
        ActorCriticConfig::new(obs_dim, action_dim)
            .with_hidden_size(self.hidden_size)
            .with_num_hidden_layers(self.num_hidden_layers)
    }

    fn optimizer(&self) -> PpoOptimizer {
        AdamConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(self.max_grad_norm)))
            .init()
    }
}

/// Trainable actor-critic policy for one side.
pub struct PpoPolicy {
    network: ActorCritic<TrainBackend>,
    optimizer: PpoOptimizer,
    net_config: ActorCriticConfig,
    config: PpoConfig,
    device: <TrainBackend as Backend>::Device,
    rng: StdRng,
    name: String,
}

impl PpoPolicy {
    pub fn new(side: Side, obs_dim: usize, action_dim: usize, config: &PpoConfig, seed: Option<u64>) -> Self {
        let device = Default::default();
        let net_config = config.network_config(obs_dim, action_dim);
        let network: ActorCritic<TrainBackend> = net_config.init(&device);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        PpoPolicy {
            network,
            optimizer: config.optimizer(),
            net_config,
            config: config.clone(),
            device,
            rng,
            name: format!("ppo_{side}"),
        }
    }

    pub fn network_config(&self) -> &ActorCriticConfig {
        &self.net_config
    }

    /// Masked action distribution of the current weights.
    pub fn action_probabilities(&self, obs: &Observation) -> Vec<f32> {
        let (logits, _) = infer(&self.network.valid(), obs, &self.device);
        masked_softmax(&logits, &obs.legal_indices())
    }
}

impl Policy for PpoPolicy {
    fn predict(&mut self, obs: &Observation, deterministic: bool) -> usize {
        let (logits, _) = infer(&self.network.valid(), obs, &self.device);
        select_action(&logits, obs, deterministic, &mut self.rng).0
    }

    fn forward(&mut self, obs: &Observation) -> PolicyStep {
        let (logits, value) = infer(&self.network.valid(), obs, &self.device);
        let (action, log_prob) = select_action(&logits, obs, false, &mut self.rng);
        PolicyStep {
            action,
            value,
            log_prob,
        }
    }

    fn value(&mut self, obs: &Observation) -> f32 {
        infer(&self.network.valid(), obs, &self.device).1
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Learner for PpoPolicy {
    type Snapshot = FrozenPolicy;

    fn snapshot(&self) -> FrozenPolicy {
        FrozenPolicy {
            network: self.network.valid(),
            device: self.device,
            rng: StdRng::seed_from_u64(self.rng.clone().random()),
            name: format!("{}_snapshot", self.name),
        }
    }

    fn observation_size(&self) -> usize {
        self.net_config.obs_dim
    }

    fn num_actions(&self) -> usize {
        self.net_config.action_dim
    }

    fn save(&self, dir: &Path) -> Result<(), CheckpointError> {
        let recorder = DefaultRecorder::default();
        self.network
            .clone()
            .valid()
            .save_file(dir.join(NETWORK_FILE), &recorder)
            .map_err(|e| CheckpointError::ModelSave(e.to_string()))?;
        Recorder::<TrainBackend>::record(&recorder, self.optimizer.to_record(), dir.join(OPTIMIZER_FILE))
            .map_err(|e| CheckpointError::ModelSave(e.to_string()))?;
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<(), CheckpointError> {
        let recorder = DefaultRecorder::default();
        let network: ActorCritic<TrainBackend> = self
            .net_config
            .init(&self.device)
            .load_file(dir.join(NETWORK_FILE), &recorder, &self.device)
            .map_err(|e| CheckpointError::ModelLoad(e.to_string()))?;
        let record = Recorder::<TrainBackend>::load(&recorder, dir.join(OPTIMIZER_FILE), &self.device)
            .map_err(|e| CheckpointError::ModelLoad(e.to_string()))?;

        self.network = network;
        self.optimizer = self.config.optimizer().load_record(record);
        Ok(())
    }

    fn save_snapshot(&self, snapshot: &FrozenPolicy, path: &Path) -> Result<(), CheckpointError> {
        let recorder = DefaultRecorder::default();
        snapshot
            .network
            .clone()
            .save_file(path, &recorder)
            .map_err(|e| CheckpointError::ModelSave(e.to_string()))
    }

    fn load_snapshot(&self, path: &Path) -> Result<FrozenPolicy, CheckpointError> {
        let recorder = DefaultRecorder::default();
        let network: ActorCritic<InferBackend> = self
            .net_config
            .init(&self.device)
            .load_file(path, &recorder, &self.device)
            .map_err(|e| CheckpointError::ModelLoad(e.to_string()))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}_snapshot", self.name));
        Ok(FrozenPolicy {
            network,
            device: self.device,
            rng: StdRng::from_os_rng(),
            name,
        })
    }
}

/// Inference-only copy of a [`PpoPolicy`], used as a pool opponent.
#[derive(Debug, Clone)]
pub struct FrozenPolicy {
    network: ActorCritic<InferBackend>,
    device: <InferBackend as Backend>::Device,
    rng: StdRng,
    name: String,
}

impl FrozenPolicy {
    pub fn action_probabilities(&self, obs: &Observation) -> Vec<f32> {
        let (logits, _) = infer(&self.network, obs, &self.device);
        masked_softmax(&logits, &obs.legal_indices())
    }
}

impl Policy for FrozenPolicy {
    fn predict(&mut self, obs: &Observation, deterministic: bool) -> usize {
        let (logits, _) = infer(&self.network, obs, &self.device);
        select_action(&logits, obs, deterministic, &mut self.rng).0
    }

    fn forward(&mut self, obs: &Observation) -> PolicyStep {
        let (logits, value) = infer(&self.network, obs, &self.device);
        let (action, log_prob) = select_action(&logits, obs, false, &mut self.rng);
        PolicyStep {
            action,
            value,
            log_prob,
        }
    }

    fn value(&mut self, obs: &Observation) -> f32 {
        infer(&self.network, obs, &self.device).1
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Clipped-surrogate PPO update.
#[derive(Debug, Clone)]
pub struct PpoUpdate {
    config: PpoConfig,
}

impl PpoUpdate {
    pub fn new(config: PpoConfig) -> Self {
        PpoUpdate { config }
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }
}

impl UpdateStrategy<PpoPolicy> for PpoUpdate {
    fn algorithm(&self) -> &'static str {
        "PPO"
    }

    fn hyperparameters(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn update(
        &mut self,
        policy: &mut PpoPolicy,
        buffer: &RolloutBuffer,
        params: UpdateParams,
        rng: &mut StdRng,
    ) -> UpdateMetrics {
        if buffer.is_empty() {
            return UpdateMetrics {
                learning_rate: params.learning_rate,
                ..Default::default()
            };
        }

        let obs_dim = policy.net_config.obs_dim;
        let n_actions = policy.net_config.action_dim;
        let clip = params.clip_range;
        let device = policy.device;

        let mut policy_losses = Vec::new();
        let mut value_losses = Vec::new();
        let mut entropy_losses = Vec::new();
        let mut clip_fractions = Vec::new();
        let mut losses = Vec::new();
        let mut epoch_kl = 0.0;
        let mut epochs = 0;
        let mut minibatches = 0;

        for epoch in 0..self.config.n_epochs {
            epochs += 1;
            let mut approx_kls = Vec::new();
            for batch in buffer.minibatch_indices(self.config.batch_size, rng) {
                let n = batch.len();
                let obs_data: Vec<f32> = batch
                    .iter()
                    .flat_map(|&i| buffer.observations[i].iter().copied())
                    .collect();
                let mut action_mask_data = vec![0.0f32; n * n_actions];
                let mut legal_mask_data = vec![-1e9f32; n * n_actions];
                for (row, &i) in batch.iter().enumerate() {
                    action_mask_data[row * n_actions + buffer.actions[i]] = 1.0;
                    let legal = &buffer.legal_actions[i];
                    let any_legal = legal.iter().any(|&ok| ok);
                    for a in 0..n_actions {
                        if !any_legal || legal.get(a).copied().unwrap_or(false) {
                            legal_mask_data[row * n_actions + a] = 0.0;
                        }
                    }
                }
                let gather = |source: &[f32]| batch.iter().map(|&i| source[i]).collect::<Vec<f32>>();
                let advantages = normalize(&gather(&buffer.advantages));
                let old_log_probs = gather(&buffer.log_probs);
                let old_values = gather(&buffer.values);
                let returns = gather(&buffer.returns);

                let (values, log_prob, entropy) = policy.network.evaluate_actions(
                    tensor_2d(&obs_data, n, obs_dim, &device),
                    tensor_2d(&legal_mask_data, n, n_actions, &device),
                    tensor_2d(&action_mask_data, n, n_actions, &device),
                );

                // Ratio r = exp(log_pi_new - log_pi_old)
                let log_ratio = log_prob - tensor_1d(&old_log_probs, &device);
                let ratio = log_ratio.clone().exp();
                let adv = tensor_1d(&advantages, &device);

                // min(a, b) = (a + b - |a - b|) / 2
                let surr1 = ratio.clone() * adv.clone();
                let surr2 = ratio.clone().clamp(1.0 - clip, 1.0 + clip) * adv;
                let diff = surr1.clone() - surr2.clone();
                let abs_diff = diff.clone() * diff.sign();
                let policy_loss = -((surr1 + surr2 - abs_diff) / 2.0).mean();

                let old_values = tensor_1d(&old_values, &device);
                let values_pred = match self.config.clip_range_vf {
                    Some(vf_clip) => old_values.clone() + (values - old_values).clamp(-vf_clip, vf_clip),
                    None => values,
                };
                let value_diff = tensor_1d(&returns, &device) - values_pred;
                let value_loss = (value_diff.clone() * value_diff).mean();

                let entropy_loss = -entropy.mean();

                let loss = policy_loss.clone()
                    + entropy_loss.clone() * self.config.ent_coef
                    + value_loss.clone() * self.config.vf_coef;

                let ratio_data = to_f32_vec(ratio);
                let log_ratio_data = to_f32_vec(log_ratio);
                let clipped = ratio_data.iter().filter(|&&r| (r - 1.0).abs() > clip).count();
                clip_fractions.push(clipped as f32 / n as f32);
                let approx_kl = log_ratio_data
                    .iter()
                    .map(|&lr| lr.exp_m1() - lr)
                    .sum::<f32>()
                    / n as f32;
                approx_kls.push(approx_kl);

                policy_losses.push(scalar(policy_loss));
                value_losses.push(scalar(value_loss));
                entropy_losses.push(scalar(entropy_loss));
                losses.push(scalar(loss.clone()));

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &policy.network);
                policy.network = policy
                    .optimizer
                    .step(params.learning_rate, policy.network.clone(), grads);
                minibatches += 1;
            }

            // The whole epoch is applied before the KL check
            epoch_kl = mean(&approx_kls);
            if let Some(target_kl) = self.config.target_kl {
                if epoch_kl > 1.5 * target_kl {
                    debug!(epoch, approx_kl = epoch_kl, target_kl, "early stopping at max kl");
                    break;
                }
            }
        }

        UpdateMetrics {
            loss: mean(&losses),
            policy_loss: mean(&policy_losses),
            value_loss: mean(&value_losses),
            entropy_loss: mean(&entropy_losses),
            approx_kl: epoch_kl,
            clip_fraction: mean(&clip_fractions),
            epochs,
            minibatches,
            learning_rate: params.learning_rate,
        }
    }
}

fn tensor_1d(data: &[f32], device: &<TrainBackend as Backend>::Device) -> Tensor<TrainBackend, 1> {
    Tensor::<TrainBackend, 1>::from_data(TensorData::from(data), device)
}

fn tensor_2d(
    data: &[f32],
    rows: usize,
    cols: usize,
    device: &<TrainBackend as Backend>::Device,
) -> Tensor<TrainBackend, 2> {
    tensor_1d(data, device).reshape([rows as i32, cols as i32])
}

fn to_f32_vec<B: Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
    t.into_data()
        .to_vec()
        .expect("network tensors hold f32 elements")
}

fn scalar(t: Tensor<TrainBackend, 1>) -> f32 {
    to_f32_vec(t)[0]
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Single-observation forward pass: (logits, value).
fn infer(
    network: &ActorCritic<InferBackend>,
    obs: &Observation,
    device: &<InferBackend as Backend>::Device,
) -> (Vec<f32>, f32) {
    let input = Tensor::<InferBackend, 1>::from_data(TensorData::from(obs.features.as_slice()), device)
        .reshape([1, obs.features.len() as i32]);
    let (logits, value) = network.forward(input);
    let logits = to_f32_vec(logits);
    let value = to_f32_vec(value);
    (logits, value[0])
}

/// Pick an action among the legal ones: argmax when deterministic, sampled
/// otherwise. Returns the action and its log-probability.
fn select_action(logits: &[f32], obs: &Observation, deterministic: bool, rng: &mut StdRng) -> (usize, f32) {
    let legal = obs.legal_indices();
    let probs = masked_softmax(logits, &legal);
    let action = if deterministic {
        let mut best_action = legal[0];
        let mut best_prob = f32::NEG_INFINITY;
        for &a in &legal {
            if probs[a] > best_prob {
                best_prob = probs[a];
                best_action = a;
            }
        }
        best_action
    } else {
        sample_categorical(&probs, rng)
    };
    (action, probs[action].max(f32::MIN_POSITIVE).ln())
}

/// Apply legal action mask and compute softmax probabilities.
fn masked_softmax(logits: &[f32], legal: &[usize]) -> Vec<f32> {
    let mut masked = vec![f32::NEG_INFINITY; logits.len()];
    for &a in legal {
        masked[a] = logits[a];
    }

    // Numerically stable softmax
    let max_val = masked.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut probs = vec![0.0f32; logits.len()];
    let mut sum = 0.0f32;
    for (i, &m) in masked.iter().enumerate() {
        let v = (m - max_val).exp();
        probs[i] = v;
        sum += v;
    }
    for p in &mut probs {
        *p /= sum;
    }

    probs
}

/// Sample an action from a categorical distribution defined by probs.
fn sample_categorical(probs: &[f32], rng: &mut StdRng) -> usize {
    let r: f32 = rng.random_range(0.0..1.0);
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if r < cumulative {
            return i;
        }
    }
    probs.iter().rposition(|&p| p > 0.0).unwrap_or(0)
}
