use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::{log_softmax, softmax};

/// Actor-critic MLP with separate policy and value trunks.
///
/// ```text
/// Input:        [batch, obs_dim]
/// Policy trunk: obs_dim -> hidden -> ... -> hidden, ReLU
/// Value trunk:  obs_dim -> hidden -> ... -> hidden, ReLU
/// Policy head:  hidden -> action_dim (logits)
/// Value head:   hidden -> 1
/// ```
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    policy_layers: Vec<Linear<B>>,
    value_layers: Vec<Linear<B>>,
    policy_head: Linear<B>,
    value_head: Linear<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct ActorCriticConfig {
    pub obs_dim: usize,
    pub action_dim: usize,
    #[config(default = 64)]
    pub hidden_size: usize,
    #[config(default = 2)]
    pub num_hidden_layers: usize,
}

impl ActorCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ActorCritic<B> {
        let trunk = || {
            (0..self.num_hidden_layers)
                .map(|i| {
                    let input = if i == 0 { self.obs_dim } else { self.hidden_size };
                    LinearConfig::new(input, self.hidden_size).init(device)
                })
                .collect::<Vec<_>>()
        };
        let head_input = if self.num_hidden_layers == 0 {
            self.obs_dim
        } else {
            self.hidden_size
        };
        ActorCritic {
            policy_layers: trunk(),
            value_layers: trunk(),
            policy_head: LinearConfig::new(head_input, self.action_dim).init(device),
            value_head: LinearConfig::new(head_input, 1).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> ActorCritic<B> {
    /// Forward pass: input [batch, obs_dim] -> (logits [batch, action_dim], value [batch, 1]).
    pub fn forward(&self, input: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut pi = input.clone();
        for layer in &self.policy_layers {
            pi = self.relu.forward(layer.forward(pi));
        }
        let mut vf = input;
        for layer in &self.value_layers {
            vf = self.relu.forward(layer.forward(vf));
        }
        (self.policy_head.forward(pi), self.value_head.forward(vf))
    }

    /// Evaluate taken actions under the current policy.
    ///
    /// `legal_mask` is additive (0 for legal, a large negative number for
    /// illegal actions) and `actions` is one-hot, both [batch, action_dim].
    /// Returns `(values, log_prob, entropy)`, each [batch].
    pub fn evaluate_actions(
        &self,
        obs: Tensor<B, 2>,
        legal_mask: Tensor<B, 2>,
        actions: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, Tensor<B, 1>, Tensor<B, 1>) {
        let batch = obs.dims()[0] as i32;
        let (logits, values) = self.forward(obs);
        let masked = logits + legal_mask;
        let log_probs = log_softmax(masked.clone(), 1);
        let probs = softmax(masked, 1);

        let log_prob = (log_probs.clone() * actions).sum_dim(1).reshape([batch]);
        let entropy = -(probs * log_probs).sum_dim(1).reshape([batch]);
        (values.reshape([batch]), log_prob, entropy)
    }
}
