use std::collections::VecDeque;

use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{NetworkConfig, NodeType, Position};

/// Number of past attacker positions kept for the anti-cycling rule.
pub const HISTORY_LEN: usize = 4;

/// Parameters for randomising the initial state of every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialStateParams {
    /// Defense value of the non-vulnerable defense types
    pub defense_val: u32,
    pub attack_val: u32,
    pub num_vulnerabilities_per_node: usize,
    pub det_val: u32,
    /// Defense value of the vulnerable defense types
    pub vulnerability_val: u32,
}

impl Default for InitialStateParams {
    fn default() -> Self {
        InitialStateParams {
            defense_val: 2,
            attack_val: 0,
            num_vulnerabilities_per_node: 1,
            det_val: 2,
            vulnerability_val: 0,
        }
    }
}

/// Full state of one game: per-node values, attacker position and episode bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    /// `attack_values[node][attack_type]`
    pub attack_values: Vec<Vec<u32>>,
    /// `defense_values[node][attack_type]`
    pub defense_values: Vec<Vec<u32>>,
    /// Detection value per node
    pub defense_det: Vec<u32>,
    pub attacker_pos: Position,
    pub attacker_cumulative_reward: f64,
    pub defender_cumulative_reward: f64,
    pub game_step: usize,
    pub num_games: u64,
    pub num_hacks: u64,
    pub done: bool,
    pub hacked: bool,
    pub detected: bool,
    history: VecDeque<usize>,
}

impl GameState {
    /// All-zero state with the attacker on START.
    pub fn empty(network: &NetworkConfig, num_attack_types: usize) -> Self {
        let num_nodes = network.num_nodes();
        let mut history = VecDeque::with_capacity(HISTORY_LEN);
        history.push_back(network.start_node_id());
        GameState {
            attack_values: vec![vec![0; num_attack_types]; num_nodes],
            defense_values: vec![vec![0; num_attack_types]; num_nodes],
            defense_det: vec![0; num_nodes],
            attacker_pos: network.start_pos(),
            attacker_cumulative_reward: 0.0,
            defender_cumulative_reward: 0.0,
            game_step: 0,
            num_games: 0,
            num_hacks: 0,
            done: false,
            hacked: false,
            detected: false,
            history,
        }
    }

    /// Deterministic default: every defendable node has defense value 2 on all
    /// types except one vulnerable type (`node_id % num_attack_types`) at 0, and
    /// detection value 2.
    pub fn default_state(network: &NetworkConfig, num_attack_types: usize) -> Self {
        let mut state = Self::empty(network, num_attack_types);
        let params = InitialStateParams::default();
        for (node_id, node_type) in network.node_types().into_iter().enumerate() {
            if !node_type.is_defendable() {
                continue;
            }
            let vulnerable = node_id % num_attack_types;
            state.fill_node(node_id, &params, &[vulnerable]);
        }
        state
    }

    /// Re-draw every defendable node's values, picking
    /// `num_vulnerabilities_per_node` distinct vulnerable types at random.
    pub fn randomize<R: Rng + ?Sized>(
        &mut self,
        network: &NetworkConfig,
        params: &InitialStateParams,
        rng: &mut R,
    ) {
        let num_attack_types = self.num_attack_types();
        let amount = params.num_vulnerabilities_per_node.min(num_attack_types);
        for (node_id, node_type) in network.node_types().into_iter().enumerate() {
            if !node_type.is_defendable() {
                self.attack_values[node_id].fill(0);
                self.defense_values[node_id].fill(0);
                self.defense_det[node_id] = 0;
                continue;
            }
            let vulnerable = sample(rng, num_attack_types, amount).into_vec();
            self.fill_node(node_id, params, &vulnerable);
        }
    }

    fn fill_node(&mut self, node_id: usize, params: &InitialStateParams, vulnerable: &[usize]) {
        for (attack_type, value) in self.defense_values[node_id].iter_mut().enumerate() {
            *value = if vulnerable.contains(&attack_type) {
                params.vulnerability_val
            } else {
                params.defense_val
            };
        }
        self.attack_values[node_id].fill(params.attack_val);
        self.defense_det[node_id] = params.det_val;
    }

    /// Restore the per-episode part of the state from `initial`. Lifetime
    /// counters and cumulative rewards are kept.
    pub fn reset(&mut self, initial: &GameState, start_node_id: usize) {
        self.attack_values.clone_from(&initial.attack_values);
        self.defense_values.clone_from(&initial.defense_values);
        self.defense_det.clone_from(&initial.defense_det);
        self.attacker_pos = initial.attacker_pos;
        self.game_step = 0;
        self.done = false;
        self.hacked = false;
        self.detected = false;
        self.history.clear();
        self.history.push_back(start_node_id);
    }

    pub fn num_attack_types(&self) -> usize {
        self.attack_values.first().map_or(0, |v| v.len())
    }

    /// Record a new attacker position, keeping only the last [`HISTORY_LEN`].
    pub fn record_position(&mut self, node_id: usize) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(node_id);
    }

    /// Last attacker node ids, oldest first
    pub fn history(&self) -> &VecDeque<usize> {
        &self.history
    }

    /// Attacker view: per node the attack values plus a flag on the attacker's node.
    pub fn attacker_observation(&self, network: &NetworkConfig, max_value: u32) -> Vec<f32> {
        let attacker_node = network.get_node_id(self.attacker_pos).ok().flatten();
        let scale = max_value.max(1) as f32;
        let mut obs = Vec::with_capacity(self.attack_values.len() * (self.num_attack_types() + 1));
        for (node_id, values) in self.attack_values.iter().enumerate() {
            obs.extend(values.iter().map(|&v| v as f32 / scale));
            obs.push(if attacker_node == Some(node_id) { 1.0 } else { 0.0 });
        }
        obs
    }

    /// Defender view: per node the defense values plus the detection value.
    pub fn defender_observation(&self, max_value: u32) -> Vec<f32> {
        let scale = max_value.max(1) as f32;
        let mut obs = Vec::with_capacity(self.defense_values.len() * (self.num_attack_types() + 1));
        for (values, &det) in self.defense_values.iter().zip(&self.defense_det) {
            obs.extend(values.iter().map(|&v| v as f32 / scale));
            obs.push(det as f32 / scale);
        }
        obs
    }

    /// Whether the attacker currently stands on DATA
    pub fn attacker_on_data(&self, network: &NetworkConfig) -> bool {
        network.node_type_at(self.attacker_pos).ok() == Some(NodeType::Data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn network() -> NetworkConfig {
        NetworkConfig::new(3, 2).unwrap()
    }

    #[test]
    fn test_default_state_values() {
        let net = network();
        let state = GameState::default_state(&net, 10);
        assert_eq!(state.attacker_pos, net.start_pos());
        // DATA is node 0, vulnerable type 0
        assert_eq!(state.defense_values[0][0], 0);
        assert_eq!(state.defense_values[0][1], 2);
        // server node 2, vulnerable type 2
        assert_eq!(state.defense_values[2][2], 0);
        assert_eq!(state.defense_det[2], 2);
        // START is never defended
        assert!(state.defense_values[3].iter().all(|&v| v == 0));
        assert_eq!(state.defense_det[3], 0);
    }

    #[test]
    fn test_history_keeps_last_four() {
        let net = network();
        let mut state = GameState::default_state(&net, 2);
        assert_eq!(state.history().len(), 1);
        for id in [1, 0, 2, 1, 0] {
            state.record_position(id);
        }
        let history: Vec<usize> = state.history().iter().copied().collect();
        assert_eq!(history, vec![0, 2, 1, 0]);
    }

    #[test]
    fn test_reset_keeps_lifetime_counters() {
        let net = network();
        let initial = GameState::default_state(&net, 3);
        let mut state = initial.clone();
        state.num_games = 5;
        state.num_hacks = 2;
        state.game_step = 7;
        state.done = true;
        state.hacked = true;
        state.attack_values[1][0] = 4;
        state.attacker_pos = Position::new(1, 0);
        state.record_position(1);

        state.reset(&initial, net.start_node_id());

        assert_eq!(state.num_games, 5);
        assert_eq!(state.num_hacks, 2);
        assert_eq!(state.game_step, 0);
        assert!(!state.done && !state.hacked);
        assert_eq!(state.attack_values[1][0], 0);
        assert_eq!(state.attacker_pos, net.start_pos());
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_observation_sizes_and_flag() {
        let net = network();
        let state = GameState::default_state(&net, 3);
        let attacker = state.attacker_observation(&net, 9);
        let defender = state.defender_observation(9);
        assert_eq!(attacker.len(), 4 * 4);
        assert_eq!(defender.len(), 4 * 4);
        // attacker starts on START, node 3
        assert_eq!(attacker[3 * 4 + 3], 1.0);
        assert_eq!(attacker.iter().filter(|&&v| v == 1.0).count(), 1);
        // detection value 2 on DATA, normalised by 9
        assert!((defender[3] - 2.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_randomize_vulnerabilities() {
        let net = NetworkConfig::new(4, 3).unwrap();
        let mut state = GameState::empty(&net, 5);
        let params = InitialStateParams {
            defense_val: 4,
            num_vulnerabilities_per_node: 2,
            vulnerability_val: 1,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        state.randomize(&net, &params, &mut rng);

        for (node_id, node_type) in net.node_types().into_iter().enumerate() {
            let values = &state.defense_values[node_id];
            if node_type.is_defendable() {
                assert_eq!(values.iter().filter(|&&v| v == 1).count(), 2);
                assert_eq!(values.iter().filter(|&&v| v == 4).count(), 3);
                assert_eq!(state.defense_det[node_id], 2);
            } else {
                assert!(values.iter().all(|&v| v == 0));
            }
        }
    }
}
