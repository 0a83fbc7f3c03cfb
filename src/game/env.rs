use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::action::{
    interpret_action, is_attack_legal, legal_attack_actions, legal_defense_actions,
};
use super::{GameConfig, GameState, InitialStateParams, NodeType, Side};
use crate::error::GameError;

/// What a policy sees: normalised features plus the legal-action mask of its side.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub features: Vec<f32>,
    pub legal_actions: Vec<bool>,
}

impl Observation {
    pub fn new(features: Vec<f32>, legal_actions: Vec<bool>) -> Self {
        Observation {
            features,
            legal_actions,
        }
    }

    /// Indices of the legal actions. Falls back to every action when the mask is empty.
    pub fn legal_indices(&self) -> Vec<usize> {
        let legal: Vec<usize> = self
            .legal_actions
            .iter()
            .enumerate()
            .filter(|(_, &ok)| ok)
            .map(|(i, _)| i)
            .collect();
        if legal.is_empty() {
            (0..self.legal_actions.len()).collect()
        } else {
            legal
        }
    }
}

/// Simultaneous move of both players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointAction {
    pub attacker: usize,
    pub defender: usize,
}

/// Summary attached to the last step of an episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeInfo {
    pub attacker_reward: f64,
    pub defender_reward: f64,
    pub length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepInfo {
    pub episode: Option<EpisodeInfo>,
    /// Whether the attacker reached DATA on this step
    pub is_success: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub attacker_obs: Observation,
    pub defender_obs: Observation,
    pub attacker_reward: f32,
    pub defender_reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

impl StepResult {
    pub fn observation(&self, side: Side) -> &Observation {
        match side {
            Side::Attacker => &self.attacker_obs,
            Side::Defender => &self.defender_obs,
        }
    }

    pub fn reward(&self, side: Side) -> f32 {
        match side {
            Side::Attacker => self.attacker_reward,
            Side::Defender => self.defender_reward,
        }
    }
}

/// Two-player simultaneous-move environment driven by the trainer.
pub trait Environment {
    /// Start a new episode and return `(attacker_obs, defender_obs)`.
    fn reset(&mut self) -> (Observation, Observation);

    fn step(&mut self, action: JointAction, update_stats: bool) -> Result<StepResult, GameError>;

    fn state(&self) -> &GameState;

    fn game_config(&self) -> &GameConfig;

    fn observation_size(&self, side: Side) -> usize {
        self.game_config().observation_size(side)
    }

    fn num_actions(&self, side: Side) -> usize {
        self.game_config().num_actions(side)
    }

    /// Number of parallel environments behind this handle
    fn num_envs(&self) -> usize {
        1
    }
}

/// Game parameters and reward constants of [`IdsGameEnv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdsGameEnvConfig {
    pub num_layers: usize,
    pub num_servers_per_layer: usize,
    pub num_attack_types: usize,
    pub max_value: u32,
    /// Episodes end without reward after this many steps
    pub max_steps: usize,
    pub illegal_move_penalty: f32,
    pub hack_reward: f32,
    pub detection_reward: f32,
    pub dense_rewards: bool,
    /// Attacker bonus for moving one row closer to DATA
    pub dense_reward: f32,
    /// When set, the initial state is drawn at random once at construction
    pub initial_state: Option<InitialStateParams>,
    pub seed: Option<u64>,
}

impl Default for IdsGameEnvConfig {
    fn default() -> Self {
        IdsGameEnvConfig {
            num_layers: 1,
            num_servers_per_layer: 2,
            num_attack_types: 10,
            max_value: 9,
            max_steps: 500,
            illegal_move_penalty: -1.0,
            hack_reward: 1.0,
            detection_reward: 1.0,
            dense_rewards: false,
            dense_reward: 0.1,
            initial_state: None,
            seed: None,
        }
    }
}

/// The intrusion detection game: the attacker climbs from START toward DATA
/// while the defender hardens nodes and raises detection.
#[derive(Debug, Clone)]
pub struct IdsGameEnv {
    config: IdsGameEnvConfig,
    game: GameConfig,
    state: GameState,
    episode_attacker_reward: f64,
    episode_defender_reward: f64,
    rng: StdRng,
}

impl IdsGameEnv {
    pub fn new(config: IdsGameEnvConfig) -> Result<Self, GameError> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut game = GameConfig::new(
            config.num_layers,
            config.num_servers_per_layer,
            config.num_attack_types,
            config.max_value,
        )?;
        if let Some(params) = &config.initial_state {
            game.set_initial_state(params, &mut rng);
        }
        Ok(Self::from_parts(config, game, rng))
    }

    /// Wrap an already built game, e.g. one with a custom topology.
    pub fn with_game_config(config: IdsGameEnvConfig, game: GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::from_parts(config, game, rng)
    }

    fn from_parts(config: IdsGameEnvConfig, game: GameConfig, rng: StdRng) -> Self {
        let state = game.initial_state().clone();
        IdsGameEnv {
            config,
            game,
            state,
            episode_attacker_reward: 0.0,
            episode_defender_reward: 0.0,
            rng,
        }
    }

    pub fn config(&self) -> &IdsGameEnvConfig {
        &self.config
    }

    /// Re-seed the detection draws
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn observations(&self) -> (Observation, Observation) {
        let max_value = self.game.max_value();
        let attacker = Observation::new(
            self.state
                .attacker_observation(self.game.network(), max_value),
            legal_attack_actions(&self.state, &self.game),
        );
        let defender = Observation::new(
            self.state.defender_observation(max_value),
            legal_defense_actions(&self.game),
        );
        (attacker, defender)
    }

    fn apply_defense(&mut self, node_id: usize, defense_type: usize) {
        let max_value = self.game.max_value();
        let value = if defense_type == self.game.num_attack_types() {
            &mut self.state.defense_det[node_id]
        } else {
            &mut self.state.defense_values[node_id][defense_type]
        };
        *value = (*value + 1).min(max_value);
    }

    /// Resolve a legal attack. Returns `(attacker_reward, defender_reward)`.
    fn apply_attack(&mut self, node_id: usize, attack_type: usize) -> Result<(f32, f32), GameError> {
        let max_value = self.game.max_value();
        let attack = &mut self.state.attack_values[node_id][attack_type];
        *attack = (*attack + 1).min(max_value);
        let attack = *attack;

        if attack > self.state.defense_values[node_id][attack_type] {
            let previous_row = self.state.attacker_pos.row;
            let target = self.game.network().get_node_pos(node_id)?;
            self.state.attacker_pos = target;
            self.state.record_position(node_id);

            let mut attacker_reward = 0.0;
            if self.config.dense_rewards && target.row < previous_row {
                attacker_reward += self.config.dense_reward;
            }
            if self.game.network().node_type(node_id)? == NodeType::Data {
                self.state.hacked = true;
                self.state.done = true;
                debug!(step = self.state.game_step, "attacker reached DATA");
                return Ok((
                    attacker_reward + self.config.hack_reward,
                    -self.config.hack_reward,
                ));
            }
            return Ok((attacker_reward, 0.0));
        }

        let detection = self.state.defense_det[node_id] as f64 / (max_value as f64 + 1.0);
        if self.rng.random::<f64>() < detection {
            self.state.detected = true;
            self.state.done = true;
            debug!(step = self.state.game_step, node_id, "attack detected");
            return Ok((-self.config.detection_reward, self.config.detection_reward));
        }
        Ok((0.0, 0.0))
    }
}

impl Environment for IdsGameEnv {
    fn reset(&mut self) -> (Observation, Observation) {
        let start = self.game.network().start_node_id();
        self.state.reset(self.game.initial_state(), start);
        self.episode_attacker_reward = 0.0;
        self.episode_defender_reward = 0.0;
        self.observations()
    }

    fn step(&mut self, action: JointAction, update_stats: bool) -> Result<StepResult, GameError> {
        if self.state.done {
            return Err(GameError::EpisodeOver);
        }
        let attack = interpret_action(action.attacker, Side::Attacker, &self.game)?;
        let defense = interpret_action(action.defender, Side::Defender, &self.game)?;

        self.state.game_step += 1;
        let mut attacker_reward = 0.0f32;
        let mut defender_reward = 0.0f32;

        if self.game.network().node_type(defense.node_id)?.is_defendable() {
            self.apply_defense(defense.node_id, defense.action_type);
        } else {
            defender_reward += self.config.illegal_move_penalty;
        }

        if is_attack_legal(
            attack.position,
            self.state.attacker_pos,
            self.game.network(),
            self.state.history(),
        ) {
            let (a, d) = self.apply_attack(attack.node_id, attack.action_type)?;
            attacker_reward += a;
            defender_reward += d;
        } else {
            attacker_reward += self.config.illegal_move_penalty;
        }

        if !self.state.done && self.state.game_step >= self.config.max_steps {
            self.state.done = true;
        }

        self.state.attacker_cumulative_reward += attacker_reward as f64;
        self.state.defender_cumulative_reward += defender_reward as f64;
        self.episode_attacker_reward += attacker_reward as f64;
        self.episode_defender_reward += defender_reward as f64;

        let mut info = StepInfo {
            episode: None,
            is_success: self.state.hacked,
        };
        if self.state.done {
            if update_stats {
                self.state.num_games += 1;
                if self.state.hacked {
                    self.state.num_hacks += 1;
                }
            }
            info.episode = Some(EpisodeInfo {
                attacker_reward: self.episode_attacker_reward,
                defender_reward: self.episode_defender_reward,
                length: self.state.game_step,
            });
        }

        let (attacker_obs, defender_obs) = self.observations();
        Ok(StepResult {
            attacker_obs,
            defender_obs,
            attacker_reward,
            defender_reward,
            done: self.state.done,
            info,
        })
    }

    fn state(&self) -> &GameState {
        &self.state
    }

    fn game_config(&self) -> &GameConfig {
        &self.game
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::encode_action;

    fn env(num_attack_types: usize, max_steps: usize) -> IdsGameEnv {
        IdsGameEnv::new(IdsGameEnvConfig {
            num_layers: 1,
            num_servers_per_layer: 2,
            num_attack_types,
            max_value: 3,
            max_steps,
            seed: Some(42),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_reset_observations() {
        let mut env = env(10, 100);
        let (attacker, defender) = env.reset();
        assert_eq!(attacker.features.len(), env.observation_size(Side::Attacker));
        assert_eq!(defender.features.len(), env.observation_size(Side::Defender));
        assert_eq!(attacker.legal_actions.len(), 40);
        assert_eq!(defender.legal_actions.len(), 44);
    }

    #[test]
    fn test_hack_ends_episode_with_rewards() {
        // single attack type: every node is vulnerable with defense 0
        let mut env = env(1, 100);
        env.reset();
        let config = env.game_config().clone();
        let defend_other = encode_action(2, 0, Side::Defender, &config).unwrap();

        let first = env
            .step(
                JointAction {
                    attacker: encode_action(1, 0, Side::Attacker, &config).unwrap(),
                    defender: defend_other,
                },
                true,
            )
            .unwrap();
        assert!(!first.done);
        assert_eq!(env.state().attacker_pos, config.network().get_node_pos(1).unwrap());

        let second = env
            .step(
                JointAction {
                    attacker: encode_action(0, 0, Side::Attacker, &config).unwrap(),
                    defender: defend_other,
                },
                true,
            )
            .unwrap();
        assert!(second.done);
        assert!(second.info.is_success);
        assert_eq!(second.attacker_reward, 1.0);
        assert_eq!(second.defender_reward, -1.0);
        let episode = second.info.episode.unwrap();
        assert_eq!(episode.length, 2);
        assert_eq!(env.state().num_games, 1);
        assert_eq!(env.state().num_hacks, 1);
    }

    #[test]
    fn test_illegal_attack_penalised_without_moving() {
        let mut env = env(10, 100);
        env.reset();
        let config = env.game_config().clone();
        // DATA is not adjacent to START
        let result = env
            .step(
                JointAction {
                    attacker: encode_action(0, 0, Side::Attacker, &config).unwrap(),
                    defender: encode_action(1, 0, Side::Defender, &config).unwrap(),
                },
                true,
            )
            .unwrap();
        assert_eq!(result.attacker_reward, -1.0);
        assert_eq!(result.defender_reward, 0.0);
        assert_eq!(env.state().attacker_pos, config.network().start_pos());
        assert_eq!(env.state().attack_values[0][0], 0);
    }

    #[test]
    fn test_illegal_defense_penalised() {
        let mut env = env(10, 100);
        env.reset();
        let config = env.game_config().clone();
        let before = env.state().defense_values.clone();
        // defending START
        let result = env
            .step(
                JointAction {
                    attacker: encode_action(0, 0, Side::Attacker, &config).unwrap(),
                    defender: encode_action(3, 0, Side::Defender, &config).unwrap(),
                },
                true,
            )
            .unwrap();
        assert_eq!(result.defender_reward, -1.0);
        assert_eq!(env.state().defense_values, before);
    }

    #[test]
    fn test_defense_caps_at_max_value() {
        let mut env = env(2, 100);
        env.reset();
        let config = env.game_config().clone();
        let raise_det = encode_action(1, 2, Side::Defender, &config).unwrap();
        let illegal_attack = encode_action(0, 0, Side::Attacker, &config).unwrap();
        for _ in 0..5 {
            env.step(
                JointAction {
                    attacker: illegal_attack,
                    defender: raise_det,
                },
                true,
            )
            .unwrap();
        }
        assert_eq!(env.state().defense_det[1], 3);
    }

    #[test]
    fn test_max_steps_ends_episode() {
        let mut env = env(10, 2);
        env.reset();
        let config = env.game_config().clone();
        let action = JointAction {
            attacker: encode_action(0, 0, Side::Attacker, &config).unwrap(),
            defender: encode_action(1, 0, Side::Defender, &config).unwrap(),
        };
        assert!(!env.step(action, true).unwrap().done);
        let last = env.step(action, true).unwrap();
        assert!(last.done);
        assert!(!last.info.is_success);
        assert_eq!(last.info.episode.unwrap().length, 2);
        assert_eq!(env.state().num_hacks, 0);
        assert_eq!(env.step(action, true), Err(GameError::EpisodeOver));
    }

    #[test]
    fn test_failed_attacks_get_detected() {
        let mut env = env(2, 1000);
        env.reset();
        let config = env.game_config().clone();
        // node 1 is vulnerable to type 1, so type 0 faces defense 2; keep it at the cap
        let action = JointAction {
            attacker: encode_action(1, 0, Side::Attacker, &config).unwrap(),
            defender: encode_action(1, 0, Side::Defender, &config).unwrap(),
        };
        let mut last = env.step(action, true).unwrap();
        while !last.done {
            last = env.step(action, true).unwrap();
        }
        assert!(env.state().detected);
        assert!(!env.state().hacked);
        assert_eq!(last.attacker_reward, -1.0);
        assert_eq!(last.defender_reward, 1.0);
        assert_eq!(env.state().attacker_pos, config.network().start_pos());
    }

    #[test]
    fn test_invalid_action_id() {
        let mut env = env(10, 100);
        env.reset();
        let err = env
            .step(
                JointAction {
                    attacker: 40,
                    defender: 0,
                },
                true,
            )
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidAction { side: Side::Attacker, .. }));
    }

    #[test]
    fn test_update_stats_flag() {
        let mut env = env(10, 1);
        env.reset();
        let action = JointAction {
            attacker: 0,
            defender: 10,
        };
        let result = env.step(action, false).unwrap();
        assert!(result.done);
        assert!(result.info.episode.is_some());
        assert_eq!(env.state().num_games, 0);
    }

    #[test]
    fn test_reset_after_episode() {
        let mut env = env(10, 1);
        env.reset();
        env.step(
            JointAction {
                attacker: 0,
                defender: 10,
            },
            true,
        )
        .unwrap();
        env.reset();
        assert!(!env.state().done);
        assert_eq!(env.state().game_step, 0);
        assert_eq!(env.state().num_games, 1);
    }
}
