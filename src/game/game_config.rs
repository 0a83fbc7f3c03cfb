use rand::Rng;

use super::{GameState, InitialStateParams, NetworkConfig, Side};
use crate::error::GameError;

/// Static description of a game: topology, attack types and the initial state.
///
/// All sizes are derived from the topology and `num_attack_types` at
/// construction. Only [`GameConfig::set_initial_state`] changes the config afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    num_layers: usize,
    num_servers_per_layer: usize,
    num_attack_types: usize,
    max_value: u32,
    network: NetworkConfig,
    initial_state: GameState,
}

impl GameConfig {
    pub fn new(
        num_layers: usize,
        num_servers_per_layer: usize,
        num_attack_types: usize,
        max_value: u32,
    ) -> Result<Self, GameError> {
        if num_layers < 1 {
            return Err(GameError::InvalidConfiguration(
                "the number of layers cannot be less than 1".into(),
            ));
        }
        let network = NetworkConfig::new(num_layers + 2, num_servers_per_layer)?;
        Self::with_network(network, num_attack_types, max_value)
    }

    /// Build a configuration around a custom topology.
    pub fn with_network(
        network: NetworkConfig,
        num_attack_types: usize,
        max_value: u32,
    ) -> Result<Self, GameError> {
        if num_attack_types < 1 {
            return Err(GameError::InvalidConfiguration(
                "the number of attack types cannot be less than 1".into(),
            ));
        }
        if max_value < 3 {
            return Err(GameError::InvalidConfiguration(
                "the max attack/defense value cannot be less than 3".into(),
            ));
        }
        let initial_state = GameState::default_state(&network, num_attack_types);
        Ok(GameConfig {
            num_layers: network.num_rows().saturating_sub(2),
            num_servers_per_layer: network.num_cols(),
            num_attack_types,
            max_value,
            network,
            initial_state,
        })
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn num_servers_per_layer(&self) -> usize {
        self.num_servers_per_layer
    }

    pub fn num_attack_types(&self) -> usize {
        self.num_attack_types
    }

    pub fn max_value(&self) -> u32 {
        self.max_value
    }

    pub fn num_rows(&self) -> usize {
        self.network.num_rows()
    }

    pub fn num_cols(&self) -> usize {
        self.network.num_cols()
    }

    pub fn num_nodes(&self) -> usize {
        self.network.num_nodes()
    }

    pub fn num_attack_actions(&self) -> usize {
        self.num_attack_types * self.num_nodes()
    }

    /// The defender has one extra type per node that raises detection.
    pub fn num_defense_actions(&self) -> usize {
        (self.num_attack_types + 1) * self.num_nodes()
    }

    /// Number of action types per node for a side.
    pub fn num_types(&self, side: Side) -> usize {
        match side {
            Side::Attacker => self.num_attack_types,
            Side::Defender => self.num_attack_types + 1,
        }
    }

    pub fn num_actions(&self, side: Side) -> usize {
        match side {
            Side::Attacker => self.num_attack_actions(),
            Side::Defender => self.num_defense_actions(),
        }
    }

    /// Flat observation length; the same for both sides.
    pub fn observation_size(&self, _side: Side) -> usize {
        self.num_nodes() * (self.num_attack_types + 1)
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn initial_state(&self) -> &GameState {
        &self.initial_state
    }

    /// Replace the initial state with randomly drawn vulnerabilities.
    pub fn set_initial_state<R: Rng + ?Sized>(&mut self, params: &InitialStateParams, rng: &mut R) {
        self.initial_state.randomize(&self.network, params, rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_derived_sizes() {
        let config = GameConfig::new(1, 2, 10, 9).unwrap();
        assert_eq!(config.num_rows(), 3);
        assert_eq!(config.num_cols(), 2);
        assert_eq!(config.num_nodes(), 4);
        assert_eq!(config.num_attack_actions(), 40);
        assert_eq!(config.num_defense_actions(), 44);
        assert_eq!(config.observation_size(Side::Attacker), 44);
        assert_eq!(config.observation_size(Side::Defender), 44);
    }

    #[test]
    fn test_node_count_formula() {
        for (layers, servers) in [(1, 1), (2, 3), (4, 5)] {
            let config = GameConfig::new(layers, servers, 3, 5).unwrap();
            assert_eq!(config.num_nodes(), layers * servers + 2);
        }
    }

    #[test]
    fn test_types_per_side() {
        let config = GameConfig::new(2, 3, 4, 9).unwrap();
        assert_eq!(config.num_types(Side::Attacker), 4);
        assert_eq!(config.num_types(Side::Defender), 5);
        assert_eq!(config.num_actions(Side::Defender), 5 * 8);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(GameConfig::new(0, 2, 10, 9).is_err());
        assert!(GameConfig::new(1, 2, 0, 9).is_err());
        assert!(GameConfig::new(1, 2, 10, 2).is_err());
        assert!(GameConfig::new(1, 0, 10, 9).is_err());
    }

    #[test]
    fn test_set_initial_state_keeps_sizes() {
        let mut config = GameConfig::new(2, 2, 4, 9).unwrap();
        let before = config.num_attack_actions();
        let mut rng = StdRng::seed_from_u64(3);
        config.set_initial_state(
            &InitialStateParams {
                defense_val: 5,
                ..Default::default()
            },
            &mut rng,
        );
        assert_eq!(config.num_attack_actions(), before);
        let data = config.network().data_node_id();
        let defense = &config.initial_state().defense_values[data];
        assert_eq!(defense.iter().filter(|&&v| v == 5).count(), 3);
    }
}
