use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::agent::{BotKind, ScriptedBot};
use crate::game::action::{legal_attack_actions, legal_defense_actions};
use crate::game::{GameConfig, GameState, Side};

/// Build a boxed baseline bot.
pub fn build_bot(kind: BotKind, seed: Option<u64>) -> Box<dyn ScriptedBot> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    match kind {
        BotKind::AttackMaximalValue => Box::new(AttackMaximalValueBot),
        BotKind::RandomAttack => Box::new(RandomAttackBot { rng }),
        BotKind::DefendMinimalValue => Box::new(DefendMinimalValueBot),
        BotKind::RandomDefense => Box::new(RandomDefenseBot { rng }),
    }
}

fn legal_ids(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter(|(_, &ok)| ok)
        .map(|(id, _)| id)
        .collect()
}

/// Keeps hammering the reachable attack with the highest accumulated value,
/// preferring nodes closer to DATA on ties.
#[derive(Debug, Clone, Default)]
pub struct AttackMaximalValueBot;

impl ScriptedBot for AttackMaximalValueBot {
    fn action(&mut self, state: &GameState, config: &GameConfig) -> usize {
        let num_types = config.num_types(Side::Attacker);
        let network = config.network();
        legal_ids(&legal_attack_actions(state, config))
            .into_iter()
            .max_by_key(|&id| {
                let (node, attack_type) = (id / num_types, id % num_types);
                let row = network.get_node_pos(node).map_or(usize::MAX, |p| p.row);
                (state.attack_values[node][attack_type], std::cmp::Reverse(row), std::cmp::Reverse(id))
            })
            .unwrap_or(0)
    }

    fn name(&self) -> &str {
        "AttackMaximalValue"
    }

    fn kind(&self) -> BotKind {
        BotKind::AttackMaximalValue
    }
}

/// Uniformly random legal attack.
#[derive(Debug, Clone)]
pub struct RandomAttackBot {
    rng: StdRng,
}

impl ScriptedBot for RandomAttackBot {
    fn action(&mut self, state: &GameState, config: &GameConfig) -> usize {
        let legal = legal_ids(&legal_attack_actions(state, config));
        if legal.is_empty() {
            return self.rng.random_range(0..config.num_attack_actions());
        }
        legal[self.rng.random_range(0..legal.len())]
    }

    fn name(&self) -> &str {
        "RandomAttack"
    }

    fn kind(&self) -> BotKind {
        BotKind::RandomAttack
    }
}

/// Raises the weakest defense (or detection) value in the network.
#[derive(Debug, Clone, Default)]
pub struct DefendMinimalValueBot;

impl ScriptedBot for DefendMinimalValueBot {
    fn action(&mut self, state: &GameState, config: &GameConfig) -> usize {
        let num_types = config.num_types(Side::Defender);
        let num_attack_types = config.num_attack_types();
        legal_ids(&legal_defense_actions(config))
            .into_iter()
            .min_by_key(|&id| {
                let (node, defense_type) = (id / num_types, id % num_types);
                if defense_type == num_attack_types {
                    state.defense_det[node]
                } else {
                    state.defense_values[node][defense_type]
                }
            })
            .unwrap_or(0)
    }

    fn name(&self) -> &str {
        "DefendMinimalValue"
    }

    fn kind(&self) -> BotKind {
        BotKind::DefendMinimalValue
    }
}

/// Uniformly random legal defense.
#[derive(Debug, Clone)]
pub struct RandomDefenseBot {
    rng: StdRng,
}

impl ScriptedBot for RandomDefenseBot {
    fn action(&mut self, _state: &GameState, config: &GameConfig) -> usize {
        let legal = legal_ids(&legal_defense_actions(config));
        legal[self.rng.random_range(0..legal.len())]
    }

    fn name(&self) -> &str {
        "RandomDefense"
    }

    fn kind(&self) -> BotKind {
        BotKind::RandomDefense
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::action::{is_attack_id_legal, is_defense_id_legal};

    fn config() -> GameConfig {
        GameConfig::new(2, 3, 4, 9).unwrap()
    }

    #[test]
    fn test_bots_pick_legal_actions() {
        let config = config();
        let state = config.initial_state().clone();
        for kind in [
            BotKind::AttackMaximalValue,
            BotKind::RandomAttack,
            BotKind::DefendMinimalValue,
            BotKind::RandomDefense,
        ] {
            let mut bot = build_bot(kind, Some(1));
            assert_eq!(bot.kind(), kind);
            for _ in 0..50 {
                let action = bot.action(&state, &config);
                let legal = match kind.side() {
                    Side::Attacker => is_attack_id_legal(action, &config, &state).unwrap(),
                    Side::Defender => is_defense_id_legal(action, &config).unwrap(),
                };
                assert!(legal, "{} picked illegal action {action}", bot.name());
            }
        }
    }

    #[test]
    fn test_attack_maximal_value_prefers_accumulated_attack() {
        let config = config();
        let mut state = config.initial_state().clone();
        let target = config
            .network()
            .get_node_id(crate::game::Position::new(2, 2))
            .unwrap()
            .unwrap();
        state.attack_values[target][3] = 5;
        let mut bot = AttackMaximalValueBot;
        assert_eq!(bot.action(&state, &config), target * 4 + 3);
    }

    #[test]
    fn test_defend_minimal_value_targets_weakest() {
        let config = config();
        let mut state = config.initial_state().clone();
        for values in state.defense_values.iter_mut() {
            values.fill(5);
        }
        state.defense_det.fill(5);
        state.defense_det[4] = 1;
        let mut bot = DefendMinimalValueBot;
        // detection is the fifth defender type of node 4
        assert_eq!(bot.action(&state, &config), 4 * 5 + 4);
    }

    #[test]
    fn test_random_attack_explores() {
        let config = config();
        let state = config.initial_state().clone();
        let mut bot = build_bot(BotKind::RandomAttack, Some(9));
        let actions: std::collections::HashSet<usize> =
            (0..100).map(|_| bot.action(&state, &config)).collect();
        assert!(actions.len() > 1);
    }
}
