use std::collections::VecDeque;

use super::{GameConfig, GameState, NetworkConfig, NodeType, Position, Side, HISTORY_LEN};
use crate::error::GameError;

/// An action id decoded into its target node and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpretedAction {
    pub node_id: usize,
    pub position: Position,
    /// Attack type, or for the defender a defense type where the last type
    /// (`num_attack_types`) raises the detection value
    pub action_type: usize,
}

/// Decode `action_id` into `(node_id, position, type)` for `side`.
pub fn interpret_action(
    action_id: usize,
    side: Side,
    config: &GameConfig,
) -> Result<InterpretedAction, GameError> {
    let num_actions = config.num_actions(side);
    if action_id >= num_actions {
        return Err(GameError::InvalidAction {
            side,
            action: action_id,
            num_actions,
        });
    }
    let num_types = config.num_types(side);
    let node_id = action_id / num_types;
    Ok(InterpretedAction {
        node_id,
        position: config.network().get_node_pos(node_id)?,
        action_type: action_id % num_types,
    })
}

/// Inverse of [`interpret_action`].
pub fn encode_action(
    node_id: usize,
    action_type: usize,
    side: Side,
    config: &GameConfig,
) -> Result<usize, GameError> {
    let num_nodes = config.num_nodes();
    if node_id >= num_nodes {
        return Err(GameError::InvalidNodeId { node_id, num_nodes });
    }
    let num_types = config.num_types(side);
    let action = node_id * num_types + action_type;
    if action_type >= num_types {
        return Err(GameError::InvalidAction {
            side,
            action,
            num_actions: config.num_actions(side),
        });
    }
    Ok(action)
}

/// Whether the attacker at `attacker` may attack `target`.
///
/// `history` holds the attacker's last node ids, oldest first, with the
/// current node last.
pub fn is_attack_legal(
    target: Position,
    attacker: Position,
    network: &NetworkConfig,
    history: &VecDeque<usize>,
) -> bool {
    attack_violation(target, attacker, network, history).is_none()
}

fn attack_violation(
    target: Position,
    attacker: Position,
    network: &NetworkConfig,
    history: &VecDeque<usize>,
) -> Option<&'static str> {
    if target == attacker {
        return Some("target is the attacker's current node");
    }
    let target_id = match network.get_node_id(target) {
        Ok(Some(id)) => id,
        _ => return Some("target is not a node"),
    };
    if network.node_type(target_id) == Ok(NodeType::Start) {
        return Some("the START node cannot be attacked");
    }
    if is_cycle_retreat(target_id, target, attacker, history) {
        return Some("move would repeat a back-and-forth cycle");
    }
    if !network.is_adjacent(attacker, target).unwrap_or(false) {
        return Some("target is not adjacent to the attacker");
    }
    None
}

/// Period-2 oscillation ending in a retreat toward START: the last four
/// positions alternate between two nodes and the target returns to the lower one.
fn is_cycle_retreat(
    target_id: usize,
    target: Position,
    attacker: Position,
    history: &VecDeque<usize>,
) -> bool {
    let n = history.len();
    if n < HISTORY_LEN {
        return false;
    }
    let back = |k: usize| history[n - k];
    target_id == back(2)
        && target_id == back(4)
        && back(1) == back(3)
        && target_id != back(1)
        && target.row > attacker.row
}

pub fn is_attack_id_legal(
    action_id: usize,
    config: &GameConfig,
    state: &GameState,
) -> Result<bool, GameError> {
    let action = interpret_action(action_id, Side::Attacker, config)?;
    Ok(is_attack_legal(
        action.position,
        state.attacker_pos,
        config.network(),
        state.history(),
    ))
}

/// A defense is legal iff it targets a SERVER or DATA node.
pub fn is_defense_id_legal(action_id: usize, config: &GameConfig) -> Result<bool, GameError> {
    let action = interpret_action(action_id, Side::Defender, config)?;
    Ok(config.network().node_type(action.node_id)?.is_defendable())
}

/// Decode an attack, rejecting illegal moves with [`GameError::IllegalMove`].
pub fn check_attack(
    action_id: usize,
    config: &GameConfig,
    state: &GameState,
) -> Result<InterpretedAction, GameError> {
    let action = interpret_action(action_id, Side::Attacker, config)?;
    match attack_violation(
        action.position,
        state.attacker_pos,
        config.network(),
        state.history(),
    ) {
        Some(reason) => Err(GameError::IllegalMove {
            side: Side::Attacker,
            action: action_id,
            reason: reason.to_string(),
        }),
        None => Ok(action),
    }
}

/// Decode a defense, rejecting illegal moves with [`GameError::IllegalMove`].
pub fn check_defense(action_id: usize, config: &GameConfig) -> Result<InterpretedAction, GameError> {
    let action = interpret_action(action_id, Side::Defender, config)?;
    if !config.network().node_type(action.node_id)?.is_defendable() {
        return Err(GameError::IllegalMove {
            side: Side::Defender,
            action: action_id,
            reason: "only SERVER and DATA nodes can be defended".to_string(),
        });
    }
    Ok(action)
}

/// Legality mask over the attacker's action space for the current state.
pub fn legal_attack_actions(state: &GameState, config: &GameConfig) -> Vec<bool> {
    (0..config.num_attack_actions())
        .map(|id| is_attack_id_legal(id, config, state).unwrap_or(false))
        .collect()
}

/// Legality mask over the defender's action space. Independent of the state.
pub fn legal_defense_actions(config: &GameConfig) -> Vec<bool> {
    (0..config.num_defense_actions())
        .map(|id| is_defense_id_legal(id, config).unwrap_or(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GameConfig {
        GameConfig::new(1, 2, 10, 9).unwrap()
    }

    #[test]
    fn test_interpret_scenario() {
        let config = config();
        let action = interpret_action(23, Side::Attacker, &config).unwrap();
        assert_eq!(action.node_id, 2);
        assert_eq!(action.action_type, 3);
        assert_eq!(action.position, Position::new(1, 1));
        assert_eq!(encode_action(2, 3, Side::Attacker, &config).unwrap(), 23);
    }

    #[test]
    fn test_interpret_encode_roundtrip() {
        let config = GameConfig::new(2, 3, 4, 9).unwrap();
        for side in Side::BOTH {
            for node in 0..config.num_nodes() {
                for t in 0..config.num_types(side) {
                    let id = encode_action(node, t, side, &config).unwrap();
                    let action = interpret_action(id, side, &config).unwrap();
                    assert_eq!(action.node_id, node);
                    assert_eq!(action.action_type, t);
                    assert_eq!(action.position, config.network().get_node_pos(node).unwrap());
                }
            }
        }
    }

    #[test]
    fn test_defender_uses_extra_type() {
        let config = config();
        // 11 types per node for the defender
        let action = interpret_action(23, Side::Defender, &config).unwrap();
        assert_eq!(action.node_id, 2);
        assert_eq!(action.action_type, 1);
        let det = interpret_action(10, Side::Defender, &config).unwrap();
        assert_eq!(det.node_id, 0);
        assert_eq!(det.action_type, 10);
    }

    #[test]
    fn test_out_of_range_action() {
        let config = config();
        assert!(matches!(
            interpret_action(40, Side::Attacker, &config),
            Err(GameError::InvalidAction { .. })
        ));
        assert!(interpret_action(43, Side::Defender, &config).is_ok());
        assert!(encode_action(4, 0, Side::Attacker, &config).is_err());
        assert!(encode_action(0, 10, Side::Attacker, &config).is_err());
    }

    #[test]
    fn test_attack_own_position_is_illegal() {
        let config = GameConfig::new(2, 3, 2, 9).unwrap();
        let net = config.network();
        let history = VecDeque::new();
        for id in 0..net.num_nodes() {
            let pos = net.get_node_pos(id).unwrap();
            assert!(!is_attack_legal(pos, pos, net, &history));
        }
    }

    #[test]
    fn test_attack_start_is_illegal() {
        let config = GameConfig::new(2, 3, 2, 9).unwrap();
        let net = config.network();
        let history = VecDeque::new();
        // server directly above START is adjacent to it
        let above_start = Position::new(net.start_pos().row - 1, net.start_pos().col);
        assert!(net.is_adjacent(above_start, net.start_pos()).unwrap());
        assert!(!is_attack_legal(net.start_pos(), above_start, net, &history));
    }

    #[test]
    fn test_attack_requires_adjacency() {
        let config = GameConfig::new(2, 3, 2, 9).unwrap();
        let net = config.network();
        let history = VecDeque::new();
        let start = net.start_pos();
        assert!(is_attack_legal(Position::new(2, 0), start, net, &history));
        assert!(!is_attack_legal(Position::new(1, 0), start, net, &history));
        assert!(!is_attack_legal(net.data_pos(), start, net, &history));
        assert!(is_attack_legal(net.data_pos(), Position::new(1, 2), net, &history));
    }

    #[test]
    fn test_anti_cycle_rejects_retreat() {
        let config = GameConfig::new(2, 3, 2, 9).unwrap();
        let net = config.network();
        let upper = Position::new(1, 0);
        let lower = Position::new(2, 0);
        let upper_id = net.get_node_id(upper).unwrap().unwrap();
        let lower_id = net.get_node_id(lower).unwrap().unwrap();

        // lower, upper, lower, upper: now on upper, moving back down
        let history: VecDeque<usize> = [lower_id, upper_id, lower_id, upper_id].into();
        assert!(!is_attack_legal(lower, upper, net, &history));
        // moving up is never a retreat
        assert!(is_attack_legal(net.data_pos(), upper, net, &history));

        // fewer than four entries never triggers the rule
        let short: VecDeque<usize> = [upper_id, lower_id, upper_id].into();
        assert!(is_attack_legal(lower, upper, net, &short));
    }

    #[test]
    fn test_check_attack_reports_reason() {
        let config = config();
        let state = config.initial_state().clone();
        // node 3 is START, the attacker's own node
        let err = check_attack(30, &config, &state).unwrap_err();
        assert!(matches!(err, GameError::IllegalMove { side: Side::Attacker, action: 30, .. }));
        // node 1 is adjacent to START
        let ok = check_attack(12, &config, &state).unwrap();
        assert_eq!(ok.node_id, 1);
        assert_eq!(ok.action_type, 2);
    }

    #[test]
    fn test_defense_legality() {
        let config = config();
        // START node 3 covers defender ids 33..44
        assert!(!is_defense_id_legal(33, &config).unwrap());
        assert!(is_defense_id_legal(0, &config).unwrap());
        assert!(is_defense_id_legal(21, &config).unwrap());
        assert!(check_defense(40, &config).is_err());
        let mask = legal_defense_actions(&config);
        assert_eq!(mask.len(), 44);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 33);
    }

    #[test]
    fn test_attack_mask_from_start() {
        let config = config();
        let state = config.initial_state().clone();
        let mask = legal_attack_actions(&state, &config);
        assert_eq!(mask.len(), 40);
        // both servers of the single layer are reachable from START
        for id in 0..40 {
            let node = id / 10;
            assert_eq!(mask[id], node == 1 || node == 2, "action {id}");
        }
    }
}
