//! The intrusion detection game: network topology, game configuration,
//! action interpretation and the simultaneous-move environment.

pub mod action;
mod env;
mod game_config;
mod network;
mod node_type;
mod side;
mod state;

pub use action::{encode_action, interpret_action, InterpretedAction};
pub use env::{
    EpisodeInfo, Environment, IdsGameEnv, IdsGameEnvConfig, JointAction, Observation, StepInfo,
    StepResult,
};
pub use game_config::GameConfig;
pub use network::{NetworkConfig, Position};
pub use node_type::NodeType;
pub use side::Side;
pub use state::{GameState, InitialStateParams, HISTORY_LEN};
