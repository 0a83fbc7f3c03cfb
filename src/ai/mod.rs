mod agent;
pub mod algorithms;
mod bots;
pub mod networks;

pub use agent::{BotKind, Learner, Observation, Policy, PolicyStep, ScriptedBot};
pub use algorithms::{FrozenPolicy, PpoConfig, PpoPolicy, PpoUpdate};
pub use bots::{
    build_bot, AttackMaximalValueBot, DefendMinimalValueBot, RandomAttackBot, RandomDefenseBot,
};
pub use networks::{ActorCritic, ActorCriticConfig};
