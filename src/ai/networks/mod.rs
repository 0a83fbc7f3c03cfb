mod actor_critic;

pub use actor_critic::{ActorCritic, ActorCriticConfig};
