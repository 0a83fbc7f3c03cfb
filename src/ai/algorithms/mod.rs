mod ppo;

pub use ppo::{FrozenPolicy, InferBackend, PpoConfig, PpoPolicy, PpoUpdate, TrainBackend};
