//! Training infrastructure: rollout collection, opponent pools, schedules,
//! metrics and the two-player trainer.

mod core;
pub mod metrics;
pub mod opponent_pool;
pub mod rollout;
pub mod rollout_buffer;
pub mod schedule;
pub mod scheduler;
pub mod trainer;

pub use self::core::{Phase, TrainerCore, UpdateMetrics, UpdateParams, UpdateStrategy};
pub use metrics::{EpisodeResult, MetricsRecord, RecordContext, TrainingMetrics};
pub use opponent_pool::{softmax, OpponentEntry, OpponentHandle, OpponentPool, OpponentPoolConfig};
pub use rollout::{
    CollectOutcome, NoCallback, RolloutCollector, SideContext, StepCallback, StepProgress,
};
pub use rollout_buffer::{normalize, RolloutBuffer};
pub use schedule::{progress_remaining, Schedule, ScheduleKind};
pub use scheduler::AlternatingScheduler;
pub use trainer::{LearnOutcome, PpoTrainer, SideState, Trainer, TrainerConfig};
