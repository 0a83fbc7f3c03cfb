mod manager;
mod metadata;
mod pool;

pub use manager::{CheckpointData, CheckpointManager, CheckpointManagerConfig};
pub use metadata::{
    CheckpointMetadata, PoolEntryRecord, PoolEntrySource, PoolManifest, SpaceShape,
    TrainingState, CHECKPOINT_VERSION, POOL_MANIFEST_VERSION,
};
pub use pool::{load_pool, save_pool};
