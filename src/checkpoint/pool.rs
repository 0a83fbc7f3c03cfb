use std::fs;
use std::path::Path;

use crate::ai::{build_bot, Learner};
use crate::checkpoint::metadata::{
    PoolEntryRecord, PoolEntrySource, PoolManifest, POOL_MANIFEST_VERSION,
};
use crate::error::CheckpointError;
use crate::game::Side;
use crate::training::{OpponentHandle, OpponentPool, OpponentPoolConfig};

const MANIFEST_FILE: &str = "pool.json";

/// Write a pool into `dir`: `pool.json` plus one weights file per snapshot.
pub fn save_pool<L: Learner>(
    learner: &L,
    pool: &OpponentPool<L::Snapshot>,
    dir: &Path,
) -> Result<(), CheckpointError> {
    fs::create_dir_all(dir)?;
    let mut entries = Vec::with_capacity(pool.len());
    for (i, entry) in pool.entries().iter().enumerate() {
        let source = match &entry.handle {
            OpponentHandle::Policy(snapshot) => {
                let file = format!("entry_{i}");
                learner.save_snapshot(snapshot, &dir.join(&file))?;
                PoolEntrySource::Snapshot { file }
            }
            OpponentHandle::ScriptedBot(bot) => PoolEntrySource::Bot { bot: bot.kind() },
        };
        entries.push(PoolEntryRecord {
            source,
            quality: entry.quality,
        });
    }

    let manifest = PoolManifest {
        version: POOL_MANIFEST_VERSION,
        side: pool.side(),
        current: pool.current(),
        entries,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;
    Ok(())
}

/// Rebuild a pool from `dir` with entry order, quality scores and the current
/// opponent restored. Bots get fresh random state.
pub fn load_pool<L: Learner>(
    learner: &L,
    side: Side,
    config: OpponentPoolConfig,
    dir: &Path,
    seed: Option<u64>,
) -> Result<OpponentPool<L::Snapshot>, CheckpointError> {
    let path = dir.join(MANIFEST_FILE);
    let json = fs::read_to_string(&path).map_err(|e| CheckpointError::MetadataRead {
        path: path.clone(),
        source: e,
    })?;
    let manifest: PoolManifest =
        serde_json::from_str(&json).map_err(|e| CheckpointError::MetadataParse { path, source: e })?;
    if manifest.version != POOL_MANIFEST_VERSION {
        return Err(CheckpointError::UnsupportedVersion {
            found: manifest.version,
            expected: POOL_MANIFEST_VERSION,
        });
    }

    let mut pool = OpponentPool::new(side, config);
    for (i, record) in manifest.entries.into_iter().enumerate() {
        let handle = match record.source {
            PoolEntrySource::Snapshot { file } => {
                OpponentHandle::Policy(learner.load_snapshot(&dir.join(file))?)
            }
            PoolEntrySource::Bot { bot } => {
                OpponentHandle::ScriptedBot(build_bot(bot, seed.map(|s| s.wrapping_add(i as u64))))
            }
        };
        pool.restore_entry(handle, record.quality);
    }
    if let Some(current) = manifest.current {
        pool.set_current(current)
            .map_err(|e| CheckpointError::ModelLoad(e.to_string()))?;
    }
    Ok(pool)
}
