pub mod doctor;
pub mod export;
pub mod inspect;
pub mod maintenance;
pub mod stats;

use anyhow::{Context, Result};

use recollect::config::RecollectConfig;
use recollect::MemoryManager;

/// Open the configured database, creating it on first use.
fn open_manager(config: &RecollectConfig) -> Result<MemoryManager> {
    let db_path = config.resolved_db_path();
    MemoryManager::open(config)
        .with_context(|| format!("failed to open database at {}", db_path.display()))
}
