//! CLI maintenance commands — `cleanup` and the long-running `reaper`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use recollect::config::RecollectConfig;
use recollect::memory::maintenance::spawn_reaper;

/// Purge expired cross-session memories once, or list them with `dry_run`.
pub fn cleanup(config: &RecollectConfig, dry_run: bool) -> Result<()> {
    let manager = super::open_manager(config)?;

    if !dry_run {
        let purged = manager.cleanup_expired()?;
        println!("Deleted {purged} expired memories.");
        return Ok(());
    }

    let candidates = manager.expired_candidates()?;
    if candidates.is_empty() {
        println!("No expired memories found.");
        return Ok(());
    }

    println!(
        "Found {} expired memory(s) (dry run — nothing deleted):\n",
        candidates.len()
    );
    println!(
        "{:<38} {:<16} {:<18} {:<10} {}",
        "ID", "User", "Type", "Importance", "Expired at"
    );
    println!("{}", "-".repeat(110));
    for c in &candidates {
        let expired_at = c.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        println!(
            "{:<38} {:<16} {:<18} {:<10.2} {}",
            c.id, c.user_id, c.memory_type, c.importance_score, expired_at
        );
    }

    Ok(())
}

/// Run the periodic reaper until Ctrl-C.
pub async fn reaper(config: &RecollectConfig) -> Result<()> {
    if !config.maintenance.enabled {
        println!("Maintenance is disabled in the configuration; not starting the reaper.");
        return Ok(());
    }

    let manager = Arc::new(super::open_manager(config)?);
    let every = Duration::from_secs(config.maintenance.reap_interval_secs.max(1));
    let handle = spawn_reaper(manager, every);

    println!(
        "Reaper running every {}s on {} (Ctrl-C to stop)",
        every.as_secs(),
        config.resolved_db_path().display()
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    handle.shutdown().await;
    Ok(())
}
