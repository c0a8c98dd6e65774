//! Background TTL reaper.
//!
//! The reaper runs [`MemoryManager::cleanup_expired`] on a fixed interval.
//! Each sweep runs on the blocking pool so storage I/O never stalls async
//! workers, and every deletion inside a sweep is a single conditional delete,
//! so foreground reads and upserts are never held up by more than one record.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::manager::MemoryManager;

/// Handle to a running reaper. Dropping it stops the reaper at its next
/// wakeup; [`ReaperHandle::shutdown`] also waits for it to finish.
pub struct ReaperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop after the sweep in progress (if any) and wait for the task.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "reaper task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start sweeping every `every`. The first sweep runs immediately.
/// Must be called from within a tokio runtime.
pub fn spawn_reaper(manager: Arc<MemoryManager>, every: Duration) -> ReaperHandle {
    let (stop, mut stopped) = oneshot::channel();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = every.as_secs_f64(), "reaper started");

        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => sweep(&manager).await,
            }
        }

        tracing::info!("reaper stopped");
    });

    ReaperHandle {
        stop: Some(stop),
        task,
    }
}

async fn sweep(manager: &Arc<MemoryManager>) {
    let manager = Arc::clone(manager);
    match tokio::task::spawn_blocking(move || manager.cleanup_expired()).await {
        Ok(Ok(purged)) => tracing::debug!(purged, "reaper sweep complete"),
        Ok(Err(e)) => tracing::warn!(error = %e, "reaper sweep failed"),
        Err(e) => tracing::error!(error = %e, "reaper sweep panicked"),
    }
}
