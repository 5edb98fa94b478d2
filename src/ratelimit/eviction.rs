//! Background sweep that bounds limiter memory.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// State that can drop entries which no longer affect any decision.
pub trait Evict: Send + Sync + 'static {
    /// Remove expired state. Returns the number of keys removed.
    fn evict_expired(&self) -> usize;
}

/// Owner of a running eviction task.
///
/// The task holds only a weak reference to its target and exits on its own
/// once the target is dropped. Call [`EvictionHandle::stop`] to end it
/// earlier; dropping the handle detaches the task without stopping it.
#[derive(Debug)]
pub struct EvictionHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl EvictionHandle {
    /// Spawn a sweep over `target` every `period` on the current runtime.
    ///
    /// The first sweep runs one full period after spawning.
    pub fn spawn<T: Evict>(target: Weak<T>, period: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            debug!(period = ?period, "Eviction task started");

            loop {
                tokio::select! {
                    _ = signal.notified() => {
                        debug!("Eviction task received stop signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(target) = target.upgrade() else {
                            debug!("Eviction target dropped, exiting");
                            break;
                        };
                        let evicted = target.evict_expired();
                        if evicted > 0 {
                            debug!(evicted = evicted, "Evicted idle keys");
                        }
                    }
                }
            }
        });

        Self { shutdown, task }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        match self.task.await {
            Ok(()) => info!("Eviction task stopped"),
            Err(e) => warn!(error = %e, "Eviction task ended abnormally"),
        }
    }
}
