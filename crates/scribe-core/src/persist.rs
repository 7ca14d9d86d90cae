//! Debounced snapshot writes
//!
//! Mutations do not hit the store directly; they request a flush, and
//! requests made while one is pending coalesce into a single delayed pass
//! over every loaded instance. Snapshots are taken under the instance lock
//! but written after it is released, so writes never stall the editing path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::registry::Registry;
use crate::store::DocumentStore;

pub struct FlushScheduler {
    registry: Arc<Registry>,
    store: Arc<dyn DocumentStore>,
    delay: Duration,
    pending: AtomicBool,
}

impl FlushScheduler {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn DocumentStore>, delay: Duration) -> Self {
        Self {
            registry,
            store,
            delay,
            pending: AtomicBool::new(false),
        }
    }

    /// Request a flush after the configured delay. A no-op while one is
    /// already pending.
    pub fn schedule_flush(self: &Arc<Self>) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(scheduler.delay).await;
            scheduler.pending.store(false, Ordering::SeqCst);
            scheduler.flush_now().await;
        });
    }

    /// Write every dirty loaded instance. An instance whose version already
    /// matches the store is only marked clean; presence churn alone does not
    /// rewrite the record. Failed writes stay dirty for the next pass.
    pub async fn flush_now(&self) {
        for (key, instance) in self.registry.loaded() {
            let snapshot = {
                let locked = instance.lock();
                if !locked.is_dirty() {
                    continue;
                }
                locked.snapshot()
            };
            let record = match snapshot {
                Ok(record) => record,
                Err(e) => {
                    warn!(key = %key, error = %e, "snapshot failed");
                    continue;
                }
            };
            let version = record.version;

            match self.store.version(&key).await {
                Ok(Some(stored)) if stored >= version => {
                    instance.lock().mark_clean(version);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "version check failed");
                    continue;
                }
            }

            match self.store.store(&key, record).await {
                Ok(()) => {
                    debug!(key = %key, version, "flushed instance");
                    instance.lock().mark_clean(version);
                }
                Err(e) => warn!(key = %key, error = %e, "flush failed"),
            }
        }
    }
}
