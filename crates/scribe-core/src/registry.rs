//! In-memory instance cache
//!
//! Loaded instances are shared behind a mutex and cached by scope key.
//! Hydration from the store is serialized per key through a creation gate so
//! concurrent first requests produce exactly one instance. The cache is
//! bounded: when full, the instance idle the longest is written out (if
//! dirty) and dropped.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::instance::{Instance, InstanceSummary, Member};
use crate::scope::ScopeKey;
use crate::store::DocumentStore;

pub struct Registry {
    store: Arc<dyn DocumentStore>,
    instances: DashMap<ScopeKey, Arc<Mutex<Instance>>>,
    gates: DashMap<ScopeKey, Arc<tokio::sync::Mutex<()>>>,
    /// Serializes check-evict-insert so concurrent cold creations cannot
    /// both pass the capacity check and overshoot the bound.
    admission: tokio::sync::Mutex<()>,
    max_instances: usize,
    max_step_history: usize,
}

impl Registry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        max_instances: usize,
        max_step_history: usize,
    ) -> Self {
        Self {
            store,
            instances: DashMap::new(),
            gates: DashMap::new(),
            admission: tokio::sync::Mutex::new(()),
            max_instances,
            max_step_history,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get_if_loaded(&self, key: &ScopeKey) -> Option<Arc<Mutex<Instance>>> {
        self.instances.get(key).map(|entry| Arc::clone(&entry))
    }

    /// All loaded instances. Callers lock each entry themselves.
    pub fn loaded(&self) -> Vec<(ScopeKey, Arc<Mutex<Instance>>)> {
        self.instances
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn summaries(&self) -> Vec<InstanceSummary> {
        self.loaded()
            .into_iter()
            .map(|(_, instance)| instance.lock().summary())
            .collect()
    }

    /// Fetch the instance for a key, hydrating from the store (or creating a
    /// fresh document) on first access. A member, when given, has their
    /// presence registered on the way out.
    pub async fn get(
        &self,
        key: &ScopeKey,
        member: Option<&Member>,
    ) -> Result<Arc<Mutex<Instance>>> {
        let instance = self.get_or_load(key).await?;
        if let Some(member) = member {
            instance.lock().register_presence(member);
        }
        Ok(instance)
    }

    async fn get_or_load(&self, key: &ScopeKey) -> Result<Arc<Mutex<Instance>>> {
        if let Some(instance) = self.get_if_loaded(key) {
            return Ok(instance);
        }

        let gate = self
            .gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // someone else may have hydrated while we waited on the gate
        if let Some(instance) = self.get_if_loaded(key) {
            return Ok(instance);
        }

        let instance = match self.store.load(key).await? {
            Some(record) => {
                info!(key = %key, version = record.version, "hydrating instance");
                Instance::hydrate(key.clone(), record, self.max_step_history)?
            }
            None => {
                info!(key = %key, "creating fresh instance");
                Instance::fresh(key.clone(), self.max_step_history)
            }
        };

        let _admit = self.admission.lock().await;
        while self.instances.len() >= self.max_instances {
            if !self.evict_idlest().await {
                break;
            }
        }

        let shared = Arc::new(Mutex::new(instance));
        self.instances.insert(key.clone(), Arc::clone(&shared));
        self.gates.remove(key);
        Ok(shared)
    }

    /// A member left the session entirely: deactivate them in every loaded
    /// instance and drop their cursors.
    pub fn remove_presence(&self, member: &Member) {
        for (_, instance) in self.loaded() {
            instance.lock().remove_presence(member);
        }
    }

    /// Drop the instance idle the longest, writing it out when dirty. The
    /// victim leaves the map before the write so the pool shrinks even while
    /// the write is in flight; a failed write is logged, the record stays at
    /// its last persisted state. Returns whether anything was evicted.
    async fn evict_idlest(&self) -> bool {
        let mut victim: Option<(ScopeKey, Arc<Mutex<Instance>>)> = None;
        let mut oldest = None;
        for (key, instance) in self.loaded() {
            let last_active = instance.lock().last_active;
            if oldest.map_or(true, |seen| last_active < seen) {
                oldest = Some(last_active);
                victim = Some((key, instance));
            }
        }
        let Some((key, instance)) = victim else {
            return false;
        };

        info!(key = %key, "evicting idle instance");
        self.instances.remove(&key);

        let snapshot = {
            let locked = instance.lock();
            locked.is_dirty().then(|| locked.snapshot())
        };
        match snapshot {
            Some(Ok(record)) => {
                let version = record.version;
                match self.store.store(&key, record).await {
                    Ok(()) => instance.lock().mark_clean(version),
                    Err(e) => warn!(key = %key, error = %e, "eviction write failed"),
                }
            }
            Some(Err(e)) => warn!(key = %key, error = %e, "eviction snapshot failed"),
            None => {}
        }
        true
    }
}
