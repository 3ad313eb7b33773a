//! Latest-value cache, one entry per module.

use std::collections::HashMap;
use std::sync::Arc;

use hostbridge_core::{ModuleName, ModuleSnapshot};
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Capacity of the change-signal channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Holds the most recent snapshot for every module.
///
/// Every module in [`ModuleName::ALL`] has an entry from construction on;
/// entries are replaced whole and never removed. Readers get an `Arc` to
/// an immutable snapshot, so a write never exposes a partial entry.
pub struct ModuleCache {
    entries: RwLock<HashMap<ModuleName, Arc<ModuleSnapshot>>>,
    changes: broadcast::Sender<ModuleName>,
}

impl ModuleCache {
    /// Cache seeded with the default entry for every module.
    pub fn new() -> Self {
        let entries = ModuleName::ALL
            .into_iter()
            .map(|m| (m, Arc::new(ModuleSnapshot::empty(m))))
            .collect();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(entries),
            changes,
        }
    }

    /// Current entry for `module`.
    pub fn get(&self, module: ModuleName) -> Arc<ModuleSnapshot> {
        self.entries
            .read()
            .get(&module)
            .cloned()
            .unwrap_or_else(|| Arc::new(ModuleSnapshot::empty(module)))
    }

    /// Current entries for every module, in catalog order.
    pub fn all(&self) -> Vec<Arc<ModuleSnapshot>> {
        let entries = self.entries.read();
        ModuleName::ALL
            .into_iter()
            .filter_map(|m| entries.get(&m).cloned())
            .collect()
    }

    /// Replace the entry for `snapshot.module`, returning the previous one.
    pub fn set(&self, snapshot: Arc<ModuleSnapshot>) -> Option<Arc<ModuleSnapshot>> {
        self.entries.write().insert(snapshot.module, snapshot)
    }

    /// Announce that `module` changed.
    pub fn notify_changed(&self, module: ModuleName) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.changes.send(module);
    }

    /// Receive change signals.
    pub fn subscribe(&self) -> broadcast::Receiver<ModuleName> {
        self.changes.subscribe()
    }

    /// Number of modules whose latest sample succeeded.
    pub fn ok_count(&self) -> usize {
        self.entries.read().values().filter(|s| s.ok).count()
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_module_has_default_entry() {
        let cache = ModuleCache::new();
        for module in ModuleName::ALL {
            let entry = cache.get(module);
            assert_eq!(entry.module, module);
            assert!(!entry.ok);
            assert_eq!(entry.data, json!({}));
            assert!(entry.sampled_at.is_none());
        }
        assert_eq!(cache.all().len(), ModuleName::ALL.len());
        assert_eq!(cache.ok_count(), 0);
    }

    #[test]
    fn set_replaces_and_returns_previous() {
        let cache = ModuleCache::new();
        let snap = Arc::new(ModuleSnapshot::sampled(ModuleName::Cpu, json!({"usage": 3})));
        let prev = cache.set(snap.clone()).unwrap();
        assert!(!prev.ok);
        assert_eq!(cache.get(ModuleName::Cpu), snap);
        assert_eq!(cache.ok_count(), 1);
    }

    #[test]
    fn all_is_in_catalog_order() {
        let cache = ModuleCache::new();
        let modules: Vec<_> = cache.all().iter().map(|s| s.module).collect();
        assert_eq!(modules, ModuleName::ALL.to_vec());
    }

    #[tokio::test]
    async fn change_signal_reaches_subscribers() {
        let cache = ModuleCache::new();
        let mut rx = cache.subscribe();
        cache.notify_changed(ModuleName::Disks);
        assert_eq!(rx.recv().await.unwrap(), ModuleName::Disks);
    }

    #[test]
    fn notify_without_subscribers_is_harmless() {
        let cache = ModuleCache::new();
        cache.notify_changed(ModuleName::Memory);
    }
}
