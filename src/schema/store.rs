use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::core::Result;
use super::registry::DeviceRegistry;

/// Holds the active registry and swaps it atomically on reload
///
/// Readers clone the `Arc` and keep using it for the whole encode or decode
/// call, so a concurrent reload never shows them a half-built schema.
#[derive(Debug)]
pub struct SchemaStore {
    current: RwLock<Arc<DeviceRegistry>>,
    generation: AtomicU64,
}

impl SchemaStore {
    pub fn new(registry: DeviceRegistry) -> Self {
        SchemaStore {
            current: RwLock::new(Arc::new(registry)),
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot of the active registry
    pub fn current(&self) -> Arc<DeviceRegistry> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Replaces the active registry
    pub fn replace(&self, registry: DeviceRegistry) {
        let next = Arc::new(registry);
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "device schema replaced");
    }

    /// Builds a registry from JSON and swaps it in; on error the old one stays active
    pub fn reload_json(&self, text: &str) -> Result<()> {
        let registry = DeviceRegistry::from_json(text)?;
        self.replace(registry);
        Ok(())
    }

    /// Number of successful replacements since creation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeviceKind, Error};

    const LIGHT_ONLY: &str = r#"{"Light": {"type": "light",
        "state": {"header": "B0", "structure": {"2": {"name": "deviceId"}}}}}"#;

    #[test]
    fn test_reload_swaps_registry() {
        let store = SchemaStore::new(DeviceRegistry::builtin().unwrap());
        let before = store.current();
        assert!(before.device(DeviceKind::Thermo).is_some());

        store.reload_json(LIGHT_ONLY).unwrap();
        assert_eq!(store.generation(), 1);
        assert!(store.current().device(DeviceKind::Thermo).is_none());

        // Snapshots taken before the swap are unaffected.
        assert!(before.device(DeviceKind::Thermo).is_some());
    }

    #[test]
    fn test_failed_reload_keeps_previous() {
        let store = SchemaStore::new(DeviceRegistry::builtin().unwrap());
        let result = store.reload_json(r#"{"Sauna": {"type": "climate"}}"#);
        assert!(matches!(result, Err(Error::Schema(_))));
        assert_eq!(store.generation(), 0);
        assert!(store.current().device(DeviceKind::Thermo).is_some());
    }

    #[test]
    fn test_identical_reload_is_idempotent() {
        let store = SchemaStore::new(DeviceRegistry::from_json(LIGHT_ONLY).unwrap());
        let first = store.current();
        store.reload_json(LIGHT_ONLY).unwrap();
        store.reload_json(LIGHT_ONLY).unwrap();
        assert_eq!(*store.current(), *first);
    }
}
