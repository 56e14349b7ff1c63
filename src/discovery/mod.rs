//! Passive device discovery
//!
//! Listens to the bus for a fixed window and counts devices per type from
//! the highest device index seen in state frames. Discovery never transmits
//! and never touches the command queue.

mod session;

pub use self::session::{run_discovery, DeviceInventory, DiscoverySession, InventoryEntry};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{Error, Result};

/// Admits one discovery session at a time
#[derive(Debug, Clone, Default)]
pub struct DiscoverySlot {
    active: Arc<AtomicBool>,
}

/// Held for the lifetime of a session; dropping it frees the slot
#[derive(Debug)]
pub struct DiscoveryLease {
    active: Arc<AtomicBool>,
}

impl DiscoverySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot, or fails with a conflict if a session is running
    pub fn acquire(&self) -> Result<DiscoveryLease> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::DiscoveryConflict)?;
        Ok(DiscoveryLease {
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for DiscoveryLease {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
