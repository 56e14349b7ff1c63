use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::core::Result;

/// Out-of-band control over the serial adapter
///
/// Rebooting is the only lever the gateway has when the bus goes quiet; how
/// it is done (a GPIO line, a relay, a management API) is up to the host.
pub trait AdapterControl: Send + Sync {
    /// Power-cycles or resets the adapter
    fn reboot(&self) -> Result<()>;
}

/// Adapter control for deployments without a reboot path
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAdapterControl;

impl AdapterControl for NoAdapterControl {
    fn reboot(&self) -> Result<()> {
        warn!("adapter reboot requested but no adapter control is configured");
        Ok(())
    }
}

/// Time of the last inbound frame, shared by the router and the tick
///
/// Stored as milliseconds since creation in a single atomic.
#[derive(Debug)]
pub struct BusHealth {
    origin: Instant,
    last_inbound_ms: AtomicU64,
}

impl Default for BusHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl BusHealth {
    /// Starts counting silence from now
    pub fn new() -> Self {
        BusHealth {
            origin: Instant::now(),
            last_inbound_ms: AtomicU64::new(0),
        }
    }

    /// Marks an inbound frame arriving now
    pub fn record_arrival(&self) {
        self.record_at(Instant::now());
    }

    /// Marks an inbound frame arriving at `now`
    pub fn record_at(&self, now: Instant) {
        self.last_inbound_ms.store(self.millis(now), Ordering::Release);
    }

    /// Time since the last inbound frame
    pub fn silence(&self, now: Instant) -> Duration {
        let last = self.last_inbound_ms.load(Ordering::Acquire);
        Duration::from_millis(self.millis(now).saturating_sub(last))
    }

    fn millis(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.origin).as_millis() as u64
    }
}

/// Reboots the adapter after prolonged bus silence
pub struct HealthMonitor {
    threshold: Duration,
    auto_reboot: bool,
    adapter: Arc<dyn AdapterControl>,
    reboots: AtomicU64,
}

impl HealthMonitor {
    pub fn new(threshold: Duration, auto_reboot: bool, adapter: Arc<dyn AdapterControl>) -> Self {
        HealthMonitor {
            threshold,
            auto_reboot,
            adapter,
            reboots: AtomicU64::new(0),
        }
    }

    /// Runs once per tick; returns true when a reboot was triggered
    ///
    /// After triggering, the silence clock restarts so the adapter gets a full
    /// threshold to come back before the next reboot.
    pub fn check(&self, health: &BusHealth, now: Instant) -> bool {
        if !self.auto_reboot {
            return false;
        }
        let silence = health.silence(now);
        if silence <= self.threshold {
            return false;
        }

        info!(silence_ms = silence.as_millis() as u64, "bus silent, rebooting adapter");
        if let Err(e) = self.adapter.reboot() {
            warn!(error = %e, "adapter reboot failed");
        }
        health.record_at(now);
        self.reboots.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Reboots triggered since creation
    pub fn reboots(&self) -> u64 {
        self.reboots.load(Ordering::Relaxed)
    }
}
