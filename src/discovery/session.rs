use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

use crate::core::{DeviceInstance, DeviceKind, PacketKind};
use crate::protocol::{quirks, Frame};
use crate::schema::{DeviceRegistry, FieldName};

/// Inventory line for one device type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Entity class from the schema `type` key
    pub kind: String,
    /// Highest index seen, taken as the number of devices
    pub count: u8,
}

/// Result of a discovery session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInventory {
    /// Keyed by device type name
    pub devices: BTreeMap<String, InventoryEntry>,
    pub completed_at: DateTime<Utc>,
}

impl DeviceInventory {
    /// Devices of one type, zero if none were seen
    pub fn count(&self, kind: DeviceKind) -> u8 {
        self.devices.get(kind.name()).map_or(0, |entry| entry.count)
    }

    /// Every instance implied by the counts, `Light1..=LightN` and so on
    pub fn instances(&self) -> Vec<DeviceInstance> {
        let mut instances = Vec::new();
        for name in self.devices.keys() {
            let Ok(kind) = name.parse::<DeviceKind>() else { continue };
            let count = self.count(kind);
            instances.extend((1..=count).map(|index| DeviceInstance::new(kind, index)));
        }
        instances
    }
}

/// Running per-type maximum device index
///
/// Indices are assumed dense from 1, so the maximum is the device count.
#[derive(Debug, Clone)]
pub struct DiscoverySession {
    deadline: Instant,
    max_index: BTreeMap<DeviceKind, u8>,
}

impl DiscoverySession {
    /// Opens a session closing `window` from now
    pub fn new(window: Duration) -> Self {
        DiscoverySession {
            deadline: Instant::now() + window,
            max_index: BTreeMap::new(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Validates one candidate and tallies it; garbled input is ignored
    pub fn observe(&mut self, registry: &DeviceRegistry, candidate: &str) -> Option<DeviceInstance> {
        match Frame::from_hex(candidate) {
            Ok(frame) => self.observe_frame(registry, &frame),
            Err(e) => {
                trace!(candidate, error = %e, "discovery skipping invalid frame");
                None
            }
        }
    }

    /// Tallies a valid frame if it is a state frame carrying a device id
    pub fn observe_frame(&mut self, registry: &DeviceRegistry, frame: &Frame) -> Option<DeviceInstance> {
        if quirks::recognize_echo(registry, frame).is_some() {
            return None;
        }

        for device in registry.match_header(PacketKind::State, frame.header()) {
            let Some(id_field) = device.packet(PacketKind::State).and_then(|p| p.field(&FieldName::DeviceId)) else {
                continue;
            };
            let Ok(position) = id_field.payload_index(device.kind) else { continue };
            let index = frame.payload()[position];
            if index == 0 {
                continue;
            }

            let max = self.max_index.entry(device.kind).or_insert(0);
            if index > *max {
                debug!(device = %device.kind, index, "discovered device index");
                *max = index;
            }
            return Some(DeviceInstance::new(device.kind, index));
        }
        None
    }

    /// Highest index seen so far for a device type
    pub fn max_index(&self, kind: DeviceKind) -> u8 {
        self.max_index.get(&kind).copied().unwrap_or(0)
    }

    /// Closes the session into an inventory of every type seen
    pub fn finish(self, registry: &DeviceRegistry) -> DeviceInventory {
        let devices = self
            .max_index
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(kind, count)| {
                let type_name = registry
                    .device(kind)
                    .map(|device| device.type_name.clone())
                    .unwrap_or_default();
                (kind.name().to_string(), InventoryEntry { kind: type_name, count })
            })
            .collect();

        DeviceInventory {
            devices,
            completed_at: Utc::now(),
        }
    }
}

/// Listens to inbound candidates until the window closes or `stop` fires
///
/// Closing the frame channel or dropping the stop sender also ends the
/// session. Whatever was tallied so far becomes the inventory.
pub async fn run_discovery(
    registry: Arc<DeviceRegistry>,
    mut frames: mpsc::Receiver<String>,
    window: Duration,
    mut stop: watch::Receiver<bool>,
) -> DeviceInventory {
    let mut session = DiscoverySession::new(window);
    let deadline = sleep_until(session.deadline());
    tokio::pin!(deadline);

    info!(window_ms = window.as_millis() as u64, "discovery started");
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    info!("discovery stopped early");
                    break;
                }
            }
            candidate = frames.recv() => match candidate {
                Some(candidate) => {
                    session.observe(&registry, &candidate);
                }
                None => {
                    debug!("discovery input closed");
                    break;
                }
            }
        }
    }

    let inventory = session.finish(&registry);
    info!(
        types = inventory.devices.len(),
        devices = inventory.instances().len(),
        "discovery finished"
    );
    inventory
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<DeviceRegistry> {
        Arc::new(DeviceRegistry::builtin().unwrap())
    }

    fn light_state(index: u8) -> String {
        Frame::from_payload([0xB0, 0x01, index, 0, 0, 0, 0]).to_string()
    }

    #[test]
    fn test_max_index_with_noise() {
        let registry = registry();
        let mut session = DiscoverySession::new(Duration::from_secs(20));
        let inputs = [
            light_state(1),
            "B00102000000004F".to_string(), // bad checksum
            light_state(2),
            "zzzz".to_string(),
            light_state(1),
            "3101010000000033".to_string(), // a command, not a state
            light_state(3),
        ];
        for input in &inputs {
            session.observe(&registry, input);
        }

        let inventory = session.finish(&registry);
        assert_eq!(inventory.count(DeviceKind::Light), 3);
        assert_eq!(inventory.devices["Light"].kind, "light");
        assert_eq!(inventory.devices.len(), 1);
        assert_eq!(inventory.instances().len(), 3);
    }

    #[test]
    fn test_elevator_echo_is_not_a_breaker() {
        let registry = registry();
        let mut session = DiscoverySession::new(Duration::from_secs(20));
        let echo = Frame::from_payload([0xA0, 0x01, 0x01, 0x00, 0x08, 0x15, 0x00]);
        assert!(session.observe_frame(&registry, &echo).is_none());

        let breaker = Frame::from_payload([0xA0, 0x01, 0x02, 0, 0, 0, 0]);
        assert_eq!(
            session.observe_frame(&registry, &breaker),
            Some(DeviceInstance::new(DeviceKind::LightBreaker, 2))
        );
        assert_eq!(session.max_index(DeviceKind::LightBreaker), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_closes_on_deadline() {
        let (tx, rx) = mpsc::channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        for index in [1, 2, 1, 3] {
            tx.send(light_state(index)).await.unwrap();
        }
        tx.send(Frame::from_payload([0x82, 0x81, 0x02, 0x22, 0x23, 0, 0]).to_string()).await.unwrap();

        let started = Instant::now();
        let inventory = run_discovery(registry(), rx, Duration::from_secs(20), stop_rx).await;
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(inventory.count(DeviceKind::Light), 3);
        assert_eq!(inventory.count(DeviceKind::Thermo), 2);
        assert_eq!(inventory.count(DeviceKind::Fan), 0);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_early() {
        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        tx.send(light_state(4)).await.unwrap();

        let task = tokio::spawn(run_discovery(registry(), rx, Duration::from_secs(20), stop_rx));
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop_tx.send(true).unwrap();

        let inventory = task.await.unwrap();
        assert_eq!(inventory.count(DeviceKind::Light), 4);
        drop(tx);
    }
}
