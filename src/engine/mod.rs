//! Gateway engine
//!
//! Ties the schema store, the command queue, bus health and discovery
//! together behind one handle. Three flows run against it concurrently:
//!
//! 1. Inbound bus data through [`Engine::handle_inbound`]
//! 2. Intents through [`Engine::submit_intent`]
//! 3. The periodic tick driven by [`Engine::run`]
//!
//! Outbound frames and decoded state leave through bounded channels handed
//! out by [`Engine::new`]. Both are fire-and-forget: a full or closed channel
//! is logged and never stalls the engine.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::watch;
//! use wallpad_gateway::bus::NoAdapterControl;
//! use wallpad_gateway::core::{GatewayConfig, Intent};
//! use wallpad_gateway::engine::Engine;
//! use wallpad_gateway::schema::DeviceRegistry;
//!
//! #[tokio::main]
//! async fn main() -> wallpad_gateway::Result<()> {
//!     let registry = DeviceRegistry::builtin()?;
//!     let (engine, mut channels) =
//!         Engine::new(GatewayConfig::default(), registry, Arc::new(NoAdapterControl))?;
//!
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     tokio::spawn({
//!         let engine = Arc::clone(&engine);
//!         async move { engine.run(shutdown_rx).await }
//!     });
//!
//!     engine.submit_intent(&Intent::new("Light1", "power", "ON")).await?;
//!     while let Some(frame) = channels.frames.recv().await {
//!         println!("send {}", frame);
//!     }
//!     Ok(())
//! }
//! ```

mod router;

pub use self::router::{classify, route_intent, Inbound, RoutedIntent};

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bus::{AdapterControl, BusHealth, CommandQueue, Drained, HealthMonitor, QueueEntry};
use crate::core::{DeviceInstance, Error, GatewayConfig, Intent, Result, StateUpdate};
use crate::discovery::{run_discovery, DeviceInventory, DiscoverySlot};
use crate::protocol::{split_frames, Frame, PacketCodec};
use crate::schema::{DeviceRegistry, SchemaStore};

/// Receiving ends of the engine's outbound channels
pub struct EngineChannels {
    /// Command frames to write to the bus
    pub frames: mpsc::Receiver<Frame>,
    /// Decoded state to publish
    pub states: mpsc::Receiver<StateUpdate>,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing queued
    Idle,
    /// Frames are queued but the bus has not settled
    Busy,
    /// One frame was emitted
    Sent(Drained),
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub queue_depth: usize,
    /// Milliseconds since the last inbound frame
    pub signal_interval_ms: u64,
    pub adapter_reboots: u64,
    pub discovery_active: bool,
    pub schema_generation: u64,
}

/// A running discovery session
pub struct DiscoveryHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<DeviceInventory>,
}

impl DiscoveryHandle {
    /// Ends the session before its window closes
    pub fn stop(&self) {
        // The task may already have finished on its own.
        let _ = self.stop.send(true);
    }

    /// Waits for the session to finish and returns its inventory
    ///
    /// Dropping the handle instead also ends the session early.
    pub async fn wait(self) -> Result<DeviceInventory> {
        let DiscoveryHandle { stop, task } = self;
        let inventory = task
            .await
            .map_err(|e| Error::channel(format!("discovery task failed: {}", e)));
        drop(stop);
        inventory
    }
}

/// The protocol engine
pub struct Engine {
    config: GatewayConfig,
    schema: SchemaStore,
    queue: Mutex<CommandQueue>,
    health: BusHealth,
    monitor: HealthMonitor,
    frames_tx: mpsc::Sender<Frame>,
    states_tx: mpsc::Sender<StateUpdate>,
    discovery: DiscoverySlot,
    discovery_tap: StdMutex<Option<mpsc::Sender<String>>>,
}

impl Engine {
    /// Creates a new engine around a loaded registry
    ///
    /// Fails if the configuration does not validate.
    pub fn new(
        config: GatewayConfig,
        registry: DeviceRegistry,
        adapter: Arc<dyn AdapterControl>,
    ) -> Result<(Arc<Self>, EngineChannels)> {
        config.validate()?;

        let (frames_tx, frames) = mpsc::channel(config.channel_capacity);
        let (states_tx, states) = mpsc::channel(config.channel_capacity);
        let monitor = HealthMonitor::new(config.reboot_threshold, config.auto_reboot, adapter);

        let engine = Engine {
            schema: SchemaStore::new(registry),
            queue: Mutex::new(CommandQueue::new()),
            health: BusHealth::new(),
            monitor,
            frames_tx,
            states_tx,
            discovery: DiscoverySlot::new(),
            discovery_tap: StdMutex::new(None),
            config,
        };
        Ok((Arc::new(engine), EngineChannels { frames, states }))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Snapshot of the active device registry
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.schema.current()
    }

    /// Handles a chunk of hex bus data of any length
    ///
    /// The chunk is sliced into 16-character candidates; a trailing partial
    /// candidate is dropped. Every candidate counts as bus activity, valid or
    /// not. Returns the number of state updates published.
    pub async fn handle_inbound(&self, chunk: &str) -> usize {
        let registry = self.schema.current();
        let mut published = 0;

        for candidate in split_frames(chunk) {
            self.health.record_arrival();
            self.tap_discovery(&candidate);

            let inbound = classify(&registry, &candidate);
            if self.config.track_expected_state {
                if let Some(frame) = inbound.frame() {
                    let retired = self
                        .queue
                        .lock()
                        .await
                        .observe_state(frame, self.config.expected_state_matches);
                    if retired > 0 {
                        debug!(%frame, retired, "commands confirmed by device state");
                    }
                }
            }

            if let Inbound::State { packet, .. } = inbound {
                for update in packet.state_updates() {
                    if self.publish(update) {
                        published += 1;
                    }
                }
            }
        }
        published
    }

    /// Encodes an intent and queues it for transmission
    ///
    /// Rejected intents return the reason and leave the queue untouched.
    pub async fn submit_intent(&self, intent: &Intent) -> Result<Frame> {
        let registry = self.schema.current();
        let routed = route_intent(&registry, &self.config, intent).map_err(|e| {
            warn!(instance = %intent.instance, action = %intent.action, value = %intent.value, error = %e, "rejecting intent");
            e
        })?;

        let entry = QueueEntry::new(routed.command, self.config.max_attempts, routed.expected_state);
        self.queue.lock().await.push(entry);
        debug!(instance = %routed.instance, frame = %routed.command, "queued command");
        Ok(routed.command)
    }

    /// Queues a state poll for one device
    pub async fn request_state(&self, instance: &str) -> Result<Frame> {
        let instance: DeviceInstance = instance.parse()?;
        let registry = self.schema.current();
        let frame = PacketCodec::new(&registry).encode_state_request(instance.kind, instance.index)?;

        self.queue
            .lock()
            .await
            .push(QueueEntry::new(frame, self.config.max_attempts, None));
        debug!(%instance, %frame, "queued state request");
        Ok(frame)
    }

    /// One scheduler step: health check, then at most one transmission
    pub async fn tick(&self, now: Instant) -> TickOutcome {
        self.monitor.check(&self.health, now);

        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return TickOutcome::Idle;
        }
        if self.health.silence(now) <= self.config.settle_threshold {
            return TickOutcome::Busy;
        }
        let Some(drained) = queue.pop_and_requeue() else {
            return TickOutcome::Idle;
        };
        drop(queue);

        self.emit(drained.frame);
        TickOutcome::Sent(drained)
    }

    /// Ticks until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = self.config.tick_interval.as_millis() as u64, "engine started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Instant::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("engine stopped");
    }

    /// Starts a discovery session over the configured window
    ///
    /// Must be called from within a tokio runtime. Fails with a conflict while
    /// another session is running.
    pub fn start_discovery(&self) -> Result<DiscoveryHandle> {
        let lease = self.discovery.acquire()?;
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let (stop, stop_rx) = watch::channel(false);
        *self.lock_tap() = Some(tx);

        let registry = self.schema.current();
        let window = self.config.discovery_window;
        let task = tokio::spawn(async move {
            let inventory = run_discovery(registry, rx, window, stop_rx).await;
            drop(lease);
            inventory
        });
        Ok(DiscoveryHandle { stop, task })
    }

    /// Swaps in a new schema; queued commands are kept
    pub fn reload_schema(&self, json: &str) -> Result<()> {
        self.schema.reload_json(json).map_err(|e| {
            warn!(error = %e, "schema reload rejected, keeping current schema");
            e
        })
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            queue_depth: self.queue.lock().await.len(),
            signal_interval_ms: self.signal_interval(Instant::now()).as_millis() as u64,
            adapter_reboots: self.monitor.reboots(),
            discovery_active: self.discovery.is_active(),
            schema_generation: self.schema.generation(),
        }
    }

    fn signal_interval(&self, now: Instant) -> Duration {
        self.health.silence(now)
    }

    fn emit(&self, frame: Frame) {
        match self.frames_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => warn!(%frame, "outbound channel full, frame not emitted"),
            Err(TrySendError::Closed(frame)) => warn!(%frame, "outbound channel closed, frame not emitted"),
        }
    }

    fn publish(&self, update: StateUpdate) -> bool {
        match self.states_tx.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(update)) => {
                warn!(instance = %update.instance, field = %update.field, "state channel full, update dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("state channel closed");
                false
            }
        }
    }

    fn tap_discovery(&self, candidate: &str) {
        let mut tap = self.lock_tap();
        let Some(tx) = tap.as_ref() else { return };
        match tx.try_send(candidate.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("discovery input full, frame skipped"),
            Err(TrySendError::Closed(_)) => *tap = None,
        }
    }

    fn lock_tap(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<String>>> {
        self.discovery_tap.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
