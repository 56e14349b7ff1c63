//! Outbound bus scheduling
//!
//! The wallpad bus is half duplex with no carrier sense and no reliable
//! acknowledgement. This module holds the retry queue that drains one frame
//! per quiet tick, and the silence tracking that decides both when the bus is
//! quiet enough to transmit and when the adapter looks dead.

mod health;
mod queue;

pub use self::health::{AdapterControl, BusHealth, HealthMonitor, NoAdapterControl};
pub use self::queue::{CommandQueue, Drained, QueueEntry};
