use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::core::Error;
use crate::protocol::{ExpectedState, Frame};

/// One pending outbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Frame to transmit
    pub command: Frame,
    /// Transmissions made so far
    pub attempts: u32,
    /// Transmissions allowed before the entry is dropped
    pub max_attempts: u32,
    /// State that proves the device acted, if one can be predicted
    pub expected_state: Option<ExpectedState>,
    /// Times the expected state has been observed
    pub matches: u32,
}

impl QueueEntry {
    /// Creates a new queue entry
    pub fn new(command: Frame, max_attempts: u32, expected_state: Option<ExpectedState>) -> Self {
        QueueEntry {
            command,
            attempts: 0,
            max_attempts,
            expected_state,
            matches: 0,
        }
    }
}

/// A frame handed out by [`CommandQueue::pop_and_requeue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    pub frame: Frame,
    /// Attempt number of this transmission, starting at 1
    pub attempt: u32,
    /// The entry used its last attempt and left the queue
    pub exhausted: bool,
}

/// FIFO of pending commands with retry-to-tail
///
/// `push`, `pop_and_requeue` and `observe_state` are the only mutation
/// points. Callers wrap the queue in a mutex.
#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: VecDeque<QueueEntry>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry at the tail
    ///
    /// A command identical to one already pending is not queued twice: the
    /// pending entry starts over with the new entry's budget instead. Returns
    /// false in that case.
    pub fn push(&mut self, entry: QueueEntry) -> bool {
        if let Some(pending) = self.entries.iter_mut().find(|pending| pending.command == entry.command) {
            debug!(frame = %entry.command, previous_attempts = pending.attempts, "coalescing duplicate command");
            *pending = entry;
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    /// Takes the head, counts one attempt, and requeues it at the tail
    ///
    /// An entry that reaches its attempt budget is dropped instead.
    pub fn pop_and_requeue(&mut self) -> Option<Drained> {
        let mut entry = self.entries.pop_front()?;
        entry.attempts += 1;

        let drained = Drained {
            frame: entry.command,
            attempt: entry.attempts,
            exhausted: entry.attempts >= entry.max_attempts,
        };
        if drained.exhausted {
            let err = Error::QueueExhausted {
                frame: entry.command.to_string(),
                attempts: entry.attempts,
            };
            warn!(error = %err, "dropping command");
        } else {
            self.entries.push_back(entry);
        }
        Some(drained)
    }

    /// Counts an observed state frame against pending expectations
    ///
    /// Entries whose expected state has now been seen `required` times are
    /// retired. Returns how many were retired.
    pub fn observe_state(&mut self, frame: &Frame, required: u32) -> usize {
        let before = self.entries.len();
        self.entries.retain_mut(|entry| {
            if !entry.expected_state.is_some_and(|expected| expected.matches(frame)) {
                return true;
            }
            entry.matches += 1;
            if entry.matches >= required {
                debug!(
                    command = %entry.command,
                    attempts = entry.attempts,
                    "expected state observed, retiring command"
                );
                return false;
            }
            true
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending entries, head first
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(header: u8, id: u8) -> Frame {
        Frame::from_payload([header, id, 0x01, 0, 0, 0, 0])
    }

    #[test]
    fn test_bounded_retry() {
        let mut queue = CommandQueue::new();
        queue.push(QueueEntry::new(frame(0x31, 9), 10, None));
        let before = queue.len();

        let command = frame(0x31, 1);
        queue.push(QueueEntry::new(command, 4, None));

        // The two entries alternate, so eight drains give each four attempts.
        let mut sends = 0;
        for _ in 0..8 {
            let drained = queue.pop_and_requeue().unwrap();
            if drained.frame == command {
                sends += 1;
                assert_eq!(drained.attempt, sends);
                assert_eq!(drained.exhausted, sends == 4);
            }
        }
        assert_eq!(sends, 4);
        assert_eq!(queue.len(), before);
        assert!(queue.iter().all(|entry| entry.command != command));
    }

    #[test]
    fn test_queue_returns_to_previous_size() {
        let mut queue = CommandQueue::new();
        queue.push(QueueEntry::new(frame(0x31, 1), 3, None));
        assert_eq!(queue.len(), 1);

        for _ in 0..3 {
            assert!(queue.pop_and_requeue().is_some());
        }
        assert!(queue.is_empty());
        assert!(queue.pop_and_requeue().is_none());
    }

    #[test]
    fn test_fifo_round_robin() {
        let mut queue = CommandQueue::new();
        let (a, b) = (frame(0x31, 1), frame(0x31, 2));
        queue.push(QueueEntry::new(a, 5, None));
        queue.push(QueueEntry::new(b, 5, None));

        let order: Vec<Frame> = (0..4).filter_map(|_| queue.pop_and_requeue()).map(|d| d.frame).collect();
        assert_eq!(order, vec![a, b, a, b]);
    }

    #[test]
    fn test_duplicate_resets_attempts() {
        let mut queue = CommandQueue::new();
        let command = frame(0x31, 1);
        assert!(queue.push(QueueEntry::new(command, 3, None)));
        queue.pop_and_requeue();
        queue.pop_and_requeue();

        assert!(!queue.push(QueueEntry::new(command, 3, None)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.iter().next().unwrap().attempts, 0);
    }

    #[test]
    fn test_expected_state_retires_entry() {
        let mut queue = CommandQueue::new();
        let expected = frame(0xB0, 1);
        queue.push(QueueEntry::new(frame(0x31, 1), 10, Some(ExpectedState::exact(expected))));
        queue.push(QueueEntry::new(frame(0x31, 2), 10, Some(ExpectedState::exact(frame(0xB0, 2)))));

        assert_eq!(queue.observe_state(&expected, 2), 0);
        assert_eq!(queue.iter().next().unwrap().matches, 1);
        assert_eq!(queue.observe_state(&expected, 2), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.observe_state(&frame(0xB0, 7), 1), 0);
    }

    #[test]
    fn test_expected_state_ignores_unpredicted_bytes() {
        let registry = crate::DeviceRegistry::builtin().unwrap();
        // Thermo1 power ON
        let command = Frame::from_payload([0x04, 0x01, 0x04, 0x81, 0, 0, 0]);
        let expected = crate::protocol::predict(&registry, &command);
        assert!(expected.is_some());

        let mut queue = CommandQueue::new();
        queue.push(QueueEntry::new(command, 10, expected));
        // Power off is not the state the command asked for.
        assert_eq!(queue.observe_state(&Frame::from_payload([0x82, 0x80, 0x01, 0x22, 0x24, 0, 0]), 1), 0);
        assert_eq!(queue.observe_state(&Frame::from_payload([0x82, 0x81, 0x01, 0x22, 0x24, 0, 0]), 1), 1);
        assert!(queue.is_empty());
    }
}
