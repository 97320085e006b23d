//! Event log
//!
//! The ledger appends one [`RegistryEvent`] per successful mutation. The log
//! is hash-chained and may be bounded; pruning drops the oldest events from
//! memory but sequence numbers keep counting.

use std::collections::VecDeque;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::models::{EventKind, RegistryEvent};

/// Receives events after the mutation that produced them has committed
pub trait EventListener: Send + Sync {
    /// Called once per committed event
    fn on_event(&self, event: &RegistryEvent);
}

/// Append-only, hash-chained event log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: VecDeque<RegistryEvent>,
    next_sequence: u64,
    last_hash: [u8; 32],
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return a copy of it
    ///
    /// `max_len` of 0 keeps every event.
    pub fn append(&mut self, actor: Address, kind: EventKind, max_len: usize) -> RegistryEvent {
        let event = RegistryEvent::new(self.next_sequence, actor, kind, self.last_hash);

        self.next_sequence += 1;
        self.last_hash = event.hash;
        self.events.push_back(event.clone());

        if max_len > 0 {
            while self.events.len() > max_len {
                self.events.pop_front();
            }
        }

        event
    }

    /// Events with a sequence number of at least `sequence`
    pub fn since(&self, sequence: u64) -> Vec<RegistryEvent> {
        self.events
            .iter()
            .filter(|event| event.sequence >= sequence)
            .cloned()
            .collect()
    }

    /// Number of events ever appended
    pub fn total(&self) -> u64 {
        self.next_sequence
    }

    /// Number of events still held in memory
    pub fn retained(&self) -> usize {
        self.events.len()
    }

    /// Most recent event
    pub fn last(&self) -> Option<&RegistryEvent> {
        self.events.back()
    }

    /// Check every retained event's hash and its link to its predecessor
    pub fn verify_chain(&self) -> bool {
        let mut previous: Option<&RegistryEvent> = None;

        for event in &self.events {
            if !event.verify_hash() {
                return false;
            }
            if let Some(prev) = previous {
                if event.prev_hash != prev.hash || event.sequence != prev.sequence + 1 {
                    return false;
                }
            }
            previous = Some(event);
        }

        previous.map_or(true, |last| last.hash == self.last_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelisted(n: u64) -> EventKind {
        EventKind::ChildCollectionWhitelisted {
            collection: Address::from_low_u64_be(1000),
            child_collection: Address::from_low_u64_be(n),
            newly_added: true,
        }
    }

    #[test]
    fn test_append_chains_events() {
        let mut log = EventLog::new();

        let first = log.append(Address::zero(), whitelisted(1), 0);
        let second = log.append(Address::zero(), whitelisted(2), 0);

        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(first.prev_hash, [0; 32]);
        assert!(log.verify_chain());
    }

    #[test]
    fn test_since() {
        let mut log = EventLog::new();
        for n in 0..5 {
            log.append(Address::zero(), whitelisted(n), 0);
        }

        let tail = log.since(3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 3);
        assert!(log.since(5).is_empty());
    }

    #[test]
    fn test_bounded_log_prunes_oldest() {
        let mut log = EventLog::new();
        for n in 0..10 {
            log.append(Address::zero(), whitelisted(n), 3);
        }

        assert_eq!(log.retained(), 3);
        assert_eq!(log.total(), 10);
        assert_eq!(log.since(0)[0].sequence, 7);
        assert!(log.verify_chain());
    }

    #[test]
    fn test_tampering_breaks_chain() {
        let mut log = EventLog::new();
        log.append(Address::zero(), whitelisted(1), 0);
        log.append(Address::zero(), whitelisted(2), 0);

        log.events[0].actor = Address::from_low_u64_be(7);
        assert!(!log.verify_chain());
    }
}
