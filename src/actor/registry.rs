//! Mailboxes and published state of every actor in a run.
//!
//! The registry lock is never held across a call into the scheduler: an
//! actor's thread may be parked while another operation delivers to it.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

use super::event::Envelope;
use crate::types::{ActorId, OperationId};
use crate::util::stable_hash;

/// Result of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Enqueued,
    /// The target halted, or never existed in this run.
    Dropped,
}

struct ActorSlot {
    id: ActorId,
    mailbox: VecDeque<Envelope>,
    halted: bool,
    state: String,
    fingerprint: u64,
}

#[derive(Default)]
pub(crate) struct ActorRegistry {
    slots: Mutex<BTreeMap<OperationId, ActorSlot>>,
}

impl ActorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: ActorId, start_state: &str) {
        self.slots.lock().insert(
            id.operation(),
            ActorSlot {
                id,
                mailbox: VecDeque::new(),
                halted: false,
                state: start_state.to_string(),
                fingerprint: 0,
            },
        );
    }

    pub(crate) fn enqueue(&self, target: ActorId, envelope: Envelope) -> Delivery {
        let mut slots = self.slots.lock();
        match slots.get_mut(&target.operation()) {
            Some(slot) if !slot.halted => {
                slot.mailbox.push_back(envelope);
                Delivery::Enqueued
            }
            _ => {
                tracing::trace!(target = %target, event = envelope.name(), "dropped event");
                Delivery::Dropped
            }
        }
    }

    pub(crate) fn dequeue(&self, op: OperationId) -> Option<Envelope> {
        self.slots
            .lock()
            .get_mut(&op)
            .and_then(|slot| slot.mailbox.pop_front())
    }

    /// Records the actor's current state and data fingerprint.
    pub(crate) fn publish(&self, op: OperationId, state: &str, fingerprint: u64) {
        if let Some(slot) = self.slots.lock().get_mut(&op) {
            if slot.state != state {
                slot.state = state.to_string();
            }
            slot.fingerprint = fingerprint;
        }
    }

    /// Marks the actor halted and drops its pending events.
    pub(crate) fn halt(&self, op: OperationId) {
        if let Some(slot) = self.slots.lock().get_mut(&op) {
            slot.halted = true;
            let dropped = slot.mailbox.len();
            slot.mailbox.clear();
            tracing::debug!(actor = %slot.id, dropped, "actor halted");
        }
    }

    pub(crate) fn current_state(&self, op: OperationId) -> Option<String> {
        self.slots.lock().get(&op).map(|slot| slot.state.clone())
    }

    pub(crate) fn is_halted(&self, op: OperationId) -> bool {
        self.slots.lock().get(&op).is_some_and(|slot| slot.halted)
    }

    pub(crate) fn pending(&self, op: OperationId) -> usize {
        self.slots.lock().get(&op).map_or(0, |slot| slot.mailbox.len())
    }

    /// Hash over every actor's published state and queued event types.
    pub(crate) fn fingerprint(&self) -> u64 {
        let slots = self.slots.lock();
        let summary: Vec<(u64, bool, u64, Vec<&'static str>)> = slots
            .iter()
            .map(|(op, slot)| {
                (
                    op.as_u64(),
                    slot.halted,
                    stable_hash(&(slot.state.as_str(), slot.fingerprint)),
                    slot.mailbox.iter().map(Envelope::name).collect(),
                )
            })
            .collect();
        stable_hash(&summary)
    }
}
