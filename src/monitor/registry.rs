//! The monitors registered in one run.

use std::any::TypeId;

use parking_lot::Mutex;

use super::instance::MonitorObject;
use super::liveness::{HotMonitor, Observation};
use crate::util::stable_hash;

struct MonitorSlot {
    type_id: TypeId,
    name: &'static str,
    /// Empty while the monitor is handling an event.
    monitor: Option<Box<dyn MonitorObject>>,
    /// Last known state, kept for observations taken mid-handling.
    fingerprint: u64,
    hot: Option<HotMonitor>,
}

/// Registration-ordered set of monitors, keyed by their data type.
#[derive(Default)]
pub(crate) struct MonitorRegistry {
    slots: Mutex<Vec<MonitorSlot>>,
}

impl MonitorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, type_id: TypeId) -> bool {
        self.slots.lock().iter().any(|s| s.type_id == type_id)
    }

    /// Reserves a slot; the started monitor is installed with [`Self::restore`].
    /// Returns false if `type_id` is already registered.
    pub(crate) fn reserve(&self, type_id: TypeId, name: &'static str) -> bool {
        let mut slots = self.slots.lock();
        if slots.iter().any(|s| s.type_id == type_id) {
            return false;
        }
        slots.push(MonitorSlot {
            type_id,
            name,
            monitor: None,
            fingerprint: 0,
            hot: None,
        });
        true
    }

    /// Takes the monitor out of its slot for handling.
    pub(crate) fn take(&self, type_id: TypeId) -> Option<Box<dyn MonitorObject>> {
        self.slots
            .lock()
            .iter_mut()
            .find(|s| s.type_id == type_id)
            .and_then(|s| s.monitor.take())
    }

    /// Puts a monitor back after handling and refreshes its cached state.
    pub(crate) fn restore(&self, type_id: TypeId, monitor: Box<dyn MonitorObject>) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|s| s.type_id == type_id) {
            slot.fingerprint = monitor.fingerprint();
            slot.hot = monitor.hot_state();
            slot.monitor = Some(monitor);
        }
    }

    pub(crate) fn current_state(&self, type_id: TypeId) -> Option<String> {
        self.slots
            .lock()
            .iter()
            .find(|s| s.type_id == type_id)
            .and_then(|s| s.monitor.as_ref())
            .map(|m| m.current_state().to_string())
    }

    /// Fingerprint of all monitor states and the monitors that are hot.
    pub(crate) fn observe(&self) -> Observation {
        let slots = self.slots.lock();
        let states: Vec<(&'static str, u64)> =
            slots.iter().map(|s| (s.name, s.fingerprint)).collect();
        Observation {
            fingerprint: stable_hash(&states),
            hot: slots.iter().filter_map(|s| s.hot.clone()).collect(),
        }
    }
}
