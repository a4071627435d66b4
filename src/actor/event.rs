//! Events and the envelopes that carry them through mailboxes.
//!
//! Any `'static + Send + Debug` type is an event. Handlers are keyed by the
//! event's [`TypeId`], so dispatch never needs to know the concrete type
//! until a handler asks for it.

use core::fmt;
use std::any::{Any, TypeId};

/// A message that can be sent to an actor or a monitor.
pub trait Event: Any + Send + fmt::Debug {
    /// Upcast used for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + fmt::Debug> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Halts the receiving actor unless one of its states handles it.
///
/// A halted actor drops every event still queued for it and every event
/// sent to it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HaltEvent;

/// A type-erased event together with its type identity.
pub(crate) struct Envelope {
    event_type: TypeId,
    name: &'static str,
    event: Box<dyn Event>,
}

impl Envelope {
    pub(crate) fn new<E: Event>(event: E) -> Self {
        Self {
            event_type: TypeId::of::<E>(),
            name: short_type_name(std::any::type_name::<E>()),
            event: Box::new(event),
        }
    }

    pub(crate) const fn event_type(&self) -> TypeId {
        self.event_type
    }

    /// The event's type name without its module path.
    pub(crate) const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn is<E: Event>(&self) -> bool {
        self.event_type == TypeId::of::<E>()
    }

    pub(crate) fn downcast_ref<E: Event>(&self) -> Option<&E> {
        (*self.event).as_any().downcast_ref::<E>()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Envelope").field(&self.event).finish()
    }
}

/// Strips the module path from a type name, keeping generic arguments.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base_end = full.find('<').unwrap_or(full.len());
    let start = full[..base_end].rfind("::").map_or(0, |i| i + 2);
    &full[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Wrapper<T>(T);

    #[test]
    fn envelope_downcasts_to_its_own_type() {
        let envelope = Envelope::new(Ping(7));
        assert!(envelope.is::<Ping>());
        assert!(!envelope.is::<HaltEvent>());
        assert_eq!(envelope.downcast_ref::<Ping>(), Some(&Ping(7)));
        assert!(envelope.downcast_ref::<HaltEvent>().is_none());
        assert_eq!(envelope.name(), "Ping");
    }

    #[test]
    fn short_names_keep_generics() {
        assert_eq!(short_type_name("a::b::Ping"), "Ping");
        assert_eq!(short_type_name("Ping"), "Ping");
        let name = Envelope::new(Wrapper(1_u8)).name();
        assert_eq!(name, "Wrapper<u8>");
    }
}
