//! The runtime handle passed to a test body.
//!
//! A [`Runtime`] belongs to one run. It is cheap to clone and may be moved
//! into spawned tasks, but it must only be used from operations of its own
//! run.

use std::any::TypeId;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;

use super::context;
use super::operation::{BlockReason, OperationKind, SchedulingPointKind};
use super::scheduler::{RunSettings, Scheduler};
use super::task_handle::TaskHandle;
use crate::actor::event::{Envelope, Event};
use crate::actor::machine::MachineInstance;
use crate::actor::registry::{ActorRegistry, Delivery};
use crate::actor::MachineDefinition;
use crate::error::Error;
use crate::lab::strategy::ExplorationStrategy;
use crate::monitor::instance::{MonitorInstance, MonitorObject};
use crate::monitor::liveness::{Observation, StateObserver};
use crate::monitor::registry::MonitorRegistry;
use crate::monitor::MonitorDefinition;
use crate::types::{ActorId, OperationId};
use crate::util::stable_hash;

struct RuntimeInner {
    scheduler: Arc<Scheduler>,
    actors: Arc<ActorRegistry>,
    monitors: Arc<MonitorRegistry>,
}

/// Feeds actor and monitor state to the liveness checker.
struct RuntimeObserver {
    actors: Arc<ActorRegistry>,
    monitors: Arc<MonitorRegistry>,
}

impl StateObserver for RuntimeObserver {
    fn observe(&self) -> Observation {
        let monitors = self.monitors.observe();
        Observation {
            fingerprint: stable_hash(&(self.actors.fingerprint(), monitors.fingerprint)),
            hot: monitors.hot,
        }
    }
}

/// Handle to the systematic runtime of one run.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub(crate) fn for_run(strategy: Box<dyn ExplorationStrategy>, settings: RunSettings) -> Self {
        let actors = Arc::new(ActorRegistry::new());
        let monitors = Arc::new(MonitorRegistry::new());
        let observer = Arc::new(RuntimeObserver {
            actors: Arc::clone(&actors),
            monitors: Arc::clone(&monitors),
        });
        let scheduler = Scheduler::new(strategy, settings, Some(observer));
        Self {
            inner: Arc::new(RuntimeInner {
                scheduler,
                actors,
                monitors,
            }),
        }
    }

    pub(crate) fn scheduler(&self) -> &Arc<Scheduler> {
        &self.inner.scheduler
    }

    pub(crate) fn actors(&self) -> &ActorRegistry {
        &self.inner.actors
    }

    fn current(&self) -> OperationId {
        context::require_operation(self.scheduler())
    }

    /// Reports `error` as the verdict of this run and unwinds the caller.
    pub(crate) fn fail(&self, error: Error) -> ! {
        self.scheduler().fail(context::current_operation(), error)
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Starts `f` as a new controlled task.
    pub fn spawn<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let current = self.current();
        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);
        let scheduler = self.scheduler();
        let op = scheduler.spawn_operation(
            current,
            OperationKind::Task,
            Box::new(move |_| {
                let value = f();
                *slot.lock() = Some(value);
            }),
        );
        tracing::trace!(parent = %current, task = %op, "spawned task");
        scheduler.schedule_next_operation(current, SchedulingPointKind::Create, false, false);
        TaskHandle::new(op, result, Arc::clone(scheduler))
    }

    /// Optional exploration point; see [`context::interleave`].
    pub fn interleave(&self) {
        let current = self.current();
        self.scheduler()
            .schedule_next_operation(current, SchedulingPointKind::Interleave, true, false);
    }

    /// Optional exploration point that deprioritizes the caller.
    pub fn yield_now(&self) {
        let current = self.current();
        self.scheduler()
            .schedule_next_operation(current, SchedulingPointKind::Yield, true, true);
    }

    // ------------------------------------------------------------------
    // Actors
    // ------------------------------------------------------------------

    /// Creates an actor running `definition` over `data`.
    pub fn create_machine<M: Send + 'static>(
        &self,
        definition: &Arc<MachineDefinition<M>>,
        data: M,
    ) -> ActorId {
        self.spawn_machine(definition, data, None)
    }

    /// Creates an actor whose start state's entry action receives `event`.
    pub fn create_machine_with_event<M: Send + 'static, E: Event>(
        &self,
        definition: &Arc<MachineDefinition<M>>,
        data: M,
        event: E,
    ) -> ActorId {
        self.spawn_machine(definition, data, Some(Envelope::new(event)))
    }

    fn spawn_machine<M: Send + 'static>(
        &self,
        definition: &Arc<MachineDefinition<M>>,
        data: M,
        initial: Option<Envelope>,
    ) -> ActorId {
        let current = self.current();
        let name = definition.name();
        let runtime = self.clone();
        let machine = Arc::clone(definition);
        let scheduler = self.scheduler();
        let op = scheduler.spawn_operation(
            current,
            OperationKind::Actor,
            Box::new(move |op| {
                let id = ActorId::new(op, name);
                MachineInstance::new(machine, data, id, runtime).run(initial);
            }),
        );
        let id = ActorId::new(op, name);
        self.actors().register(id, definition.start_state());
        tracing::debug!(creator = %current, actor = %id, "created machine");
        scheduler.schedule_next_operation(current, SchedulingPointKind::Create, false, false);
        id
    }

    /// Enqueues `event` in `target`'s mailbox.
    ///
    /// Events to a halted actor are dropped. Waking an idle actor is a
    /// scheduling point.
    pub fn send_event<E: Event>(&self, target: ActorId, event: E) {
        let current = self.current();
        let envelope = Envelope::new(event);
        let name = envelope.name();
        if self.actors().enqueue(target, envelope) == Delivery::Dropped {
            return;
        }
        tracing::trace!(sender = %current, target = %target, event = name, "sent event");
        let scheduler = self.scheduler();
        if scheduler.unblock_operation(target.operation(), BlockReason::Receive) {
            scheduler.schedule_next_operation(current, SchedulingPointKind::Send, false, false);
        }
    }

    /// Qualified name of the actor's current state.
    #[must_use]
    pub fn actor_state(&self, actor: ActorId) -> Option<String> {
        self.actors().current_state(actor.operation())
    }

    /// Returns true if the actor has halted.
    #[must_use]
    pub fn is_halted(&self, actor: ActorId) -> bool {
        self.actors().is_halted(actor.operation())
    }

    /// Number of events queued for the actor.
    #[must_use]
    pub fn pending_events(&self, actor: ActorId) -> usize {
        self.actors().pending(actor.operation())
    }

    // ------------------------------------------------------------------
    // Monitors
    // ------------------------------------------------------------------

    /// Registers a monitor and runs its start state's entry action.
    ///
    /// Monitors are keyed by their data type; registering the same type
    /// twice is a configuration error.
    pub fn register_monitor<M: Send + 'static>(
        &self,
        definition: &Arc<MonitorDefinition<M>>,
        data: M,
    ) {
        let type_id = TypeId::of::<M>();
        if !self.inner.monitors.reserve(type_id, definition.name()) {
            self.fail(Error::configuration(format!(
                "Monitor '{}' is already registered.",
                definition.name()
            )));
        }
        let mut monitor: Box<dyn MonitorObject> =
            Box::new(MonitorInstance::new(Arc::clone(definition), data));
        monitor.start(self);
        tracing::debug!(monitor = definition.name(), state = monitor.current_state(), "registered monitor");
        self.inner.monitors.restore(type_id, monitor);
    }

    /// Delivers `event` synchronously to the monitor whose data type is `W`.
    ///
    /// Does nothing if no such monitor is registered.
    pub fn monitor<W: 'static, E: Event>(&self, event: E) {
        let type_id = TypeId::of::<W>();
        let Some(mut monitor) = self.inner.monitors.take(type_id) else {
            tracing::trace!(
                monitor = std::any::type_name::<W>(),
                "monitor not registered; event dropped"
            );
            return;
        };
        monitor.handle(Envelope::new(event), self);
        self.inner.monitors.restore(type_id, monitor);
    }

    /// Qualified name of the current state of monitor `W`.
    #[must_use]
    pub fn monitor_state<W: 'static>(&self) -> Option<String> {
        self.inner.monitors.current_state(TypeId::of::<W>())
    }

    /// Returns true if a monitor with data type `W` is registered.
    #[must_use]
    pub fn has_monitor<W: 'static>(&self) -> bool {
        self.inner.monitors.contains(TypeId::of::<W>())
    }

    // ------------------------------------------------------------------
    // Nondeterminism and assertions
    // ------------------------------------------------------------------

    /// A nondeterministic boolean.
    #[must_use]
    pub fn random_boolean(&self) -> bool {
        let current = self.current();
        self.scheduler().next_boolean(current, None)
    }

    /// A nondeterministic boolean that is not starved at this call site.
    #[must_use]
    #[track_caller]
    pub fn fair_random_boolean(&self) -> bool {
        let site = context::call_site_key(Location::caller());
        let current = self.current();
        self.scheduler().next_boolean(current, Some(site))
    }

    /// A nondeterministic integer in `0..bound`.
    #[must_use]
    pub fn random_integer(&self, bound: u64) -> u64 {
        let current = self.current();
        self.scheduler().next_integer(current, bound)
    }

    /// Fails the run with `message` unless `condition` holds.
    pub fn assert(&self, condition: bool, message: &str) {
        if !condition {
            self.fail(Error::assertion(message));
        }
    }
}

impl core::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}
