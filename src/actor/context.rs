//! The context handed to every machine and monitor action.

use super::definition::MachineDefinition;
use super::event::{Envelope, Event};
use crate::error::{Error, ErrorKind};
use crate::runtime::Runtime;
use crate::types::ActorId;

/// Who is running the action.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Owner {
    Actor(ActorId),
    Monitor(&'static str),
}

/// A state transition requested by an action. At most one per action.
#[derive(Debug)]
pub(crate) enum Control {
    Raise(Envelope),
    Goto(String),
    Push(String),
    Pop,
    Halt,
}

/// Access to the runtime from inside an action.
///
/// Transitions requested here (`raise_event`, `goto_state`, `push_state`,
/// `pop_state`, `halt`) take effect after the action returns. An action may
/// request at most one of them.
pub struct Context<'a> {
    runtime: &'a Runtime,
    owner: Owner,
    state: &'a str,
    received: Option<&'a Envelope>,
    control: Option<Control>,
}

impl<'a> Context<'a> {
    pub(crate) const fn new(
        runtime: &'a Runtime,
        owner: Owner,
        state: &'a str,
        received: Option<&'a Envelope>,
    ) -> Self {
        Self {
            runtime,
            owner,
            state,
            received,
            control: None,
        }
    }

    pub(crate) fn into_control(self) -> Option<Control> {
        self.control
    }

    /// The id of the running actor.
    ///
    /// Inside a monitor action this reports a configuration error.
    #[must_use]
    pub fn id(&self) -> ActorId {
        match self.owner {
            Owner::Actor(id) => id,
            Owner::Monitor(name) => {
                self.fail_config(&format!("Monitor '{name}' has no actor id."))
            }
        }
    }

    /// Qualified name of the state the action runs in.
    #[must_use]
    pub const fn current_state(&self) -> &str {
        self.state
    }

    /// The event that triggered this action, if it is an `E`.
    #[must_use]
    pub fn received_event<E: Event>(&self) -> Option<&E> {
        self.received.and_then(Envelope::downcast_ref::<E>)
    }

    /// Short type name of the triggering event, if any.
    #[must_use]
    pub fn received_event_name(&self) -> Option<&'static str> {
        self.received.map(Envelope::name)
    }

    /// The runtime of the current run.
    #[must_use]
    pub const fn runtime(&self) -> &Runtime {
        self.runtime
    }

    /// Sends `event` to `target`.
    pub fn send_event<E: Event>(&self, target: ActorId, event: E) {
        self.require_actor("send events");
        self.runtime.send_event(target, event);
    }

    /// Creates a machine running `definition` over `data`.
    pub fn create_machine<N: Send + 'static>(
        &self,
        definition: &std::sync::Arc<MachineDefinition<N>>,
        data: N,
    ) -> ActorId {
        self.require_actor("create machines");
        self.runtime.create_machine(definition, data)
    }

    /// Creates a machine and hands `event` to its start state's entry action.
    pub fn create_machine_with_event<N: Send + 'static, E: Event>(
        &self,
        definition: &std::sync::Arc<MachineDefinition<N>>,
        data: N,
        event: E,
    ) -> ActorId {
        self.require_actor("create machines");
        self.runtime
            .create_machine_with_event(definition, data, event)
    }

    /// Handles `event` right after this action, before the next mailbox
    /// event.
    pub fn raise_event<E: Event>(&mut self, event: E) {
        self.set_control(Control::Raise(Envelope::new(event)));
    }

    /// Exits the current state and enters `target`.
    pub fn goto_state(&mut self, target: &str) {
        self.set_control(Control::Goto(target.to_string()));
    }

    /// Enters `target` on top of the current state, without exiting it.
    pub fn push_state(&mut self, target: &str) {
        self.require_actor("push states");
        self.set_control(Control::Push(target.to_string()));
    }

    /// Exits the current state and returns to the one below it.
    pub fn pop_state(&mut self) {
        self.require_actor("pop states");
        self.set_control(Control::Pop);
    }

    /// Halts the actor once this action returns.
    pub fn halt(&mut self) {
        self.require_actor("halt");
        self.set_control(Control::Halt);
    }

    /// Forwards `event` to the registered monitor `W`.
    pub fn monitor<W: 'static, E: Event>(&self, event: E) {
        self.runtime.monitor::<W, E>(event);
    }

    /// Fails the run with `message` unless `condition` holds.
    pub fn assert(&self, condition: bool, message: &str) {
        if !condition {
            self.fail(Error::assertion(message));
        }
    }

    /// Fails the run with a generic message unless `condition` holds.
    pub fn assert_true(&self, condition: bool) {
        self.assert(condition, "Detected an assertion failure.");
    }

    /// A nondeterministic boolean.
    #[must_use]
    pub fn random_boolean(&self) -> bool {
        self.runtime.random_boolean()
    }

    /// A nondeterministic boolean that is not starved at this call site.
    #[must_use]
    #[track_caller]
    pub fn fair_random_boolean(&self) -> bool {
        self.runtime.fair_random_boolean()
    }

    /// A nondeterministic integer in `0..bound`.
    #[must_use]
    pub fn random_integer(&self, bound: u64) -> u64 {
        self.runtime.random_integer(bound)
    }

    fn set_control(&mut self, control: Control) {
        if self.control.is_some() {
            let who = match self.owner {
                Owner::Actor(id) => format!("Machine '{id}'"),
                Owner::Monitor(name) => format!("Monitor '{name}'"),
            };
            self.fail(Error::assertion(format!(
                "{who} requested more than one transition in a single action."
            )));
        }
        self.control = Some(control);
    }

    fn require_actor(&self, what: &str) {
        if let Owner::Monitor(name) = self.owner {
            self.fail_config(&format!("Monitor '{name}' can not {what}."));
        }
    }

    fn fail_config(&self, message: &str) -> ! {
        self.fail(Error::new(ErrorKind::Configuration).with_message(message))
    }

    fn fail(&self, error: Error) -> ! {
        let error = match self.owner {
            Owner::Actor(id) => error.in_actor(id, self.state),
            Owner::Monitor(_) => error,
        };
        self.runtime.fail(error)
    }
}
