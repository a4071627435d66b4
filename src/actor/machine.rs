//! The per-actor event loop.
//!
//! An actor runs on its own operation thread. After entering its start state
//! it repeatedly dequeues one event, handles it against the top of its state
//! stack, drains any raised event, and then reaches a scheduling point. With
//! an empty mailbox it blocks until a sender wakes it.
//!
//! Dispatch for an event `e` against the state stack:
//!
//! 1. the top state's handler for `e` (own or inherited) runs,
//! 2. otherwise a `HaltEvent` halts the actor,
//! 3. otherwise, if a state lies below the top, the top is exited and popped
//!    and dispatch repeats,
//! 4. otherwise the event is ignored if the definition says so, or reported
//!    as unhandled.

use std::sync::Arc;

use smallvec::SmallVec;

use super::context::{Context, Control, Owner};
use super::definition::{Action, Handler, MachineDefinition, StateIndex};
use super::event::{Envelope, HaltEvent};
use crate::error::{Error, ErrorKind};
use crate::runtime::operation::{BlockReason, SchedulingPointKind};
use crate::runtime::Runtime;
use crate::types::ActorId;
use crate::util::stable_hash;

pub(crate) struct MachineInstance<M> {
    definition: Arc<MachineDefinition<M>>,
    data: M,
    id: ActorId,
    runtime: Runtime,
    stack: SmallVec<[StateIndex; 4]>,
    raised: Option<Envelope>,
    halted: bool,
}

impl<M: Send + 'static> MachineInstance<M> {
    pub(crate) fn new(
        definition: Arc<MachineDefinition<M>>,
        data: M,
        id: ActorId,
        runtime: Runtime,
    ) -> Self {
        Self {
            definition,
            data,
            id,
            runtime,
            stack: SmallVec::new(),
            raised: None,
            halted: false,
        }
    }

    /// Runs the actor until it halts or the run ends.
    pub(crate) fn run(mut self, initial: Option<Envelope>) {
        let start = self.definition.start_index();
        self.stack.push(start);
        tracing::debug!(actor = %self.id, state = %self.state_name(), "machine started");
        let control = self.run_entry(initial.as_ref());
        self.apply_control(control, initial.as_ref());
        self.drain_raised();
        self.publish();

        let op = self.id.operation();
        let scheduler = Arc::clone(self.runtime.scheduler());
        while !self.halted {
            scheduler.schedule_next_operation(op, SchedulingPointKind::Actor, false, false);
            let envelope = loop {
                if let Some(envelope) = self.runtime.actors().dequeue(op) {
                    break envelope;
                }
                scheduler.block_current(op, BlockReason::Receive);
                scheduler.schedule_next_operation(op, SchedulingPointKind::Receive, false, false);
            };
            tracing::trace!(actor = %self.id, event = envelope.name(), state = %self.state_name(), "dequeued event");
            self.handle(envelope);
            self.drain_raised();
            self.publish();
        }
        self.runtime.actors().halt(op);
    }

    fn top(&self) -> StateIndex {
        self.stack
            .last()
            .copied()
            .unwrap_or_else(|| self.definition.start_index())
    }

    fn state_name(&self) -> &str {
        &self.definition.state(self.top()).name
    }

    fn publish(&self) {
        let fingerprint = stable_hash(&(
            self.stack.as_slice(),
            self.definition.hash_data(&self.data),
        ));
        self.runtime
            .actors()
            .publish(self.id.operation(), self.state_name(), fingerprint);
    }

    fn drain_raised(&mut self) {
        while let Some(envelope) = self.raised.take() {
            if self.halted {
                break;
            }
            tracing::trace!(actor = %self.id, event = envelope.name(), "handling raised event");
            self.handle(envelope);
        }
    }

    fn handle(&mut self, envelope: Envelope) {
        loop {
            let top = self.top();
            let handler = self
                .definition
                .state(top)
                .handlers
                .get(&envelope.event_type())
                .map(|entry| entry.handler.clone());
            match handler {
                Some(handler) => {
                    self.dispatch(handler, &envelope);
                    return;
                }
                None if envelope.is::<HaltEvent>() => {
                    self.halted = true;
                    return;
                }
                None if self.stack.len() > 1 => {
                    tracing::trace!(
                        actor = %self.id,
                        event = envelope.name(),
                        state = %self.state_name(),
                        "no handler; popping state"
                    );
                    self.pop(Some(&envelope));
                }
                None if self.definition.ignores_unhandled() => {
                    tracing::trace!(actor = %self.id, event = envelope.name(), "ignored unhandled event");
                    return;
                }
                None => {
                    let err = Error::new(ErrorKind::UnhandledEvent)
                        .with_message(format!(
                            "Machine '{}' received event '{}' that cannot be handled.",
                            self.id,
                            envelope.name()
                        ))
                        .in_actor(self.id, self.state_name());
                    self.runtime.fail(err)
                }
            }
        }
    }

    fn dispatch(&mut self, handler: Handler<M>, envelope: &Envelope) {
        match handler {
            Handler::Ignore => {
                tracing::trace!(actor = %self.id, event = envelope.name(), "ignored event");
            }
            Handler::Do(action) => {
                let control = self.invoke(&action, Some(envelope));
                self.apply_control(control, Some(envelope));
            }
            Handler::Goto(target) => {
                let control = self.goto(target, Some(envelope));
                self.apply_control(control, Some(envelope));
            }
            Handler::Push(target) => {
                let control = self.push(target, Some(envelope));
                self.apply_control(control, Some(envelope));
            }
        }
    }

    fn invoke(&mut self, action: &Action<M>, received: Option<&Envelope>) -> Option<Control> {
        let definition = Arc::clone(&self.definition);
        let state = definition.state(self.top()).name.as_str();
        let mut cx = Context::new(&self.runtime, Owner::Actor(self.id), state, received);
        action(&mut self.data, &mut cx);
        cx.into_control()
    }

    fn run_entry(&mut self, received: Option<&Envelope>) -> Option<Control> {
        let action = self.definition.state(self.top()).entry.clone()?;
        self.invoke(&action, received)
    }

    fn run_exit(&mut self, received: Option<&Envelope>) {
        let Some(action) = self.definition.state(self.top()).exit.clone() else {
            return;
        };
        if self.invoke(&action, received).is_some() {
            let err = Error::assertion(format!(
                "Machine '{}' requested a transition while exiting state '{}'.",
                self.id,
                self.state_name()
            ))
            .in_actor(self.id, self.state_name());
            self.runtime.fail(err);
        }
    }

    fn goto(&mut self, target: StateIndex, received: Option<&Envelope>) -> Option<Control> {
        self.run_exit(received);
        let from = self.top();
        if let Some(top) = self.stack.last_mut() {
            *top = target;
        }
        tracing::trace!(
            actor = %self.id,
            from = %self.definition.state(from).name,
            to = %self.state_name(),
            "goto"
        );
        self.run_entry(received)
    }

    fn push(&mut self, target: StateIndex, received: Option<&Envelope>) -> Option<Control> {
        self.stack.push(target);
        tracing::trace!(actor = %self.id, to = %self.state_name(), depth = self.stack.len(), "push");
        self.run_entry(received)
    }

    fn pop(&mut self, received: Option<&Envelope>) {
        if self.stack.len() <= 1 {
            let err = Error::assertion(format!(
                "Machine '{}' popped with no matching push.",
                self.id
            ))
            .in_actor(self.id, self.state_name());
            self.runtime.fail(err);
        }
        self.run_exit(received);
        self.stack.pop();
        tracing::trace!(actor = %self.id, to = %self.state_name(), "pop");
    }

    fn resolve(&self, target: &str) -> StateIndex {
        match self.definition.resolve(self.top(), target) {
            Some(index) => index,
            None => {
                let err = Error::configuration(format!(
                    "Machine '{}' can not transition to unknown state '{target}'.",
                    self.id
                ))
                .in_actor(self.id, self.state_name());
                self.runtime.fail(err)
            }
        }
    }

    fn apply_control(&mut self, control: Option<Control>, received: Option<&Envelope>) {
        let mut next = control;
        while let Some(control) = next.take() {
            next = match control {
                Control::Raise(envelope) => {
                    self.raised = Some(envelope);
                    None
                }
                Control::Goto(target) => {
                    let target = self.resolve(&target);
                    self.goto(target, received)
                }
                Control::Push(target) => {
                    let target = self.resolve(&target);
                    self.push(target, received)
                }
                Control::Pop => {
                    self.pop(received);
                    None
                }
                Control::Halt => {
                    self.halted = true;
                    None
                }
            };
        }
    }
}
