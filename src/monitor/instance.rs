//! A registered monitor: definition, user data, and current state.
//!
//! Monitors have no mailbox and no thread. An event sent to a monitor is
//! handled synchronously on the sender's operation, together with any events
//! the handler raises.

use std::sync::Arc;

use super::liveness::HotMonitor;
use super::{MonitorDefinition, Temperature};
use crate::actor::context::{Context, Control, Owner};
use crate::actor::definition::{Action, Handler, StateIndex};
use crate::actor::event::Envelope;
use crate::error::{Error, ErrorContext, ErrorKind};
use crate::runtime::Runtime;
use crate::util::stable_hash;

/// Type-erased monitor, stored in the registry.
pub(crate) trait MonitorObject: Send {
    fn name(&self) -> &'static str;
    fn start(&mut self, runtime: &Runtime);
    fn handle(&mut self, envelope: Envelope, runtime: &Runtime);
    fn current_state(&self) -> &str;
    fn hot_state(&self) -> Option<HotMonitor>;
    fn fingerprint(&self) -> u64;
}

pub(crate) struct MonitorInstance<M> {
    definition: Arc<MonitorDefinition<M>>,
    data: M,
    current: StateIndex,
}

impl<M: Send + 'static> MonitorInstance<M> {
    pub(crate) fn new(definition: Arc<MonitorDefinition<M>>, data: M) -> Self {
        let current = definition.machine().start_index();
        Self {
            definition,
            data,
            current,
        }
    }

    fn invoke(
        &mut self,
        action: &Action<M>,
        received: Option<&Envelope>,
        runtime: &Runtime,
    ) -> Option<Control> {
        let definition = Arc::clone(&self.definition);
        let state = definition.machine().state(self.current).name.as_str();
        let owner = Owner::Monitor(definition.name());
        let mut cx = Context::new(runtime, owner, state, received);
        action(&mut self.data, &mut cx);
        cx.into_control()
    }

    fn enter(&mut self, received: Option<&Envelope>, runtime: &Runtime) -> Option<Control> {
        let action = self.definition.machine().state(self.current).entry.clone()?;
        self.invoke(&action, received, runtime)
    }

    fn goto(
        &mut self,
        target: StateIndex,
        received: Option<&Envelope>,
        runtime: &Runtime,
    ) -> Option<Control> {
        let exit = self.definition.machine().state(self.current).exit.clone();
        if let Some(action) = exit {
            if self.invoke(&action, received, runtime).is_some() {
                runtime.fail(self.error(
                    ErrorKind::AssertionFailure,
                    format!(
                        "Monitor '{}' requested a transition while exiting state '{}'.",
                        self.name(),
                        self.current_state()
                    ),
                ));
            }
        }
        let from = self.current;
        self.current = target;
        tracing::trace!(
            monitor = self.name(),
            from = %self.definition.machine().state(from).name,
            to = %self.current_state(),
            "monitor goto"
        );
        self.enter(received, runtime)
    }

    /// Applies a requested transition; returns an event to handle next.
    fn apply(
        &mut self,
        control: Option<Control>,
        received: Option<&Envelope>,
        runtime: &Runtime,
    ) -> Option<Envelope> {
        let mut next = control;
        let mut raised = None;
        while let Some(control) = next.take() {
            next = match control {
                Control::Raise(envelope) => {
                    raised = Some(envelope);
                    None
                }
                Control::Goto(target) => {
                    let Some(target) = self.definition.machine().resolve(self.current, &target)
                    else {
                        runtime.fail(self.error(
                            ErrorKind::Configuration,
                            format!(
                                "Monitor '{}' can not transition to unknown state '{target}'.",
                                self.name()
                            ),
                        ))
                    };
                    self.goto(target, received, runtime)
                }
                Control::Push(_) | Control::Pop | Control::Halt => runtime.fail(self.error(
                    ErrorKind::Configuration,
                    format!("Monitor '{}' can only goto or raise.", self.name()),
                )),
            };
        }
        raised
    }

    fn error(&self, kind: ErrorKind, message: String) -> Error {
        let context = ErrorContext {
            state: Some(self.current_state().to_string()),
            ..ErrorContext::default()
        };
        Error::new(kind).with_message(message).with_context(context)
    }
}

impl<M: Send + 'static> MonitorObject for MonitorInstance<M> {
    fn name(&self) -> &'static str {
        self.definition.name()
    }

    fn start(&mut self, runtime: &Runtime) {
        let control = self.enter(None, runtime);
        let mut pending = self.apply(control, None, runtime);
        while let Some(envelope) = pending.take() {
            self.handle_one(envelope, runtime, &mut pending);
        }
    }

    fn handle(&mut self, envelope: Envelope, runtime: &Runtime) {
        let mut pending = Some(envelope);
        while let Some(envelope) = pending.take() {
            self.handle_one(envelope, runtime, &mut pending);
        }
    }

    fn current_state(&self) -> &str {
        &self.definition.machine().state(self.current).name
    }

    fn hot_state(&self) -> Option<HotMonitor> {
        let state = self.definition.machine().state(self.current);
        (state.temperature == Temperature::Hot).then(|| HotMonitor {
            monitor: self.name(),
            state: state.name.clone(),
        })
    }

    fn fingerprint(&self) -> u64 {
        stable_hash(&(self.current, self.definition.machine().hash_data(&self.data)))
    }
}

impl<M: Send + 'static> MonitorInstance<M> {
    fn handle_one(
        &mut self,
        envelope: Envelope,
        runtime: &Runtime,
        pending: &mut Option<Envelope>,
    ) {
        let ignores_unhandled = self.definition.machine().ignores_unhandled();
        let handler = self
            .definition
            .machine()
            .state(self.current)
            .handlers
            .get(&envelope.event_type())
            .map(|entry| entry.handler.clone());
        let control = match handler {
            Some(Handler::Do(action)) => self.invoke(&action, Some(&envelope), runtime),
            Some(Handler::Goto(target)) => self.goto(target, Some(&envelope), runtime),
            Some(Handler::Ignore) => None,
            Some(Handler::Push(_)) => runtime.fail(Error::internal(format!(
                "Monitor '{}' holds a push transition.",
                self.name()
            ))),
            None if ignores_unhandled => None,
            None => runtime.fail(self.error(
                ErrorKind::UnhandledEvent,
                format!(
                    "Monitor '{}' received event '{}' that cannot be handled.",
                    self.name(),
                    envelope.name()
                ),
            )),
        };
        *pending = self.apply(control, Some(&envelope), runtime);
    }
}
