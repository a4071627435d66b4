//! Declarative state machine definitions.
//!
//! A definition is built once, validated, flattened, and then shared by every
//! instance of the machine. States may be nested in named groups and may
//! inherit from other states:
//!
//! - entry and exit actions are inherited and may be overridden,
//! - event handlers are inherited; the most-derived declaration wins,
//! - temperatures are inherited unless redeclared,
//! - the start flag is **not** inherited.
//!
//! Transition targets are resolved relative to the group of the state that
//! declares the handler, innermost group first, so `"S2"` declared inside
//! group `States2` means `States2.S2` when that exists and top-level `S2`
//! otherwise.
//!
//! # Example
//!
//! ```ignore
//! let def = StateMachineBuilder::<Client>::new("Client")
//!     .state("Init", |s| {
//!         s.start()
//!             .on_entry(|client, cx| cx.send_event(client.server, Ping))
//!             .on_event_goto::<Pong>("Done")
//!     })
//!     .state("Done", |s| s)
//!     .build()?;
//! ```

use core::fmt;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::context::Context;
use super::event::{short_type_name, Event};
use crate::error::{Error, Result};
use crate::monitor::{MonitorDefinition, Temperature};
use crate::util::DetHashMap;

/// An action run on state entry, state exit, or event receipt.
pub type Action<M> = Arc<dyn Fn(&mut M, &mut Context<'_>) + Send + Sync>;

type StateHasher<M> = Arc<dyn Fn(&M) -> u64 + Send + Sync>;

/// Position of a state in its flattened definition.
pub(crate) type StateIndex = usize;

/// A resolved event handler.
pub(crate) enum Handler<M> {
    Do(Action<M>),
    Goto(StateIndex),
    Push(StateIndex),
    Ignore,
}

impl<M> Clone for Handler<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Do(action) => Self::Do(Arc::clone(action)),
            Self::Goto(target) => Self::Goto(*target),
            Self::Push(target) => Self::Push(*target),
            Self::Ignore => Self::Ignore,
        }
    }
}

pub(crate) struct HandlerEntry<M> {
    pub(crate) event: &'static str,
    pub(crate) handler: Handler<M>,
}

impl<M> Clone for HandlerEntry<M> {
    fn clone(&self) -> Self {
        Self {
            event: self.event,
            handler: self.handler.clone(),
        }
    }
}

/// A flattened state: inherited members already merged in.
pub(crate) struct StateDescriptor<M> {
    pub(crate) name: String,
    pub(crate) temperature: Temperature,
    pub(crate) entry: Option<Action<M>>,
    pub(crate) exit: Option<Action<M>>,
    pub(crate) handlers: DetHashMap<TypeId, HandlerEntry<M>>,
    is_abstract: bool,
    scope: Vec<String>,
}

enum Transition<M> {
    Do(Action<M>),
    Goto(String),
    Push(String),
    Ignore,
}

struct StateDecl<M> {
    name: String,
    scope: Vec<String>,
    is_start: bool,
    is_abstract: bool,
    temperature: Option<Temperature>,
    base: Option<String>,
    entry: Option<Action<M>>,
    exit: Option<Action<M>>,
    handlers: Vec<(TypeId, &'static str, Transition<M>)>,
    errors: Vec<String>,
}

fn qualify(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{name}", scope.join("."))
    }
}

fn resolve_in_scope(
    index: &BTreeMap<String, StateIndex>,
    scope: &[String],
    target: &str,
) -> Option<StateIndex> {
    (0..=scope.len())
        .rev()
        .find_map(|depth| index.get(&qualify(&scope[..depth], target)).copied())
}

fn declare<M>(
    scope: &[String],
    name: &str,
    is_abstract: bool,
    configure: impl FnOnce(StateBuilder<M>) -> StateBuilder<M>,
) -> StateDecl<M> {
    let builder = StateBuilder {
        decl: StateDecl {
            name: qualify(scope, name),
            scope: scope.to_vec(),
            is_start: false,
            is_abstract,
            temperature: None,
            base: None,
            entry: None,
            exit: None,
            handlers: Vec::new(),
            errors: Vec::new(),
        },
    };
    configure(builder).decl
}

/// Configures one state.
pub struct StateBuilder<M> {
    decl: StateDecl<M>,
}

impl<M: 'static> StateBuilder<M> {
    /// Marks this as the start state.
    #[must_use]
    pub fn start(mut self) -> Self {
        self.decl.is_start = true;
        self
    }

    /// Marks this monitor state as hot: progress is still owed.
    #[must_use]
    pub fn hot(mut self) -> Self {
        self.decl.temperature = Some(Temperature::Hot);
        self
    }

    /// Marks this monitor state as cold, overriding an inherited hot mark.
    #[must_use]
    pub fn cold(mut self) -> Self {
        self.decl.temperature = Some(Temperature::Cold);
        self
    }

    /// Inherits entry, exit, handlers, and temperature from `base`.
    #[must_use]
    pub fn inherits(mut self, base: &str) -> Self {
        if self.decl.base.is_some() {
            let msg = format!("state '{}' declares more than one base state", self.decl.name);
            self.decl.errors.push(msg);
        }
        self.decl.base = Some(base.to_string());
        self
    }

    /// Sets the entry action.
    #[must_use]
    pub fn on_entry<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut M, &mut Context<'_>) + Send + Sync + 'static,
    {
        self.decl.entry = Some(Arc::new(action));
        self
    }

    /// Sets the exit action.
    #[must_use]
    pub fn on_exit<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut M, &mut Context<'_>) + Send + Sync + 'static,
    {
        self.decl.exit = Some(Arc::new(action));
        self
    }

    /// Runs `action` when an `E` is received in this state.
    #[must_use]
    pub fn on_event_do<E: Event, F>(self, action: F) -> Self
    where
        F: Fn(&mut M, &mut Context<'_>) + Send + Sync + 'static,
    {
        self.handler::<E>(Transition::Do(Arc::new(action)))
    }

    /// Moves to `target` when an `E` is received in this state.
    #[must_use]
    pub fn on_event_goto<E: Event>(self, target: &str) -> Self {
        self.handler::<E>(Transition::Goto(target.to_string()))
    }

    /// Pushes `target` on top of this state when an `E` is received.
    #[must_use]
    pub fn on_event_push<E: Event>(self, target: &str) -> Self {
        self.handler::<E>(Transition::Push(target.to_string()))
    }

    /// Drops `E` silently while in this state.
    #[must_use]
    pub fn ignore<E: Event>(self) -> Self {
        self.handler::<E>(Transition::Ignore)
    }

    fn handler<E: Event>(mut self, transition: Transition<M>) -> Self {
        let event_type = TypeId::of::<E>();
        let event = short_type_name(std::any::type_name::<E>());
        if self.decl.handlers.iter().any(|(id, _, _)| *id == event_type) {
            let msg = format!(
                "state '{}' declares more than one handler for event '{event}'",
                self.decl.name
            );
            self.decl.errors.push(msg);
        }
        self.decl.handlers.push((event_type, event, transition));
        self
    }
}

/// Collects the states of a named group.
pub struct GroupBuilder<M> {
    scope: Vec<String>,
    decls: Vec<StateDecl<M>>,
}

impl<M: 'static> GroupBuilder<M> {
    /// Declares a state inside this group.
    #[must_use]
    pub fn state(
        mut self,
        name: &str,
        configure: impl FnOnce(StateBuilder<M>) -> StateBuilder<M>,
    ) -> Self {
        self.decls.push(declare(&self.scope, name, false, configure));
        self
    }

    /// Declares a state that can only be inherited from.
    #[must_use]
    pub fn abstract_state(
        mut self,
        name: &str,
        configure: impl FnOnce(StateBuilder<M>) -> StateBuilder<M>,
    ) -> Self {
        self.decls.push(declare(&self.scope, name, true, configure));
        self
    }

    /// Declares a nested group.
    #[must_use]
    pub fn group(
        mut self,
        name: &str,
        configure: impl FnOnce(GroupBuilder<M>) -> GroupBuilder<M>,
    ) -> Self {
        let mut scope = self.scope.clone();
        scope.push(name.to_string());
        let nested = configure(GroupBuilder {
            scope,
            decls: Vec::new(),
        });
        self.decls.extend(nested.decls);
        self
    }
}

/// Builds a [`MachineDefinition`] or a [`MonitorDefinition`].
pub struct StateMachineBuilder<M> {
    name: &'static str,
    decls: Vec<StateDecl<M>>,
    ignore_unhandled: bool,
    hasher: Option<StateHasher<M>>,
}

impl<M: 'static> StateMachineBuilder<M> {
    /// Starts a definition named `name`.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            decls: Vec::new(),
            ignore_unhandled: false,
            hasher: None,
        }
    }

    /// Declares a top-level state.
    #[must_use]
    pub fn state(
        mut self,
        name: &str,
        configure: impl FnOnce(StateBuilder<M>) -> StateBuilder<M>,
    ) -> Self {
        self.decls.push(declare(&[], name, false, configure));
        self
    }

    /// Declares a top-level state that can only be inherited from.
    #[must_use]
    pub fn abstract_state(
        mut self,
        name: &str,
        configure: impl FnOnce(StateBuilder<M>) -> StateBuilder<M>,
    ) -> Self {
        self.decls.push(declare(&[], name, true, configure));
        self
    }

    /// Declares a top-level group of states.
    #[must_use]
    pub fn group(
        mut self,
        name: &str,
        configure: impl FnOnce(GroupBuilder<M>) -> GroupBuilder<M>,
    ) -> Self {
        let group = configure(GroupBuilder {
            scope: vec![name.to_string()],
            decls: Vec::new(),
        });
        self.decls.extend(group.decls);
        self
    }

    /// Drops events no state on the stack handles instead of reporting them.
    #[must_use]
    pub const fn ignore_unhandled(mut self) -> Self {
        self.ignore_unhandled = true;
        self
    }

    /// Includes a hash of the user data in state fingerprints.
    ///
    /// Without it, two instances that differ only in their data look the
    /// same to cycle detection.
    #[must_use]
    pub fn hashed_state<F>(mut self, hasher: F) -> Self
    where
        F: Fn(&M) -> u64 + Send + Sync + 'static,
    {
        self.hasher = Some(Arc::new(hasher));
        self
    }

    /// Validates and flattens a machine definition.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid definition.
    pub fn build(self) -> Result<Arc<MachineDefinition<M>>> {
        self.compile("machine", true).map(Arc::new)
    }

    /// Validates and flattens a monitor definition. Monitors cannot push.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid definition.
    pub fn build_monitor(self) -> Result<Arc<MonitorDefinition<M>>> {
        self.compile("monitor", false)
            .map(|machine| Arc::new(MonitorDefinition::new(machine)))
    }

    fn compile(self, label: &str, allow_push: bool) -> Result<MachineDefinition<M>> {
        let name = self.name;
        let fail = |detail: String| Err(Error::configuration(detail));

        if let Some(err) = self.decls.iter().flat_map(|d| d.errors.iter()).next() {
            return fail(format!("{label} '{name}': {err}"));
        }
        if self.decls.is_empty() {
            return fail(format!("{label} '{name}' must declare at least one state"));
        }

        let mut index = BTreeMap::new();
        for (i, decl) in self.decls.iter().enumerate() {
            if index.insert(decl.name.clone(), i).is_some() {
                return fail(format!(
                    "{label} '{name}' declares state '{}' more than once",
                    decl.name
                ));
            }
        }

        let starts: Vec<StateIndex> = (0..self.decls.len())
            .filter(|&i| self.decls[i].is_start)
            .collect();
        let start = match starts.as_slice() {
            [] => return fail(format!("{label} '{name}' must declare a start state")),
            [start] => *start,
            _ => {
                return fail(format!(
                    "{label} '{name}' can not declare more than one start state"
                ))
            }
        };
        if self.decls[start].is_abstract {
            return fail(format!(
                "start state '{}' of {label} '{name}' can not be abstract",
                self.decls[start].name
            ));
        }

        let mut bases = Vec::with_capacity(self.decls.len());
        for decl in &self.decls {
            let base = match &decl.base {
                None => None,
                Some(base) => match resolve_in_scope(&index, &decl.scope, base) {
                    Some(b) => Some(b),
                    None => {
                        return fail(format!(
                            "state '{}' of {label} '{name}' inherits from unknown state '{base}'",
                            decl.name
                        ))
                    }
                },
            };
            bases.push(base);
        }

        let mut chains = Vec::with_capacity(self.decls.len());
        for i in 0..self.decls.len() {
            let mut chain = vec![i];
            let mut cursor = bases[i];
            while let Some(parent) = cursor {
                if chain.contains(&parent) {
                    return fail(format!(
                        "state '{}' of {label} '{name}' has a cyclic inheritance chain",
                        self.decls[i].name
                    ));
                }
                chain.push(parent);
                cursor = bases[parent];
            }
            chain.reverse();
            chains.push(chain);
        }

        let mut resolved: Vec<Vec<(TypeId, HandlerEntry<M>)>> = Vec::new();
        for decl in &self.decls {
            let mut entries = Vec::with_capacity(decl.handlers.len());
            for (event_type, event, transition) in &decl.handlers {
                let target = |t: &str| -> Result<StateIndex> {
                    let Some(idx) = resolve_in_scope(&index, &decl.scope, t) else {
                        return Err(Error::configuration(format!(
                            "state '{}' of {label} '{name}' transitions to unknown state '{t}'",
                            decl.name
                        )));
                    };
                    if self.decls[idx].is_abstract {
                        return Err(Error::configuration(format!(
                            "state '{}' of {label} '{name}' can not transition to abstract state '{t}'",
                            decl.name
                        )));
                    }
                    Ok(idx)
                };
                let handler = match transition {
                    Transition::Do(action) => Handler::Do(Arc::clone(action)),
                    Transition::Goto(t) => Handler::Goto(target(t)?),
                    Transition::Push(t) if allow_push => Handler::Push(target(t)?),
                    Transition::Push(t) => {
                        return fail(format!(
                            "state '{}' of {label} '{name}' can not push state '{t}'",
                            decl.name
                        ))
                    }
                    Transition::Ignore => Handler::Ignore,
                };
                entries.push((*event_type, HandlerEntry { event, handler }));
            }
            resolved.push(entries);
        }

        let mut states = Vec::with_capacity(self.decls.len());
        for (i, decl) in self.decls.iter().enumerate() {
            let mut handlers = DetHashMap::default();
            let mut entry = None;
            let mut exit = None;
            let mut temperature = None;
            for &ancestor in &chains[i] {
                let a = &self.decls[ancestor];
                for (event_type, handler) in &resolved[ancestor] {
                    handlers.insert(*event_type, handler.clone());
                }
                if let Some(action) = &a.entry {
                    entry = Some(Arc::clone(action));
                }
                if let Some(action) = &a.exit {
                    exit = Some(Arc::clone(action));
                }
                if a.temperature.is_some() {
                    temperature = a.temperature;
                }
            }
            states.push(StateDescriptor {
                name: decl.name.clone(),
                temperature: temperature.unwrap_or_default(),
                entry,
                exit,
                handlers,
                is_abstract: decl.is_abstract,
                scope: decl.scope.clone(),
            });
        }

        tracing::trace!(
            definition = name,
            kind = label,
            states = states.len(),
            start = %states[start].name,
            "compiled state machine definition"
        );

        Ok(MachineDefinition {
            name,
            states,
            index,
            start,
            ignore_unhandled: self.ignore_unhandled,
            hasher: self.hasher,
        })
    }
}

/// A validated, flattened state machine.
pub struct MachineDefinition<M> {
    name: &'static str,
    states: Vec<StateDescriptor<M>>,
    index: BTreeMap<String, StateIndex>,
    start: StateIndex,
    ignore_unhandled: bool,
    hasher: Option<StateHasher<M>>,
}

impl<M> MachineDefinition<M> {
    /// The machine's name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Qualified name of the start state.
    #[must_use]
    pub fn start_state(&self) -> &str {
        &self.states[self.start].name
    }

    /// Qualified names of every declared state, in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|s| s.name.as_str())
    }

    /// Returns true if `state` has a handler for `E`, own or inherited.
    #[must_use]
    pub fn handles<E: Event>(&self, state: &str) -> bool {
        self.index
            .get(state)
            .is_some_and(|&i| self.states[i].handlers.contains_key(&TypeId::of::<E>()))
    }

    /// Returns true if `state` is hot, own or inherited.
    #[must_use]
    pub fn is_hot(&self, state: &str) -> bool {
        self.index
            .get(state)
            .is_some_and(|&i| self.states[i].temperature == Temperature::Hot)
    }

    pub(crate) const fn start_index(&self) -> StateIndex {
        self.start
    }

    pub(crate) const fn ignores_unhandled(&self) -> bool {
        self.ignore_unhandled
    }

    pub(crate) fn state(&self, index: StateIndex) -> &StateDescriptor<M> {
        &self.states[index]
    }

    /// Resolves `target` as seen from the group of state `from`.
    pub(crate) fn resolve(&self, from: StateIndex, target: &str) -> Option<StateIndex> {
        let idx = resolve_in_scope(&self.index, &self.states[from].scope, target)?;
        (!self.states[idx].is_abstract).then_some(idx)
    }

    pub(crate) fn hash_data(&self, data: &M) -> u64 {
        self.hasher.as_ref().map_or(0, |hash| hash(data))
    }
}

impl<M> fmt::Debug for MachineDefinition<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineDefinition")
            .field("name", &self.name)
            .field("start", &self.states[self.start].name)
            .field("states", &self.states.len())
            .field("ignore_unhandled", &self.ignore_unhandled)
            .finish_non_exhaustive()
    }
}
