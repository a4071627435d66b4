//! Error types and verdict taxonomy.
//!
//! Every failure a run can end with is an [`Error`] carrying an [`ErrorKind`].
//! The same type is used for configuration mistakes found while building a
//! machine definition and for bug verdicts found while exploring a schedule,
//! so a harness can match on one enum regardless of where the run stopped.
//!
//! # Categories
//!
//! - **Configuration**: invalid machine, monitor, or test configuration
//! - **Safety**: assertion failures and deadlocks
//! - **Liveness**: hot monitors that never cool down
//! - **Replay**: a recorded schedule could not be reproduced
//! - **Io**: reading or writing trace files
//! - **Internal**: scheduler bugs

use core::fmt;
use std::sync::Arc;

use crate::types::{ActorId, OperationId};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Configuration ===
    /// Invalid machine/monitor definition or invalid test configuration.
    Configuration,
    /// An event reached an actor with no handler for it and no ignore policy.
    UnhandledEvent,

    // === Safety ===
    /// An explicit assertion failed, or user code panicked.
    AssertionFailure,
    /// No operation is enabled while some are blocked on each other.
    DeadlockDetected,

    // === Liveness ===
    /// A hot monitor stayed hot across a repeating execution suffix.
    LivenessViolation,

    // === Replay ===
    /// A replayed decision is not available in the live execution.
    NonReproducibleReplay,
    /// A persisted trace could not be decoded.
    TraceFormat,

    // === I/O ===
    /// Reading or writing a trace file failed.
    Io,

    // === Internal ===
    /// Scheduler invariant broken (bug in lockstep itself).
    Internal,
}

impl ErrorKind {
    /// Returns the category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration | Self::UnhandledEvent => ErrorCategory::Configuration,
            Self::AssertionFailure | Self::DeadlockDetected => ErrorCategory::Safety,
            Self::LivenessViolation => ErrorCategory::Liveness,
            Self::NonReproducibleReplay | Self::TraceFormat => ErrorCategory::Replay,
            Self::Io => ErrorCategory::Io,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns how the test engine proceeds after a run ends with this kind.
    #[must_use]
    pub const fn run_disposition(&self) -> RunDisposition {
        match self {
            Self::AssertionFailure
            | Self::DeadlockDetected
            | Self::LivenessViolation
            | Self::UnhandledEvent => RunDisposition::NextSchedule,
            Self::NonReproducibleReplay => RunDisposition::AbortReplay,
            Self::Configuration | Self::TraceFormat | Self::Io | Self::Internal => {
                RunDisposition::AbortTest
            }
        }
    }

    /// Returns true if this kind is a program bug (as opposed to a harness
    /// or replay problem).
    #[must_use]
    pub const fn is_program_bug(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Safety | ErrorCategory::Liveness
        ) || matches!(self, Self::UnhandledEvent)
    }
}

/// High-level grouping of error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Definition or configuration mistakes.
    Configuration,
    /// Safety violations.
    Safety,
    /// Liveness violations.
    Liveness,
    /// Replay and trace-decoding failures.
    Replay,
    /// File I/O failures.
    Io,
    /// Scheduler bugs.
    Internal,
}

/// What the engine does after a run ends with an error.
///
/// Every verdict ends only the current run; this says whether exploring more
/// schedules is still meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunDisposition {
    /// Record the bug; backtracking or a fresh random run may continue.
    NextSchedule,
    /// The replayed program diverged; no further replay is possible.
    AbortReplay,
    /// The test itself is malformed; every schedule would fail the same way.
    AbortTest,
}

/// Diagnostic context attached to an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation that was running when the error was raised.
    pub operation: Option<OperationId>,
    /// The actor involved, if any.
    pub actor: Option<ActorId>,
    /// The machine or monitor state involved, if any.
    pub state: Option<String>,
    /// Index of the choice point at which the error was raised.
    pub choice_point: Option<usize>,
}

/// The main error type.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: ErrorContext,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext {
                operation: None,
                actor: None,
                state: None,
                choice_point: None,
            },
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Adds a message.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Replaces the structured context.
    #[must_use]
    pub fn with_context(mut self, ctx: ErrorContext) -> Self {
        self.context = ctx;
        self
    }

    /// Records the operation that raised the error.
    #[must_use]
    pub fn at_operation(mut self, operation: OperationId) -> Self {
        self.context.operation = Some(operation);
        self
    }

    /// Records the actor and state that raised the error.
    #[must_use]
    pub fn in_actor(mut self, actor: ActorId, state: impl Into<String>) -> Self {
        self.context.actor = Some(actor);
        self.context.state = Some(state.into());
        self
    }

    /// Records the choice point at which the error was raised.
    #[must_use]
    pub fn at_choice_point(mut self, index: usize) -> Self {
        self.context.choice_point = Some(index);
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the structured context.
    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration).with_message(detail)
    }

    /// Creates an assertion failure.
    #[must_use]
    pub fn assertion(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::AssertionFailure).with_message(detail)
    }

    /// Creates a deadlock verdict.
    #[must_use]
    pub fn deadlock(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlockDetected).with_message(detail)
    }

    /// Creates a liveness verdict.
    #[must_use]
    pub fn liveness(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::LivenessViolation).with_message(detail)
    }

    /// Creates a replay divergence error.
    #[must_use]
    pub fn non_reproducible(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NonReproducibleReplay).with_message(detail)
    }

    /// Creates an internal error (lockstep bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// A specialized Result type for lockstep operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::DeadlockDetected);
        assert_eq!(err.to_string(), "DeadlockDetected");
    }

    #[test]
    fn display_with_message() {
        let err = Error::assertion("Error reached.");
        assert_eq!(err.to_string(), "AssertionFailure: Error reached.");
        assert_eq!(err.message(), Some("Error reached."));
    }

    #[test]
    fn categories() {
        assert_eq!(
            ErrorKind::UnhandledEvent.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorKind::DeadlockDetected.category(), ErrorCategory::Safety);
        assert_eq!(
            ErrorKind::LivenessViolation.category(),
            ErrorCategory::Liveness
        );
        assert_eq!(
            ErrorKind::NonReproducibleReplay.category(),
            ErrorCategory::Replay
        );
    }

    #[test]
    fn dispositions() {
        assert_eq!(
            ErrorKind::AssertionFailure.run_disposition(),
            RunDisposition::NextSchedule
        );
        assert_eq!(
            ErrorKind::Configuration.run_disposition(),
            RunDisposition::AbortTest
        );
        assert_eq!(
            ErrorKind::NonReproducibleReplay.run_disposition(),
            RunDisposition::AbortReplay
        );
    }

    #[test]
    fn program_bug_classification() {
        assert!(ErrorKind::AssertionFailure.is_program_bug());
        assert!(ErrorKind::LivenessViolation.is_program_bug());
        assert!(ErrorKind::UnhandledEvent.is_program_bug());
        assert!(!ErrorKind::Configuration.is_program_bug());
        assert!(!ErrorKind::Io.is_program_bug());
    }

    #[test]
    fn context_builders() {
        let actor = ActorId::new(OperationId::new(2), "M");
        let err = Error::new(ErrorKind::UnhandledEvent)
            .in_actor(actor, "Init")
            .at_operation(OperationId::new(2))
            .at_choice_point(7);
        assert_eq!(err.context().actor, Some(actor));
        assert_eq!(err.context().state.as_deref(), Some("Init"));
        assert_eq!(err.context().operation, Some(OperationId::new(2)));
        assert_eq!(err.context().choice_point, Some(7));
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::new(ErrorKind::Io).with_source(Underlying);
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }
}
