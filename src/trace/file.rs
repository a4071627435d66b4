//! Trace file format for persisting and loading schedule traces.
//!
//! A trace file is a small JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "decisions": [
//!     { "choice_point": 0, "choice": { "operation": 1 } },
//!     { "choice_point": 1, "choice": { "boolean": true } }
//!   ]
//! }
//! ```
//!
//! The version is checked on load; anything other than
//! [`TRACE_FILE_VERSION`] is rejected.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::schedule::{Decision, ScheduleTrace};
use crate::error::{Error, ErrorKind};

/// Current trace file schema version.
pub const TRACE_FILE_VERSION: u32 = 1;

/// Errors that can occur when reading or writing trace files.
#[derive(Debug, thiserror::Error)]
pub enum TraceFileError {
    /// Underlying I/O failure.
    #[error("trace file i/o error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON.
    #[error("trace file decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Version mismatch.
    #[error("incompatible trace version: expected {expected}, found {found}")]
    IncompatibleVersion {
        /// Expected schema version.
        expected: u32,
        /// Found schema version.
        found: u32,
    },
}

impl From<TraceFileError> for Error {
    fn from(err: TraceFileError) -> Self {
        let kind = match &err {
            TraceFileError::Io(_) => ErrorKind::Io,
            TraceFileError::Json(_) | TraceFileError::IncompatibleVersion { .. } => {
                ErrorKind::TraceFormat
            }
        };
        Self::new(kind).with_message(err.to_string()).with_source(err)
    }
}

#[derive(Serialize, Deserialize)]
struct TraceDocument {
    version: u32,
    decisions: Vec<Decision>,
}

/// Serializes a trace to its JSON document form.
pub fn to_json(trace: &ScheduleTrace) -> Result<String, TraceFileError> {
    let doc = TraceDocument {
        version: TRACE_FILE_VERSION,
        decisions: trace.decisions().to_vec(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Parses a trace from its JSON document form.
pub fn from_json(json: &str) -> Result<ScheduleTrace, TraceFileError> {
    let doc: TraceDocument = serde_json::from_str(json)?;
    if doc.version != TRACE_FILE_VERSION {
        return Err(TraceFileError::IncompatibleVersion {
            expected: TRACE_FILE_VERSION,
            found: doc.version,
        });
    }
    Ok(ScheduleTrace::from_decisions(doc.decisions))
}

/// Writes a trace to `path`, replacing any existing file.
pub fn save_trace(path: impl AsRef<Path>, trace: &ScheduleTrace) -> Result<(), TraceFileError> {
    let json = to_json(trace)?;
    fs::write(path.as_ref(), json)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        decisions = trace.len(),
        "saved schedule trace"
    );
    Ok(())
}

/// Reads a trace previously written by [`save_trace`].
pub fn load_trace(path: impl AsRef<Path>) -> Result<ScheduleTrace, TraceFileError> {
    let json = fs::read_to_string(path.as_ref())?;
    from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Choice;
    use crate::types::OperationId;

    fn sample() -> ScheduleTrace {
        let mut trace = ScheduleTrace::new();
        trace.push(Choice::Operation(OperationId::new(0)));
        trace.push(Choice::Operation(OperationId::new(1)));
        trace.push(Choice::Integer(3));
        trace
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.json");
        let trace = sample();
        save_trace(&path, &trace).expect("save");
        let loaded = load_trace(&path).expect("load");
        assert_eq!(loaded, trace);
    }

    #[test]
    fn rejects_unknown_version() {
        let json = r#"{"version": 99, "decisions": []}"#;
        match from_json(json) {
            Err(TraceFileError::IncompatibleVersion { expected, found }) => {
                assert_eq!(expected, TRACE_FILE_VERSION);
                assert_eq!(found, 99);
            }
            other => panic!("expected version error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_maps_to_trace_format() {
        let err = from_json("{ not json").expect_err("must fail");
        let err: Error = err.into();
        assert_eq!(err.kind(), ErrorKind::TraceFormat);
    }

    #[test]
    fn missing_file_maps_to_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_trace(dir.path().join("absent.json")).expect_err("must fail");
        let err: Error = err.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
