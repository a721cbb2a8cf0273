//! Errors reported by the run operations.
//!
//! Two families exist. [`ConfigError`] is returned synchronously, before any
//! input is drawn or any task is started. [`RunError`] is the outcome of a run
//! that did start and carries the first task failure that ended it.

use thiserror::Error;

/// An invalid option value or combination, detected at call entry.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// A meter parameter that must be strictly positive was not.
    #[error("{name} must be > 0, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    /// A meter parameter exceeds what the underlying primitive can hold.
    #[error("{name} must be <= {max}, got {value}")]
    TooLarge {
        name: &'static str,
        value: usize,
        max: usize,
    },

    /// Captured outcomes have nowhere to go without a result sink.
    #[error("capture_outcome requires a result sink")]
    CaptureWithoutSink,
}

/// Reason a run ended before every input was processed.
///
/// `E` is the error type of the unit-of-work function.
#[derive(Debug, Error)]
pub enum RunError<E> {
    /// The run was rejected before it started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A unit of work returned an error and outcome capture was disabled.
    ///
    /// All other in-flight work of the run was canceled.
    #[error("task {index} failed: {source}")]
    Task {
        index: usize,
        #[source]
        source: E,
    },

    /// The receiving side of the result sink was dropped mid-run.
    #[error("result sink closed before the run finished")]
    SinkClosed,
}

impl<E> RunError<E> {
    /// Returns the unit-of-work error, if this run failed because of one.
    pub fn into_task_error(self) -> Option<E> {
        match self {
            RunError::Task { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Index of the input whose task failed, if any.
    #[must_use]
    pub fn task_index(&self) -> Option<usize> {
        match self {
            RunError::Task { index, .. } => Some(*index),
            _ => None,
        }
    }
}
