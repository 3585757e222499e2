//! Error types for the `saga` crate.

use std::error::Error as StdError;
use std::fmt;

/// Boxed error returned by forward and compensating actions.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Top-level saga error. For `StepFailed` and `RollbackFailed` the `source`
/// is the original error of the forward action that failed, so callers can
/// inspect or downcast it.
#[derive(Debug)]
pub struct Error {
    pub source: Option<BoxError>,
    pub error_kind: SagaErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum SagaErrorKind {
    /// A forward action failed and every compensation succeeded. The
    /// workflow did not happen.
    StepFailed { step: String },
    /// A forward action failed and at least one compensation failed too. The
    /// workflow did not happen, but manual reconciliation may be required.
    RollbackFailed {
        step: String,
        failed_compensations: Vec<String>,
    },
    /// The workflow was already executed.
    AlreadyExecuted,
    /// A captured response is missing or has an unexpected shape.
    Response { step: String },
}

impl Error {
    pub fn is_rollback_failed(&self) -> bool {
        matches!(self.error_kind, SagaErrorKind::RollbackFailed { .. })
    }

    /// Name of the step whose forward action failed.
    pub fn failed_step(&self) -> Option<&str> {
        match &self.error_kind {
            SagaErrorKind::StepFailed { step } | SagaErrorKind::RollbackFailed { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }

    /// The original forward-action error, if it is of type `E`.
    pub fn step_error<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.as_ref().and_then(|e| e.downcast_ref::<E>())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            SagaErrorKind::StepFailed { step } => write!(f, "Saga step '{step}' failed")?,
            SagaErrorKind::RollbackFailed {
                step,
                failed_compensations,
            } => write!(
                f,
                "Saga step '{step}' failed and rollback failed for {failed_compensations:?}"
            )?,
            SagaErrorKind::AlreadyExecuted => write!(f, "Saga workflow already executed")?,
            SagaErrorKind::Response { step } => {
                write!(f, "Saga response of step '{step}' unavailable")?
            }
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

pub(crate) fn step_failed(step: &str, source: BoxError) -> Error {
    Error {
        source: Some(source),
        error_kind: SagaErrorKind::StepFailed {
            step: step.to_string(),
        },
    }
}

pub(crate) fn rollback_failed(step: &str, failed_compensations: Vec<String>, source: BoxError) -> Error {
    Error {
        source: Some(source),
        error_kind: SagaErrorKind::RollbackFailed {
            step: step.to_string(),
            failed_compensations,
        },
    }
}

pub(crate) fn response_error(step: &str, source: Option<BoxError>) -> Error {
    Error {
        source,
        error_kind: SagaErrorKind::Response {
            step: step.to_string(),
        },
    }
}
