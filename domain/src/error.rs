//! Error types for the `domain` layer.
use crate::gateway::{Error as GatewayError, GatewayErrorKind};
use saga::{Error as SagaError, SagaErrorKind};
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field holds the original error. Callers map the
/// kinds to their own responses without depending on `saga` or the gateways.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

/// Enum representing the various kinds of internal errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Workflow(WorkflowErrorKind),
    /// The request failed a domain check before anything was changed.
    Invalid(String),
    Other(String),
}

/// Outcome of a workflow that did not commit. Either way the operation did
/// not happen; `RollbackFailed` additionally means a compensation failed and
/// manual reconciliation may be required.
#[derive(Debug, PartialEq)]
pub enum WorkflowErrorKind {
    StepFailed { step: String },
    RollbackFailed { step: String },
}

/// Enum representing the various kinds of external errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    Collaborator(GatewayErrorKind),
}

impl Error {
    pub fn invalid(message: &str) -> Self {
        Error {
            source: None,
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Invalid(message.to_string())),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Error {
            source: Some(format!("{what} not found").into()),
            error_kind: DomainErrorKind::External(ExternalErrorKind::Collaborator(
                GatewayErrorKind::NotFound,
            )),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain Error: {self:?}")
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        let kind = err.error_kind;
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::External(ExternalErrorKind::Collaborator(kind)),
        }
    }
}

// This is where we translate errors from the `saga` layer to the `domain` layer.
impl From<SagaError> for Error {
    fn from(err: SagaError) -> Self {
        let error_kind = match &err.error_kind {
            SagaErrorKind::StepFailed { step } => {
                DomainErrorKind::Internal(InternalErrorKind::Workflow(
                    WorkflowErrorKind::StepFailed { step: step.clone() },
                ))
            }
            SagaErrorKind::RollbackFailed { step, .. } => {
                DomainErrorKind::Internal(InternalErrorKind::Workflow(
                    WorkflowErrorKind::RollbackFailed { step: step.clone() },
                ))
            }
            SagaErrorKind::AlreadyExecuted | SagaErrorKind::Response { .. } => {
                DomainErrorKind::Internal(InternalErrorKind::Other(err.to_string()))
            }
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Other(
                "Failed to serialize event payload".to_string(),
            )),
        }
    }
}
