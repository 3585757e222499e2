//! Error types for the `delivery` crate.
//!
//! Follows the layered pattern used across the workspace: a root `Error`
//! struct holding an error kind and an optional source for chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for the delivery core.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the delivery core.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Registry(RegistryErrorKind),
    Queue(QueueErrorKind),
    Seal(SealErrorKind),
}

/// Errors from the connection registry. Capacity is the only domain error;
/// every other registry input succeeds.
#[derive(Debug, PartialEq)]
pub enum RegistryErrorKind {
    CapacityExceeded,
}

/// Errors from the offline queue bridge. Both are recoverable: the caller may
/// retry or accept the loss for ephemeral events.
#[derive(Debug, PartialEq)]
pub enum QueueErrorKind {
    PublishFailed,
    DrainFailed,
}

/// Errors from sealing or opening payloads.
#[derive(Debug, PartialEq)]
pub enum SealErrorKind {
    KeyInvalid,
    SealFailed,
    OpenFailed,
    Malformed,
}

impl Error {
    pub fn is_capacity_exceeded(&self) -> bool {
        self.error_kind == ErrorKind::Registry(RegistryErrorKind::CapacityExceeded)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Registry(kind) => write!(f, "Registry error: {:?}", kind)?,
            ErrorKind::Queue(kind) => write!(f, "Queue error: {:?}", kind)?,
            ErrorKind::Seal(kind) => write!(f, "Seal error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
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

/// Helper function to create registry errors.
pub fn registry_error(kind: RegistryErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Registry(kind),
    }
}

/// Helper function to create queue errors, keeping the broker error as source.
pub fn queue_error<E>(kind: QueueErrorKind, source: E) -> Error
where
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    Error {
        source: Some(source.into()),
        error_kind: ErrorKind::Queue(kind),
    }
}

impl From<crate::seal::SealError> for Error {
    fn from(err: crate::seal::SealError) -> Self {
        use crate::seal::SealError;

        let kind = match &err {
            SealError::InvalidKey | SealError::HexDecode(_) => SealErrorKind::KeyInvalid,
            SealError::SealFailed => SealErrorKind::SealFailed,
            SealError::OpenFailed => SealErrorKind::OpenFailed,
            SealError::Base64Decode(_) | SealError::CiphertextTooShort | SealError::Json(_) => {
                SealErrorKind::Malformed
            }
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Seal(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_is_detectable() {
        let err = registry_error(RegistryErrorKind::CapacityExceeded, "mobile is full");
        assert!(err.is_capacity_exceeded());
        assert_eq!(
            err.to_string(),
            "Registry error: CapacityExceeded (mobile is full)"
        );
    }

    #[test]
    fn queue_error_keeps_source() {
        let err = queue_error(QueueErrorKind::PublishFailed, "broker down");
        assert!(!err.is_capacity_exceeded());
        assert_eq!(
            StdError::source(&err).map(|s| s.to_string()),
            Some("broker down".to_string())
        );
    }
}
