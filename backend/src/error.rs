//! Error types shared by collections and the gateway

use std::fmt;
use std::time::Duration;

use crate::domain::{ItemId, ValidationErrors};

/// Errors raised by a document collection backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectionError {
    #[error("item {0} not found")]
    NotFound(ItemId),

    #[error("collection unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("malformed document: {0}")]
    Decode(String),
}

pub type CollectionResult<T> = Result<T, CollectionError>;

/// Why a gateway read or write failed
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    NotFound(ItemId),
    Timeout(Duration),
    Backend(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::NotFound(id) => write!(f, "item {id} not found"),
            FailureCause::Timeout(after) => write!(f, "timed out after {}ms", after.as_millis()),
            FailureCause::Backend(msg) => f.write_str(msg),
        }
    }
}

impl From<CollectionError> for FailureCause {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::NotFound(id) => FailureCause::NotFound(id),
            other => FailureCause::Backend(other.to_string()),
        }
    }
}

/// Labeled failure returned by every gateway operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to read items: {0}")]
    ReadFailure(FailureCause),

    #[error("failed to write item: {0}")]
    WriteFailure(FailureCause),

    #[error("invalid item: {0}")]
    Invalid(ValidationErrors),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::ReadFailure(FailureCause::NotFound(_))
                | GatewayError::WriteFailure(FailureCause::NotFound(_))
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            GatewayError::ReadFailure(FailureCause::Timeout(_))
                | GatewayError::WriteFailure(FailureCause::Timeout(_))
        )
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_keeps_id() {
        let cause = FailureCause::from(CollectionError::NotFound(ItemId::new("x1")));
        let err = GatewayError::WriteFailure(cause);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "failed to write item: item x1 not found");
    }

    #[test]
    fn test_backend_errors_become_messages() {
        let cause = FailureCause::from(CollectionError::Unavailable("offline".into()));
        assert_eq!(cause, FailureCause::Backend("collection unavailable: offline".into()));
    }

    #[test]
    fn test_timeout_display() {
        let err = GatewayError::ReadFailure(FailureCause::Timeout(Duration::from_millis(1500)));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "failed to read items: timed out after 1500ms");
    }
}
