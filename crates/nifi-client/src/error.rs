//! Client error types

use nifi_types::TemplateError;
use thiserror::Error;

/// Errors raised by remote resource calls
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response
    #[error("API error on {resource}: {status} - {message}")]
    Api {
        resource: String,
        status: u16,
        message: String,
    },

    /// The resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write rejected because the supplied revision is stale
    #[error("Revision conflict on {resource}: {status} - {message}")]
    RevisionConflict {
        resource: String,
        status: u16,
        message: String,
    },

    /// Write rejected by the server's current component state
    #[error("Conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    pub fn is_revision_conflict(&self) -> bool {
        matches!(self, ClientError::RevisionConflict { .. })
    }

    /// Whether re-reading the resource and repeating the write may succeed
    pub fn is_retryable(&self) -> bool {
        self.is_revision_conflict()
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } | ClientError::RevisionConflict { status, .. } => {
                Some(*status)
            }
            ClientError::NotFound(_) => Some(404),
            ClientError::Conflict { .. } => Some(409),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_revision_conflicts_are_retryable() {
        let stale = ClientError::RevisionConflict {
            resource: "/processors/p".into(),
            status: 400,
            message: "not the most up-to-date revision".into(),
        };
        let busy = ClientError::Conflict {
            resource: "/process-groups/g".into(),
            message: "has running components".into(),
        };
        assert!(stale.is_retryable());
        assert!(!busy.is_retryable());
        assert_eq!(stale.status(), Some(400));
        assert_eq!(busy.status(), Some(409));
    }
}
