//! Deployment error types

use nifi_client::ClientError;
use nifi_types::{ConnectionId, GroupId, TemplateError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Kind of component a state transition was applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Processor,
    InputPort,
    OutputPort,
    ControllerService,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentKind::Processor => "processor",
            ComponentKind::InputPort => "input port",
            ComponentKind::OutputPort => "output port",
            ComponentKind::ControllerService => "controller service",
        };
        f.write_str(label)
    }
}

/// Deployment errors
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Remote call failed: {0}")]
    Remote(#[from] ClientError),

    /// A group of the subtree could not be read; the walk stops here
    #[error("Cannot read group {group_id} at '{path}': {source}")]
    Walk {
        group_id: GroupId,
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Cannot change {kind} '{name}' ({id}) in '{path}': {source}")]
    Transition {
        kind: ComponentKind,
        id: String,
        name: String,
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Drop request on connection {connection} failed: {reason}")]
    Drain {
        connection: ConnectionId,
        reason: String,
    },

    #[error("Timed out after {elapsed:?} waiting for {operation}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("Removing group '{name}' ({group_id}) failed: {source}")]
    Removal {
        group_id: GroupId,
        name: String,
        #[source]
        source: Box<DeployError>,
    },

    #[error("Uploading template '{name}' failed: {source}")]
    Upload {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("Instantiating template '{name}' failed: {source}")]
    Instantiate {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

impl DeployError {
    /// Process exit code for this class of failure
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::Removal { .. } => 3,
            DeployError::Upload { .. } | DeployError::Instantiate { .. } => 4,
            _ => 1,
        }
    }

    /// Whether the failure was a stale revision somewhere along the chain
    pub fn is_revision_conflict(&self) -> bool {
        match self {
            DeployError::Remote(e)
            | DeployError::Walk { source: e, .. }
            | DeployError::Transition { source: e, .. }
            | DeployError::Upload { source: e, .. }
            | DeployError::Instantiate { source: e, .. } => e.is_revision_conflict(),
            DeployError::Removal { source, .. } => source.is_revision_conflict(),
            _ => false,
        }
    }
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;
