//! CLI error types

use nifi_client::ClientError;
use nifi_deployment::DeployError;
use nifi_types::TemplateError;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine failure
    #[error(transparent)]
    Deploy(#[from] DeployError),

    /// Remote call made directly by a command
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Unreadable template artifact
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Name matches more than one resource where one is required
    #[error("{count} {kind}s are named '{name}'; rename one so the name is unique")]
    Ambiguous {
        kind: &'static str,
        name: String,
        count: usize,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Interrupted by the operator
    #[error("Cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Deploy(e) => e.exit_code(),
            CliError::InvalidInput(_) => 2,
            CliError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use nifi_types::GroupId;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::InvalidInput("no url".into()).exit_code(), 2);
        assert_eq!(CliError::Cancelled.exit_code(), 130);
        assert_eq!(CliError::NotFound("group".into()).exit_code(), 1);
        let ambiguous = CliError::Ambiguous {
            kind: "process group",
            name: "WebCrawler".into(),
            count: 2,
        };
        assert_eq!(ambiguous.exit_code(), 1);
        assert!(ambiguous.to_string().contains("2 process groups"));

        let removal = DeployError::Removal {
            group_id: GroupId::from("g-1"),
            name: "WebCrawler".into(),
            source: Box::new(DeployError::NotFound("connection".into())),
        };
        assert_eq!(CliError::from(removal).exit_code(), 3);
    }
}
