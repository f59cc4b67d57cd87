//! CLI configuration

use crate::error::{CliError, CliResult};
use nifi_deployment::DrainPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONTROLLER_DIR: &str = "config/controller";
const DEFAULT_SENSITIVE_FILE: &str = "config/sensitive.toml";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// NiFi API root, e.g. `http://localhost:8080/nifi-api`
    pub endpoint: Option<String>,

    /// Directory of controller service sections (`*.toml`)
    pub controller_dir: Option<PathBuf>,

    /// Sections of sensitive processor properties
    pub sensitive_file: Option<PathBuf>,

    /// Seconds between drop request polls
    pub drain_poll_seconds: Option<u64>,

    /// Upper bound on a drain in seconds; 0 waits indefinitely
    pub drain_timeout_seconds: Option<u64>,

    /// Request timeout in seconds
    pub timeout_seconds: Option<u64>,
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: CliConfig =
                toml::from_str(&contents).map_err(|e| CliError::Config(e.to_string()))?;
            Ok(config)
        } else {
            Ok(CliConfig::default())
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> CliResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CliError::Config("Cannot find config directory".into()))?;
        Ok(config_dir.join("nifi-deploy").join("config.toml"))
    }

    /// Endpoint from the command line, falling back to the file
    pub fn endpoint(&self, flag: Option<&str>) -> CliResult<String> {
        flag.map(str::to_string)
            .or_else(|| self.endpoint.clone())
            .ok_or_else(|| {
                CliError::InvalidInput("-u URL is required when no endpoint is configured".into())
            })
    }

    pub fn controller_dir(&self) -> PathBuf {
        self.controller_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTROLLER_DIR))
    }

    pub fn sensitive_file(&self) -> PathBuf {
        self.sensitive_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SENSITIVE_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }

    pub fn drain_policy(&self) -> DrainPolicy {
        let defaults = DrainPolicy::default();
        let poll_interval = self
            .drain_poll_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);
        let timeout = match self.drain_timeout_seconds {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.timeout,
        };
        DrainPolicy::new(poll_interval, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert!(config.endpoint.is_none());
        assert_eq!(config.controller_dir(), PathBuf::from("config/controller"));
        assert_eq!(config.sensitive_file(), PathBuf::from("config/sensitive.toml"));
        assert_eq!(config.drain_policy(), DrainPolicy::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_missing_config() {
        // Should return default config when file doesn't exist
        let config = CliConfig::load(Some("/nonexistent/path/config.toml")).unwrap();
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
endpoint = "http://nifi.internal:8080/nifi-api"
controller_dir = "/etc/nifi-deploy/controller"
drain_poll_seconds = 1
drain_timeout_seconds = 0
"#
        )
        .unwrap();

        let config = CliConfig::load(file.path().to_str()).unwrap();
        assert_eq!(
            config.endpoint(None).unwrap(),
            "http://nifi.internal:8080/nifi-api"
        );
        assert_eq!(
            config.controller_dir(),
            PathBuf::from("/etc/nifi-deploy/controller")
        );
        let policy = config.drain_policy();
        assert_eq!(policy.poll_interval, Duration::from_secs(1));
        assert_eq!(policy.timeout, None);
    }

    #[test]
    fn test_flag_overrides_configured_endpoint() {
        let config = CliConfig {
            endpoint: Some("http://configured:8080/nifi-api".into()),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint(Some("http://flag:8080/nifi-api")).unwrap(),
            "http://flag:8080/nifi-api"
        );
    }

    #[test]
    fn test_missing_endpoint_is_usage_error() {
        let err = CliConfig::default().endpoint(None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "drain_poll_seconds = \"soon\"").unwrap();
        let err = CliConfig::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
