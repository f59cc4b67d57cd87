//! CLI command implementations

pub mod deploy;
pub mod inspect;
pub mod status;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use nifi_client::{FlowApi, NifiClient};
use nifi_deployment::{find_group_by_name, LookupOutcome};
use nifi_types::SearchHit;

/// Build the HTTP client for an endpoint given on the command line or in config
pub fn connect(url: Option<&str>, config: &CliConfig) -> CliResult<NifiClient> {
    let endpoint = config.endpoint(url)?;
    Ok(NifiClient::new(&endpoint, config.request_timeout())?)
}

/// Resolve a group by exact name; an ambiguous name resolves to the first match
pub async fn resolve_group(api: &dyn FlowApi, name: &str) -> CliResult<SearchHit> {
    find_group_by_name(api, name)
        .await?
        .first("process group", name)
        .ok_or_else(|| CliError::NotFound(format!("process group '{}'", name)))
}

/// Resolve a group that must be named by exactly one match
pub async fn resolve_unique_group(api: &dyn FlowApi, name: &str) -> CliResult<SearchHit> {
    match find_group_by_name(api, name).await? {
        LookupOutcome::Unique(hit) => Ok(hit),
        LookupOutcome::Missing => Err(CliError::NotFound(format!("process group '{}'", name))),
        LookupOutcome::Ambiguous(all) => Err(CliError::Ambiguous {
            kind: "process group",
            name: name.to_string(),
            count: all.len(),
        }),
    }
}
