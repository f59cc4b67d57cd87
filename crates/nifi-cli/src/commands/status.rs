//! Run-state command for a deployed group

use crate::commands::{connect, resolve_unique_group};
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::{print_output, OutputFormat};
use clap::{ArgGroup, Args};
use nifi_client::FlowApi;
use nifi_deployment::{StatusOrchestrator, TargetState, TransitionSummary};
use nifi_types::{ControllerState, RunState, SearchHit};
use serde::Serialize;
use tabled::Tabled;

/// Start or stop every processor and port of a group and its descendants
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("run").required(true).args(["start", "stop"])))]
#[command(group(ArgGroup::new("services").args(["enable", "disable"])))]
pub struct StatusArgs {
    /// NiFi API root, e.g. http://localhost:8080/nifi-api
    #[arg(short = 'u', long = "url", env = "NIFI_DEPLOY_URL")]
    pub url: Option<String>,

    /// Process group name; must match exactly one group
    #[arg(short = 'p', long = "process-group")]
    pub group: String,

    /// Start processors and ports; referenced services are enabled first
    #[arg(long)]
    pub start: bool,

    /// Stop processors and ports
    #[arg(long)]
    pub stop: bool,

    /// Enable referenced controller services
    #[arg(long)]
    pub enable: bool,

    /// Disable referenced controller services once their users have stopped
    #[arg(long, conflicts_with = "start")]
    pub disable: bool,
}

impl StatusArgs {
    /// Starting always enables services; processors cannot run without them
    pub fn target(&self) -> TargetState {
        if self.start {
            return TargetState::running();
        }
        let controllers = if self.enable {
            Some(ControllerState::Enabled)
        } else if self.disable {
            Some(ControllerState::Disabled)
        } else {
            None
        };
        TargetState::new(RunState::Stopped, controllers)
    }
}

/// Table row for a state transition
#[derive(Debug, Serialize, Tabled)]
struct TransitionRow {
    group: String,
    target: String,
    groups: usize,
    processors: usize,
    ports: usize,
    services: usize,
    unchanged: usize,
}

impl TransitionRow {
    fn new(group: &str, target: TargetState, summary: &TransitionSummary) -> Self {
        Self {
            group: group.to_string(),
            target: target.run.to_string(),
            groups: summary.groups,
            processors: summary.processors_changed,
            ports: summary.ports_changed,
            services: summary.controllers_changed,
            unchanged: summary.unchanged,
        }
    }
}

/// Resolve the group and drive it to the requested state
///
/// Nothing is mutated unless the name identifies exactly one group.
pub async fn apply(
    api: &dyn FlowApi,
    args: &StatusArgs,
    config: &CliConfig,
) -> CliResult<(SearchHit, TargetState, TransitionSummary)> {
    let group = resolve_unique_group(api, &args.group).await?;
    let target = args.target();

    let summary = StatusOrchestrator::new(api)
        .with_settle_policy(config.drain_policy())
        .apply(&group.id, target)
        .await?;
    Ok((group, target, summary))
}

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &CliConfig, format: OutputFormat) -> CliResult<()> {
    let client = connect(args.url.as_deref(), config)?;
    let (group, target, summary) = apply(&client, &args, config).await?;
    print_output(vec![TransitionRow::new(&group.name, target, &summary)], format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use nifi_client::InMemoryFlowServer;

    fn args(start: bool, enable: bool, disable: bool) -> StatusArgs {
        StatusArgs {
            url: None,
            group: "WebCrawler".into(),
            start,
            stop: !start,
            enable,
            disable,
        }
    }

    #[test]
    fn test_start_enables_services() {
        assert_eq!(args(true, false, false).target(), TargetState::running());
    }

    #[test]
    fn test_stop_leaves_services_unless_asked() {
        assert_eq!(
            args(false, false, false).target(),
            TargetState::new(RunState::Stopped, None)
        );
        assert_eq!(args(false, false, true).target(), TargetState::stopped());
        assert_eq!(
            args(false, true, false).target(),
            TargetState::new(RunState::Stopped, Some(ControllerState::Enabled))
        );
    }

    #[tokio::test]
    async fn test_ambiguous_group_is_rejected_before_any_change() {
        let server = InMemoryFlowServer::new();
        server.seed(|b| {
            let root = b.root();
            let live = b.add_group(&root, "WebCrawler");
            b.add_processor(&live, "FetchPage", RunState::Running, &[]);
            let archive = b.add_group(&root, "Archive");
            let old = b.add_group(&archive, "WebCrawler");
            b.add_processor(&old, "FetchPage", RunState::Running, &[]);
        });

        let err = apply(&server, &args(false, false, false), &CliConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Ambiguous { count: 2, .. }));
        assert_eq!(err.exit_code(), 1);
        assert!(server.mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unique_group_is_stopped() {
        let server = InMemoryFlowServer::new();
        let group = server.seed(|b| {
            let root = b.root();
            let group = b.add_group(&root, "WebCrawler");
            b.add_processor(&group, "FetchPage", RunState::Running, &[]);
            b.add_group(&root, "WebCrawler Archive");
            group
        });

        let (hit, target, summary) =
            apply(&server, &args(false, false, false), &CliConfig::default())
                .await
                .unwrap();
        assert_eq!(hit.id, group);
        assert_eq!(target.run, RunState::Stopped);
        assert_eq!(summary.processors_changed, 1);
    }
}
