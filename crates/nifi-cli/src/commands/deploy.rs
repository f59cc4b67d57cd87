//! Template deployment command

use crate::commands::connect;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::{print_info, print_single, print_success, OutputFormat};
use clap::Args;
use nifi_deployment::{DeployOptions, DeployReport, PropertySections, TemplateDeployer};
use nifi_types::{GroupId, TemplateArtifact};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Replace the deployed instance of a template with a new version
#[derive(Debug, Args)]
pub struct DeployArgs {
    /// NiFi API root, e.g. http://localhost:8080/nifi-api
    #[arg(short = 'u', long = "url", env = "NIFI_DEPLOY_URL")]
    pub url: Option<String>,

    /// Template XML file
    #[arg(short = 't', long = "template")]
    pub template: PathBuf,

    /// Start processors and ports once configured
    #[arg(long)]
    pub start: bool,

    /// Sensitive processor properties (overrides the configured file)
    #[arg(long, value_name = "FILE")]
    pub sensitive: Option<PathBuf>,

    /// Controller service sections (overrides the configured directory)
    #[arg(long, value_name = "DIR")]
    pub controllers: Option<PathBuf>,
}

/// Execute the deploy command
pub async fn execute(args: DeployArgs, config: &CliConfig, format: OutputFormat) -> CliResult<()> {
    let client = connect(args.url.as_deref(), config)?;
    let artifact = TemplateArtifact::load(&args.template)?;

    // An explicit file must exist; the configured default may be absent
    let secrets = match &args.sensitive {
        Some(path) => PropertySections::load_file(path)?,
        None => PropertySections::load_optional_file(&config.sensitive_file())?,
    };
    let controllers = PropertySections::load_dir(
        &args.controllers.clone().unwrap_or_else(|| config.controller_dir()),
    )?;
    debug!(
        secrets = secrets.len(),
        controllers = controllers.len(),
        "Property sections loaded"
    );

    if format == OutputFormat::Table {
        print_info(&format!(
            "Deploying '{}' as group '{}'...",
            artifact.name, artifact.group_name
        ));
    }

    let deployer = TemplateDeployer::new(Arc::new(client))
        .with_controller_sections(controllers)
        .with_sensitive_sections(secrets);
    let options = DeployOptions::default()
        .with_start(args.start)
        .with_drain(config.drain_policy());
    let report = deployer
        .deploy(&artifact, &GroupId::root(), &options)
        .await?;

    match format {
        OutputFormat::Table => print_report(&report),
        _ => print_single(&report, format)?,
    }
    Ok(())
}

fn print_report(report: &DeployReport) {
    if let Some(old) = &report.removed_group {
        println!("  Removed group: {}", old);
    }
    println!("  Template: {} ({})", report.template_name, report.template_id);
    println!(
        "  Group: {} ({}) at ({:.0}, {:.0})",
        report.group_name, report.group_id, report.origin.x, report.origin.y
    );
    println!("  Sensitive updates: {}", report.sensitive_updates);
    if !report.configured_services.is_empty() {
        println!("  Configured services: {}", report.configured_services.join(", "));
    }
    if !report.provisioned_services.is_empty() {
        println!("  Provisioned services: {}", report.provisioned_services.join(", "));
    }
    if report.started {
        print_success(&format!("Group '{}' deployed and started", report.group_name));
    } else {
        print_success(&format!("Group '{}' deployed (stopped)", report.group_name));
    }
}
