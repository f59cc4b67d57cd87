//! Template replace-and-instantiate workflow
//!
//! Redeploying a template is a sequence of destructive steps against a
//! live server:
//!
//! 1. find the group the previous deployment created (exact name)
//! 2. stop it, drain its queues and delete it
//! 3. replace the uploaded template of the same name
//! 4. instantiate the new template onto the canvas
//! 5. inject secrets and configure controller services in the new subtree
//! 6. optionally start everything
//!
//! There is no rollback: a failure after step 2 leaves the old group gone.

use crate::controllers::{ControllerResolver, ResolveSummary};
use crate::drain::{DrainPolicy, DrainSummary, QueueDrainer};
use crate::error::{DeployError, Result};
use crate::lookup::{find_group_by_name, find_template_by_name};
use crate::sections::PropertySections;
use crate::sensitive::SensitiveInjector;
use crate::status::{StatusOrchestrator, TargetState, TransitionSummary};
use crate::walker::TreeWalker;
use nifi_client::FlowApi;
use nifi_types::{GroupId, InstantiateTemplateRequest, Position, TemplateArtifact, TemplateId};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Canvas placement range for new groups along each axis
const ORIGIN_RANGE: f64 = 200.0;

/// Options for one deployment run
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Start processors and ports once configured
    pub start: bool,
    /// Bounds the wait for queues of the old group to empty, and for
    /// disabled services to settle
    pub drain: DrainPolicy,
    /// Canvas position of the new group; random when unset
    pub origin: Option<Position>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            start: false,
            drain: DrainPolicy::default(),
            origin: None,
        }
    }
}

impl DeployOptions {
    pub fn with_start(mut self, start: bool) -> Self {
        self.start = start;
        self
    }

    pub fn with_drain(mut self, drain: DrainPolicy) -> Self {
        self.drain = drain;
        self
    }

    pub fn with_origin(mut self, origin: Position) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// What a deployment run did
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub template_name: String,
    pub group_name: String,
    /// Group deleted to make room, if one existed
    pub removed_group: Option<GroupId>,
    pub template_id: TemplateId,
    pub group_id: GroupId,
    pub origin: Position,
    /// Processors given secrets
    pub sensitive_updates: usize,
    /// Services configured from their sections
    pub configured_services: Vec<String>,
    /// Required services created at controller scope
    pub provisioned_services: Vec<String>,
    pub started: bool,
}

/// Replaces a deployed template instance with a new version
pub struct TemplateDeployer {
    api: Arc<dyn FlowApi>,
    controllers: PropertySections,
    secrets: PropertySections,
}

impl TemplateDeployer {
    pub fn new(api: Arc<dyn FlowApi>) -> Self {
        Self {
            api,
            controllers: PropertySections::new(),
            secrets: PropertySections::new(),
        }
    }

    /// Settings applied to controller services, keyed by service name
    pub fn with_controller_sections(mut self, sections: PropertySections) -> Self {
        self.controllers = sections;
        self
    }

    /// Secrets applied to processors, keyed by processor name
    pub fn with_sensitive_sections(mut self, sections: PropertySections) -> Self {
        self.secrets = sections;
        self
    }

    /// Deploy `artifact` under `parent`, replacing any previous instance
    #[instrument(skip(self, artifact, options), fields(template = %artifact.name, parent = %parent))]
    pub async fn deploy(
        &self,
        artifact: &TemplateArtifact,
        parent: &GroupId,
        options: &DeployOptions,
    ) -> Result<DeployReport> {
        let api = self.api.as_ref();

        // Remove the previous instance
        let removed_group = match find_group_by_name(api, &artifact.group_name)
            .await?
            .first("process group", &artifact.group_name)
        {
            Some(existing) => {
                info!(group_id = %existing.id, name = %existing.name, "Existing group found, removing");
                self.remove_group(&existing.id, &existing.name, options.drain)
                    .await?;
                Some(existing.id)
            }
            None => {
                info!(name = %artifact.group_name, "No existing group");
                None
            }
        };

        // Swap the uploaded template
        if let Some(old) = find_template_by_name(api, &artifact.name)
            .await?
            .first("template", &artifact.name)
        {
            match api.delete_template(&old.id).await {
                Ok(()) => info!(template_id = %old.id, "Previous template deleted"),
                Err(e) => warn!(template_id = %old.id, error = %e, "Could not delete previous template"),
            }
        }

        let uploaded = api
            .upload_template(parent, artifact)
            .await
            .map_err(|source| DeployError::Upload {
                name: artifact.name.clone(),
                source,
            })?;
        info!(template_id = %uploaded.id, "Template uploaded");

        // Place the new instance
        let origin = options.origin.unwrap_or_else(random_origin);
        let instantiated = api
            .instantiate_template(parent, &InstantiateTemplateRequest::new(uploaded.id.clone(), origin))
            .await
            .map_err(|source| DeployError::Instantiate {
                name: artifact.name.clone(),
                source,
            })?;
        let group_id = instantiated
            .root_group()
            .map(|group| group.id.clone())
            .ok_or_else(|| {
                DeployError::NotFound(format!(
                    "process group in instantiated template '{}'",
                    artifact.name
                ))
            })?;
        info!(group_id = %group_id, x = origin.x, y = origin.y, "Template instantiated");

        let configured = self.configure_with(&group_id, options.drain).await?;

        if options.start {
            info!(group_id = %group_id, "Starting processors and ports");
            self.set_state(&group_id, TargetState::running()).await?;
        }

        info!(group_id = %group_id, started = options.start, "Deployment complete");
        Ok(DeployReport {
            template_name: artifact.name.clone(),
            group_name: artifact.group_name.clone(),
            removed_group,
            template_id: uploaded.id,
            group_id,
            origin,
            sensitive_updates: configured.sensitive_updates,
            configured_services: configured.services.configured,
            provisioned_services: configured.services.provisioned,
            started: options.start,
        })
    }

    /// Stop, drain and delete a group
    ///
    /// Every failure on the way is reported as [`DeployError::Removal`].
    #[instrument(skip(self, drain), fields(group_id = %group))]
    pub async fn remove_group(&self, group: &GroupId, name: &str, drain: DrainPolicy) -> Result<DrainSummary> {
        let removal = |source: DeployError| DeployError::Removal {
            group_id: group.clone(),
            name: name.to_string(),
            source: Box::new(source),
        };
        let api = self.api.as_ref();

        StatusOrchestrator::new(api)
            .with_settle_policy(drain)
            .apply(group, TargetState::stopped())
            .await
            .map_err(removal)?;

        let drained = QueueDrainer::new(api, drain)
            .drain_group(group)
            .await
            .map_err(removal)?;

        let current = api
            .process_group(group)
            .await
            .map_err(|e| removal(e.into()))?;
        api.delete_process_group(group, &current.revision)
            .await
            .map_err(|e| removal(e.into()))?;

        info!(name, "Group removed");
        Ok(drained)
    }

    /// Inject secrets and configure services in every group of the subtree
    pub async fn configure(&self, root: &GroupId) -> Result<ConfigureSummary> {
        self.configure_with(root, DrainPolicy::default()).await
    }

    async fn configure_with(&self, root: &GroupId, settle: DrainPolicy) -> Result<ConfigureSummary> {
        let api = self.api.as_ref();
        let injector = SensitiveInjector::new(api, &self.secrets);
        let resolver = ControllerResolver::new(api, &self.controllers).with_settle_policy(settle);
        let mut summary = ConfigureSummary::default();

        let mut walker = TreeWalker::new(api, root.clone());
        while let Some(visit) = walker.next().await {
            let visit = visit?;
            summary.sensitive_updates += injector.inject_group(visit.id(), &visit.path).await?;
            let services = resolver.configure_group(visit.id(), &visit.path).await?;
            summary.services.merge(services);
        }
        Ok(summary)
    }

    /// Apply a run state to a deployed group
    pub async fn set_state(&self, group: &GroupId, target: TargetState) -> Result<TransitionSummary> {
        StatusOrchestrator::new(self.api.as_ref())
            .apply(group, target)
            .await
    }
}

/// What the configuration pass did across a subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureSummary {
    pub sensitive_updates: usize,
    pub services: ResolveSummary,
}

fn random_origin() -> Position {
    let mut rng = rand::thread_rng();
    Position {
        x: rng.gen_range(0.0..ORIGIN_RANGE),
        y: rng.gen_range(0.0..ORIGIN_RANGE),
    }
}
