//! Controller service configuration and dependency resolution
//!
//! Services arrive from a template without environment-specific settings.
//! For each service a group owns or its processors reference, the resolver
//! looks up a settings section, writes it, makes sure any service named by
//! a `_requires_service` directive exists and is enabled, and finally
//! enables the service itself.
//!
//! A service that was enabled is disabled first and polled until it
//! reports `DISABLED`; the server rejects property writes while it is still
//! `DISABLING`.
//!
//! Required services are shared infrastructure: a missing one is created
//! once, at controller scope, from its own section (whose `type` key gives
//! the component type). An existing one is enabled if needed but never
//! recreated.

use crate::drain::DrainPolicy;
use crate::error::{ComponentKind, DeployError, Result};
use crate::sections::{PropertySections, Section, REQUIRES_SERVICE, TYPE_KEY};
use nifi_client::{ClientError, FlowApi};
use nifi_types::{
    controller_refs, ControllerScope, ControllerServiceEntity, ControllerServiceId,
    ControllerServiceUpdate, ControllerState, GroupId, NewControllerService, PropertyValue,
};
use std::collections::HashSet;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Service property naming the settings section to use instead of the
/// service's display name
pub const CONFIG_SECTION: &str = "config_section";

/// What one [`ControllerResolver::configure_group`] call did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Names of services whose section was applied
    pub configured: Vec<String>,
    /// Names of required services created at controller scope
    pub provisioned: Vec<String>,
    /// Services without a section, left for the start pass
    pub skipped: usize,
}

impl ResolveSummary {
    pub(crate) fn merge(&mut self, other: ResolveSummary) {
        self.configured.extend(other.configured);
        self.provisioned.extend(other.provisioned);
        self.skipped += other.skipped;
    }
}

pub struct ControllerResolver<'a> {
    api: &'a dyn FlowApi,
    sections: &'a PropertySections,
    settle: DrainPolicy,
}

impl<'a> ControllerResolver<'a> {
    pub fn new(api: &'a dyn FlowApi, sections: &'a PropertySections) -> Self {
        Self {
            api,
            sections,
            settle: DrainPolicy::default(),
        }
    }

    /// How long to poll a disabled service before it reports `DISABLED`
    pub fn with_settle_policy(mut self, settle: DrainPolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Configure the services owned by `group` and those its processors use
    #[instrument(skip(self), fields(group_id = %group))]
    pub async fn configure_group(&self, group: &GroupId, path: &str) -> Result<ResolveSummary> {
        let mut summary = ResolveSummary::default();

        for service in self.candidates(group).await? {
            let section_name = service
                .properties()
                .get(CONFIG_SECTION)
                .and_then(PropertyValue::as_str)
                .unwrap_or_else(|| service.name())
                .to_string();

            let Some((matched, section)) = self.sections.find(&section_name) else {
                debug!(name = service.name(), section = %section_name, "No settings for service, skipping");
                summary.skipped += 1;
                continue;
            };

            info!(name = service.name(), section = matched, "Configuring controller service");
            let provisioned = self.configure_service(&service, section, group, path).await?;
            summary.merge(provisioned);
            summary.configured.push(service.name().to_string());
        }

        Ok(summary)
    }

    /// Owned services first, then referenced ones, without duplicates
    async fn candidates(&self, group: &GroupId) -> Result<Vec<ControllerServiceEntity>> {
        let mut candidates: Vec<ControllerServiceEntity> = self
            .api
            .group_controller_services(group)
            .await?
            .into_iter()
            .filter(|service| service.parent_group() == Some(group))
            .collect();

        for processor in self.api.processors(group).await? {
            for id in controller_refs(processor.properties()) {
                if candidates.iter().any(|c| c.id == id) {
                    continue;
                }
                match self.api.controller_service(&id).await {
                    Ok(service) => candidates.push(service),
                    Err(e) if e.is_not_found() => {
                        debug!(processor = processor.name(), value = %id, "Value is not a service id");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(candidates)
    }

    async fn configure_service(
        &self,
        service: &ControllerServiceEntity,
        section: &Section,
        group: &GroupId,
        path: &str,
    ) -> Result<ResolveSummary> {
        let mut summary = ResolveSummary::default();
        let fail = |source| service_error(&service.id, service.name(), path, source);

        let mut current = self.api.controller_service(&service.id).await.map_err(fail)?;
        if current.state().is_enabled() {
            debug!(name = current.name(), "Disabling service before changing its settings");
            current = self
                .api
                .update_controller_service(&ControllerServiceUpdate::state(
                    &current,
                    ControllerState::Disabled,
                ))
                .await
                .map_err(fail)?;
        }
        if current.state() != ControllerState::Disabled {
            current = await_disabled(self.api, current, self.settle, path).await?;
        }

        let properties = section.properties();
        if !properties.is_empty() {
            current = self
                .api
                .update_controller_service(&ControllerServiceUpdate::properties(&current, properties))
                .await
                .map_err(fail)?;
        }

        if let Some(required) = section.directive(REQUIRES_SERVICE) {
            summary.provisioned = self
                .ensure_service(required, service.name(), group, path)
                .await?;
            current = self.api.controller_service(&service.id).await.map_err(fail)?;
        }

        if !current.state().satisfies(ControllerState::Enabled) {
            self.api
                .update_controller_service(&ControllerServiceUpdate::state(
                    &current,
                    ControllerState::Enabled,
                ))
                .await
                .map_err(fail)?;
        }
        Ok(summary)
    }

    /// Make sure `name` and everything it transitively requires exists and
    /// is enabled, returning the names of services created
    ///
    /// `origin` is the service being configured; a chain leading back to it
    /// is cut there.
    async fn ensure_service(
        &self,
        name: &str,
        origin: &str,
        group: &GroupId,
        path: &str,
    ) -> Result<Vec<String>> {
        // Dependency chain, requirer first
        let mut chain: Vec<String> = Vec::new();
        let mut seen = HashSet::from([origin.to_string()]);
        let mut next = Some(name.to_string());
        while let Some(current) = next.take() {
            if !seen.insert(current.clone()) {
                warn!(service = %current, "Required services form a cycle, stopping there");
                break;
            }
            next = self
                .sections
                .find(&current)
                .and_then(|(_, section)| section.directive(REQUIRES_SERVICE))
                .map(str::to_string);
            chain.push(current);
        }

        let mut created = Vec::new();
        for required in chain.iter().rev() {
            if self.provide_service(required, group, path).await? {
                created.push(required.clone());
            }
        }
        Ok(created)
    }

    /// Enable an existing service named `name`, or create and enable it;
    /// returns whether it was created
    async fn provide_service(&self, name: &str, group: &GroupId, path: &str) -> Result<bool> {
        if let Some(existing) = self.find_service(name, group).await? {
            if !existing.state().is_enabled() {
                info!(name, "Enabling required service");
                self.api
                    .update_controller_service(&ControllerServiceUpdate::state(
                        &existing,
                        ControllerState::Enabled,
                    ))
                    .await
                    .map_err(|source| service_error(&existing.id, name, path, source))?;
            }
            return Ok(false);
        }

        let (_, section) = self.sections.find(name).ok_or_else(|| {
            DeployError::Config(format!(
                "required service '{}' does not exist and has no settings section",
                name
            ))
        })?;
        let kind = section.get(TYPE_KEY).map(str::to_string);
        let mut properties = section.properties();
        properties.remove(TYPE_KEY);

        let created = self
            .api
            .create_controller_service(
                &ControllerScope::Global,
                &NewControllerService::new(name, kind, properties),
            )
            .await
            .map_err(|source| DeployError::Transition {
                kind: ComponentKind::ControllerService,
                id: String::new(),
                name: name.to_string(),
                path: path.to_string(),
                source,
            })?;
        info!(name, service_id = %created.id, "Required service created at controller scope");

        self.api
            .update_controller_service(&ControllerServiceUpdate::state(
                &created,
                ControllerState::Enabled,
            ))
            .await
            .map_err(|source| service_error(&created.id, name, path, source))?;
        Ok(true)
    }

    /// First service called `name`, checking controller scope before the
    /// group's own scope
    async fn find_service(&self, name: &str, group: &GroupId) -> Result<Option<ControllerServiceEntity>> {
        let global = self.api.global_controller_services().await?;
        if let Some(found) = global.into_iter().find(|s| s.name() == name) {
            return Ok(Some(found));
        }
        let scoped = self.api.group_controller_services(group).await?;
        Ok(scoped.into_iter().find(|s| s.name() == name))
    }
}

/// Poll a service until it reports `DISABLED`
///
/// Bounded by the policy's timeout like a queue drain.
pub(crate) async fn await_disabled(
    api: &dyn FlowApi,
    service: ControllerServiceEntity,
    policy: DrainPolicy,
    path: &str,
) -> Result<ControllerServiceEntity> {
    let started = Instant::now();
    let deadline = policy.timeout.map(|t| started + t);
    let mut current = service;
    while current.state() != ControllerState::Disabled {
        if let Some(deadline) = deadline {
            if Instant::now() + policy.poll_interval > deadline {
                warn!(service_id = %current.id, name = current.name(), state = %current.state(), "Service did not disable in time");
                return Err(DeployError::Timeout {
                    operation: format!("controller service '{}' to disable", current.name()),
                    elapsed: started.elapsed(),
                });
            }
        }
        debug!(service_id = %current.id, name = current.name(), state = %current.state(), "Waiting for service to disable");
        tokio::time::sleep(policy.poll_interval).await;
        let id = current.id.clone();
        current = api
            .controller_service(&id)
            .await
            .map_err(|source| service_error(&id, current.name(), path, source))?;
    }
    Ok(current)
}

fn service_error(id: &ControllerServiceId, name: &str, path: &str, source: ClientError) -> DeployError {
    DeployError::Transition {
        kind: ComponentKind::ControllerService,
        id: id.to_string(),
        name: name.to_string(),
        path: path.to_string(),
        source,
    }
}
