//! Run-state transitions across a subtree
//!
//! Processors depend on the controller services their properties
//! reference, and services may reference each other, which fixes the
//! order of operations:
//!
//! - enabling: a group's own services are enabled, dependencies first,
//!   before its processors; each referenced service is enabled before the
//!   processor using it starts
//! - disabling: services, owned or referenced, are disabled only after
//!   every processor and port of the subtree has stopped, dependents
//!   before the services they use, and each is awaited until it reports
//!   `DISABLED`
//!
//! Every component is re-read just before it is changed, and a component
//! already in the target state is left untouched, so applying the same
//! target twice issues no writes the second time.

use crate::controllers::await_disabled;
use crate::drain::DrainPolicy;
use crate::error::{ComponentKind, DeployError, Result};
use crate::walker::TreeWalker;
use nifi_client::{ClientError, FlowApi};
use nifi_types::{
    controller_refs, ControllerServiceEntity, ControllerServiceId, ControllerServiceUpdate,
    ControllerState, GroupId, PortKind, PortUpdate, ProcessorEntity, ProcessorUpdate, RunState,
};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Desired state for every processor and port of a subtree, and optionally
/// for the services they reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetState {
    pub run: RunState,
    pub controllers: Option<ControllerState>,
}

impl TargetState {
    pub fn new(run: RunState, controllers: Option<ControllerState>) -> Self {
        Self { run, controllers }
    }

    /// Start everything, enabling referenced services first
    pub fn running() -> Self {
        Self::new(RunState::Running, Some(ControllerState::Enabled))
    }

    /// Stop everything, then disable owned and referenced services
    pub fn stopped() -> Self {
        Self::new(RunState::Stopped, Some(ControllerState::Disabled))
    }

    fn enables_controllers(&self) -> bool {
        self.controllers == Some(ControllerState::Enabled)
    }

    fn disables_controllers(&self) -> bool {
        self.controllers == Some(ControllerState::Disabled)
    }
}

/// Counts of components changed or left alone by one [`StatusOrchestrator::apply`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionSummary {
    pub groups: usize,
    pub processors_changed: usize,
    pub ports_changed: usize,
    pub controllers_changed: usize,
    /// Components already in the target state, or disabled processors
    pub unchanged: usize,
}

impl TransitionSummary {
    pub fn changed(&self) -> usize {
        self.processors_changed + self.ports_changed + self.controllers_changed
    }
}

/// Applies a [`TargetState`] to a group and all of its descendants
pub struct StatusOrchestrator<'a> {
    api: &'a dyn FlowApi,
    settle: DrainPolicy,
}

impl<'a> StatusOrchestrator<'a> {
    pub fn new(api: &'a dyn FlowApi) -> Self {
        Self {
            api,
            settle: DrainPolicy::default(),
        }
    }

    /// How long to poll a disabled service before it reports `DISABLED`
    pub fn with_settle_policy(mut self, settle: DrainPolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Walk the subtree pre-order and move each component to `target`
    ///
    /// The first component that cannot be changed halts the walk with
    /// [`DeployError::Transition`]. Services to disable are collected in
    /// first-reference order, each group's own services after those its
    /// processors reference, and switched off once every processor of the
    /// subtree has stopped: a service shared with a processor that is
    /// still running cannot be disabled.
    #[instrument(skip(self), fields(group_id = %root))]
    pub async fn apply(&self, root: &GroupId, target: TargetState) -> Result<TransitionSummary> {
        let mut summary = TransitionSummary::default();
        let mut to_disable: Vec<(ControllerServiceId, String)> = Vec::new();

        let mut walker = TreeWalker::new(self.api, root.clone());
        while let Some(visit) = walker.next().await {
            let visit = visit?;
            summary.groups += 1;

            let owned = if target.controllers.is_some() {
                self.owned_services(visit.id()).await?
            } else {
                Vec::new()
            };
            if target.enables_controllers() {
                for service in dependency_order(owned.clone(), ControllerState::Enabled) {
                    self.transition(&service, ControllerState::Enabled, &visit.path, &mut summary)
                        .await?;
                }
            }

            for listed in &visit.flow.flow.processors {
                let processor = self
                    .api
                    .processor(&listed.id)
                    .await
                    .map_err(|e| transition_error(ComponentKind::Processor, listed, &visit.path, e))?;
                let references = controller_refs(processor.properties());

                if target.enables_controllers() {
                    for service in &references {
                        self.set_controller(service, ControllerState::Enabled, &visit.path, &mut summary)
                            .await?;
                    }
                }

                self.set_processor(&processor, target.run, &visit.path, &mut summary)
                    .await?;

                if target.disables_controllers() {
                    for service in references {
                        if !to_disable.iter().any(|(id, _)| id == &service) {
                            to_disable.push((service, visit.path.clone()));
                        }
                    }
                }
            }

            for (kind, listed) in visit.flow.ports() {
                let component = match kind {
                    PortKind::Input => ComponentKind::InputPort,
                    PortKind::Output => ComponentKind::OutputPort,
                };
                let port_error = |source| DeployError::Transition {
                    kind: component,
                    id: listed.id.to_string(),
                    name: listed.name().to_string(),
                    path: visit.path.clone(),
                    source,
                };

                let port = self.api.port(kind, &listed.id).await.map_err(port_error)?;
                if port.state() == target.run || port.state() == RunState::Disabled {
                    summary.unchanged += 1;
                    continue;
                }
                self.api
                    .update_port(kind, &PortUpdate::state(&port, target.run))
                    .await
                    .map_err(port_error)?;
                debug!(port_id = %port.id, name = port.name(), state = %target.run, "Port state changed");
                summary.ports_changed += 1;
            }

            if target.disables_controllers() {
                for service in owned {
                    if !to_disable.iter().any(|(id, _)| id == &service.id) {
                        to_disable.push((service.id, visit.path.clone()));
                    }
                }
            }
        }

        if !to_disable.is_empty() {
            let mut paths = HashMap::new();
            let mut services = Vec::new();
            for (id, path) in to_disable {
                if let Some(service) = self.fetch_service(&id, &path).await? {
                    services.push(service);
                }
                paths.insert(id, path);
            }
            for service in dependency_order(services, ControllerState::Disabled) {
                let path = paths.get(&service.id).map(String::as_str).unwrap_or_default();
                self.transition(&service, ControllerState::Disabled, path, &mut summary)
                    .await?;
            }
        }

        info!(
            groups = summary.groups,
            changed = summary.changed(),
            unchanged = summary.unchanged,
            target = %target.run,
            "State transition applied"
        );
        Ok(summary)
    }

    async fn set_processor(
        &self,
        processor: &ProcessorEntity,
        state: RunState,
        path: &str,
        summary: &mut TransitionSummary,
    ) -> Result<()> {
        if processor.state() == state {
            summary.unchanged += 1;
            return Ok(());
        }
        if processor.state() == RunState::Disabled {
            debug!(processor_id = %processor.id, name = processor.name(), "Processor is disabled, leaving it");
            summary.unchanged += 1;
            return Ok(());
        }

        self.api
            .update_processor(&ProcessorUpdate::state(processor, state))
            .await
            .map_err(|e| transition_error(ComponentKind::Processor, processor, path, e))?;
        debug!(processor_id = %processor.id, name = processor.name(), state = %state, "Processor state changed");
        summary.processors_changed += 1;
        Ok(())
    }

    /// Services whose owner is `group` itself, not an ancestor
    async fn owned_services(&self, group: &GroupId) -> Result<Vec<ControllerServiceEntity>> {
        Ok(self
            .api
            .group_controller_services(group)
            .await?
            .into_iter()
            .filter(|service| service.parent_group() == Some(group))
            .collect())
    }

    /// Current view of a service; ids that do not resolve are plain values
    async fn fetch_service(
        &self,
        id: &ControllerServiceId,
        path: &str,
    ) -> Result<Option<ControllerServiceEntity>> {
        match self.api.controller_service(id).await {
            Ok(service) => Ok(Some(service)),
            Err(e) if e.is_not_found() => {
                warn!(value = %id, path, "Property looks like a service id but no such service exists");
                Ok(None)
            }
            Err(source) => Err(DeployError::Transition {
                kind: ComponentKind::ControllerService,
                id: id.to_string(),
                name: String::new(),
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Move one referenced service to `state`
    async fn set_controller(
        &self,
        id: &ControllerServiceId,
        state: ControllerState,
        path: &str,
        summary: &mut TransitionSummary,
    ) -> Result<()> {
        match self.fetch_service(id, path).await? {
            Some(service) => self.transition(&service, state, path, summary).await,
            None => Ok(()),
        }
    }

    async fn transition(
        &self,
        service: &ControllerServiceEntity,
        state: ControllerState,
        path: &str,
        summary: &mut TransitionSummary,
    ) -> Result<()> {
        if service.state().satisfies(state) {
            if service.state() == ControllerState::Disabling {
                await_disabled(self.api, service.clone(), self.settle, path).await?;
            }
            summary.unchanged += 1;
            return Ok(());
        }

        let updated = self
            .api
            .update_controller_service(&ControllerServiceUpdate::state(service, state))
            .await
            .map_err(|source| DeployError::Transition {
                kind: ComponentKind::ControllerService,
                id: service.id.to_string(),
                name: service.name().to_string(),
                path: path.to_string(),
                source,
            })?;
        info!(service_id = %service.id, name = service.name(), from = %service.state(), to = %state, "Controller service state changed");
        if updated.state() == ControllerState::Disabling {
            await_disabled(self.api, updated, self.settle, path).await?;
        }
        summary.controllers_changed += 1;
        Ok(())
    }
}

/// Order services so that, within the set, a service is enabled after the
/// services it references and disabled before them
///
/// Ties keep their input order. A reference cycle is broken at the first
/// remaining service.
fn dependency_order(
    mut pending: Vec<ControllerServiceEntity>,
    target: ControllerState,
) -> Vec<ControllerServiceEntity> {
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let ready = pending.iter().position(|candidate| {
            pending
                .iter()
                .filter(|other| other.id != candidate.id)
                .all(|other| {
                    if target.is_enabled() {
                        !controller_refs(candidate.properties()).contains(&other.id)
                    } else {
                        !controller_refs(other.properties()).contains(&candidate.id)
                    }
                })
        });
        let index = ready.unwrap_or_else(|| {
            warn!(
                name = pending[0].name(),
                "Controller services reference each other in a cycle, taking the first"
            );
            0
        });
        ordered.push(pending.remove(index));
    }
    ordered
}

fn transition_error(
    kind: ComponentKind,
    processor: &ProcessorEntity,
    path: &str,
    source: ClientError,
) -> DeployError {
    DeployError::Transition {
        kind,
        id: processor.id.to_string(),
        name: processor.name().to_string(),
        path: path.to_string(),
        source,
    }
}
