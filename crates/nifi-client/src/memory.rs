//! In-memory implementation of [`FlowApi`]
//!
//! Suitable for development and testing. The server keeps the same rules the
//! real control plane enforces on the paths the engine uses:
//!
//! - every write is checked against the component's current revision
//! - a processor cannot start while a service it references is disabled
//! - a service cannot be disabled while a running processor references it
//! - a service rejects property changes until it is fully disabled
//! - a group cannot be deleted while it has running processors or ports,
//!   queued data, or services of its own that are not disabled
//! - template names are unique
//!
//! Disabling a service can be made to linger in `DISABLING` for a number of
//! reads with [`InMemoryFlowServer::with_disable_polls`], the way a real
//! service waits for its in-flight work before it reports `DISABLED`.
//!
//! Every mutating call (and every drop-request poll) is appended to a call
//! log so tests can assert on ordering and call counts.

use crate::api::FlowApi;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use nifi_types::*;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Display name of the root canvas group
pub const ROOT_GROUP_NAME: &str = "NiFi Flow";

/// A recorded remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    UpdateProcessorState {
        id: ProcessorId,
        name: String,
        state: RunState,
    },
    UpdateProcessorProperties {
        id: ProcessorId,
        name: String,
        keys: Vec<String>,
    },
    UpdatePortState {
        id: PortId,
        state: RunState,
    },
    UpdateControllerState {
        id: ControllerServiceId,
        name: String,
        state: ControllerState,
    },
    UpdateControllerProperties {
        id: ControllerServiceId,
        name: String,
        keys: Vec<String>,
    },
    CreateControllerService {
        name: String,
        scope: ControllerScope,
    },
    CreateDropRequest {
        connection: ConnectionId,
    },
    PollDropRequest {
        connection: ConnectionId,
    },
    DeleteDropRequest {
        connection: ConnectionId,
    },
    DeleteProcessGroup {
        id: GroupId,
        name: String,
    },
    DeleteTemplate {
        id: TemplateId,
        name: String,
    },
    UploadTemplate {
        name: String,
    },
    InstantiateTemplate {
        template: String,
        group: GroupId,
    },
}

impl ApiCall {
    /// Whether the call changes server state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ApiCall::PollDropRequest { .. })
    }
}

/// Operations that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    DeleteProcessGroup,
    CreateDropRequest,
    UpdatePort,
    UploadTemplate,
    InstantiateTemplate,
}

/// Callback that materializes a template's contents into its new group
pub type Blueprint = Arc<dyn Fn(&mut FlowBuilder<'_>, &GroupId) + Send + Sync>;

struct GroupRecord {
    entity: ProcessGroupEntity,
    children: Vec<GroupId>,
    processors: Vec<ProcessorId>,
    input_ports: Vec<PortId>,
    output_ports: Vec<PortId>,
    connections: Vec<ConnectionId>,
}

struct DropRecord {
    connection: ConnectionId,
    polls_left: usize,
    finished: bool,
    original_count: u64,
}

struct TemplateRecord {
    summary: TemplateSummary,
    group_name: String,
}

struct FlowState {
    root: GroupId,
    groups: HashMap<GroupId, GroupRecord>,
    group_order: Vec<GroupId>,
    processors: HashMap<ProcessorId, ProcessorEntity>,
    ports: HashMap<PortId, PortEntity>,
    connections: HashMap<ConnectionId, ConnectionEntity>,
    controllers: HashMap<ControllerServiceId, ControllerServiceEntity>,
    controller_order: Vec<ControllerServiceId>,
    templates: Vec<TemplateRecord>,
    blueprints: HashMap<String, Blueprint>,
    positions: HashMap<GroupId, Position>,
    drops: HashMap<DropRequestId, DropRecord>,
    drop_polls: usize,
    disable_polls: usize,
    /// Services still `DISABLING`, with the reads left before they settle
    settling: HashMap<ControllerServiceId, usize>,
    failures: HashSet<FailurePoint>,
    unreadable: HashSet<GroupId>,
    calls: Vec<ApiCall>,
}

impl FlowState {
    fn new() -> Self {
        let root = GroupId::generate();
        let mut state = Self {
            root: root.clone(),
            groups: HashMap::new(),
            group_order: Vec::new(),
            processors: HashMap::new(),
            ports: HashMap::new(),
            connections: HashMap::new(),
            controllers: HashMap::new(),
            controller_order: Vec::new(),
            templates: Vec::new(),
            blueprints: HashMap::new(),
            positions: HashMap::new(),
            drops: HashMap::new(),
            drop_polls: 0,
            disable_polls: 0,
            settling: HashMap::new(),
            failures: HashSet::new(),
            unreadable: HashSet::new(),
            calls: Vec::new(),
        };
        state.insert_group(root, ROOT_GROUP_NAME, None);
        state
    }

    fn insert_group(&mut self, id: GroupId, name: &str, parent: Option<&GroupId>) {
        let entity = ProcessGroupEntity {
            id: id.clone(),
            revision: Revision::new(0),
            component: ProcessGroupComponent {
                id: id.clone(),
                name: name.to_string(),
                parent_group_id: parent.cloned(),
            },
        };
        self.groups.insert(
            id.clone(),
            GroupRecord {
                entity,
                children: Vec::new(),
                processors: Vec::new(),
                input_ports: Vec::new(),
                output_ports: Vec::new(),
                connections: Vec::new(),
            },
        );
        self.group_order.push(id.clone());
        if let Some(parent) = parent.and_then(|p| self.groups.get_mut(p)) {
            parent.children.push(id);
        }
    }

    fn resolve(&self, id: &GroupId) -> GroupId {
        if id == &GroupId::root() {
            self.root.clone()
        } else {
            id.clone()
        }
    }

    fn fail_if(&self, point: FailurePoint, resource: &str) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(ClientError::Api {
                resource: resource.to_string(),
                status: 500,
                message: format!("injected failure: {:?}", point),
            });
        }
        Ok(())
    }

    /// Advance a lingering disable by one read
    fn settle(&mut self, id: &ControllerServiceId) {
        let Some(left) = self.settling.get_mut(id) else {
            return;
        };
        if *left > 0 {
            *left -= 1;
            return;
        }
        self.settling.remove(id);
        if let Some(service) = self.controllers.get_mut(id) {
            service.component.state = ControllerState::Disabled;
        }
    }

    fn group(&self, id: &GroupId) -> Result<&GroupRecord> {
        self.groups
            .get(id)
            .ok_or_else(|| ClientError::NotFound(format!("/process-groups/{}", id)))
    }

    fn breadcrumb(&self, id: &GroupId) -> Breadcrumb {
        let record = self.groups.get(id);
        let name = record.map(|r| r.entity.name().to_string()).unwrap_or_default();
        let parent = record.and_then(|r| r.entity.component.parent_group_id.clone());
        Breadcrumb {
            id: id.clone(),
            breadcrumb: Some(BreadcrumbName {
                id: id.clone(),
                name,
            }),
            parent_breadcrumb: parent.map(|p| Box::new(self.breadcrumb(&p))),
        }
    }

    fn flow_of(&self, id: &GroupId) -> Result<ProcessGroupFlow> {
        let record = self.group(id)?;
        let flow = FlowContents {
            process_groups: record
                .children
                .iter()
                .filter_map(|c| self.groups.get(c).map(|g| g.entity.clone()))
                .collect(),
            processors: record
                .processors
                .iter()
                .filter_map(|p| self.processors.get(p).cloned())
                .collect(),
            input_ports: record
                .input_ports
                .iter()
                .filter_map(|p| self.ports.get(p).cloned())
                .collect(),
            output_ports: record
                .output_ports
                .iter()
                .filter_map(|p| self.ports.get(p).cloned())
                .collect(),
            connections: record
                .connections
                .iter()
                .filter_map(|c| self.connections.get(c).cloned())
                .collect(),
        };
        Ok(ProcessGroupFlow {
            id: id.clone(),
            parent_group_id: record.entity.component.parent_group_id.clone(),
            breadcrumb: Some(self.breadcrumb(id)),
            flow,
        })
    }

    /// Group ids of the subtree rooted at `id`, parent first
    fn subtree(&self, id: &GroupId) -> Vec<GroupId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(record) = self.groups.get(&next) {
                stack.extend(record.children.iter().rev().cloned());
                out.push(next);
            }
        }
        out
    }

    /// Whether `group` is `ancestor` or lies below it
    fn is_within(&self, group: &GroupId, ancestor: &GroupId) -> bool {
        let mut current = Some(group.clone());
        while let Some(id) = current {
            if &id == ancestor {
                return true;
            }
            current = self
                .groups
                .get(&id)
                .and_then(|g| g.entity.component.parent_group_id.clone());
        }
        false
    }

    fn running_referrers(&self, service: &ControllerServiceId) -> Vec<String> {
        self.processors
            .values()
            .filter(|p| p.state() == RunState::Running)
            .filter(|p| controller_refs(p.properties()).contains(service))
            .map(|p| p.name().to_string())
            .collect()
    }
}

fn check_revision(resource: &str, current: &Revision, supplied: &Revision) -> Result<()> {
    if current.version != supplied.version {
        return Err(ClientError::RevisionConflict {
            resource: resource.to_string(),
            status: 400,
            message: format!(
                "revision {} is not the most up-to-date revision ({})",
                supplied.version, current.version
            ),
        });
    }
    Ok(())
}

fn conflict(resource: String, message: impl Into<String>) -> ClientError {
    ClientError::Conflict {
        resource,
        message: message.into(),
    }
}

fn to_properties(pairs: &[(&str, &str)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), PropertyValue::from(*v)))
        .collect()
}

/// Mutable view used to seed the server and to materialize blueprints
pub struct FlowBuilder<'a> {
    state: &'a mut FlowState,
}

impl FlowBuilder<'_> {
    pub fn root(&self) -> GroupId {
        self.state.root.clone()
    }

    pub fn add_group(&mut self, parent: &GroupId, name: &str) -> GroupId {
        let id = GroupId::generate();
        let parent = self.state.resolve(parent);
        self.state.insert_group(id.clone(), name, Some(&parent));
        id
    }

    pub fn add_processor(
        &mut self,
        group: &GroupId,
        name: &str,
        state: RunState,
        properties: &[(&str, &str)],
    ) -> ProcessorId {
        let id = ProcessorId::generate();
        let entity = ProcessorEntity {
            id: id.clone(),
            revision: Revision::new(0),
            component: ProcessorComponent {
                id: id.clone(),
                name: name.to_string(),
                kind: None,
                state,
                config: ProcessorConfig {
                    properties: to_properties(properties),
                },
            },
        };
        self.state.processors.insert(id.clone(), entity);
        let group = self.state.resolve(group);
        if let Some(record) = self.state.groups.get_mut(&group) {
            record.processors.push(id.clone());
        }
        id
    }

    pub fn add_port(&mut self, group: &GroupId, kind: PortKind, name: &str, state: RunState) -> PortId {
        let id = PortId::generate();
        let entity = PortEntity {
            id: id.clone(),
            revision: Revision::new(0),
            component: PortComponent {
                id: id.clone(),
                name: name.to_string(),
                state,
            },
        };
        self.state.ports.insert(id.clone(), entity);
        let group = self.state.resolve(group);
        if let Some(record) = self.state.groups.get_mut(&group) {
            match kind {
                PortKind::Input => record.input_ports.push(id.clone()),
                PortKind::Output => record.output_ports.push(id.clone()),
            }
        }
        id
    }

    pub fn add_connection(&mut self, group: &GroupId, queued: u64) -> ConnectionId {
        let id = ConnectionId::generate();
        let entity = ConnectionEntity {
            id: id.clone(),
            revision: Some(Revision::new(0)),
            status: ConnectionStatus::queued(queued),
        };
        self.state.connections.insert(id.clone(), entity);
        let group = self.state.resolve(group);
        if let Some(record) = self.state.groups.get_mut(&group) {
            record.connections.push(id.clone());
        }
        id
    }

    pub fn add_controller(
        &mut self,
        scope: ControllerScope,
        name: &str,
        state: ControllerState,
        properties: &[(&str, &str)],
    ) -> ControllerServiceId {
        let id = ControllerServiceId::generate();
        let parent_group_id = match scope {
            ControllerScope::Global => None,
            ControllerScope::Group(group) => Some(self.state.resolve(&group)),
        };
        let entity = ControllerServiceEntity {
            id: id.clone(),
            revision: Revision::new(0),
            component: ControllerServiceComponent {
                id: id.clone(),
                name: name.to_string(),
                kind: None,
                parent_group_id,
                state,
                properties: to_properties(properties),
            },
        };
        self.state.controllers.insert(id.clone(), entity);
        self.state.controller_order.push(id.clone());
        id
    }
}

/// In-memory flow server
pub struct InMemoryFlowServer {
    state: Mutex<FlowState>,
}

impl InMemoryFlowServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlowState::new()),
        }
    }

    /// Number of status polls a drop request answers `finished = false` to
    pub fn with_drop_polls(self, polls: usize) -> Self {
        self.state.lock().drop_polls = polls;
        self
    }

    /// Number of reads a disabled service reports `DISABLING` before it
    /// settles in `DISABLED`
    pub fn with_disable_polls(self, polls: usize) -> Self {
        self.state.lock().disable_polls = polls;
        self
    }

    /// Seed components through a builder
    pub fn seed<R>(&self, f: impl FnOnce(&mut FlowBuilder<'_>) -> R) -> R {
        let mut state = self.state.lock();
        let mut builder = FlowBuilder { state: &mut *state };
        f(&mut builder)
    }

    /// Contents materialized whenever the named template is instantiated
    pub fn register_blueprint(
        &self,
        template_name: &str,
        blueprint: impl Fn(&mut FlowBuilder<'_>, &GroupId) + Send + Sync + 'static,
    ) {
        self.state
            .lock()
            .blueprints
            .insert(template_name.to_string(), Arc::new(blueprint));
    }

    pub fn fail_on(&self, point: FailurePoint) {
        self.state.lock().failures.insert(point);
    }

    /// Make every flow read of `group` fail with a server error
    pub fn fail_group_flow(&self, group: &GroupId) {
        self.state.lock().unreadable.insert(group.clone());
    }

    pub fn root_id(&self) -> GroupId {
        self.state.lock().root.clone()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<ApiCall> {
        self.calls().into_iter().filter(ApiCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn groups_named(&self, name: &str) -> Vec<GroupId> {
        let state = self.state.lock();
        state
            .group_order
            .iter()
            .filter(|id| state.groups.get(*id).map(|g| g.entity.name()) == Some(name))
            .cloned()
            .collect()
    }

    pub fn processor_snapshot(&self, id: &ProcessorId) -> Option<ProcessorEntity> {
        self.state.lock().processors.get(id).cloned()
    }

    pub fn processors_named(&self, name: &str) -> Vec<ProcessorEntity> {
        self.state
            .lock()
            .processors
            .values()
            .filter(|p| p.name() == name)
            .cloned()
            .collect()
    }

    pub fn port_snapshot(&self, id: &PortId) -> Option<PortEntity> {
        self.state.lock().ports.get(id).cloned()
    }

    pub fn controller_snapshot(&self, id: &ControllerServiceId) -> Option<ControllerServiceEntity> {
        self.state.lock().controllers.get(id).cloned()
    }

    pub fn controllers_named(&self, name: &str) -> Vec<ControllerServiceEntity> {
        let state = self.state.lock();
        state
            .controller_order
            .iter()
            .filter_map(|id| state.controllers.get(id))
            .filter(|c| c.name() == name)
            .cloned()
            .collect()
    }

    pub fn template_names(&self) -> Vec<String> {
        self.state
            .lock()
            .templates
            .iter()
            .map(|t| t.summary.name.clone())
            .collect()
    }

    pub fn queued(&self, connection: &ConnectionId) -> Option<u64> {
        self.state
            .lock()
            .connections
            .get(connection)
            .map(ConnectionEntity::queued)
    }

    pub fn position_of(&self, group: &GroupId) -> Option<Position> {
        self.state.lock().positions.get(group).copied()
    }
}

impl Default for InMemoryFlowServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowApi for InMemoryFlowServer {
    async fn group_flow(&self, id: &GroupId) -> Result<ProcessGroupFlow> {
        let state = self.state.lock();
        let id = state.resolve(id);
        if state.unreadable.contains(&id) {
            return Err(ClientError::Api {
                resource: format!("/flow/process-groups/{}", id),
                status: 500,
                message: "injected failure: group flow".to_string(),
            });
        }
        state.flow_of(&id)
    }

    async fn process_group(&self, id: &GroupId) -> Result<ProcessGroupEntity> {
        let state = self.state.lock();
        let id = state.resolve(id);
        Ok(state.group(&id)?.entity.clone())
    }

    async fn delete_process_group(&self, id: &GroupId, revision: &Revision) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let id = state.resolve(id);
        let resource = format!("/process-groups/{}", id);
        state.fail_if(FailurePoint::DeleteProcessGroup, &resource)?;
        if id == state.root {
            return Err(conflict(resource, "the root group cannot be removed"));
        }
        let record = state.group(&id)?;
        check_revision(&resource, &record.entity.revision, revision)?;
        let name = record.entity.name().to_string();
        let parent = record.entity.component.parent_group_id.clone();

        let subtree = state.subtree(&id);
        for group in &subtree {
            let record = state.group(group)?;
            for pid in &record.processors {
                if let Some(p) = state.processors.get(pid) {
                    if p.state() == RunState::Running {
                        return Err(conflict(
                            resource,
                            format!("processor {} is running", p.name()),
                        ));
                    }
                }
            }
            for port in record.input_ports.iter().chain(&record.output_ports) {
                if let Some(p) = state.ports.get(port) {
                    if p.state() == RunState::Running {
                        return Err(conflict(
                            resource,
                            format!("port {} is running", p.name()),
                        ));
                    }
                }
            }
            for cid in &record.connections {
                if let Some(c) = state.connections.get(cid) {
                    if c.queued() > 0 {
                        return Err(conflict(
                            resource,
                            format!("connection {} has {} queued flow files", cid, c.queued()),
                        ));
                    }
                }
            }
        }

        if let Some(active) = state
            .controllers
            .values()
            .filter(|c| c.parent_group().map_or(false, |g| subtree.contains(g)))
            .find(|c| c.state() != ControllerState::Disabled)
        {
            return Err(conflict(
                resource,
                format!("controller service {} is {}", active.name(), active.state()),
            ));
        }

        for group in &subtree {
            if let Some(record) = state.groups.remove(group) {
                for pid in record.processors {
                    state.processors.remove(&pid);
                }
                for port in record.input_ports.into_iter().chain(record.output_ports) {
                    state.ports.remove(&port);
                }
                for cid in record.connections {
                    state.connections.remove(&cid);
                }
            }
            state.positions.remove(group);
        }
        let owned: Vec<ControllerServiceId> = state
            .controllers
            .values()
            .filter(|c| c.parent_group().map_or(false, |g| subtree.contains(g)))
            .map(|c| c.id.clone())
            .collect();
        for cid in owned {
            state.controllers.remove(&cid);
            state.settling.remove(&cid);
            state.controller_order.retain(|c| c != &cid);
        }
        state.group_order.retain(|g| !subtree.contains(g));
        if let Some(parent) = parent.and_then(|p| state.groups.get_mut(&p)) {
            parent.children.retain(|c| c != &id);
        }

        state.calls.push(ApiCall::DeleteProcessGroup { id, name });
        Ok(())
    }

    async fn search_process_groups(&self, query: &str) -> Result<Vec<SearchHit>> {
        let state = self.state.lock();
        let needle = query.to_lowercase();
        Ok(state
            .group_order
            .iter()
            .filter(|id| **id != state.root)
            .filter_map(|id| state.groups.get(id))
            .filter(|g| g.entity.name().to_lowercase().contains(&needle))
            .map(|g| SearchHit {
                id: g.entity.id.clone(),
                name: g.entity.name().to_string(),
                group_id: g.entity.component.parent_group_id.clone(),
            })
            .collect())
    }

    async fn processors(&self, group: &GroupId) -> Result<Vec<ProcessorEntity>> {
        let state = self.state.lock();
        let group = state.resolve(group);
        Ok(state
            .group(&group)?
            .processors
            .iter()
            .filter_map(|p| state.processors.get(p).cloned())
            .collect())
    }

    async fn processor(&self, id: &ProcessorId) -> Result<ProcessorEntity> {
        self.state
            .lock()
            .processors
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("/processors/{}", id)))
    }

    async fn update_processor(&self, update: &ProcessorUpdate) -> Result<ProcessorEntity> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let resource = format!("/processors/{}", update.id);
        let processor = state
            .processors
            .get_mut(&update.id)
            .ok_or_else(|| ClientError::NotFound(resource.clone()))?;
        check_revision(&resource, &processor.revision, &update.revision)?;

        if let Some(target) = update.component.state {
            if target == RunState::Running {
                if processor.state() == RunState::Disabled {
                    return Err(conflict(resource, "processor is disabled"));
                }
                for cid in controller_refs(processor.properties()) {
                    if let Some(service) = state.controllers.get(&cid) {
                        if !service.state().is_enabled() {
                            return Err(conflict(
                                resource,
                                format!("controller service {} is not enabled", service.name()),
                            ));
                        }
                    }
                }
            }
            processor.component.state = target;
            state.calls.push(ApiCall::UpdateProcessorState {
                id: processor.id.clone(),
                name: processor.name().to_string(),
                state: target,
            });
        }

        if let Some(config) = &update.component.config {
            if processor.state() == RunState::Running {
                return Err(conflict(resource, "processor is running"));
            }
            for (key, value) in &config.properties {
                processor
                    .component
                    .config
                    .properties
                    .insert(key.clone(), value.clone());
            }
            state.calls.push(ApiCall::UpdateProcessorProperties {
                id: processor.id.clone(),
                name: processor.name().to_string(),
                keys: config.properties.keys().cloned().collect(),
            });
        }

        processor.revision.version += 1;
        Ok(processor.clone())
    }

    async fn port(&self, _kind: PortKind, id: &PortId) -> Result<PortEntity> {
        self.state
            .lock()
            .ports
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("/ports/{}", id)))
    }

    async fn update_port(&self, kind: PortKind, update: &PortUpdate) -> Result<PortEntity> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let resource = format!("/{}/{}", kind.path_segment(), update.component.id);
        state.fail_if(FailurePoint::UpdatePort, &resource)?;
        let port = state
            .ports
            .get_mut(&update.component.id)
            .ok_or_else(|| ClientError::NotFound(resource.clone()))?;
        check_revision(&resource, &port.revision, &update.revision)?;
        port.component.state = update.component.state;
        port.revision.version += 1;
        state.calls.push(ApiCall::UpdatePortState {
            id: port.id.clone(),
            state: update.component.state,
        });
        Ok(port.clone())
    }

    async fn create_drop_request(&self, connection: &ConnectionId) -> Result<DropRequest> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let resource = format!("/flowfile-queues/{}/drop-requests", connection);
        state.fail_if(FailurePoint::CreateDropRequest, &resource)?;
        let entity = state
            .connections
            .get_mut(connection)
            .ok_or_else(|| ClientError::NotFound(resource.clone()))?;
        let original_count = entity.queued();
        let finished = state.drop_polls == 0;
        if finished {
            entity.status = ConnectionStatus::queued(0);
        }

        let id = DropRequestId::generate();
        state.drops.insert(
            id.clone(),
            DropRecord {
                connection: connection.clone(),
                polls_left: state.drop_polls,
                finished,
                original_count,
            },
        );
        state.calls.push(ApiCall::CreateDropRequest {
            connection: connection.clone(),
        });
        Ok(DropRequest {
            id,
            finished,
            current_count: Some(if finished { 0 } else { original_count }),
            dropped_count: Some(if finished { original_count } else { 0 }),
            failure_reason: None,
        })
    }

    async fn drop_request(
        &self,
        connection: &ConnectionId,
        request: &DropRequestId,
    ) -> Result<DropRequest> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let resource = format!("/flowfile-queues/{}/drop-requests/{}", connection, request);
        state.calls.push(ApiCall::PollDropRequest {
            connection: connection.clone(),
        });
        let record = state
            .drops
            .get_mut(request)
            .filter(|r| &r.connection == connection)
            .ok_or_else(|| ClientError::NotFound(resource))?;
        if !record.finished {
            if record.polls_left > 0 {
                record.polls_left -= 1;
            } else {
                record.finished = true;
                if let Some(entity) = state.connections.get_mut(connection) {
                    entity.status = ConnectionStatus::queued(0);
                }
            }
        }
        Ok(DropRequest {
            id: request.clone(),
            finished: record.finished,
            current_count: Some(if record.finished { 0 } else { record.original_count }),
            dropped_count: Some(if record.finished { record.original_count } else { 0 }),
            failure_reason: None,
        })
    }

    async fn delete_drop_request(
        &self,
        connection: &ConnectionId,
        request: &DropRequestId,
    ) -> Result<DropRequest> {
        let mut state = self.state.lock();
        let resource = format!("/flowfile-queues/{}/drop-requests/{}", connection, request);
        let record = state
            .drops
            .remove(request)
            .ok_or_else(|| ClientError::NotFound(resource))?;
        state.calls.push(ApiCall::DeleteDropRequest {
            connection: connection.clone(),
        });
        Ok(DropRequest {
            id: request.clone(),
            finished: record.finished,
            current_count: None,
            dropped_count: None,
            failure_reason: None,
        })
    }

    async fn controller_service(
        &self,
        id: &ControllerServiceId,
    ) -> Result<ControllerServiceEntity> {
        let mut state = self.state.lock();
        state.settle(id);
        state
            .controllers
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("/controller-services/{}", id)))
    }

    async fn group_controller_services(
        &self,
        group: &GroupId,
    ) -> Result<Vec<ControllerServiceEntity>> {
        let state = self.state.lock();
        let group = state.resolve(group);
        state.group(&group)?;
        Ok(state
            .controller_order
            .iter()
            .filter_map(|id| state.controllers.get(id))
            .filter(|c| {
                c.parent_group()
                    .map_or(false, |owner| state.is_within(&group, owner))
            })
            .cloned()
            .collect())
    }

    async fn global_controller_services(&self) -> Result<Vec<ControllerServiceEntity>> {
        let state = self.state.lock();
        Ok(state
            .controller_order
            .iter()
            .filter_map(|id| state.controllers.get(id))
            .filter(|c| c.parent_group().is_none())
            .cloned()
            .collect())
    }

    async fn update_controller_service(
        &self,
        update: &ControllerServiceUpdate,
    ) -> Result<ControllerServiceEntity> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let id = &update.component.id;
        let resource = format!("/controller-services/{}", id);
        let current = state
            .controllers
            .get(id)
            .ok_or_else(|| ClientError::NotFound(resource.clone()))?;
        check_revision(&resource, &current.revision, &update.revision)?;

        if let Some(target) = update.component.state {
            if target.is_enabled() && current.state() == ControllerState::Disabling {
                return Err(conflict(resource, "service is still disabling"));
            }
            if !target.is_enabled() && current.state().is_enabled() {
                let referrers = state.running_referrers(id);
                if !referrers.is_empty() {
                    return Err(conflict(
                        resource,
                        format!("referenced by running processors: {}", referrers.join(", ")),
                    ));
                }
            }
        }
        if update.component.properties.is_some() && current.state() != ControllerState::Disabled {
            return Err(conflict(
                resource,
                format!("cannot change properties while {}", current.state()),
            ));
        }

        let Some(service) = state.controllers.get_mut(id) else {
            return Err(ClientError::NotFound(resource));
        };
        if let Some(target) = update.component.state {
            let was_enabled = service.state().is_enabled();
            service.component.state = match target {
                ControllerState::Enabling => ControllerState::Enabled,
                ControllerState::Disabled | ControllerState::Disabling
                    if was_enabled && state.disable_polls > 0 =>
                {
                    state.settling.insert(id.clone(), state.disable_polls);
                    ControllerState::Disabling
                }
                ControllerState::Disabling => ControllerState::Disabled,
                other => other,
            };
            state.calls.push(ApiCall::UpdateControllerState {
                id: id.clone(),
                name: service.name().to_string(),
                state: service.component.state,
            });
        }
        if let Some(properties) = &update.component.properties {
            for (key, value) in properties {
                service
                    .component
                    .properties
                    .insert(key.clone(), value.clone());
            }
            state.calls.push(ApiCall::UpdateControllerProperties {
                id: id.clone(),
                name: service.name().to_string(),
                keys: properties.keys().cloned().collect(),
            });
        }
        service.revision.version += 1;
        Ok(service.clone())
    }

    async fn create_controller_service(
        &self,
        scope: &ControllerScope,
        service: &NewControllerService,
    ) -> Result<ControllerServiceEntity> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let scope = match scope {
            ControllerScope::Global => ControllerScope::Global,
            ControllerScope::Group(group) => {
                let group = state.resolve(group);
                state.group(&group)?;
                ControllerScope::Group(group)
            }
        };
        let id = {
            let mut builder = FlowBuilder { state: &mut *state };
            builder.add_controller(
                scope.clone(),
                service.name(),
                ControllerState::Disabled,
                &[],
            )
        };
        let Some(created) = state.controllers.get_mut(&id) else {
            return Err(ClientError::NotFound(format!("/controller-services/{}", id)));
        };
        created.component.kind = service.component.kind.clone();
        created.component.properties = service.component.properties.clone();
        created.revision.version = 1;
        let created = created.clone();
        state.calls.push(ApiCall::CreateControllerService {
            name: service.name().to_string(),
            scope,
        });
        Ok(created)
    }

    async fn templates(&self) -> Result<Vec<TemplateSummary>> {
        Ok(self
            .state
            .lock()
            .templates
            .iter()
            .map(|t| t.summary.clone())
            .collect())
    }

    async fn delete_template(&self, id: &TemplateId) -> Result<()> {
        let mut state = self.state.lock();
        let index = state
            .templates
            .iter()
            .position(|t| &t.summary.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("/templates/{}", id)))?;
        let removed = state.templates.remove(index);
        state.calls.push(ApiCall::DeleteTemplate {
            id: id.clone(),
            name: removed.summary.name,
        });
        Ok(())
    }

    async fn upload_template(
        &self,
        group: &GroupId,
        artifact: &TemplateArtifact,
    ) -> Result<TemplateSummary> {
        let mut state = self.state.lock();
        let resource = format!("/process-groups/{}/templates/upload", group);
        state.fail_if(FailurePoint::UploadTemplate, &resource)?;
        if state.templates.iter().any(|t| t.summary.name == artifact.name) {
            return Err(conflict(
                resource,
                format!("A template named '{}' already exists", artifact.name),
            ));
        }
        let summary = TemplateSummary {
            id: TemplateId::generate(),
            name: artifact.name.clone(),
        };
        state.templates.push(TemplateRecord {
            summary: summary.clone(),
            group_name: artifact.group_name.clone(),
        });
        state.calls.push(ApiCall::UploadTemplate {
            name: artifact.name.clone(),
        });
        Ok(summary)
    }

    async fn instantiate_template(
        &self,
        group: &GroupId,
        request: &InstantiateTemplateRequest,
    ) -> Result<FlowEntity> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let resource = format!("/process-groups/{}/template-instance", group);
        state.fail_if(FailurePoint::InstantiateTemplate, &resource)?;
        let parent = state.resolve(group);
        state.group(&parent)?;
        let template = state
            .templates
            .iter()
            .find(|t| t.summary.id == request.template_id)
            .ok_or_else(|| ClientError::NotFound(format!("/templates/{}", request.template_id)))?;
        let template_name = template.summary.name.clone();
        let group_name = template.group_name.clone();
        let blueprint = state.blueprints.get(&template_name).cloned();

        let new_group = {
            let mut builder = FlowBuilder { state: &mut *state };
            let new_group = builder.add_group(&parent, &group_name);
            if let Some(blueprint) = blueprint {
                blueprint(&mut builder, &new_group);
            }
            new_group
        };
        state.positions.insert(
            new_group.clone(),
            Position {
                x: request.origin_x,
                y: request.origin_y,
            },
        );
        state.calls.push(ApiCall::InstantiateTemplate {
            template: template_name,
            group: new_group.clone(),
        });

        let entity = state.group(&new_group)?.entity.clone();
        Ok(FlowEntity {
            flow: FlowContents {
                process_groups: vec![entity],
                ..FlowContents::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stale_revision_is_rejected() {
        let server = InMemoryFlowServer::new();
        let pid = server.seed(|b| {
            let root = b.root();
            b.add_processor(&root, "GetFile", RunState::Stopped, &[])
        });
        let processor = server.processor(&pid).await.unwrap();

        server
            .update_processor(&ProcessorUpdate::state(&processor, RunState::Running))
            .await
            .unwrap();
        let err = server
            .update_processor(&ProcessorUpdate::state(&processor, RunState::Stopped))
            .await
            .unwrap_err();
        assert!(err.is_revision_conflict());
    }

    #[tokio::test]
    async fn test_start_requires_enabled_controller() {
        let server = InMemoryFlowServer::new();
        let pid = server.seed(|b| {
            let root = b.root();
            let cid = b.add_controller(
                ControllerScope::Group(root.clone()),
                "Cache",
                ControllerState::Disabled,
                &[],
            );
            b.add_processor(&root, "PutCache", RunState::Stopped, &[("cache", cid.as_str())])
        });
        let processor = server.processor(&pid).await.unwrap();
        let err = server
            .update_processor(&ProcessorUpdate::state(&processor, RunState::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_delete_refuses_queued_data() {
        let server = InMemoryFlowServer::new();
        let gid = server.seed(|b| {
            let root = b.root();
            let gid = b.add_group(&root, "Ingest");
            let child = b.add_group(&gid, "Nested");
            b.add_connection(&child, 3);
            gid
        });
        let group = server.process_group(&gid).await.unwrap();
        let err = server
            .delete_process_group(&gid, &group.revision)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Conflict { .. }));
        assert_eq!(server.groups_named("Ingest").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_refuses_enabled_owned_service() {
        let server = InMemoryFlowServer::new();
        let (gid, cid) = server.seed(|b| {
            let root = b.root();
            let gid = b.add_group(&root, "Ingest");
            let child = b.add_group(&gid, "Nested");
            let cid = b.add_controller(
                ControllerScope::Group(child),
                "SSL Context",
                ControllerState::Enabled,
                &[],
            );
            (gid, cid)
        });
        let group = server.process_group(&gid).await.unwrap();
        let err = server
            .delete_process_group(&gid, &group.revision)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Conflict { .. }));

        let service = server.controller_service(&cid).await.unwrap();
        server
            .update_controller_service(&ControllerServiceUpdate::state(&service, ControllerState::Disabled))
            .await
            .unwrap();
        server.delete_process_group(&gid, &group.revision).await.unwrap();
        assert!(server.controller_snapshot(&cid).is_none());
    }

    #[tokio::test]
    async fn test_delete_refuses_running_port() {
        let server = InMemoryFlowServer::new();
        let gid = server.seed(|b| {
            let root = b.root();
            let gid = b.add_group(&root, "Ingest");
            b.add_port(&gid, PortKind::Output, "archived", RunState::Running);
            gid
        });
        let group = server.process_group(&gid).await.unwrap();
        let err = server
            .delete_process_group(&gid, &group.revision)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Conflict { .. }));
        assert_eq!(server.groups_named("Ingest").len(), 1);
    }

    #[tokio::test]
    async fn test_disabling_service_settles_after_configured_reads() {
        let server = InMemoryFlowServer::new().with_disable_polls(2);
        let cid = server.seed(|b| {
            b.add_controller(ControllerScope::Global, "Cache", ControllerState::Enabled, &[])
        });
        let service = server.controller_service(&cid).await.unwrap();
        let service = server
            .update_controller_service(&ControllerServiceUpdate::state(&service, ControllerState::Disabled))
            .await
            .unwrap();
        assert_eq!(service.state(), ControllerState::Disabling);

        let early = server
            .update_controller_service(&ControllerServiceUpdate::properties(
                &service,
                to_properties(&[("Port", "4557")]),
            ))
            .await
            .unwrap_err();
        assert!(matches!(early, ClientError::Conflict { .. }));

        let states: Vec<_> = read_states(&server, &cid, 3).await;
        assert_eq!(
            states,
            vec![
                ControllerState::Disabling,
                ControllerState::Disabling,
                ControllerState::Disabled
            ]
        );
    }

    async fn read_states(
        server: &InMemoryFlowServer,
        id: &ControllerServiceId,
        reads: usize,
    ) -> Vec<ControllerState> {
        let mut states = Vec::new();
        for _ in 0..reads {
            states.push(server.controller_service(id).await.unwrap().state());
        }
        states
    }

    #[tokio::test]
    async fn test_unreadable_group_flow_fails() {
        let server = InMemoryFlowServer::new();
        let gid = server.seed(|b| {
            let root = b.root();
            b.add_group(&root, "Ingest")
        });
        server.fail_group_flow(&gid);
        let err = server.group_flow(&gid).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(server.root_flow().await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_request_finishes_after_configured_polls() {
        let server = InMemoryFlowServer::new().with_drop_polls(1);
        let cid = server.seed(|b| {
            let root = b.root();
            b.add_connection(&root, 5)
        });
        let request = server.create_drop_request(&cid).await.unwrap();
        assert!(!request.finished);
        assert!(!server.drop_request(&cid, &request.id).await.unwrap().finished);
        assert!(server.drop_request(&cid, &request.id).await.unwrap().finished);
        assert_eq!(server.queued(&cid), Some(0));
    }

    #[tokio::test]
    async fn test_search_matches_substrings_in_creation_order() {
        let server = InMemoryFlowServer::new();
        server.seed(|b| {
            let root = b.root();
            b.add_group(&root, "WebCrawler Archive");
            b.add_group(&root, "WebCrawler");
        });
        let hits = server.search_process_groups("webcrawler").await.unwrap();
        let names: Vec<_> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["WebCrawler Archive", "WebCrawler"]);
    }
}
