//! Remote resource API trait
//!
//! `FlowApi` is the boundary between the deployment engine and the server.
//! Every call is a single request/response; mutations take the revision
//! copied from a fresh read and fail with
//! [`ClientError::RevisionConflict`](crate::ClientError::RevisionConflict)
//! when it is stale.

use crate::error::Result;
use async_trait::async_trait;
use nifi_types::*;

#[async_trait]
pub trait FlowApi: Send + Sync {
    // ========== Groups ==========

    /// Contents of a group, one level deep
    async fn group_flow(&self, id: &GroupId) -> Result<ProcessGroupFlow>;

    /// Contents of the root canvas group
    async fn root_flow(&self) -> Result<ProcessGroupFlow> {
        self.group_flow(&GroupId::root()).await
    }

    /// Group entity with its current revision
    async fn process_group(&self, id: &GroupId) -> Result<ProcessGroupEntity>;

    /// Remove a group and everything inside it
    async fn delete_process_group(&self, id: &GroupId, revision: &Revision) -> Result<()>;

    /// Server-side search; matches are substrings, not exact names
    async fn search_process_groups(&self, query: &str) -> Result<Vec<SearchHit>>;

    // ========== Processors and ports ==========

    async fn processors(&self, group: &GroupId) -> Result<Vec<ProcessorEntity>>;

    async fn processor(&self, id: &ProcessorId) -> Result<ProcessorEntity>;

    async fn update_processor(&self, update: &ProcessorUpdate) -> Result<ProcessorEntity>;

    async fn port(&self, kind: PortKind, id: &PortId) -> Result<PortEntity>;

    async fn update_port(&self, kind: PortKind, update: &PortUpdate) -> Result<PortEntity>;

    // ========== Queues ==========

    async fn create_drop_request(&self, connection: &ConnectionId) -> Result<DropRequest>;

    async fn drop_request(
        &self,
        connection: &ConnectionId,
        request: &DropRequestId,
    ) -> Result<DropRequest>;

    async fn delete_drop_request(
        &self,
        connection: &ConnectionId,
        request: &DropRequestId,
    ) -> Result<DropRequest>;

    // ========== Controller services ==========

    async fn controller_service(&self, id: &ControllerServiceId)
        -> Result<ControllerServiceEntity>;

    /// Services visible from a group, including those of its ancestors
    async fn group_controller_services(
        &self,
        group: &GroupId,
    ) -> Result<Vec<ControllerServiceEntity>>;

    /// Controller-level services
    async fn global_controller_services(&self) -> Result<Vec<ControllerServiceEntity>>;

    async fn update_controller_service(
        &self,
        update: &ControllerServiceUpdate,
    ) -> Result<ControllerServiceEntity>;

    async fn create_controller_service(
        &self,
        scope: &ControllerScope,
        service: &NewControllerService,
    ) -> Result<ControllerServiceEntity>;

    // ========== Templates ==========

    async fn templates(&self) -> Result<Vec<TemplateSummary>>;

    async fn delete_template(&self, id: &TemplateId) -> Result<()>;

    async fn upload_template(
        &self,
        group: &GroupId,
        artifact: &TemplateArtifact,
    ) -> Result<TemplateSummary>;

    async fn instantiate_template(
        &self,
        group: &GroupId,
        request: &InstantiateTemplateRequest,
    ) -> Result<FlowEntity>;
}
