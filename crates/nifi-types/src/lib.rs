//! nifi-deploy Types - Core types for the remote flow tree
//!
//! This crate models the slice of the NiFi 1.x REST control plane that the
//! deployment engine reads and mutates:
//!
//! - **Groups**: process groups and their flow contents (the tree nodes)
//! - **Components**: processors, ports, connections, controller services
//! - **Revisions**: optimistic-concurrency stamps carried by every mutation
//! - **Templates**: uploadable XML artifacts keyed by name
//!
//! Wire names follow the server's camelCase JSON. Property values are
//! classified once, at deserialization time, into [`PropertyValue`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod controller;
pub mod flow;
pub mod ids;
pub mod processor;
pub mod property;
pub mod revision;
pub mod template;

pub use controller::{
    ControllerScope, ControllerServiceComponent, ControllerServiceEntity, ControllerServicePatch,
    ControllerServiceUpdate, ControllerServicesEntity, ControllerState, NewControllerComponent,
    NewControllerService,
};
pub use flow::{
    Breadcrumb, BreadcrumbName, ConnectionEntity, ConnectionSnapshot, ConnectionStatus,
    DropRequest, DropRequestEntity, FlowContents, FlowEntity, ProcessGroupComponent,
    ProcessGroupEntity, ProcessGroupFlow, ProcessGroupFlowEntity, SearchHit, SearchResults,
    SearchResultsEntity,
};
pub use ids::{
    ConnectionId, ControllerServiceId, DropRequestId, GroupId, PortId, ProcessorId, TemplateId,
};
pub use processor::{
    PortComponent, PortEntity, PortKind, PortPatch, PortUpdate, ProcessorComponent,
    ProcessorConfig, ProcessorEntity, ProcessorPatch, ProcessorsEntity, ProcessorUpdate, RunState,
};
pub use property::{controller_refs, is_component_id, Properties, PropertyValue};
pub use revision::Revision;
pub use template::{
    InstantiateTemplateRequest, Position, TemplateArtifact, TemplateEntity, TemplateError,
    TemplateSummary, TemplatesEntity,
};
