//! Process group and flow contents
//!
//! The server exposes a group twice: `/process-groups/{id}` returns the group
//! entity with its revision, `/flow/process-groups/{id}` returns the group's
//! contents. The engine needs both: the contents to walk the tree, the
//! revision to delete it.

use crate::ids::{ConnectionId, DropRequestId, GroupId};
use crate::processor::{PortEntity, PortKind, ProcessorEntity};
use crate::revision::Revision;
use serde::{Deserialize, Serialize};

/// Group entity with its revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGroupEntity {
    pub id: GroupId,
    pub revision: Revision,
    pub component: ProcessGroupComponent,
}

impl ProcessGroupEntity {
    pub fn name(&self) -> &str {
        &self.component.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupComponent {
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_group_id: Option<GroupId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupFlowEntity {
    pub process_group_flow: ProcessGroupFlow,
}

/// Contents of one group, one level deep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupFlow {
    pub id: GroupId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_group_id: Option<GroupId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breadcrumb: Option<Breadcrumb>,

    #[serde(default)]
    pub flow: FlowContents,
}

impl ProcessGroupFlow {
    /// Display name of the group, from its breadcrumb
    pub fn name(&self) -> &str {
        self.breadcrumb
            .as_ref()
            .and_then(|b| b.breadcrumb.as_ref())
            .map(|b| b.name.as_str())
            .unwrap_or("")
    }

    pub fn child_group_ids(&self) -> impl Iterator<Item = &GroupId> + '_ {
        self.flow.process_groups.iter().map(|g| &g.id)
    }

    pub fn ports(&self) -> impl Iterator<Item = (PortKind, &PortEntity)> + '_ {
        self.flow
            .input_ports
            .iter()
            .map(|p| (PortKind::Input, p))
            .chain(self.flow.output_ports.iter().map(|p| (PortKind::Output, p)))
    }
}

/// Breadcrumb chain from a group up to the root canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub id: GroupId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breadcrumb: Option<BreadcrumbName>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_breadcrumb: Option<Box<Breadcrumb>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreadcrumbName {
    pub id: GroupId,
    pub name: String,
}

impl Breadcrumb {
    /// Group names from the root down to this group, joined with `/`
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        let mut current = Some(self);
        while let Some(crumb) = current {
            if let Some(named) = &crumb.breadcrumb {
                names.push(named.name.as_str());
            }
            current = crumb.parent_breadcrumb.as_deref();
        }
        names.reverse();
        names.join("/")
    }
}

/// Components directly contained in a group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContents {
    #[serde(default)]
    pub process_groups: Vec<ProcessGroupEntity>,
    #[serde(default)]
    pub processors: Vec<ProcessorEntity>,
    #[serde(default)]
    pub input_ports: Vec<PortEntity>,
    #[serde(default)]
    pub output_ports: Vec<PortEntity>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntity>,
}

/// Snippet returned when a template is instantiated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowEntity {
    #[serde(default)]
    pub flow: FlowContents,
}

impl FlowEntity {
    /// Root group of the instantiated snippet
    pub fn root_group(&self) -> Option<&ProcessGroupEntity> {
        self.flow.process_groups.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEntity {
    pub id: ConnectionId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,

    #[serde(default)]
    pub status: ConnectionStatus,
}

impl ConnectionEntity {
    /// Number of flow files waiting in the connection's queue
    pub fn queued(&self) -> u64 {
        self.status.aggregate_snapshot.flow_files_queued
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    #[serde(default)]
    pub aggregate_snapshot: ConnectionSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    #[serde(default)]
    pub flow_files_queued: u64,
}

impl ConnectionStatus {
    pub fn queued(count: u64) -> Self {
        Self {
            aggregate_snapshot: ConnectionSnapshot {
                flow_files_queued: count,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRequestEntity {
    pub drop_request: DropRequest,
}

/// Server-side task draining one connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRequest {
    pub id: DropRequestId,
    pub finished: bool,
    #[serde(default)]
    pub current_count: Option<u64>,
    #[serde(default)]
    pub dropped_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResultsEntity {
    #[serde(rename = "searchResultsDTO", default)]
    pub search_results: SearchResults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    #[serde(default)]
    pub process_group_results: Vec<SearchHit>,
}

/// One search result; the server matches on substrings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: GroupId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW_JSON: &str = r#"{
        "processGroupFlow": {
            "id": "g-2",
            "breadcrumb": {
                "id": "g-2",
                "breadcrumb": { "id": "g-2", "name": "WebCrawler" },
                "parentBreadcrumb": {
                    "id": "root-id",
                    "breadcrumb": { "id": "root-id", "name": "NiFi Flow" }
                }
            },
            "flow": {
                "processGroups": [
                    { "id": "g-3", "revision": { "version": 0 },
                      "component": { "id": "g-3", "name": "Fetch" } }
                ],
                "connections": [
                    { "id": "c-1", "status": { "aggregateSnapshot": { "flowFilesQueued": 12 } } }
                ],
                "labels": []
            }
        }
    }"#;

    #[test]
    fn test_flow_parses_with_unknown_fields() {
        let entity: ProcessGroupFlowEntity = serde_json::from_str(FLOW_JSON).unwrap();
        let flow = entity.process_group_flow;
        assert_eq!(flow.name(), "WebCrawler");
        assert_eq!(flow.child_group_ids().count(), 1);
        assert_eq!(flow.flow.connections[0].queued(), 12);
        assert!(flow.flow.processors.is_empty());
    }

    #[test]
    fn test_breadcrumb_path_runs_root_first() {
        let entity: ProcessGroupFlowEntity = serde_json::from_str(FLOW_JSON).unwrap();
        let crumb = entity.process_group_flow.breadcrumb.unwrap();
        assert_eq!(crumb.path(), "NiFi Flow/WebCrawler");
    }

    #[test]
    fn test_search_results_field_name() {
        let json = r#"{"searchResultsDTO":{"processGroupResults":[{"id":"a","name":"WebCrawler"}]}}"#;
        let results: SearchResultsEntity = serde_json::from_str(json).unwrap();
        assert_eq!(results.search_results.process_group_results[0].name, "WebCrawler");
    }
}
