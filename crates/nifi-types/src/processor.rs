//! Processor and port types

use crate::ids::{PortId, ProcessorId};
use crate::property::Properties;
use crate::revision::Revision;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduled state of a processor or port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Stopped,
    Disabled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Running => "RUNNING",
            RunState::Stopped => "STOPPED",
            RunState::Disabled => "DISABLED",
        };
        f.write_str(name)
    }
}

/// Processor as returned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorEntity {
    pub id: ProcessorId,
    pub revision: Revision,
    pub component: ProcessorComponent,
}

impl ProcessorEntity {
    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn state(&self) -> RunState {
        self.component.state
    }

    pub fn properties(&self) -> &Properties {
        &self.component.config.properties
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorComponent {
    pub id: ProcessorId,
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub state: RunState,

    #[serde(default)]
    pub config: ProcessorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default)]
    pub properties: Properties,
}

/// Listing of the processors directly inside one group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorsEntity {
    #[serde(default)]
    pub processors: Vec<ProcessorEntity>,
}

/// Body of a processor mutation
///
/// State and properties are independent: a patch carries one or the other,
/// never a full component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorUpdate {
    pub id: ProcessorId,
    pub revision: Revision,
    pub component: ProcessorPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorPatch {
    pub id: ProcessorId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ProcessorConfig>,
}

impl ProcessorUpdate {
    /// Schedule change against the revision of `processor`
    pub fn state(processor: &ProcessorEntity, state: RunState) -> Self {
        Self {
            id: processor.id.clone(),
            revision: processor.revision.clone(),
            component: ProcessorPatch {
                id: processor.id.clone(),
                state: Some(state),
                config: None,
            },
        }
    }

    /// Property change against the revision of `processor`
    pub fn properties(processor: &ProcessorEntity, properties: Properties) -> Self {
        Self {
            id: processor.id.clone(),
            revision: processor.revision.clone(),
            component: ProcessorPatch {
                id: processor.id.clone(),
                state: None,
                config: Some(ProcessorConfig { properties }),
            },
        }
    }
}

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    Input,
    Output,
}

impl PortKind {
    /// Collection segment used in request paths
    pub fn path_segment(&self) -> &'static str {
        match self {
            PortKind::Input => "input-ports",
            PortKind::Output => "output-ports",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortKind::Input => f.write_str("input"),
            PortKind::Output => f.write_str("output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortEntity {
    pub id: PortId,
    pub revision: Revision,
    pub component: PortComponent,
}

impl PortEntity {
    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn state(&self) -> RunState {
        self.component.state
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortComponent {
    pub id: PortId,
    #[serde(default)]
    pub name: String,
    pub state: RunState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortUpdate {
    pub revision: Revision,
    pub component: PortPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortPatch {
    pub id: PortId,
    pub state: RunState,
}

impl PortUpdate {
    pub fn state(port: &PortEntity, state: RunState) -> Self {
        Self {
            revision: port.revision.clone(),
            component: PortPatch {
                id: port.id.clone(),
                state,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyValue;

    const PROCESSOR_JSON: &str = r#"{
        "id": "0a1b2c3d-0000-1000-8000-000000000001",
        "revision": { "version": 4 },
        "component": {
            "id": "0a1b2c3d-0000-1000-8000-000000000001",
            "name": "PutSlack",
            "type": "org.apache.nifi.processors.slack.PutSlack",
            "state": "STOPPED",
            "config": {
                "properties": {
                    "channel": "nifi-notifications",
                    "ssl-context-service": "4d908dd7-0157-1000-c1f3-366f70148660",
                    "proxy": null
                }
            }
        }
    }"#;

    #[test]
    fn test_processor_parses_and_classifies_properties() {
        let processor: ProcessorEntity = serde_json::from_str(PROCESSOR_JSON).unwrap();
        assert_eq!(processor.name(), "PutSlack");
        assert_eq!(processor.state(), RunState::Stopped);
        assert_eq!(processor.revision.version, 4);
        assert!(processor.properties()["ssl-context-service"]
            .controller_ref()
            .is_some());
        assert_eq!(processor.properties()["proxy"], PropertyValue::Unset);
    }

    #[test]
    fn test_state_update_carries_only_state() {
        let processor: ProcessorEntity = serde_json::from_str(PROCESSOR_JSON).unwrap();
        let update = ProcessorUpdate::state(&processor, RunState::Running);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["component"]["state"], "RUNNING");
        assert!(json["component"].get("config").is_none());
        assert_eq!(json["revision"]["version"], 4);
    }

    #[test]
    fn test_port_path_segment() {
        assert_eq!(PortKind::Input.path_segment(), "input-ports");
        assert_eq!(PortKind::Output.path_segment(), "output-ports");
    }
}
