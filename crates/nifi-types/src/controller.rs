//! Controller service types
//!
//! Controller services are shared, stateful configuration objects. They live
//! either at controller (global) scope or inside a process group, and
//! processors reference them by id from their properties.

use crate::ids::{ControllerServiceId, GroupId};
use crate::property::Properties;
use crate::revision::Revision;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Enablement of a controller service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerState {
    Enabled,
    Enabling,
    Disabled,
    Disabling,
}

impl ControllerState {
    /// Whether this state already satisfies `target`
    ///
    /// A service that is still enabling is heading where an enable request
    /// would send it; the same holds for disabling.
    pub fn satisfies(&self, target: ControllerState) -> bool {
        match target {
            ControllerState::Enabled | ControllerState::Enabling => matches!(
                self,
                ControllerState::Enabled | ControllerState::Enabling
            ),
            ControllerState::Disabled | ControllerState::Disabling => matches!(
                self,
                ControllerState::Disabled | ControllerState::Disabling
            ),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, ControllerState::Enabled | ControllerState::Enabling)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Enabled => "ENABLED",
            ControllerState::Enabling => "ENABLING",
            ControllerState::Disabled => "DISABLED",
            ControllerState::Disabling => "DISABLING",
        };
        f.write_str(name)
    }
}

/// Where a controller service is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerScope {
    /// Controller-level service visible to every group
    Global,
    /// Service owned by a process group
    Group(GroupId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerServiceEntity {
    pub id: ControllerServiceId,
    pub revision: Revision,
    pub component: ControllerServiceComponent,
}

impl ControllerServiceEntity {
    pub fn name(&self) -> &str {
        &self.component.name
    }

    pub fn state(&self) -> ControllerState {
        self.component.state
    }

    pub fn properties(&self) -> &Properties {
        &self.component.properties
    }

    /// Group that owns the service, `None` at controller scope
    pub fn parent_group(&self) -> Option<&GroupId> {
        self.component.parent_group_id.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerServiceComponent {
    pub id: ControllerServiceId,
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_group_id: Option<GroupId>,

    pub state: ControllerState,

    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerServicesEntity {
    #[serde(default)]
    pub controller_services: Vec<ControllerServiceEntity>,
}

/// Body of a controller service mutation
///
/// The server refuses to change properties and state in the same request, so
/// a patch holds exactly one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerServiceUpdate {
    pub revision: Revision,
    pub component: ControllerServicePatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerServicePatch {
    pub id: ControllerServiceId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ControllerState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

impl ControllerServiceUpdate {
    pub fn state(service: &ControllerServiceEntity, state: ControllerState) -> Self {
        Self {
            revision: service.revision.clone(),
            component: ControllerServicePatch {
                id: service.id.clone(),
                state: Some(state),
                properties: None,
            },
        }
    }

    pub fn properties(service: &ControllerServiceEntity, properties: Properties) -> Self {
        Self {
            revision: service.revision.clone(),
            component: ControllerServicePatch {
                id: service.id.clone(),
                state: None,
                properties: Some(properties),
            },
        }
    }
}

/// Body for creating a controller service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewControllerService {
    pub revision: Revision,
    pub component: NewControllerComponent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewControllerComponent {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub properties: Properties,
}

impl NewControllerService {
    pub fn new(name: impl Into<String>, kind: Option<String>, properties: Properties) -> Self {
        Self {
            revision: Revision::initial(),
            component: NewControllerComponent {
                name: name.into(),
                kind,
                properties,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.component.name
    }
}
