//! Strongly-typed identifiers for flow components
//!
//! The server hands out UUID-shaped strings for every component, but a
//! processor id is never a valid group id. Each kind gets its own newtype so
//! the engine cannot mix them up when building request paths.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! component_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

component_id!(
    /// Identifier of a process group (a node of the flow tree)
    GroupId
);

impl GroupId {
    /// Alias the server accepts for the top-level canvas group
    pub fn root() -> Self {
        Self::new("root")
    }
}

component_id!(
    /// Identifier of a processor
    ProcessorId
);
component_id!(
    /// Identifier of an input or output port
    PortId
);
component_id!(
    /// Identifier of a connection (a buffered edge)
    ConnectionId
);
component_id!(
    /// Identifier of a controller service
    ControllerServiceId
);
component_id!(
    /// Identifier of an uploaded template
    TemplateId
);
component_id!(
    /// Identifier of a queue drop request
    DropRequestId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        let id1 = ProcessorId::generate();
        let id2 = ProcessorId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_id_display_is_raw() {
        let id = GroupId::new("4d908dd7-0157-1000-c1f3-366f70148660");
        assert_eq!(id.to_string(), "4d908dd7-0157-1000-c1f3-366f70148660");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = TemplateId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
