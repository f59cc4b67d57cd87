//! Optimistic-concurrency revisions

use serde::{Deserialize, Serialize};

/// Revision stamp carried by every mutable component
///
/// The server rejects a mutation whose `version` is not the current one, so
/// callers always copy the revision from a fresh read into the write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Revision {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            client_id: None,
        }
    }

    /// Revision used when creating a component that does not exist yet
    pub fn initial() -> Self {
        Self::new(0)
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}
