//! Sensitive property injection
//!
//! Templates are exported without secrets. After instantiation, every
//! processor whose name matches a section of the secrets source receives
//! that section's values in a single update. Values are never logged and
//! never read back.

use crate::error::{ComponentKind, DeployError, Result};
use crate::sections::PropertySections;
use nifi_client::FlowApi;
use nifi_types::{GroupId, ProcessorUpdate};
use tracing::{debug, info};

pub struct SensitiveInjector<'a> {
    api: &'a dyn FlowApi,
    secrets: &'a PropertySections,
}

impl<'a> SensitiveInjector<'a> {
    pub fn new(api: &'a dyn FlowApi, secrets: &'a PropertySections) -> Self {
        Self { api, secrets }
    }

    /// Apply secrets to the processors directly inside `group`
    ///
    /// Returns the number of processors updated.
    pub async fn inject_group(&self, group: &GroupId, path: &str) -> Result<usize> {
        if self.secrets.is_empty() {
            return Ok(0);
        }

        let mut updated = 0;
        for processor in self.api.processors(group).await? {
            let Some(section) = self.secrets.get(processor.name()) else {
                continue;
            };
            let properties = section.properties();
            if properties.is_empty() {
                continue;
            }

            debug!(processor_id = %processor.id, name = processor.name(), "Applying sensitive properties");
            self.api
                .update_processor(&ProcessorUpdate::properties(&processor, properties))
                .await
                .map_err(|source| DeployError::Transition {
                    kind: ComponentKind::Processor,
                    id: processor.id.to_string(),
                    name: processor.name().to_string(),
                    path: path.to_string(),
                    source,
                })?;
            info!(
                name = processor.name(),
                keys = section.property_count(),
                "Sensitive properties applied"
            );
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::Section;
    use nifi_client::{ApiCall, InMemoryFlowServer};
    use nifi_types::{PropertyValue, RunState};

    #[tokio::test]
    async fn test_matching_processor_gets_whole_section_in_one_call() {
        let server = InMemoryFlowServer::new();
        let (group, pid) = server.seed(|b| {
            let root = b.root();
            let group = b.add_group(&root, "Crawler");
            let pid = b.add_processor(&group, "PutS3Object", RunState::Stopped, &[("Bucket", "pages")]);
            b.add_processor(&group, "FetchPage", RunState::Stopped, &[]);
            (group, pid)
        });
        let secrets = PropertySections::new().with_section(
            "PutS3Object",
            Section::new()
                .with("Access Key ID", "AKIAEXAMPLE")
                .with("Secret Access Key", "s3cr3t"),
        );

        let updated = SensitiveInjector::new(&server, &secrets)
            .inject_group(&group, "NiFi Flow/Crawler")
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let calls = server.mutation_calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            &calls[0],
            ApiCall::UpdateProcessorProperties { keys, .. } if keys.len() == 2
        ));
        let processor = server.processor_snapshot(&pid).unwrap();
        assert_eq!(
            processor.properties().get("Secret Access Key"),
            Some(&PropertyValue::plain("s3cr3t"))
        );
        assert_eq!(
            processor.properties().get("Bucket"),
            Some(&PropertyValue::plain("pages"))
        );
    }

    #[tokio::test]
    async fn test_no_secrets_means_no_calls() {
        let server = InMemoryFlowServer::new();
        let group = server.seed(|b| {
            let root = b.root();
            let group = b.add_group(&root, "Crawler");
            b.add_processor(&group, "PutS3Object", RunState::Stopped, &[]);
            group
        });

        let updated = SensitiveInjector::new(&server, &PropertySections::new())
            .inject_group(&group, "NiFi Flow/Crawler")
            .await
            .unwrap();
        assert_eq!(updated, 0);
        assert!(server.calls().is_empty());
    }
}
