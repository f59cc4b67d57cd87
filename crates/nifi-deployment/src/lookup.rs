//! Exact-name lookup of groups, processors and templates
//!
//! Names are not unique on the server. Every lookup keeps only exact
//! matches and, when several remain, proceeds with the first in the
//! server's order after logging the ambiguity.

use crate::error::Result;
use nifi_client::FlowApi;
use nifi_types::{GroupId, ProcessorEntity, SearchHit, TemplateSummary};
use tracing::warn;

/// Result of matching a name against server-side candidates
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Missing,
    Unique(T),
    /// Several exact matches, in server order
    Ambiguous(Vec<T>),
}

impl<T> LookupOutcome<T> {
    pub fn from_matches(mut matches: Vec<T>) -> Self {
        match matches.len() {
            0 => LookupOutcome::Missing,
            1 => match matches.pop() {
                Some(only) => LookupOutcome::Unique(only),
                None => LookupOutcome::Missing,
            },
            _ => LookupOutcome::Ambiguous(matches),
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, LookupOutcome::Ambiguous(_))
    }

    pub fn len(&self) -> usize {
        match self {
            LookupOutcome::Missing => 0,
            LookupOutcome::Unique(_) => 1,
            LookupOutcome::Ambiguous(all) => all.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, LookupOutcome::Missing)
    }

    /// The match to act on; ambiguity is reported and resolved to the first
    pub fn first(self, kind: &str, name: &str) -> Option<T> {
        match self {
            LookupOutcome::Missing => None,
            LookupOutcome::Unique(only) => Some(only),
            LookupOutcome::Ambiguous(all) => {
                warn!(
                    kind,
                    name,
                    candidates = all.len(),
                    "Name is ambiguous, using the first match"
                );
                all.into_iter().next()
            }
        }
    }
}

/// Groups anywhere in the flow whose name is exactly `name`
pub async fn find_group_by_name(
    api: &dyn FlowApi,
    name: &str,
) -> Result<LookupOutcome<SearchHit>> {
    let hits = api.search_process_groups(name).await?;
    let exact = hits.into_iter().filter(|hit| hit.name == name).collect();
    Ok(LookupOutcome::from_matches(exact))
}

/// Processors of one group whose name is exactly `name`
pub async fn find_processor_by_name(
    api: &dyn FlowApi,
    group: &GroupId,
    name: &str,
) -> Result<LookupOutcome<ProcessorEntity>> {
    let processors = api.processors(group).await?;
    let exact = processors.into_iter().filter(|p| p.name() == name).collect();
    Ok(LookupOutcome::from_matches(exact))
}

/// Uploaded templates whose name is exactly `name`
pub async fn find_template_by_name(
    api: &dyn FlowApi,
    name: &str,
) -> Result<LookupOutcome<TemplateSummary>> {
    let templates = api.templates().await?;
    let exact = templates.into_iter().filter(|t| t.name == name).collect();
    Ok(LookupOutcome::from_matches(exact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nifi_client::InMemoryFlowServer;
    use nifi_types::RunState;

    #[tokio::test]
    async fn test_substring_hits_are_discarded() {
        let server = InMemoryFlowServer::new();
        server.seed(|b| {
            let root = b.root();
            b.add_group(&root, "WebCrawler Archive");
        });

        let outcome = find_group_by_name(&server, "WebCrawler").await.unwrap();
        assert_eq!(outcome, LookupOutcome::Missing);
    }

    #[tokio::test]
    async fn test_ambiguous_group_resolves_to_first() {
        let server = InMemoryFlowServer::new();
        let first = server.seed(|b| {
            let root = b.root();
            let first = b.add_group(&root, "WebCrawler");
            let other = b.add_group(&root, "Other");
            b.add_group(&other, "WebCrawler");
            first
        });

        let outcome = find_group_by_name(&server, "WebCrawler").await.unwrap();
        assert!(outcome.is_ambiguous());
        assert_eq!(outcome.len(), 2);
        let chosen = outcome.first("process group", "WebCrawler").unwrap();
        assert_eq!(chosen.id, first);
    }

    #[tokio::test]
    async fn test_processor_lookup_is_scoped_to_group() {
        let server = InMemoryFlowServer::new();
        let group = server.seed(|b| {
            let root = b.root();
            b.add_processor(&root, "FetchPage", RunState::Stopped, &[]);
            let group = b.add_group(&root, "Crawler");
            b.add_processor(&group, "FetchPage", RunState::Running, &[]);
            group
        });

        let outcome = find_processor_by_name(&server, &group, "FetchPage").await.unwrap();
        let LookupOutcome::Unique(processor) = outcome else {
            panic!("expected a unique match");
        };
        assert_eq!(processor.state(), RunState::Running);
    }
}
