//! Pre-order traversal of nested process groups
//!
//! The walker is lazy: each call to [`TreeWalker::next`] fetches exactly one
//! group, so every visit sees the server's state at that moment rather than
//! a snapshot taken when the walk began.

use crate::error::{DeployError, Result};
use nifi_client::FlowApi;
use nifi_types::{GroupId, ProcessGroupFlow};
use tracing::debug;

/// One group reached by the walk
#[derive(Debug, Clone)]
pub struct GroupVisit {
    pub flow: ProcessGroupFlow,
    /// Names from the canvas root down to this group, joined with `/`
    pub path: String,
    /// Distance from the group the walk started at
    pub depth: usize,
}

impl GroupVisit {
    pub fn id(&self) -> &GroupId {
        &self.flow.id
    }
}

struct Pending {
    id: GroupId,
    /// Name as listed by the parent; unknown for the starting group
    name: Option<String>,
    depth: usize,
    parent_path: String,
}

/// Lazy, restartable pre-order walk over a group and its descendants
pub struct TreeWalker<'a> {
    api: &'a dyn FlowApi,
    root: GroupId,
    stack: Vec<Pending>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(api: &'a dyn FlowApi, root: GroupId) -> Self {
        let mut walker = Self {
            api,
            root,
            stack: Vec::new(),
        };
        walker.restart();
        walker
    }

    pub fn root(&self) -> &GroupId {
        &self.root
    }

    /// Reset the walk to its starting group
    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push(Pending {
            id: self.root.clone(),
            name: None,
            depth: 0,
            parent_path: String::new(),
        });
    }

    /// Fetch the next group, parent before children, siblings in server order
    ///
    /// A failed fetch is yielded once as [`DeployError::Walk`] and ends the
    /// walk; the unreachable subtree is never skipped silently.
    pub async fn next(&mut self) -> Option<Result<GroupVisit>> {
        let pending = self.stack.pop()?;

        match self.api.group_flow(&pending.id).await {
            Ok(flow) => {
                let path = flow
                    .breadcrumb
                    .as_ref()
                    .map(|b| b.path())
                    .unwrap_or_else(|| join_path(&pending.parent_path, flow.name()));

                for child in flow.flow.process_groups.iter().rev() {
                    self.stack.push(Pending {
                        id: child.id.clone(),
                        name: Some(child.name().to_string()),
                        depth: pending.depth + 1,
                        parent_path: path.clone(),
                    });
                }

                debug!(group_id = %flow.id, path = %path, depth = pending.depth, "Visiting group");
                Some(Ok(GroupVisit {
                    flow,
                    path,
                    depth: pending.depth,
                }))
            }
            Err(source) => {
                self.stack.clear();
                let name = pending.name.as_deref().unwrap_or(pending.id.as_str());
                Some(Err(DeployError::Walk {
                    path: join_path(&pending.parent_path, name),
                    group_id: pending.id,
                    source,
                }))
            }
        }
    }

    /// Drain the walk into a vector, stopping at the first failure
    pub async fn collect(mut self) -> Result<Vec<GroupVisit>> {
        let mut visits = Vec::new();
        while let Some(visit) = self.next().await {
            visits.push(visit?);
        }
        Ok(visits)
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nifi_client::InMemoryFlowServer;

    fn nested_server() -> (InMemoryFlowServer, GroupId) {
        let server = InMemoryFlowServer::new();
        let top = server.seed(|b| {
            let root = b.root();
            let top = b.add_group(&root, "WebCrawler");
            let fetch = b.add_group(&top, "Fetch");
            b.add_group(&fetch, "Retry");
            b.add_group(&top, "Store");
            top
        });
        (server, top)
    }

    #[tokio::test]
    async fn test_walk_is_pre_order() {
        let (server, top) = nested_server();
        let visits = TreeWalker::new(&server, top).collect().await.unwrap();

        let paths: Vec<_> = visits.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "NiFi Flow/WebCrawler",
                "NiFi Flow/WebCrawler/Fetch",
                "NiFi Flow/WebCrawler/Fetch/Retry",
                "NiFi Flow/WebCrawler/Store",
            ]
        );
        let depths: Vec<_> = visits.iter().map(|v| v.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 1]);
    }

    #[tokio::test]
    async fn test_restart_begins_again_at_root() {
        let (server, top) = nested_server();
        let mut walker = TreeWalker::new(&server, top.clone());
        walker.next().await.unwrap().unwrap();
        walker.next().await.unwrap().unwrap();

        walker.restart();
        let first = walker.next().await.unwrap().unwrap();
        assert_eq!(first.id(), &top);
    }

    #[tokio::test]
    async fn test_missing_group_ends_walk_with_error() {
        let server = InMemoryFlowServer::new();
        let mut walker = TreeWalker::new(&server, GroupId::new("gone"));

        let err = walker.next().await.unwrap().unwrap_err();
        assert!(matches!(err, DeployError::Walk { .. }));
        assert!(walker.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_child_stops_walk_before_later_siblings() {
        let server = InMemoryFlowServer::new();
        let (top, fetch) = server.seed(|b| {
            let root = b.root();
            let top = b.add_group(&root, "WebCrawler");
            let fetch = b.add_group(&top, "Fetch");
            b.add_group(&fetch, "Retry");
            b.add_group(&top, "Store");
            (top, fetch)
        });
        server.fail_group_flow(&fetch);

        let mut walker = TreeWalker::new(&server, top.clone());
        let first = walker.next().await.unwrap().unwrap();
        assert_eq!(first.id(), &top);

        let err = walker.next().await.unwrap().unwrap_err();
        let DeployError::Walk { path, group_id, source } = err else {
            panic!("expected a walk error");
        };
        assert_eq!(path, "NiFi Flow/WebCrawler/Fetch");
        assert_eq!(group_id, fetch);
        assert_eq!(source.status(), Some(500));

        // Store comes after Fetch and must not be reached
        assert!(walker.next().await.is_none());
    }

    #[tokio::test]
    async fn test_collect_stops_at_unreadable_child() {
        let (server, top) = nested_server();
        let fetch = server.groups_named("Fetch")[0].clone();
        server.fail_group_flow(&fetch);

        let err = TreeWalker::new(&server, top).collect().await.unwrap_err();
        assert!(matches!(err, DeployError::Walk { group_id, .. } if group_id == fetch));
    }
}
