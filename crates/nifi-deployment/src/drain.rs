//! Queue drain coordination
//!
//! A group can only be removed once every connection in its subtree is
//! empty. Draining is the one place the engine waits on remote progress:
//! a drop request is issued per non-empty connection and polled until the
//! server reports it finished.
//!
//! The wait is bounded by [`DrainPolicy::timeout`]. Cancellation is
//! cooperative: dropping the future stops polling at the next await point.

use crate::error::{DeployError, Result};
use crate::walker::TreeWalker;
use nifi_client::FlowApi;
use nifi_types::{ConnectionId, DropRequest, GroupId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// How a drain waits for drop requests to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Upper bound on the whole drain; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl DrainPolicy {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    pub fn unbounded(self) -> Self {
        Self {
            timeout: None,
            ..self
        }
    }
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POLL_INTERVAL, Some(Self::DEFAULT_TIMEOUT))
    }
}

/// Outcome of draining one subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Connections that needed a drop request
    pub connections: usize,
    /// Flow files queued across those connections when the drain began
    pub flow_files: u64,
    /// Status polls issued across all drop requests
    pub polls: usize,
}

/// Empties every connection queue of a group and its descendants
pub struct QueueDrainer<'a> {
    api: &'a dyn FlowApi,
    policy: DrainPolicy,
}

impl<'a> QueueDrainer<'a> {
    pub fn new(api: &'a dyn FlowApi, policy: DrainPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> &DrainPolicy {
        &self.policy
    }

    /// Drain every non-empty connection in the subtree rooted at `group`
    ///
    /// Returns only once each of them has reported its drop request
    /// finished. A drop request that fails or cannot be created fails the
    /// whole drain.
    #[instrument(skip(self), fields(group_id = %group))]
    pub async fn drain_group(&self, group: &GroupId) -> Result<DrainSummary> {
        let started = Instant::now();
        let deadline = self.policy.timeout.map(|t| started + t);
        let mut summary = DrainSummary::default();

        let mut walker = TreeWalker::new(self.api, group.clone());
        while let Some(visit) = walker.next().await {
            let visit = visit?;
            for connection in &visit.flow.flow.connections {
                let queued = connection.queued();
                if queued == 0 {
                    continue;
                }
                debug!(
                    connection_id = %connection.id,
                    path = %visit.path,
                    queued,
                    "Requesting drop"
                );
                summary.connections += 1;
                summary.flow_files += queued;
                summary.polls += self
                    .drain_connection(&connection.id, started, deadline)
                    .await?;
            }
        }

        info!(
            connections = summary.connections,
            flow_files = summary.flow_files,
            polls = summary.polls,
            "Queues drained"
        );
        Ok(summary)
    }

    /// Issue a drop request and poll until it finishes, returning the poll count
    async fn drain_connection(
        &self,
        connection: &ConnectionId,
        started: Instant,
        deadline: Option<Instant>,
    ) -> Result<usize> {
        let mut request = self.api.create_drop_request(connection).await?;
        check_failure(connection, &request)?;

        let mut polls = 0;
        while !request.finished {
            if let Some(deadline) = deadline {
                if Instant::now() + self.policy.poll_interval > deadline {
                    warn!(connection_id = %connection, polls, "Drain deadline reached");
                    self.discard(connection, &request).await;
                    return Err(DeployError::Timeout {
                        operation: format!("drop request on connection {}", connection),
                        elapsed: started.elapsed(),
                    });
                }
            }

            debug!(
                connection_id = %connection,
                current = ?request.current_count,
                "Drop request not finished, waiting"
            );
            tokio::time::sleep(self.policy.poll_interval).await;

            request = self.api.drop_request(connection, &request.id).await?;
            polls += 1;
            check_failure(connection, &request)?;
        }

        self.api.delete_drop_request(connection, &request.id).await?;
        debug!(connection_id = %connection, polls, dropped = ?request.dropped_count, "Drop request finished");
        Ok(polls)
    }

    /// Best-effort cleanup of an abandoned drop request
    async fn discard(&self, connection: &ConnectionId, request: &DropRequest) {
        if let Err(e) = self.api.delete_drop_request(connection, &request.id).await {
            warn!(connection_id = %connection, error = %e, "Failed to discard drop request");
        }
    }
}

fn check_failure(connection: &ConnectionId, request: &DropRequest) -> Result<()> {
    match &request.failure_reason {
        Some(reason) => Err(DeployError::Drain {
            connection: connection.clone(),
            reason: reason.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nifi_client::{ApiCall, InMemoryFlowServer};

    #[tokio::test(start_paused = true)]
    async fn test_empty_connections_need_no_drop_request() {
        let server = InMemoryFlowServer::new().with_drop_polls(3);
        let group = server.seed(|b| {
            let root = b.root();
            let group = b.add_group(&root, "Idle");
            b.add_connection(&group, 0);
            group
        });

        let summary = QueueDrainer::new(&server, DrainPolicy::default())
            .drain_group(&group)
            .await
            .unwrap();
        assert_eq!(summary, DrainSummary::default());
        assert!(server.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_connections_are_drained() {
        let server = InMemoryFlowServer::new().with_drop_polls(1);
        let (group, nested) = server.seed(|b| {
            let root = b.root();
            let group = b.add_group(&root, "Ingest");
            let child = b.add_group(&group, "Parse");
            (group, b.add_connection(&child, 40))
        });

        let summary = QueueDrainer::new(&server, DrainPolicy::default())
            .drain_group(&group)
            .await
            .unwrap();
        assert_eq!(summary.connections, 1);
        assert_eq!(summary.flow_files, 40);
        assert_eq!(server.queued(&nested), Some(0));
        assert!(server
            .calls()
            .contains(&ApiCall::DeleteDropRequest { connection: nested }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_the_wait() {
        let server = InMemoryFlowServer::new().with_drop_polls(100);
        let group = server.seed(|b| {
            let root = b.root();
            let group = b.add_group(&root, "Stuck");
            b.add_connection(&group, 1);
            group
        });

        let policy = DrainPolicy::new(Duration::from_secs(5), Some(Duration::from_secs(30)));
        let err = QueueDrainer::new(&server, policy)
            .drain_group(&group)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Timeout { .. }));
    }
}
