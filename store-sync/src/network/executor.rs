//! Bounded-retry wrapper for store node operations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::client::Config;
use crate::error::{SyncError, SyncResult};
use crate::network::manager::StoreNodeManager;
use crate::types::StoreNode;

/// Runs an operation against the active store node, feeding every outcome back
/// into the node's health.
#[derive(Clone)]
pub struct RequestExecutor {
    manager: Arc<StoreNodeManager>,
    max_tries: u32,
    retry_backoff: Duration,
}

impl RequestExecutor {
    pub fn new(manager: Arc<StoreNodeManager>, config: &Config) -> Self {
        Self {
            manager,
            max_tries: config.max_request_tries,
            retry_backoff: config.retry_backoff,
        }
    }

    pub fn manager(&self) -> &Arc<StoreNodeManager> {
        &self.manager
    }

    /// Run `operation` with up to `max_tries` attempts.
    ///
    /// Fails fast with [`SyncError::NodeUnavailable`] when there is no usable
    /// node. Errors that are not transient are returned without a retry and do
    /// not count against the node. A node that crosses the failure threshold
    /// ends the attempts with [`SyncError::TooManyFailedRequests`].
    pub async fn perform<T, F, Fut>(&self, community: Option<&str>, mut operation: F) -> SyncResult<T>
    where
        F: FnMut(StoreNode) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut last_error = SyncError::NodeUnavailable;

        for attempt in 1..=self.max_tries {
            if !self.manager.is_available(community).await? {
                return Err(SyncError::NodeUnavailable);
            }
            let node = self.manager.active_node(community).await?.ok_or(SyncError::NodeUnavailable)?;

            match operation(node.clone()).await {
                Ok(value) => {
                    self.manager.mark_success(&node).await;
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Store node request to {} failed (attempt {}/{}): {}",
                        node.id,
                        attempt,
                        self.max_tries,
                        e
                    );
                    if self.manager.mark_failure(&node).await {
                        return Err(SyncError::TooManyFailedRequests(node.id));
                    }
                    last_error = e;
                }
            }

            if attempt < self.max_tries {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use crate::storage::{MemoryStorage, NodeStorage};
    use crate::test_utils::{MockDirectory, MockTransport};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const FLEET: &str = "test.fleet";

    async fn setup(connect: bool) -> (RequestExecutor, Arc<StoreNodeManager>) {
        let storage = Arc::new(MemoryStorage::new().with_fleet(FLEET));
        let node = StoreNode::new("node-a", "/ip4/10.0.0.1/tcp/30303", FLEET, 2);
        storage.add_custom_store_node(node.clone()).await.unwrap();

        let config = Arc::new(Config::new(FLEET).with_retry_backoff(Duration::from_millis(5)));
        let manager = Arc::new(StoreNodeManager::new(
            config.clone(),
            Arc::new(MockTransport::new()),
            Arc::new(MockDirectory::new().with_ping(&node.address, Some(10))),
            storage,
            EventBus::default(),
        ));
        if connect {
            manager.ensure_active().await.unwrap();
        }
        (RequestExecutor::new(manager.clone(), &config), manager)
    }

    fn scripted(results: Vec<SyncResult<u32>>) -> Arc<Mutex<VecDeque<SyncResult<u32>>>> {
        Arc::new(Mutex::new(results.into()))
    }

    #[tokio::test]
    async fn test_no_active_node_fails_fast() {
        let (executor, _) = setup(false).await;
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let result = executor
            .perform(None, move |_node| {
                *counter.lock().unwrap() += 1;
                async { Ok::<_, SyncError>(1u32) }
            })
            .await;

        assert_eq!(result, Err(SyncError::NodeUnavailable));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_transient_failure() {
        let (executor, manager) = setup(true).await;
        let results = scripted(vec![Err(SyncError::Network("reset".into())), Ok(7)]);

        let result = executor
            .perform(None, |_node| {
                let next = results.lock().unwrap().pop_front().unwrap();
                async move { next }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert!(results.lock().unwrap().is_empty());
        assert_eq!(manager.node_status("node-a").await.unwrap().failed_requests, 0);
    }

    #[tokio::test]
    async fn test_protocol_error_is_not_retried() {
        let (executor, manager) = setup(true).await;
        let results = scripted(vec![Err(SyncError::Protocol("bad cursor".into())), Ok(1)]);

        let result = executor
            .perform(None, |_node| {
                let next = results.lock().unwrap().pop_front().unwrap();
                async move { next }
            })
            .await;

        assert_eq!(result, Err(SyncError::Protocol("bad cursor".into())));
        assert_eq!(results.lock().unwrap().len(), 1);
        assert_eq!(manager.node_status("node-a").await.unwrap().failed_requests, 0);
    }

    #[tokio::test]
    async fn test_failure_threshold_drops_node() {
        let (executor, manager) = setup(true).await;
        let results = scripted(vec![
            Err(SyncError::Network("reset".into())),
            Err(SyncError::Timeout("page".into())),
        ]);

        let result = executor
            .perform(None, |_node| {
                let next = results.lock().unwrap().pop_front().unwrap();
                async move { next }
            })
            .await;

        assert_eq!(result, Err(SyncError::TooManyFailedRequests("node-a".into())));
        assert_eq!(manager.active_node(None).await.unwrap(), None);
        assert!(!manager.is_available(None).await.unwrap());
    }
}
