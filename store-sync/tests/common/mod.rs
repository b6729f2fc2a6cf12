//! Shared setup for store-sync integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use store_sync::storage::{ChatStorage, MemoryStorage, NodeStorage};
use store_sync::test_utils::{content_topic_for, MockDirectory, MockTransport};
use store_sync::{ChatKind, ChatSyncState, Config, Filter, Shard, StoreNode, SyncCoordinator, SyncSignal};

pub const FLEET: &str = "test.fleet";

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).with_test_writer().try_init();
}

/// Custom store node `node-<n>` of the test fleet.
pub fn store_node(n: usize) -> StoreNode {
    StoreNode::new(format!("node-{}", n), format!("/ip4/10.0.0.{}/tcp/30303", n), FLEET, 2)
}

/// Config with short timings, exact 24h windows and no automatic history request.
pub fn test_config() -> Config {
    Config::new(FLEET)
        .with_auto_request_historic_messages(false)
        .with_tolerance(0)
        .with_retry_backoff(Duration::from_millis(10))
        .with_producer_delay(Duration::from_millis(1))
        .with_node_available_timeout(Duration::from_millis(200))
}

/// Public filter on the default shard, matching what the mock transport would install.
pub fn public_filter(chat_id: &str) -> Filter {
    Filter::new(chat_id, Shard::default().pubsub_topic(), content_topic_for(chat_id))
}

pub struct TestHarness {
    pub coordinator: SyncCoordinator,
    pub transport: Arc<MockTransport>,
    pub storage: Arc<MemoryStorage>,
    pub directory: Arc<MockDirectory>,
    pub nodes: Vec<StoreNode>,
}

impl TestHarness {
    /// One reachable store node, not yet connected.
    pub async fn new() -> Self {
        Self::with_config(test_config(), MemoryStorage::new()).await
    }

    pub async fn with_config(config: Config, storage: MemoryStorage) -> Self {
        Self::with_pings(config, storage, &[Some(10)]).await
    }

    /// One custom node per entry of `pings`; `None` is unreachable.
    pub async fn with_pings(config: Config, storage: MemoryStorage, pings: &[Option<u64>]) -> Self {
        init_logging();

        let storage = Arc::new(storage.with_fleet(FLEET));
        let directory = MockDirectory::new();
        let mut nodes = Vec::new();
        for (i, rtt) in pings.iter().enumerate() {
            let node = store_node(i + 1);
            storage.add_custom_store_node(node.clone().into_custom()).await.unwrap();
            directory.set_ping(&node.address, *rtt);
            nodes.push(node);
        }

        let transport = Arc::new(MockTransport::new().with_storage(storage.clone()));
        let directory = Arc::new(directory);
        let coordinator =
            SyncCoordinator::new(config, transport.clone(), directory.clone(), storage.clone()).unwrap();

        Self {
            coordinator,
            transport,
            storage,
            directory,
            nodes,
        }
    }

    /// Select and connect a store node.
    pub async fn connect(&self) -> StoreNode {
        self.coordinator.manager().ensure_active().await.unwrap().expect("a reachable store node")
    }

    /// Install a public filter for `chat_id` and store its chat.
    pub async fn add_public_chat(&self, chat: ChatSyncState) -> Filter {
        let filter = public_filter(&chat.id);
        self.transport.add_filter(filter.clone());
        self.storage.save_chat(chat).await.unwrap();
        filter
    }

    pub async fn add_chat(&self, chat_id: &str) -> Filter {
        self.add_public_chat(ChatSyncState::new(chat_id, ChatKind::Public)).await
    }
}

/// Drain every signal received so far.
pub fn drain(receiver: &mut store_sync::EventReceiver<SyncSignal>) -> Vec<SyncSignal> {
    let mut signals = Vec::new();
    while let Some(signal) = receiver.try_recv() {
        signals.push(signal);
    }
    signals
}
