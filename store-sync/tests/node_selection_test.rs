//! Store node selection, graylisting, pinning and the enable toggle.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use common::{drain, TestHarness, FLEET};
use store_sync::network::ConnectionStatus;
use store_sync::storage::{MemoryStorage, SettingsStorage};
use store_sync::{ConnectionState, StoreSyncError, SyncError, SyncSignal};

const PINGS: [Option<u64>; 5] = [Some(10), Some(20), Some(30), None, Some(40)];

async fn five_nodes() -> TestHarness {
    TestHarness::with_pings(common::test_config(), MemoryStorage::new(), &PINGS).await
}

#[tokio::test]
async fn test_fastest_reachable_node_is_selected() {
    let harness = five_nodes().await;

    // Four reachable nodes: the pool is the single fastest one.
    for _ in 0..10 {
        let picked = harness.coordinator.manager().select_node().await.unwrap().unwrap();
        assert_eq!(picked.id, "node-1");
    }
}

#[tokio::test]
async fn test_connect_publishes_availability() {
    let harness = five_nodes().await;
    let mut signals = harness.coordinator.subscribe_signals();

    let node = harness.connect().await;

    assert_eq!(
        drain(&mut signals),
        vec![
            SyncSignal::MailserverChanged {
                address: node.address.clone(),
                id: node.id.clone()
            },
            SyncSignal::MailserverAvailable {
                address: node.address.clone(),
                id: node.id.clone()
            },
        ]
    );
    let status = harness.coordinator.manager().node_status(&node.id).await.unwrap();
    assert_eq!(status.status, ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_failing_node_is_graylisted() {
    let harness = five_nodes().await;
    let manager = harness.coordinator.manager().clone();
    let node = harness.connect().await;
    assert_eq!(node.id, "node-1");
    let mut signals = harness.coordinator.subscribe_signals();

    assert!(!manager.mark_failure(&node).await);
    assert!(manager.mark_failure(&node).await);

    assert_eq!(manager.active_node(None).await.unwrap(), None);
    assert!(drain(&mut signals).contains(&SyncSignal::MailserverNotWorking));

    // Not picked again for the whole graylist period.
    for _ in 0..5 {
        let picked = manager.select_node().await.unwrap().unwrap();
        assert_eq!(picked.id, "node-2");
        tokio::time::advance(Duration::from_secs(30)).await;
    }
    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(manager.select_node().await.unwrap().unwrap().id, "node-2");

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(manager.select_node().await.unwrap().unwrap().id, "node-1");
}

#[tokio::test]
async fn test_success_resets_failure_count() {
    let harness = five_nodes().await;
    let manager = harness.coordinator.manager().clone();
    let node = harness.connect().await;

    assert!(!manager.mark_failure(&node).await);
    manager.mark_success(&node).await;
    assert!(!manager.mark_failure(&node).await);
    assert_eq!(manager.active_node(None).await.unwrap(), Some(node));
}

#[tokio::test]
async fn test_pinned_node_wins_over_latency() {
    let harness = five_nodes().await;
    harness.connect().await;

    let pinned = HashMap::from([(FLEET.to_string(), "node-5".to_string())]);
    harness.coordinator.set_pinned_mailservers(pinned.clone()).await.unwrap();

    assert_eq!(harness.storage.pinned_store_nodes().await.unwrap(), pinned);
    let active = harness.coordinator.active_store_node(None).await.unwrap().unwrap();
    assert_eq!(active.id, "node-5");
}

#[tokio::test]
async fn test_unknown_pinned_node_falls_back_to_selection() {
    let harness = five_nodes().await;

    let pinned = HashMap::from([(FLEET.to_string(), "node-99".to_string())]);
    harness.coordinator.set_pinned_mailservers(pinned).await.unwrap();

    let active = harness.coordinator.active_store_node(None).await.unwrap().unwrap();
    assert_eq!(active.id, "node-1");
}

#[tokio::test]
async fn test_toggle_use_mailservers() {
    let harness = five_nodes().await;
    harness.connect().await;

    harness.coordinator.toggle_use_mailservers(false).await.unwrap();
    assert!(!harness.storage.can_use_store_nodes().await.unwrap());
    assert_eq!(harness.coordinator.active_store_node(None).await.unwrap(), None);
    assert_eq!(harness.coordinator.manager().select_node().await.unwrap(), None);

    harness.coordinator.toggle_use_mailservers(true).await.unwrap();
    assert!(harness.coordinator.active_store_node(None).await.unwrap().is_some());
}

#[tokio::test]
async fn test_no_reachable_node() {
    let harness =
        TestHarness::with_pings(common::test_config(), MemoryStorage::new(), &[None, None]).await;
    assert_eq!(harness.coordinator.manager().ensure_active().await.unwrap(), None);
    assert!(!harness.coordinator.manager().is_available(None).await.unwrap());
}

#[tokio::test]
async fn test_community_store_node_overrides_active() {
    let harness = five_nodes().await;
    harness.connect().await;
    let dedicated = common::store_node(9);

    harness.coordinator.set_community_store_node("0xab", Some(dedicated.clone())).await.unwrap();

    assert_eq!(harness.coordinator.active_store_node(Some("0xab")).await.unwrap(), Some(dedicated.clone()));
    assert_eq!(harness.coordinator.active_store_node(None).await.unwrap().unwrap().id, "node-1");
    assert!(harness.transport.peers().contains(&dedicated));

    harness.coordinator.set_community_store_node("0xab", None).await.unwrap();
    assert_eq!(harness.coordinator.active_store_node(Some("0xab")).await.unwrap().unwrap().id, "node-1");
}

#[tokio::test]
async fn test_connection_changes_reach_transport() {
    let harness = five_nodes().await;
    harness.connect().await;

    harness.coordinator.connection_changed(ConnectionState::offline()).await;
    assert!(!harness.coordinator.manager().is_online().await);
    assert!(!harness.coordinator.manager().should_sync().await.unwrap());

    harness.coordinator.connection_changed(ConnectionState::online()).await;
    assert!(harness.coordinator.manager().should_sync().await.unwrap());
    assert_eq!(
        harness.transport.connection_states(),
        vec![ConnectionState::offline(), ConnectionState::online()]
    );
}

#[tokio::test]
async fn test_start_registers_peers_and_stop_disconnects() {
    let harness = five_nodes().await;

    harness.coordinator.start().await.unwrap();
    assert!(harness.coordinator.is_running().await);
    assert_eq!(harness.transport.peers().len(), 5);

    let node = harness.connect().await;
    harness.coordinator.stop().await.unwrap();

    assert!(!harness.coordinator.is_running().await);
    assert_eq!(harness.coordinator.active_store_node(None).await.unwrap(), None);
    let status = harness.coordinator.manager().node_status(&node.id).await.unwrap();
    assert_eq!(status.status, ConnectionStatus::Disconnected);

    // A stopped coordinator stays stopped.
    assert!(matches!(harness.coordinator.start().await, Err(StoreSyncError::Config(_))));
}

#[tokio::test]
async fn test_version_one_transport_is_rejected() {
    use std::sync::Arc;
    use store_sync::test_utils::{MockDirectory, MockTransport};

    let coordinator = store_sync::SyncCoordinator::new(
        common::test_config(),
        Arc::new(MockTransport::new().with_version(1)),
        Arc::new(MockDirectory::new()),
        Arc::new(MemoryStorage::new()),
    )
    .unwrap();

    let result = coordinator.start().await;
    assert!(matches!(result, Err(StoreSyncError::Sync(SyncError::InvalidState(_)))));
}
