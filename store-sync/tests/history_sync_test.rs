//! History sync, gap markers and gap filling against the scripted transport.

mod common;

use common::{drain, TestHarness};
use store_sync::storage::{ChatStorage, MessageStorage, MemoryStorage, SettingsStorage, TopicStorage};
use store_sync::test_utils::MockFailure;
use store_sync::{ChatKind, ChatSyncState, Filter, Shard, SyncError, SyncSignal};

const DAY: u32 = 24 * 60 * 60;

#[tokio::test]
async fn test_history_sync_covers_default_period() {
    let harness = TestHarness::with_config(
        common::test_config(),
        MemoryStorage::new().with_default_sync_period(3 * DAY),
    )
    .await;
    let filter = harness.add_chat("status").await;
    harness.connect().await;

    let report = harness.coordinator.request_all_historic_messages(false).await.unwrap();

    assert_eq!(report.batches, 3);
    let queries = harness.transport.queries();
    assert_eq!(queries.len(), 3);

    // Newest window first, contiguous, 24h each.
    let to = queries[0].1.to;
    for (i, (_, query)) in queries.iter().enumerate() {
        assert_eq!(query.to, to - i as u32 * DAY);
        assert_eq!(query.from, query.to - DAY);
        assert_eq!(query.content_topics, vec![filter.content_topic.clone()]);
        assert_eq!(query.pubsub_topic, filter.pubsub_topic);
    }

    let topics = harness.storage.topics().await.unwrap();
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0].last_request, to);

    let chat = harness.storage.chat("status").await.unwrap().unwrap();
    assert_eq!(chat.synced_to, to);
    assert_eq!(chat.synced_from, to - 3 * DAY);
}

#[tokio::test]
async fn test_resync_starts_from_bookmark_minus_tolerance() {
    let config = common::test_config().with_tolerance(60);
    let harness = TestHarness::with_config(config, MemoryStorage::new()).await;
    let filter = harness.add_chat("status").await;
    harness.connect().await;

    // A topic without a bookmark covers exactly the default period.
    harness.coordinator.request_all_historic_messages(false).await.unwrap();
    let first = harness.transport.queries();
    assert_eq!(first.len(), 1);
    let first_to = first[0].1.to;
    assert_eq!(first[0].1.from, first_to - DAY);

    harness.coordinator.request_all_historic_messages(false).await.unwrap();
    let queries = harness.transport.queries();
    assert_eq!(queries.len(), 2);
    let second = &queries[1].1;
    assert_eq!(second.from, first_to - 60);
    assert_eq!(second.content_topics, vec![filter.content_topic]);
}

#[tokio::test]
async fn test_follows_cursors_within_window() {
    let harness = TestHarness::new().await;
    let filter = harness.add_chat("status").await;
    harness.transport.script_pages(&filter.content_topic, 4, 5);
    harness.connect().await;

    let report = harness.coordinator.request_all_historic_messages(false).await.unwrap();

    assert_eq!(report.batches, 1);
    assert_eq!(report.envelopes, 20);
    assert_eq!(harness.transport.query_count(), 4);
}

#[tokio::test]
async fn test_history_signals_bracket_the_sync() {
    let harness = TestHarness::new().await;
    harness.add_chat("status").await;
    harness.connect().await;
    let mut signals = harness.coordinator.subscribe_signals();

    harness.coordinator.request_all_historic_messages(false).await.unwrap();

    assert_eq!(
        drain(&mut signals),
        vec![
            SyncSignal::HistoryRequestStarted {
                batches: 1
            },
            SyncSignal::HistoryRequestCompleted,
        ]
    );
}

#[tokio::test]
async fn test_muted_and_ephemeral_filters_are_skipped() {
    let harness = TestHarness::new().await;
    let shard = Shard::default().pubsub_topic();
    harness.transport.add_filter(Filter::new("muted", &shard, "0x0000aaaa").with_listen(false));
    harness.transport.add_filter(Filter::new("ephemeral", &shard, "0x0000bbbb").with_ephemeral(true));
    harness.connect().await;
    let mut signals = harness.coordinator.subscribe_signals();

    let report = harness.coordinator.request_all_historic_messages(false).await.unwrap();

    assert_eq!(report.batches, 0);
    assert_eq!(harness.transport.query_count(), 0);
    assert!(drain(&mut signals).is_empty());
}

#[tokio::test]
async fn test_backup_fetched_once_unless_forced() {
    let harness = TestHarness::new().await;
    harness.transport.set_personal_filter(Filter::new("personal", Shard::default().pubsub_topic(), "0xbac0bac0"));
    harness.connect().await;

    let backup_queries = |harness: &TestHarness| {
        harness.transport.queries().iter().filter(|(_, q)| q.content_topics == vec!["0xbac0bac0".to_string()]).count()
    };

    harness.coordinator.request_all_historic_messages(false).await.unwrap();
    let first = backup_queries(&harness);
    assert!(first >= 31, "backup window spans a month, got {} windows", first);
    assert!(harness.storage.backup_fetched().await.unwrap());

    harness.coordinator.request_all_historic_messages(false).await.unwrap();
    assert_eq!(backup_queries(&harness), first);

    harness.coordinator.request_all_historic_messages(true).await.unwrap();
    assert!(backup_queries(&harness) > first);
}

#[tokio::test]
async fn test_stale_chat_gets_gap_marker_and_fill_is_idempotent() {
    let harness = TestHarness::new().await;
    let now = store_sync::types::unix_now();
    let stale_to = now - 5 * DAY;
    harness
        .add_public_chat(ChatSyncState::new("status", ChatKind::Public).with_sync_range(stale_to - DAY, stale_to))
        .await;
    harness.connect().await;

    let report = harness.coordinator.request_all_historic_messages(false).await.unwrap();

    assert_eq!(report.gaps.len(), 1);
    let gap = report.gaps[0].clone();
    let range = gap.gap.unwrap();
    assert_eq!(range.from, stale_to);
    assert_eq!(range.to, harness.transport.queries()[0].1.from);
    assert_eq!(harness.storage.message_count().await, 1);

    let chat = harness.storage.chat("status").await.unwrap().unwrap();
    assert_eq!(chat.synced_from, stale_to - DAY);

    // Filling fetches exactly the gap range, then drops the marker.
    let before = harness.transport.query_count();
    harness.coordinator.fill_gaps("status", &[gap.id.clone()]).await.unwrap();
    let queries = harness.transport.queries();
    assert_eq!(queries.len(), before + 1);
    assert_eq!(queries[before].1.from, range.from);
    assert_eq!(queries[before].1.to, range.to);
    assert_eq!(harness.storage.message_count().await, 0);

    harness.coordinator.fill_gaps("status", &[gap.id]).await.unwrap();
    assert_eq!(harness.transport.query_count(), before + 1);
}

#[tokio::test]
async fn test_fill_gaps_rejects_regular_messages() {
    let harness = TestHarness::new().await;
    harness.add_chat("status").await;
    harness.connect().await;

    let message = store_sync::StoredMessage {
        id: "msg-1".to_string(),
        chat_id: "status".to_string(),
        clock: 1,
        timestamp: 1_000,
        gap: None,
    };
    harness.storage.save_messages(&[message]).await.unwrap();

    let result = harness.coordinator.fill_gaps("status", &["msg-1".to_string()]).await;
    assert_eq!(result, Err(SyncError::NotAGap("msg-1".to_string())));
    assert_eq!(harness.storage.message_count().await, 1);
}

#[tokio::test]
async fn test_failed_window_keeps_bookmarks() {
    let harness = TestHarness::new().await;
    harness.add_chat("status").await;
    harness.connect().await;
    harness.transport.fail_next([MockFailure::Protocol]);

    let result = harness.coordinator.request_all_historic_messages(false).await;

    assert!(matches!(result, Err(SyncError::Protocol(_))));
    assert!(harness.storage.topics().await.unwrap().is_empty());
    assert_eq!(harness.storage.chat("status").await.unwrap().unwrap().synced_to, 0);
}

#[tokio::test]
async fn test_history_without_store_node_fails_fast() {
    let harness = TestHarness::new().await;
    harness.add_chat("status").await;

    let result = harness.coordinator.request_all_historic_messages(false).await;

    assert_eq!(result.unwrap_err(), SyncError::NodeUnavailable);
    assert_eq!(harness.transport.query_count(), 0);
}

#[tokio::test]
async fn test_sync_chat_extends_history_backwards() {
    let harness = TestHarness::new().await;
    harness
        .add_public_chat(ChatSyncState::new("status", ChatKind::Public).with_sync_range(1_000_000 + DAY, 1_000_000 + 2 * DAY))
        .await;
    harness.connect().await;

    let synced_from = harness.coordinator.sync_chat_from_synced_from("status").await.unwrap();

    assert_eq!(synced_from, 1_000_000);
    let query = &harness.transport.queries()[0].1;
    assert_eq!((query.from, query.to), (1_000_000, 1_000_000 + DAY));
    let chat = harness.storage.chat("status").await.unwrap().unwrap();
    assert_eq!((chat.synced_from, chat.synced_to), (1_000_000, 1_000_000 + 2 * DAY));
}

#[tokio::test]
async fn test_unknown_chat_is_reported() {
    let harness = TestHarness::new().await;
    harness.connect().await;

    let result = harness.coordinator.fetch_messages("nope", std::time::Duration::from_secs(60)).await;
    assert_eq!(result, Err(SyncError::ChatNotFound("nope".to_string())));
}
