//! Paginated batch execution over the scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use store_sync::network::{node_query, StoreTransport};
use store_sync::sync::{FetchOutcome, FollowAllPages, PaginatedFetcher};
use store_sync::test_utils::{MockFailure, MockTransport};
use store_sync::types::Cursor;
use store_sync::{Config, Shard, StoreBatch, SyncError};
use tokio_util::sync::CancellationToken;

fn batch(topics: &[&str]) -> StoreBatch {
    StoreBatch::new(1_000, 1_000 + 86_400, Shard::default().pubsub_topic())
        .with_topics(topics.iter().map(|t| t.to_string()).collect())
}

fn fetcher(config: &Config) -> PaginatedFetcher {
    PaginatedFetcher::new(config)
}

#[tokio::test]
async fn test_follows_cursor_chain_to_the_end() {
    let transport = Arc::new(MockTransport::new());
    transport.script_pages("0xaaaa", 6, 2);
    let query = node_query(transport.clone() as Arc<dyn StoreTransport>, common::store_node(1));

    let outcome = fetcher(&common::test_config())
        .fetch(&batch(&["0xaaaa"]), 4, &FollowAllPages { page_size: 20 }, query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome { pages: 6, envelopes: 12 });
    let queries = transport.queries();
    assert_eq!(queries.len(), 6);
    assert_eq!(queries[0].1.cursor, None);
    assert_eq!(queries[0].1.page_size, 4);
    for (k, (node_id, query)) in queries.iter().enumerate().skip(1) {
        assert_eq!(node_id, "node-1");
        assert_eq!(query.cursor, Some(Cursor::new(format!("0xaaaa-{}", k).into_bytes())));
        assert_eq!(query.page_size, 20);
    }
}

#[tokio::test]
async fn test_topics_are_split_into_groups() {
    let transport = Arc::new(MockTransport::new());
    let query = node_query(transport.clone() as Arc<dyn StoreTransport>, common::store_node(1));
    let mut config = common::test_config();
    config.max_topics_per_request = 2;

    let topics = ["0x01", "0x02", "0x03", "0x04", "0x05"];
    let outcome = fetcher(&config)
        .fetch(&batch(&topics), 20, &FollowAllPages { page_size: 20 }, query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.pages, 3);
    let mut seen: Vec<String> = transport
        .queries()
        .into_iter()
        .inspect(|(_, q)| assert!(q.content_topics.len() <= 2))
        .flat_map(|(_, q)| q.content_topics)
        .collect();
    seen.sort();
    assert_eq!(seen, topics.iter().map(|t| t.to_string()).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_returns_promptly() {
    let transport = Arc::new(MockTransport::new());
    transport.set_delay(Duration::from_secs(60));
    let query = node_query(transport.clone() as Arc<dyn StoreTransport>, common::store_node(1));
    let config = common::test_config().with_page_timeout(Duration::from_secs(120));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let result = fetcher(&config)
        .fetch(&batch(&["0xaaaa"]), 20, &FollowAllPages { page_size: 20 }, query, &cancel)
        .await;

    assert_eq!(result, Err(SyncError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.query_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_first_error_stops_remaining_groups() {
    let transport = Arc::new(MockTransport::new());
    transport.set_delay(Duration::from_millis(10));
    transport.fail_next([MockFailure::Protocol]);
    transport.script_pages("0x0b", 50, 1);
    transport.script_pages("0x0c", 50, 1);
    let query = node_query(transport.clone() as Arc<dyn StoreTransport>, common::store_node(1));
    let mut config = common::test_config();
    config.max_topics_per_request = 1;

    let result = fetcher(&config)
        .fetch(&batch(&["0x0a", "0x0b", "0x0c"]), 20, &FollowAllPages { page_size: 20 }, query, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SyncError::Protocol(_))));
    assert!(transport.query_count() < 3, "in-flight pages were not cancelled");
}

#[tokio::test]
async fn test_transient_failure_surfaces_as_network_error() {
    let transport = Arc::new(MockTransport::new());
    transport.fail_next([MockFailure::ConnectionFailed]);
    let query = node_query(transport.clone() as Arc<dyn StoreTransport>, common::store_node(1));

    let result = fetcher(&common::test_config())
        .fetch(&batch(&["0xaaaa"]), 20, &FollowAllPages { page_size: 20 }, query, &CancellationToken::new())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
    assert!(err.is_retryable());
}
