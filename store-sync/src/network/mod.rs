//! Store node networking: the transport seam, node health, selection and retries.

pub mod constants;
pub mod executor;
pub mod fleet;
pub mod health;
pub mod manager;
pub mod ping;
pub mod selector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{NetworkResult, SyncError, SyncResult};
use crate::types::{ConnectionState, Cursor, Filter, StoreNode};

pub use executor::RequestExecutor;
pub use health::{ConnectionStatus, NodeHealthTracker, NodeStatus};
pub use manager::StoreNodeManager;
pub use ping::TcpPingDirectory;

/// One page request against a store node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreQuery {
    pub from: u32,
    pub to: u32,
    pub cursor: Option<Cursor>,
    pub pubsub_topic: String,
    pub content_topics: Vec<String>,
    pub page_size: u32,
}

/// What a store node returned for one page. Envelopes are handed to the
/// transport's own processing queue; only their count surfaces here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorePage {
    /// Present when more pages exist.
    pub cursor: Option<Cursor>,
    pub envelopes: usize,
}

/// Chat that needs a public filter installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRequest {
    pub chat_id: String,
    pub pubsub_topic: String,
}

/// The pub/sub transport history is fetched through.
#[async_trait]
pub trait StoreTransport: Send + Sync {
    /// Protocol version; store node candidates are filtered to match it.
    fn waku_version(&self) -> u32;

    /// Make a store node dialable.
    async fn add_store_peer(&self, node: &StoreNode) -> NetworkResult<()>;

    /// Fetch one page of history.
    async fn query_store(&self, node: &StoreNode, query: StoreQuery) -> NetworkResult<StorePage>;

    /// Decode and persist envelopes received so far. Resources they carry
    /// (communities, contacts, shard info) become visible in storage afterwards.
    async fn process_received_envelopes(&self) -> NetworkResult<()>;

    /// All installed filters.
    async fn filters(&self) -> NetworkResult<Vec<Filter>>;

    async fn filter_by_chat_id(&self, chat_id: &str) -> NetworkResult<Option<Filter>>;

    /// Private filters for the given public keys.
    async fn filters_by_identities(&self, identities: &[String]) -> NetworkResult<Vec<Filter>>;

    /// Filter carrying the user's own backups.
    async fn personal_topic_filter(&self) -> NetworkResult<Option<Filter>>;

    async fn init_public_filters(&self, requests: &[FilterRequest]) -> NetworkResult<Vec<Filter>>;

    /// Install a private filter for a contact's public key.
    async fn join_private(&self, public_key: &[u8]) -> NetworkResult<Filter>;

    async fn remove_filters(&self, filters: &[Filter]) -> NetworkResult<()>;

    async fn connection_changed(&self, state: ConnectionState);
}

/// Page query bound to `node`, in the shape the paginated fetcher takes.
pub fn node_query(
    transport: Arc<dyn StoreTransport>,
    node: StoreNode,
) -> impl Fn(StoreQuery) -> BoxFuture<'static, SyncResult<StorePage>> + Send + Sync + Clone + 'static {
    move |query: StoreQuery| {
        let transport = transport.clone();
        let node = node.clone();
        async move { transport.query_store(&node, query).await.map_err(SyncError::from) }.boxed()
    }
}

/// Round trip measurement for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResult {
    pub address: String,
    pub rtt: Option<Duration>,
    pub error: Option<String>,
}

impl PingResult {
    pub fn reachable(address: impl Into<String>, rtt: Duration) -> Self {
        Self {
            address: address.into(),
            rtt: Some(rtt),
            error: None,
        }
    }

    pub fn failed(address: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            rtt: None,
            error: Some(error.into()),
        }
    }
}

/// Measures latency to store node candidates.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Ping all addresses concurrently, each bounded by `timeout`.
    async fn ping(&self, addresses: &[String], timeout: Duration) -> Vec<PingResult>;
}
