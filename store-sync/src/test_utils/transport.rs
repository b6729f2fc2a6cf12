use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{NetworkError, NetworkResult};
use crate::network::constants::WAKU_V2;
use crate::network::{FilterRequest, StorePage, StoreQuery, StoreTransport};
use crate::storage::{MemoryStorage, ResourceStorage};
use crate::types::{Community, ConnectionState, Contact, Cursor, Filter, Shard, StoreNode};

/// Content topic the mock assigns to a chat's public filter.
pub fn content_topic_for(chat_id: &str) -> String {
    let hash = blake3::hash(chat_id.as_bytes());
    format!("0x{}", &hex::encode(hash.as_bytes())[..8])
}

/// Failure returned by the next store query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    ConnectionFailed,
    Timeout,
    Protocol,
}

impl MockFailure {
    fn into_error(self) -> NetworkError {
        match self {
            MockFailure::ConnectionFailed => NetworkError::ConnectionFailed("mock connection refused".into()),
            MockFailure::Timeout => NetworkError::Timeout,
            MockFailure::Protocol => NetworkError::Protocol("mock malformed page".into()),
        }
    }
}

/// Resource that shows up in storage once enough pages were processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResource {
    Community(Community),
    Contact(Contact),
    Shard {
        community_id: String,
        shard: Shard,
    },
}

#[derive(Default)]
struct MockState {
    /// (content topic, cursor) -> page.
    pages: HashMap<(String, Option<Cursor>), StorePage>,
    failures: VecDeque<MockFailure>,
    delay: Option<Duration>,
    filters: Vec<Filter>,
    personal_filter: Option<Filter>,
    /// Resources released once this many queries completed.
    resources: Vec<(usize, MockResource)>,
    log: Vec<(String, StoreQuery)>,
    peers: Vec<StoreNode>,
    removed_filters: Vec<Filter>,
    connection_states: Vec<ConnectionState>,
}

/// Scripted [`StoreTransport`].
///
/// Pages are keyed by the first content topic of the query and its cursor;
/// anything unscripted answers with an empty last page.
pub struct MockTransport {
    version: u32,
    storage: Option<Arc<MemoryStorage>>,
    state: Mutex<MockState>,
    queries: AtomicUsize,
    processed: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            version: WAKU_V2,
            storage: None,
            state: Mutex::new(MockState::default()),
            queries: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Storage that scripted resources are written to.
    pub fn with_storage(mut self, storage: Arc<MemoryStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Script a chain of `pages` pages for `content_topic`, each with `envelopes` envelopes.
    pub fn script_pages(&self, content_topic: &str, pages: usize, envelopes: usize) {
        let mut state = self.state();
        let mut cursor: Option<Cursor> = None;
        for page in 1..=pages {
            let next = (page < pages).then(|| Cursor::new(format!("{}-{}", content_topic, page).into_bytes()));
            state.pages.insert(
                (content_topic.to_string(), cursor.clone()),
                StorePage {
                    cursor: next.clone(),
                    envelopes,
                },
            );
            cursor = next;
        }
    }

    /// Answer a specific (topic, cursor) query.
    pub fn script_page(&self, content_topic: &str, cursor: Option<Cursor>, page: StorePage) {
        self.state().pages.insert((content_topic.to_string(), cursor), page);
    }

    /// Fail the next queries, in order.
    pub fn fail_next(&self, failures: impl IntoIterator<Item = MockFailure>) {
        self.state().failures.extend(failures);
    }

    /// Latency added to every query.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Make `resource` visible in storage once `after_queries` queries completed
    /// and envelopes were processed.
    pub fn release_after(&self, after_queries: usize, resource: MockResource) {
        self.state().resources.push((after_queries, resource));
    }

    pub fn add_filter(&self, filter: Filter) {
        self.state().filters.push(filter);
    }

    pub fn set_personal_filter(&self, filter: Filter) {
        self.state().personal_filter = Some(filter);
    }

    /// Number of store queries issued.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Queries issued, with the node they went to.
    pub fn queries(&self) -> Vec<(String, StoreQuery)> {
        self.state().log.clone()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn peers(&self) -> Vec<StoreNode> {
        self.state().peers.clone()
    }

    pub fn removed_filters(&self) -> Vec<Filter> {
        self.state().removed_filters.clone()
    }

    pub fn installed_filters(&self) -> Vec<Filter> {
        self.state().filters.clone()
    }

    pub fn connection_states(&self) -> Vec<ConnectionState> {
        self.state().connection_states.clone()
    }

    async fn materialize(&self, resource: MockResource) {
        let Some(storage) = &self.storage else {
            return;
        };
        let _ = match resource {
            MockResource::Community(community) => storage.save_community(community).await,
            MockResource::Contact(contact) => storage.save_contact(contact).await,
            MockResource::Shard {
                community_id,
                shard,
            } => storage.save_community_shard(&community_id, shard).await,
        };
    }
}

#[async_trait]
impl StoreTransport for MockTransport {
    fn waku_version(&self) -> u32 {
        self.version
    }

    async fn add_store_peer(&self, node: &StoreNode) -> NetworkResult<()> {
        self.state().peers.push(node.clone());
        Ok(())
    }

    async fn query_store(&self, node: &StoreNode, query: StoreQuery) -> NetworkResult<StorePage> {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (failure, page) = {
            let mut state = self.state();
            state.log.push((node.id.clone(), query.clone()));
            let failure = state.failures.pop_front();
            let topic = query.content_topics.first().cloned().unwrap_or_default();
            let page = state.pages.get(&(topic, query.cursor.clone())).cloned().unwrap_or_default();
            (failure, page)
        };
        self.queries.fetch_add(1, Ordering::SeqCst);

        match failure {
            Some(failure) => Err(failure.into_error()),
            None => Ok(page),
        }
    }

    async fn process_received_envelopes(&self) -> NetworkResult<()> {
        self.processed.fetch_add(1, Ordering::SeqCst);
        let queries = self.query_count();
        let ready: Vec<MockResource> = {
            let mut state = self.state();
            let (ready, waiting) =
                std::mem::take(&mut state.resources).into_iter().partition(|(after, _)| *after <= queries);
            state.resources = waiting;
            ready.into_iter().map(|(_, resource)| resource).collect()
        };

        for resource in ready {
            self.materialize(resource).await;
        }
        Ok(())
    }

    async fn filters(&self) -> NetworkResult<Vec<Filter>> {
        Ok(self.state().filters.clone())
    }

    async fn filter_by_chat_id(&self, chat_id: &str) -> NetworkResult<Option<Filter>> {
        Ok(self.state().filters.iter().find(|f| f.chat_id == chat_id).cloned())
    }

    async fn filters_by_identities(&self, identities: &[String]) -> NetworkResult<Vec<Filter>> {
        Ok(self
            .state()
            .filters
            .iter()
            .filter(|f| f.identity.as_ref().is_some_and(|id| identities.contains(id)))
            .cloned()
            .collect())
    }

    async fn personal_topic_filter(&self) -> NetworkResult<Option<Filter>> {
        Ok(self.state().personal_filter.clone())
    }

    async fn init_public_filters(&self, requests: &[FilterRequest]) -> NetworkResult<Vec<Filter>> {
        let mut state = self.state();
        let created: Vec<Filter> = requests
            .iter()
            .map(|r| Filter::new(&r.chat_id, &r.pubsub_topic, content_topic_for(&r.chat_id)))
            .collect();
        state.filters.extend(created.iter().cloned());
        Ok(created)
    }

    async fn join_private(&self, public_key: &[u8]) -> NetworkResult<Filter> {
        let chat_id = format!("0x{}", hex::encode(public_key));
        let filter = Filter::new(&chat_id, Shard::default().pubsub_topic(), content_topic_for(&chat_id))
            .with_identity(&chat_id);
        self.state().filters.push(filter.clone());
        Ok(filter)
    }

    async fn remove_filters(&self, filters: &[Filter]) -> NetworkResult<()> {
        let mut state = self.state();
        state.filters.retain(|f| !filters.iter().any(|removed| removed.chat_id == f.chat_id));
        state.removed_filters.extend(filters.iter().cloned());
        Ok(())
    }

    async fn connection_changed(&self, connection: ConnectionState) {
        self.state().connection_states.push(connection);
    }
}
