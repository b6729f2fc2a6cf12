//! Coalesced on-demand fetches of single resources.
//!
//! Concurrent requests for the same `(type, id)` share one store fetch. The
//! first caller installs the filter the resource arrives on and starts the
//! fetch; later callers only attach a subscriber. Both happen under the lock
//! that finalization takes, so a request can never complete between a caller's
//! check and its subscription.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::Config;
use crate::error::{SyncError, SyncResult};
use crate::event_bus::EventBus;
use crate::network::{node_query, FilterRequest, RequestExecutor, StoreTransport};
use crate::storage::StorageManager;
use crate::sync::events::SyncSignal;
use crate::sync::pipeline::{PageDecision, PagePolicy, PageStats, PaginatedFetcher};
use crate::types::{shard_info_topic, unix_now, Community, Contact, Filter, Shard, StoreBatch};

/// Kind of resource a request looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Community,
    Contact,
    CommunityShard,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Community => write!(f, "community"),
            RequestType::Contact => write!(f, "contact"),
            RequestType::CommunityShard => write!(f, "community shard"),
        }
    }
}

/// Deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub kind: RequestType,
    pub data_id: String,
}

/// One resource to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub kind: RequestType,
    pub data_id: String,
    /// Shard the resource is published on; the default shard when unset.
    pub shard: Option<Shard>,
}

impl ResourceRequest {
    pub fn community(community_id: impl Into<String>, shard: Option<Shard>) -> Self {
        Self {
            kind: RequestType::Community,
            data_id: community_id.into(),
            shard,
        }
    }

    pub fn community_shard(community_id: impl Into<String>) -> Self {
        Self {
            kind: RequestType::CommunityShard,
            data_id: community_id.into(),
            shard: None,
        }
    }

    pub fn contact(contact_id: impl Into<String>) -> Self {
        Self {
            kind: RequestType::Contact,
            data_id: contact_id.into(),
            shard: None,
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            kind: self.kind,
            data_id: self.data_id.clone(),
        }
    }

    /// Community whose dedicated store node (if any) serves this request.
    fn community_scope(&self) -> Option<&str> {
        match self.kind {
            RequestType::Community | RequestType::CommunityShard => Some(&self.data_id),
            RequestType::Contact => None,
        }
    }
}

/// A fetched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Community(Community),
    Contact(Contact),
    Shard(Shard),
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Found(Resource),
    /// History was exhausted without a match.
    NotFound,
    /// The fetch deadline elapsed before history was exhausted.
    TimedOut,
}

impl RequestOutcome {
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            RequestOutcome::Found(resource) => Some(resource),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    pub fetched_envelopes: usize,
    pub fetched_pages: usize,
}

/// The result every subscriber of a request receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestResult {
    pub outcome: SyncResult<RequestOutcome>,
    pub stats: RequestStats,
}

impl RequestResult {
    fn failed(error: SyncError) -> Self {
        Self {
            outcome: Err(error),
            stats: RequestStats::default(),
        }
    }
}

struct PendingRequest {
    subscribers: Vec<oneshot::Sender<RequestResult>>,
    /// Filter installed for this request, removed on finalize.
    created_filter: Option<Filter>,
}

/// Deduplicates concurrent on-demand fetches.
pub struct RequestCoalescer {
    config: Arc<Config>,
    transport: Arc<dyn StoreTransport>,
    storage: Arc<dyn StorageManager>,
    executor: RequestExecutor,
    fetcher: PaginatedFetcher,
    events: EventBus<SyncSignal>,
    cancel: CancellationToken,
    pending: Mutex<HashMap<RequestKey, PendingRequest>>,
    tasks: Mutex<JoinSet<()>>,
}

impl RequestCoalescer {
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn StoreTransport>,
        storage: Arc<dyn StorageManager>,
        executor: RequestExecutor,
        events: EventBus<SyncSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher: PaginatedFetcher::new(&config),
            config,
            transport,
            storage,
            executor,
            events,
            cancel,
            pending: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Number of requests currently in flight.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Fetch `request`, or join the fetch already running for it, and wait for the result.
    pub async fn request(self: &Arc<Self>, request: ResourceRequest) -> SyncResult<RequestResult> {
        let receiver = self.subscribe(request).await?;
        receiver
            .await
            .map_err(|_| SyncError::InvalidState("resource request dropped before completion".to_string()))
    }

    /// Attach to the fetch for `request`, starting it if none is running.
    pub async fn subscribe(
        self: &Arc<Self>,
        request: ResourceRequest,
    ) -> SyncResult<oneshot::Receiver<RequestResult>> {
        let key = request.key();
        let (tx, rx) = oneshot::channel();

        let mut pending = self.pending.lock().await;
        if let Some(entry) = pending.get_mut(&key) {
            tracing::debug!("Joining in-flight {} request for {}", key.kind, key.data_id);
            entry.subscribers.push(tx);
            return Ok(rx);
        }

        let (filter, created) = self.install_filter(&request).await?;
        pending.insert(
            key.clone(),
            PendingRequest {
                subscribers: vec![tx],
                created_filter: created.then(|| filter.clone()),
            },
        );

        drop(pending);

        tracing::info!("Requesting {} {} from store node", key.kind, key.data_id);
        let coalescer = Arc::clone(self);
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let result = AssertUnwindSafe(coalescer.run(&request, &filter))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    RequestResult::failed(SyncError::InvalidState(format!(
                        "{} request for {} panicked",
                        key.kind, key.data_id
                    )))
                });
            coalescer.finalize(&key, result).await;
        });

        Ok(rx)
    }

    /// Wait for every started request to finalize.
    ///
    /// Requests resolve with [`SyncError::Cancelled`] once the coalescer's
    /// token is cancelled, so this returns promptly after cancellation.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("Resource request task failed: {}", e);
            }
        }
    }

    /// Filter the resource arrives on, and whether it was installed for this request.
    async fn install_filter(&self, request: &ResourceRequest) -> SyncResult<(Filter, bool)> {
        let chat_id = match request.kind {
            RequestType::CommunityShard => shard_info_topic(&request.data_id),
            RequestType::Community | RequestType::Contact => request.data_id.clone(),
        };
        if let Some(filter) = self.transport.filter_by_chat_id(&chat_id).await? {
            return Ok((filter, false));
        }

        let filter = match request.kind {
            RequestType::Contact => {
                let public_key = hex::decode(chat_id.trim_start_matches("0x")).map_err(|e| {
                    SyncError::InvalidRequest(format!("contact id {}: {}", chat_id, e))
                })?;
                self.transport.join_private(&public_key).await?
            }
            RequestType::Community | RequestType::CommunityShard => {
                let shard = match request.kind {
                    RequestType::Community => request.shard.unwrap_or_default(),
                    _ => Shard::default(),
                };
                let mut filters = self
                    .transport
                    .init_public_filters(&[FilterRequest {
                        chat_id: chat_id.clone(),
                        pubsub_topic: shard.pubsub_topic(),
                    }])
                    .await?;
                if filters.len() != 1 {
                    return Err(SyncError::InvalidState(format!(
                        "expected one filter for {}, got {}",
                        chat_id,
                        filters.len()
                    )));
                }
                filters.remove(0)
            }
        };
        Ok((filter, true))
    }

    async fn run(&self, request: &ResourceRequest, filter: &Filter) -> RequestResult {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => RequestResult::failed(SyncError::Cancelled),
            result = self.fetch_resource(request, filter) => result,
        }
    }

    async fn fetch_resource(&self, request: &ResourceRequest, filter: &Filter) -> RequestResult {
        let scope = request.community_scope();
        if !self.manager_available(scope).await {
            tracing::warn!("No store node for {} {}", request.kind, request.data_id);
            return RequestResult::failed(SyncError::NodeUnavailable);
        }

        let floor = match request.kind {
            RequestType::Community => match self.storage.community(&request.data_id).await {
                Ok(community) => community.map(|c| c.clock),
                Err(e) => return RequestResult::failed(e.into()),
            },
            _ => None,
        };

        let to = unix_now();
        let from = to.saturating_sub(u32::try_from(self.config.resource_window.as_secs()).unwrap_or(u32::MAX));
        let batch = StoreBatch::new(from, to, filter.pubsub_topic.clone())
            .with_topics(vec![filter.content_topic.clone()])
            .with_chats(vec![filter.chat_id.clone()]);

        let policy = ResourcePolicy {
            coalescer: self,
            request,
            floor,
            further_page_size: self.config.further_page_size,
            found: Mutex::new(None),
            envelopes: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
        };

        let fetched = {
            let fetcher = &self.fetcher;
            let batch = &batch;
            let policy = &policy;
            let cancel = &self.cancel;
            let transport = self.transport.clone();
            let initial_page_size = self.config.initial_page_size;
            let fetch = self.executor.perform(scope, move |node| {
                fetcher.fetch(batch, initial_page_size, policy, node_query(transport.clone(), node), cancel)
            });
            tokio::time::timeout(self.config.fetch_deadline, fetch).await
        };

        let stats = policy.stats();
        let found = policy.found.into_inner();
        let outcome = match (fetched, found) {
            (_, Some(resource)) => Ok(RequestOutcome::Found(resource)),
            (Ok(Ok(_)), None) => Ok(RequestOutcome::NotFound),
            (Ok(Err(e)), None) => Err(e),
            (Err(_), None) => Ok(RequestOutcome::TimedOut),
        };

        RequestResult {
            outcome,
            stats,
        }
    }

    async fn manager_available(&self, scope: Option<&str>) -> bool {
        self.executor.manager().wait_available(self.config.node_available_timeout, scope).await
    }

    /// Local copy of the resource, if it satisfies the request.
    async fn lookup(&self, request: &ResourceRequest, floor: Option<u64>) -> SyncResult<Option<Resource>> {
        let id = &request.data_id;
        Ok(match request.kind {
            RequestType::Community => self
                .storage
                .community(id)
                .await?
                .filter(|c| floor.map_or(true, |floor| c.clock > floor))
                .map(Resource::Community),
            RequestType::CommunityShard => self.storage.community_shard(id).await?.map(Resource::Shard),
            RequestType::Contact => self.storage.contact(id).await?.map(Resource::Contact),
        })
    }

    async fn finalize(&self, key: &RequestKey, result: RequestResult) {
        let mut pending = self.pending.lock().await;
        let Some(entry) = pending.remove(key) else {
            tracing::warn!("Finalizing unknown {} request for {}", key.kind, key.data_id);
            return;
        };

        match &result.outcome {
            Ok(RequestOutcome::Found(resource)) => {
                tracing::info!("Found {} {} after {} pages", key.kind, key.data_id, result.stats.fetched_pages);
                if let Resource::Community(community) = resource {
                    self.events.emit(SyncSignal::CommunityFound {
                        community: community.clone(),
                    });
                }
            }
            Ok(outcome) => tracing::info!("{} {} not found: {:?}", key.kind, key.data_id, outcome),
            Err(e) => tracing::warn!("{} request for {} failed: {}", key.kind, key.data_id, e),
        }

        for subscriber in entry.subscribers {
            let _ = subscriber.send(result.clone());
        }

        if let Some(filter) = entry.created_filter {
            if let Err(e) = self.transport.remove_filters(&[filter]).await {
                tracing::warn!("Failed to remove filter for {}: {}", key.data_id, e);
            }
        }
    }
}

/// Processes envelopes after every page and stops once the resource shows up in storage.
struct ResourcePolicy<'a> {
    coalescer: &'a RequestCoalescer,
    request: &'a ResourceRequest,
    floor: Option<u64>,
    further_page_size: u32,
    found: Mutex<Option<Resource>>,
    envelopes: AtomicUsize,
    pages: AtomicUsize,
}

impl<'a> ResourcePolicy<'a> {
    fn stats(&self) -> RequestStats {
        RequestStats {
            fetched_envelopes: self.envelopes.load(Ordering::Relaxed),
            fetched_pages: self.pages.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<'a> PagePolicy for ResourcePolicy<'a> {
    async fn on_page(&self, stats: PageStats) -> SyncResult<PageDecision> {
        self.pages.fetch_add(1, Ordering::Relaxed);
        self.envelopes.fetch_add(stats.envelopes, Ordering::Relaxed);

        self.coalescer.transport.process_received_envelopes().await?;
        if let Some(resource) = self.coalescer.lookup(self.request, self.floor).await? {
            *self.found.lock().await = Some(resource);
            return Ok(PageDecision::Stop);
        }

        Ok(PageDecision::Continue {
            page_size: self.further_page_size,
        })
    }
}
