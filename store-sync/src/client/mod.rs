//! High-level API of the store node sync subsystem.
//!
//! [`SyncCoordinator`] is the per-session object that owns the store node
//! manager, the request coalescer and the background tasks. Its operations are
//! spread over several files:
//! - `lifecycle`: construction, start and stop
//! - `history`: history sync, gap filling and chat syncs
//! - `fetch`: on-demand community and contact fetches
//! - `nodes`: store node settings and connectivity

pub mod config;
mod fetch;
mod history;
mod lifecycle;
mod nodes;


use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::event_bus::{EventBus, EventReceiver};
use crate::network::{RequestExecutor, StoreNodeManager, StoreTransport};
use crate::storage::StorageManager;
use crate::sync::{BatchBuilder, PaginatedFetcher, RequestCoalescer, SyncSignal};

pub use config::{Config, DEFAULT_FLEET};
pub use fetch::CommunityRequest;

/// Store node sync coordinator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SyncCoordinator {
    config: Arc<Config>,
    transport: Arc<dyn StoreTransport>,
    storage: Arc<dyn StorageManager>,
    manager: Arc<StoreNodeManager>,
    executor: RequestExecutor,
    fetcher: PaginatedFetcher,
    batches: BatchBuilder,
    coalescer: Arc<RequestCoalescer>,
    events: EventBus<SyncSignal>,
    cancel: CancellationToken,
    tasks: Arc<Mutex<JoinSet<()>>>,
    running: Arc<RwLock<bool>>,
}

impl SyncCoordinator {
    /// Subscribe to sync signals. Only signals emitted afterwards are received.
    pub fn subscribe_signals(&self) -> EventReceiver<SyncSignal> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &Arc<StoreNodeManager> {
        &self.manager
    }

    pub fn coalescer(&self) -> &Arc<RequestCoalescer> {
        &self.coalescer
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Run `task` in the background until it finishes or the coordinator stops.
    async fn spawn_task<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        // Reap finished tasks so the set does not grow without bound.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }
}
