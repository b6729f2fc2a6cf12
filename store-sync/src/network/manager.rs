//! Active store node management.
//!
//! Holds the health map and the active node pointer under one lock, selects a
//! node when there is none, and fails over when the active node keeps failing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::Config;
use crate::error::{NetworkError, SyncResult};
use crate::event_bus::EventBus;
use crate::network::constants::WAKU_V2;
use crate::network::fleet::default_store_nodes;
use crate::network::health::{ConnectionStatus, NodeHealthTracker, NodeStatus};
use crate::network::selector::{choose, rank_candidates};
use crate::network::{NodeDirectory, StoreTransport};
use crate::storage::StorageManager;
use crate::sync::SyncSignal;
use crate::types::{ConnectionState, StoreNode};

struct ManagerState {
    health: NodeHealthTracker,
    active: Option<StoreNode>,
    online: bool,
}

/// Owner of the active store node.
pub struct StoreNodeManager {
    config: Arc<Config>,
    transport: Arc<dyn StoreTransport>,
    directory: Arc<dyn NodeDirectory>,
    storage: Arc<dyn StorageManager>,
    events: EventBus<SyncSignal>,
    state: Mutex<ManagerState>,
    /// Serializes selection so two cycles never race to install different nodes.
    cycle_lock: Mutex<()>,
    available: watch::Sender<bool>,
    reselect: Notify,
}

impl StoreNodeManager {
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn StoreTransport>,
        directory: Arc<dyn NodeDirectory>,
        storage: Arc<dyn StorageManager>,
        events: EventBus<SyncSignal>,
    ) -> Self {
        let (available, _) = watch::channel(false);
        Self {
            state: Mutex::new(ManagerState {
                health: NodeHealthTracker::from_config(&config),
                active: None,
                online: true,
            }),
            config,
            transport,
            directory,
            storage,
            events,
            cycle_lock: Mutex::new(()),
            available,
            reselect: Notify::new(),
        }
    }

    async fn fleet(&self) -> SyncResult<String> {
        Ok(self.storage.fleet().await?.unwrap_or_else(|| self.config.fleet.clone()))
    }

    /// Fleet defaults plus custom nodes of the same fleet, restricted to the
    /// transport's protocol version.
    pub async fn candidates(&self) -> SyncResult<Vec<StoreNode>> {
        let fleet = self.fleet().await?;
        let version = self.transport.waku_version();

        let mut nodes = default_store_nodes(&fleet);
        for mut node in self.storage.custom_store_nodes().await? {
            if node.fleet == fleet {
                node.version = version;
                nodes.push(node);
            }
        }
        nodes.retain(|node| node.version == version);
        Ok(nodes)
    }

    /// Node pinned for the current fleet, if it is still a candidate.
    pub async fn pinned_node(&self) -> SyncResult<Option<StoreNode>> {
        let fleet = self.fleet().await?;
        let pinned = self.storage.pinned_store_nodes().await?;
        let Some(pinned_id) = pinned.get(&fleet).filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        let node = self.candidates().await?.into_iter().find(|n| &n.id == pinned_id);
        if node.is_none() {
            tracing::warn!("Pinned store node {} is not a known candidate of {}", pinned_id, fleet);
        }
        Ok(node)
    }

    /// Register candidates with the transport. Only version 2 transports are supported.
    pub async fn start_cycle(&self) -> SyncResult<()> {
        let version = self.transport.waku_version();
        if version != WAKU_V2 {
            return Err(NetworkError::UnsupportedVersion(version).into());
        }

        for node in self.candidates().await? {
            if let Err(e) = self.transport.add_store_peer(&node).await {
                tracing::warn!("Failed to add store peer {}: {}", node, e);
            }
        }
        Ok(())
    }

    async fn selection_allowed(&self) -> SyncResult<bool> {
        Ok(!self.config.store_nodes_disabled && self.storage.can_use_store_nodes().await?)
    }

    /// Pick a node without connecting to it.
    ///
    /// A pinned node is returned as is. Otherwise candidates are pinged and the
    /// pick is drawn from the fastest quartile of eligible ones.
    pub async fn select_node(&self) -> SyncResult<Option<StoreNode>> {
        if !self.selection_allowed().await? {
            return Ok(None);
        }

        if let Some(pinned) = self.pinned_node().await? {
            tracing::info!("Using pinned store node {}", pinned);
            return Ok(Some(pinned));
        }

        let candidates = self.candidates().await?;
        if candidates.is_empty() {
            tracing::warn!("No store node candidates for fleet {}", self.fleet().await?);
            return Ok(None);
        }

        let addresses: Vec<String> = candidates.iter().map(|n| n.address.clone()).collect();
        let pings = self.directory.ping(&addresses, self.config.ping_timeout).await;

        let state = self.state.lock().await;
        let ranked = rank_candidates(&candidates, &pings, &state.health, Instant::now());
        drop(state);

        tracing::debug!("{} of {} store nodes reachable and eligible", ranked.len(), candidates.len());
        let picked = {
            let mut rng = rand::thread_rng();
            choose(&ranked, &mut rng)
        };
        Ok(picked)
    }

    /// Drop the active node and select a new one.
    pub async fn cycle(&self) -> SyncResult<Option<StoreNode>> {
        let _cycle = self.cycle_lock.lock().await;
        self.disconnect_active(self.config.graylist_backoff).await;
        self.select_and_connect().await
    }

    /// Select a node only if there is no active one.
    pub async fn ensure_active(&self) -> SyncResult<Option<StoreNode>> {
        let _cycle = self.cycle_lock.lock().await;
        let active = self.state.lock().await.active.clone();
        if active.is_some() {
            return Ok(active);
        }
        self.select_and_connect().await
    }

    async fn select_and_connect(&self) -> SyncResult<Option<StoreNode>> {
        match self.select_node().await? {
            Some(node) => {
                self.connect(node.clone()).await;
                Ok(Some(node))
            }
            None => {
                tracing::warn!("No store node available");
                Ok(None)
            }
        }
    }

    /// Make `node` the active node. Store peers are dialed lazily by the
    /// transport, so the node counts as connected right away.
    pub async fn connect(&self, node: StoreNode) {
        let now = Instant::now();
        {
            let mut state = self.state.lock().await;
            state.health.mark_connecting(&node.id, now);
            state.health.mark_connected(&node.id, now);
            state.active = Some(node.clone());
        }

        tracing::info!("Connected to store node {}", node);
        self.available.send_replace(true);
        self.events.emit(SyncSignal::changed_to(Some(&node)));
        self.events.emit(SyncSignal::available(&node));
    }

    /// Disconnect the active node, if any, backing it off for `backoff`.
    pub async fn disconnect_active(&self, backoff: Duration) {
        let previous = {
            let mut state = self.state.lock().await;
            let previous = state.active.take();
            if let Some(node) = &previous {
                state.health.mark_disconnected(&node.id, Instant::now(), backoff);
            }
            previous
        };

        if let Some(node) = previous {
            tracing::info!("Disconnected from store node {}", node);
            self.available.send_replace(false);
            self.events.emit(SyncSignal::changed_to(None));
        }
    }

    /// Store node serving `community`: its dedicated node when one is
    /// configured, otherwise the global active node.
    pub async fn active_node(&self, community: Option<&str>) -> SyncResult<Option<StoreNode>> {
        if let Some(node) = self.community_node(community).await? {
            return Ok(Some(node));
        }
        Ok(self.state.lock().await.active.clone())
    }

    async fn community_node(&self, community: Option<&str>) -> SyncResult<Option<StoreNode>> {
        match community {
            Some(id) => Ok(self.storage.community_store_node(id).await?),
            None => Ok(None),
        }
    }

    /// Whether requests for `community` can be sent right now.
    pub async fn is_available(&self, community: Option<&str>) -> SyncResult<bool> {
        if self.community_node(community).await?.is_some() {
            return Ok(true);
        }
        let state = self.state.lock().await;
        Ok(state
            .active
            .as_ref()
            .is_some_and(|n| state.health.connection_status(&n.id) == ConnectionStatus::Connected))
    }

    /// Wait until a node is available, for at most `timeout` plus the grace period.
    pub async fn wait_available(&self, timeout: Duration, community: Option<&str>) -> bool {
        match self.is_available(community).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Failed to check store node availability: {}", e);
                return false;
            }
        }

        let mut rx = self.available.subscribe();
        let wait = timeout + self.config.availability_grace;
        let available = matches!(tokio::time::timeout(wait, rx.wait_for(|ready| *ready)).await, Ok(Ok(_)));
        available
    }

    /// Count a failed request against `node`.
    ///
    /// At the threshold the node is disconnected and graylisted, listeners are
    /// told it is not working, and the health loop is woken to pick another.
    /// Returns true when the threshold was reached.
    pub async fn mark_failure(&self, node: &StoreNode) -> bool {
        let now = Instant::now();
        let (reached, was_active) = {
            let mut state = self.state.lock().await;
            let reached = state.health.record_failure(&node.id);
            let was_active = state.active.as_ref().is_some_and(|a| a.id == node.id);
            if reached {
                state.health.penalize(&node.id, now);
                if was_active {
                    state.active = None;
                }
            }
            (reached, was_active)
        };

        if reached {
            tracing::warn!("Store node {} is not working", node);
            self.events.emit(SyncSignal::MailserverNotWorking);
            if was_active {
                self.available.send_replace(false);
                self.events.emit(SyncSignal::changed_to(None));
                self.reselect.notify_one();
            }
        }
        reached
    }

    pub async fn mark_success(&self, node: &StoreNode) {
        self.state.lock().await.health.record_success(&node.id);
    }

    pub async fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.state.lock().await.health.status(node_id).cloned()
    }

    /// Record a connectivity change and pass it to the transport.
    pub async fn connection_changed(&self, connection: ConnectionState) {
        let came_online = {
            let mut state = self.state.lock().await;
            let came_online = !state.online && !connection.offline;
            state.online = !connection.offline;
            came_online
        };

        self.transport.connection_changed(connection).await;
        if came_online {
            self.reselect.notify_one();
        }
    }

    pub async fn is_online(&self) -> bool {
        self.state.lock().await.online
    }

    /// Whether a background sync should run now.
    pub async fn should_sync(&self) -> SyncResult<bool> {
        let ready = {
            let state = self.state.lock().await;
            state.online && state.active.is_some()
        };
        Ok(ready && self.selection_allowed().await?)
    }

    /// Periodically make sure there is an active node. Returns when `cancel` fires.
    pub async fn run_health_checks(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.health_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.reselect.notified() => {}
            }

            if let Err(e) = self.verify_active().await {
                tracing::error!("Store node health check failed: {}", e);
            }
        }
        tracing::debug!("Store node health loop stopped");
    }

    async fn verify_active(&self) -> SyncResult<()> {
        let needs_node = {
            let state = self.state.lock().await;
            state.online && state.active.is_none()
        };
        if needs_node && self.selection_allowed().await? {
            self.ensure_active().await?;
        }
        Ok(())
    }
}
