//! Coordinator lifecycle: construction, start and stop.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreSyncError};
use crate::event_bus::EventBus;
use crate::network::{NodeDirectory, RequestExecutor, StoreNodeManager, StoreTransport};
use crate::storage::StorageManager;
use crate::sync::{BatchBuilder, PaginatedFetcher, RequestCoalescer, SyncSignal};

use super::{Config, SyncCoordinator};

impl SyncCoordinator {
    /// Create a coordinator for one client session.
    pub fn new(
        config: Config,
        transport: Arc<dyn StoreTransport>,
        directory: Arc<dyn NodeDirectory>,
        storage: Arc<dyn StorageManager>,
    ) -> Result<Self> {
        config.validate().map_err(StoreSyncError::Config)?;

        let config = Arc::new(config);
        let events = EventBus::default();
        let cancel = CancellationToken::new();

        let manager = Arc::new(StoreNodeManager::new(
            config.clone(),
            transport.clone(),
            directory,
            storage.clone(),
            events.clone(),
        ));
        let executor = RequestExecutor::new(manager.clone(), &config);
        let coalescer = Arc::new(RequestCoalescer::new(
            config.clone(),
            transport.clone(),
            storage.clone(),
            executor.clone(),
            events.clone(),
            cancel.child_token(),
        ));

        Ok(Self {
            fetcher: PaginatedFetcher::new(&config),
            batches: BatchBuilder::from_config(&config),
            config,
            transport,
            storage,
            manager,
            executor,
            coalescer,
            events,
            cancel,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            running: Arc::new(RwLock::new(false)),
        })
    }

    /// Register store peers and start the background tasks.
    ///
    /// A stopped coordinator cannot be started again.
    pub async fn start(&self) -> Result<()> {
        {
            let running = self.running.read().await;
            if *running {
                return Err(StoreSyncError::Config("Coordinator already running".to_string()));
            }
        }
        if self.cancel.is_cancelled() {
            return Err(StoreSyncError::Config("Coordinator was stopped".to_string()));
        }

        self.manager.start_cycle().await?;

        // Subscribe before the health loop can emit the first availability signal.
        if self.config.auto_request_historic_messages {
            let signals = self.subscribe_signals();
            let coordinator = self.clone();
            self.spawn_task(async move { coordinator.request_history_on_availability(signals).await })
                .await;
        }

        let manager = self.manager.clone();
        let cancel = self.cancel.clone();
        self.spawn_task(async move { manager.run_health_checks(cancel).await }).await;

        *self.running.write().await = true;
        tracing::info!("Store sync started for fleet {}", self.config.fleet);
        Ok(())
    }

    /// Cancel in-flight work and wait for every background task to finish.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        self.cancel.cancel();
        self.coalescer.shutdown().await;
        {
            let mut tasks = self.tasks.lock().await;
            tasks.abort_all();
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if !e.is_cancelled() {
                        tracing::warn!("Background task failed during shutdown: {}", e);
                    }
                }
            }
        }

        self.manager.disconnect_active(self.config.default_backoff).await;
        tracing::info!("Store sync stopped");
        Ok(())
    }

    async fn request_history_on_availability(
        &self,
        mut signals: crate::event_bus::EventReceiver<SyncSignal>,
    ) {
        loop {
            let signal = tokio::select! {
                _ = self.cancel.cancelled() => break,
                signal = signals.recv() => signal,
            };

            match signal {
                Ok(SyncSignal::MailserverAvailable {
                    id,
                    ..
                }) => {
                    tracing::debug!("Store node {} available, requesting history", id);
                    if let Err(e) = self.request_all_historic_messages(false).await {
                        tracing::error!("Automatic history request failed: {}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Signal listener: {}", e),
            }
        }
    }
}
