//! Store node synchronization for a peer-to-peer messaging client.
//!
//! Fetches the history a client missed while offline from store nodes, which
//! are untrusted and may be slow or unreachable:
//!
//! - Track store node health and pick a fast, non-penalized node
//! - Retry node operations with a bounded budget and fail over on repeated failures
//! - Plan history syncs as prioritized, topic-scoped 24h windows
//! - Execute windows with bounded concurrency, following pagination cursors
//! - Record and fill gaps in a chat's history
//! - Coalesce concurrent on-demand fetches of communities and contacts
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use store_sync::network::{StoreTransport, TcpPingDirectory};
//! use store_sync::storage::MemoryStorage;
//! use store_sync::{Config, SyncCoordinator};
//!
//! async fn run(transport: Arc<dyn StoreTransport>) -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = SyncCoordinator::new(
//!         Config::production(),
//!         transport,
//!         Arc::new(TcpPingDirectory::new()),
//!         Arc::new(MemoryStorage::new()),
//!     )?;
//!
//!     coordinator.start().await?;
//!     let report = coordinator.request_all_historic_messages(false).await?;
//!     println!("fetched {} envelopes", report.envelopes);
//!     coordinator.stop().await?;
//!     Ok(())
//! }
//! ```

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub mod client;
pub mod error;
pub mod event_bus;
pub mod logging;
pub mod network;
pub mod storage;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use client::{CommunityRequest, Config, SyncCoordinator};
pub use error::{
    LoggingError, LoggingResult, NetworkError, StorageError, StoreSyncError, SyncError, SyncResult,
};
pub use event_bus::{EventBus, EventReceiver};
pub use logging::{init_console_logging, init_logging, LogFileConfig, LoggingConfig, LoggingGuard};
pub use sync::{RequestOutcome, Resource, SyncSignal};
pub use tracing::level_filters::LevelFilter;
pub use types::{
    ChatKind, ChatSyncState, Community, ConnectionState, Contact, Filter, Shard, StoreBatch, StoreNode,
    StoredMessage, SyncReport, TopicSyncState,
};

/// Current version of the store-sync library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
