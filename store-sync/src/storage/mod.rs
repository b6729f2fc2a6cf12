//! Persistence seams consumed by the sync subsystem.

pub mod disk;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::{ChatSyncState, Community, Contact, Shard, StoreNode, StoredMessage, TopicSyncState};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Topic sync bookmarks.
#[async_trait]
pub trait TopicStorage: Send + Sync {
    async fn topics(&self) -> StorageResult<Vec<TopicSyncState>>;

    /// Insert or replace bookmarks keyed by (pubsub topic, content topic).
    async fn add_topics(&self, topics: &[TopicSyncState]) -> StorageResult<()>;
}

#[async_trait]
pub trait ChatStorage: Send + Sync {
    async fn chat(&self, chat_id: &str) -> StorageResult<Option<ChatSyncState>>;

    async fn save_chat(&self, chat: ChatSyncState) -> StorageResult<()>;

    async fn set_sync_timestamps(
        &self,
        chat_id: &str,
        synced_from: u32,
        synced_to: u32,
    ) -> StorageResult<()>;
}

/// Messages, as far as gap markers are concerned.
#[async_trait]
pub trait MessageStorage: Send + Sync {
    /// Messages with the given IDs; unknown IDs are skipped.
    async fn messages_by_ids(&self, ids: &[String]) -> StorageResult<Vec<StoredMessage>>;

    async fn save_messages(&self, messages: &[StoredMessage]) -> StorageResult<()>;

    async fn delete_messages(&self, ids: &[String]) -> StorageResult<()>;
}

/// User-added store nodes and per-community store node overrides.
#[async_trait]
pub trait NodeStorage: Send + Sync {
    async fn custom_store_nodes(&self) -> StorageResult<Vec<StoreNode>>;

    async fn add_custom_store_node(&self, node: StoreNode) -> StorageResult<()>;

    async fn community_store_node(&self, community_id: &str) -> StorageResult<Option<StoreNode>>;

    async fn set_community_store_node(
        &self,
        community_id: &str,
        node: Option<StoreNode>,
    ) -> StorageResult<()>;
}

/// Resources on-demand requests look for after every page.
#[async_trait]
pub trait ResourceStorage: Send + Sync {
    async fn community(&self, community_id: &str) -> StorageResult<Option<Community>>;

    async fn save_community(&self, community: Community) -> StorageResult<()>;

    async fn community_shard(&self, community_id: &str) -> StorageResult<Option<Shard>>;

    async fn save_community_shard(&self, community_id: &str, shard: Shard) -> StorageResult<()>;

    async fn contact(&self, contact_id: &str) -> StorageResult<Option<Contact>>;

    async fn save_contact(&self, contact: Contact) -> StorageResult<()>;
}

/// User settings the sync subsystem reads and writes.
#[async_trait]
pub trait SettingsStorage: Send + Sync {
    async fn can_use_store_nodes(&self) -> StorageResult<bool>;

    async fn set_can_use_store_nodes(&self, enabled: bool) -> StorageResult<()>;

    /// Default look-back window in seconds.
    async fn default_sync_period(&self) -> StorageResult<u32>;

    /// Pinned store node ID per fleet.
    async fn pinned_store_nodes(&self) -> StorageResult<HashMap<String, String>>;

    async fn set_pinned_store_nodes(&self, pinned: HashMap<String, String>) -> StorageResult<()>;

    /// Fleet override; `None` uses the configured fleet.
    async fn fleet(&self) -> StorageResult<Option<String>>;

    async fn backup_fetched(&self) -> StorageResult<bool>;

    async fn set_backup_fetched(&self, fetched: bool) -> StorageResult<()>;
}

/// Everything the sync subsystem persists.
pub trait StorageManager:
    TopicStorage + ChatStorage + MessageStorage + NodeStorage + ResourceStorage + SettingsStorage
{
}

impl<T> StorageManager for T where
    T: TopicStorage + ChatStorage + MessageStorage + NodeStorage + ResourceStorage + SettingsStorage
{
}
