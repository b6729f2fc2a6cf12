//! JSON-file persistence for topic bookmarks and custom store nodes.
//!
//! Everything else lives in the in-memory cache. Files are written to a
//! temporary path and renamed into place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::storage::memory::MemoryStorage;
use crate::storage::{
    ChatStorage, MessageStorage, NodeStorage, ResourceStorage, SettingsStorage, TopicStorage,
};
use crate::types::{ChatSyncState, Community, Contact, Shard, StoreNode, StoredMessage, TopicSyncState};

const FORMAT_VERSION: u32 = 1;
const TOPICS_FILE: &str = "topics.json";
const NODES_FILE: &str = "nodes.json";

#[derive(Serialize, Deserialize)]
struct SavedTopics {
    version: u32,
    topics: Vec<TopicSyncState>,
}

#[derive(Serialize, Deserialize)]
struct SavedNodes {
    version: u32,
    nodes: Vec<StoreNode>,
}

/// Storage that survives restarts for bookmarks and custom nodes.
#[derive(Debug)]
pub struct DiskStorage {
    dir: PathBuf,
    cache: MemoryStorage,
}

impl DiskStorage {
    /// Open (or create) the store under `<data_dir>/store-sync`.
    pub async fn open(data_dir: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with(data_dir, MemoryStorage::new()).await
    }

    /// Open on top of a pre-configured cache, e.g. one with settings applied.
    pub async fn open_with(data_dir: impl AsRef<Path>, cache: MemoryStorage) -> StorageResult<Self> {
        let dir = data_dir.as_ref().join("store-sync");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("create {:?}: {}", dir, e)))?;

        if let Some(saved) = read_json::<SavedTopics>(&dir.join(TOPICS_FILE)).await? {
            tracing::debug!("Loaded {} topic bookmarks from {:?}", saved.topics.len(), dir);
            cache.replace_topics(saved.topics).await;
        }
        if let Some(saved) = read_json::<SavedNodes>(&dir.join(NODES_FILE)).await? {
            cache.replace_custom_nodes(saved.nodes).await;
        }

        Ok(Self {
            dir,
            cache,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    async fn persist_topics(&self) -> StorageResult<()> {
        let saved = SavedTopics {
            version: FORMAT_VERSION,
            topics: self.cache.topics().await?,
        };
        write_json(&self.dir.join(TOPICS_FILE), &saved).await
    }

    async fn persist_nodes(&self) -> StorageResult<()> {
        let saved = SavedNodes {
            version: FORMAT_VERSION,
            nodes: self.cache.custom_store_nodes().await?,
        };
        write_json(&self.dir.join(NODES_FILE), &saved).await
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> StorageResult<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
            StorageError::Corruption(format!("Failed to parse {:?}: {}", path, e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::ReadFailed(format!("{:?}: {}", path, e))),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await.map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl TopicStorage for DiskStorage {
    async fn topics(&self) -> StorageResult<Vec<TopicSyncState>> {
        self.cache.topics().await
    }

    async fn add_topics(&self, topics: &[TopicSyncState]) -> StorageResult<()> {
        self.cache.add_topics(topics).await?;
        self.persist_topics().await
    }
}

#[async_trait]
impl NodeStorage for DiskStorage {
    async fn custom_store_nodes(&self) -> StorageResult<Vec<StoreNode>> {
        self.cache.custom_store_nodes().await
    }

    async fn add_custom_store_node(&self, node: StoreNode) -> StorageResult<()> {
        self.cache.add_custom_store_node(node).await?;
        self.persist_nodes().await
    }

    async fn community_store_node(&self, community_id: &str) -> StorageResult<Option<StoreNode>> {
        self.cache.community_store_node(community_id).await
    }

    async fn set_community_store_node(
        &self,
        community_id: &str,
        node: Option<StoreNode>,
    ) -> StorageResult<()> {
        self.cache.set_community_store_node(community_id, node).await
    }
}

#[async_trait]
impl ChatStorage for DiskStorage {
    async fn chat(&self, chat_id: &str) -> StorageResult<Option<ChatSyncState>> {
        self.cache.chat(chat_id).await
    }

    async fn save_chat(&self, chat: ChatSyncState) -> StorageResult<()> {
        self.cache.save_chat(chat).await
    }

    async fn set_sync_timestamps(
        &self,
        chat_id: &str,
        synced_from: u32,
        synced_to: u32,
    ) -> StorageResult<()> {
        self.cache.set_sync_timestamps(chat_id, synced_from, synced_to).await
    }
}

#[async_trait]
impl MessageStorage for DiskStorage {
    async fn messages_by_ids(&self, ids: &[String]) -> StorageResult<Vec<StoredMessage>> {
        self.cache.messages_by_ids(ids).await
    }

    async fn save_messages(&self, messages: &[StoredMessage]) -> StorageResult<()> {
        self.cache.save_messages(messages).await
    }

    async fn delete_messages(&self, ids: &[String]) -> StorageResult<()> {
        self.cache.delete_messages(ids).await
    }
}

#[async_trait]
impl ResourceStorage for DiskStorage {
    async fn community(&self, community_id: &str) -> StorageResult<Option<Community>> {
        self.cache.community(community_id).await
    }

    async fn save_community(&self, community: Community) -> StorageResult<()> {
        self.cache.save_community(community).await
    }

    async fn community_shard(&self, community_id: &str) -> StorageResult<Option<Shard>> {
        self.cache.community_shard(community_id).await
    }

    async fn save_community_shard(&self, community_id: &str, shard: Shard) -> StorageResult<()> {
        self.cache.save_community_shard(community_id, shard).await
    }

    async fn contact(&self, contact_id: &str) -> StorageResult<Option<Contact>> {
        self.cache.contact(contact_id).await
    }

    async fn save_contact(&self, contact: Contact) -> StorageResult<()> {
        self.cache.save_contact(contact).await
    }
}

#[async_trait]
impl SettingsStorage for DiskStorage {
    async fn can_use_store_nodes(&self) -> StorageResult<bool> {
        self.cache.can_use_store_nodes().await
    }

    async fn set_can_use_store_nodes(&self, enabled: bool) -> StorageResult<()> {
        self.cache.set_can_use_store_nodes(enabled).await
    }

    async fn default_sync_period(&self) -> StorageResult<u32> {
        self.cache.default_sync_period().await
    }

    async fn pinned_store_nodes(&self) -> StorageResult<HashMap<String, String>> {
        self.cache.pinned_store_nodes().await
    }

    async fn set_pinned_store_nodes(&self, pinned: HashMap<String, String>) -> StorageResult<()> {
        self.cache.set_pinned_store_nodes(pinned).await
    }

    async fn fleet(&self) -> StorageResult<Option<String>> {
        self.cache.fleet().await
    }

    async fn backup_fetched(&self) -> StorageResult<bool> {
        self.cache.backup_fetched().await
    }

    async fn set_backup_fetched(&self, fetched: bool) -> StorageResult<()> {
        self.cache.set_backup_fetched(fetched).await
    }
}
