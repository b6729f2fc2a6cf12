//! In-memory storage implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::storage::{
    ChatStorage, MessageStorage, NodeStorage, ResourceStorage, SettingsStorage, TopicStorage,
};
use crate::types::{ChatSyncState, Community, Contact, Shard, StoreNode, StoredMessage, TopicSyncState};

/// Look-back used when nothing else is configured: one day.
pub const DEFAULT_SYNC_PERIOD_SECS: u32 = 24 * 60 * 60;

#[derive(Debug, Clone)]
struct Settings {
    can_use_store_nodes: bool,
    default_sync_period: u32,
    pinned: HashMap<String, String>,
    fleet: Option<String>,
    backup_fetched: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            can_use_store_nodes: true,
            default_sync_period: DEFAULT_SYNC_PERIOD_SECS,
            pinned: HashMap::new(),
            fleet: None,
            backup_fetched: false,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    topics: HashMap<(String, String), TopicSyncState>,
    chats: HashMap<String, ChatSyncState>,
    messages: HashMap<String, StoredMessage>,
    custom_nodes: Vec<StoreNode>,
    community_nodes: HashMap<String, StoreNode>,
    communities: HashMap<String, Community>,
    shards: HashMap<String, Shard>,
    contacts: HashMap<String, Contact>,
    settings: Settings,
}

/// Storage kept entirely in memory. Used by tests and as the cache under
/// [`DiskStorage`](crate::storage::DiskStorage).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_sync_period(mut self, secs: u32) -> Self {
        self.state.get_mut().settings.default_sync_period = secs;
        self
    }

    pub fn with_fleet(mut self, fleet: impl Into<String>) -> Self {
        self.state.get_mut().settings.fleet = Some(fleet.into());
        self
    }

    /// Number of stored messages, gap markers included.
    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }

    /// Replace all topics, used when loading from disk.
    pub(crate) async fn replace_topics(&self, topics: Vec<TopicSyncState>) {
        let mut state = self.state.write().await;
        state.topics = topics.into_iter().map(|t| (t.key(), t)).collect();
    }

    pub(crate) async fn replace_custom_nodes(&self, nodes: Vec<StoreNode>) {
        self.state.write().await.custom_nodes = nodes;
    }
}

#[async_trait]
impl TopicStorage for MemoryStorage {
    async fn topics(&self) -> StorageResult<Vec<TopicSyncState>> {
        let state = self.state.read().await;
        let mut topics: Vec<_> = state.topics.values().cloned().collect();
        topics.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(topics)
    }

    async fn add_topics(&self, topics: &[TopicSyncState]) -> StorageResult<()> {
        let mut state = self.state.write().await;
        for topic in topics {
            state.topics.insert(topic.key(), topic.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStorage for MemoryStorage {
    async fn chat(&self, chat_id: &str) -> StorageResult<Option<ChatSyncState>> {
        Ok(self.state.read().await.chats.get(chat_id).cloned())
    }

    async fn save_chat(&self, chat: ChatSyncState) -> StorageResult<()> {
        self.state.write().await.chats.insert(chat.id.clone(), chat);
        Ok(())
    }

    async fn set_sync_timestamps(
        &self,
        chat_id: &str,
        synced_from: u32,
        synced_to: u32,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let chat = state
            .chats
            .get_mut(chat_id)
            .ok_or_else(|| StorageError::NotFound(format!("chat {}", chat_id)))?;
        chat.synced_from = synced_from;
        chat.synced_to = synced_to;
        Ok(())
    }
}

#[async_trait]
impl MessageStorage for MemoryStorage {
    async fn messages_by_ids(&self, ids: &[String]) -> StorageResult<Vec<StoredMessage>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.messages.get(id).cloned()).collect())
    }

    async fn save_messages(&self, messages: &[StoredMessage]) -> StorageResult<()> {
        let mut state = self.state.write().await;
        for message in messages {
            state.messages.insert(message.id.clone(), message.clone());
        }
        Ok(())
    }

    async fn delete_messages(&self, ids: &[String]) -> StorageResult<()> {
        let mut state = self.state.write().await;
        for id in ids {
            state.messages.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStorage for MemoryStorage {
    async fn custom_store_nodes(&self) -> StorageResult<Vec<StoreNode>> {
        Ok(self.state.read().await.custom_nodes.clone())
    }

    async fn add_custom_store_node(&self, node: StoreNode) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let node = node.into_custom();
        match state.custom_nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => state.custom_nodes.push(node),
        }
        Ok(())
    }

    async fn community_store_node(&self, community_id: &str) -> StorageResult<Option<StoreNode>> {
        Ok(self.state.read().await.community_nodes.get(community_id).cloned())
    }

    async fn set_community_store_node(
        &self,
        community_id: &str,
        node: Option<StoreNode>,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        match node {
            Some(node) => {
                state.community_nodes.insert(community_id.to_string(), node);
            }
            None => {
                state.community_nodes.remove(community_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStorage for MemoryStorage {
    async fn community(&self, community_id: &str) -> StorageResult<Option<Community>> {
        Ok(self.state.read().await.communities.get(community_id).cloned())
    }

    async fn save_community(&self, community: Community) -> StorageResult<()> {
        self.state.write().await.communities.insert(community.id.clone(), community);
        Ok(())
    }

    async fn community_shard(&self, community_id: &str) -> StorageResult<Option<Shard>> {
        let state = self.state.read().await;
        Ok(state
            .shards
            .get(community_id)
            .copied()
            .or_else(|| state.communities.get(community_id).and_then(|c| c.shard)))
    }

    async fn save_community_shard(&self, community_id: &str, shard: Shard) -> StorageResult<()> {
        self.state.write().await.shards.insert(community_id.to_string(), shard);
        Ok(())
    }

    async fn contact(&self, contact_id: &str) -> StorageResult<Option<Contact>> {
        Ok(self.state.read().await.contacts.get(contact_id).cloned())
    }

    async fn save_contact(&self, contact: Contact) -> StorageResult<()> {
        self.state.write().await.contacts.insert(contact.id.clone(), contact);
        Ok(())
    }
}

#[async_trait]
impl SettingsStorage for MemoryStorage {
    async fn can_use_store_nodes(&self) -> StorageResult<bool> {
        Ok(self.state.read().await.settings.can_use_store_nodes)
    }

    async fn set_can_use_store_nodes(&self, enabled: bool) -> StorageResult<()> {
        self.state.write().await.settings.can_use_store_nodes = enabled;
        Ok(())
    }

    async fn default_sync_period(&self) -> StorageResult<u32> {
        Ok(self.state.read().await.settings.default_sync_period)
    }

    async fn pinned_store_nodes(&self) -> StorageResult<HashMap<String, String>> {
        Ok(self.state.read().await.settings.pinned.clone())
    }

    async fn set_pinned_store_nodes(&self, pinned: HashMap<String, String>) -> StorageResult<()> {
        self.state.write().await.settings.pinned = pinned;
        Ok(())
    }

    async fn fleet(&self) -> StorageResult<Option<String>> {
        Ok(self.state.read().await.settings.fleet.clone())
    }

    async fn backup_fetched(&self) -> StorageResult<bool> {
        Ok(self.state.read().await.settings.backup_fetched)
    }

    async fn set_backup_fetched(&self, fetched: bool) -> StorageResult<()> {
        self.state.write().await.settings.backup_fetched = fetched;
        Ok(())
    }
}
