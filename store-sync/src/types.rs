//! Common data types for store node synchronization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Cluster used by the main fleet for sharded communities.
pub const MAIN_SHARD_CLUSTER: u16 = 16;

/// Shard index used when a community has no shard of its own.
pub const DEFAULT_SHARD_INDEX: u16 = 32;

/// Suffix appended to a community ID to form the topic its shard info is published on.
pub const SHARD_INFO_TOPIC_SUFFIX: &str = "-shard-info";

/// A candidate store node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreNode {
    /// Stable identifier, e.g. `node-01.do-ams3.status.prod`.
    pub id: String,
    /// Dialable address (multiaddr for version 2, enode for version 1).
    pub address: String,
    /// Fleet this node belongs to.
    pub fleet: String,
    /// Transport protocol version the node speaks.
    pub version: u32,
    /// Added by the user rather than shipped with the fleet table.
    #[serde(default)]
    pub custom: bool,
}

impl StoreNode {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        fleet: impl Into<String>,
        version: u32,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            fleet: fleet.into(),
            version,
            custom: false,
        }
    }

    /// Mark this node as user-added.
    pub fn into_custom(mut self) -> Self {
        self.custom = true;
        self
    }
}

impl fmt::Display for StoreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.address)
    }
}

/// A client subscription binding a chat to a (pubsub topic, content topic) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub chat_id: String,
    /// Public key of the one-to-one partner, when this is a private filter.
    pub identity: Option<String>,
    pub pubsub_topic: String,
    pub content_topic: String,
    /// Recent activity of the chat; higher is more active.
    pub priority: u64,
    pub listen: bool,
    pub ephemeral: bool,
}

impl Filter {
    pub fn new(
        chat_id: impl Into<String>,
        pubsub_topic: impl Into<String>,
        content_topic: impl Into<String>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            identity: None,
            pubsub_topic: pubsub_topic.into(),
            content_topic: content_topic.into(),
            priority: 0,
            listen: true,
            ephemeral: false,
        }
    }

    pub fn with_priority(mut self, priority: u64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_listen(mut self, listen: bool) -> Self {
        self.listen = listen;
        self
    }

    pub fn with_ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Chat whose bookmarks a sync of this filter updates.
    pub fn sync_chat_id(&self) -> &str {
        match &self.identity {
            Some(identity) if !identity.is_empty() => identity,
            _ => &self.chat_id,
        }
    }

    /// Whether history should be fetched for this filter at all.
    pub fn is_syncable(&self) -> bool {
        self.listen && !self.ephemeral
    }
}

/// Persisted sync bookmark for one topic pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSyncState {
    pub pubsub_topic: String,
    pub content_topic: String,
    /// Unix seconds of the last successful request covering this topic.
    pub last_request: u32,
}

impl TopicSyncState {
    pub fn new(
        pubsub_topic: impl Into<String>,
        content_topic: impl Into<String>,
        last_request: u32,
    ) -> Self {
        Self {
            pubsub_topic: pubsub_topic.into(),
            content_topic: content_topic.into(),
            last_request,
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.pubsub_topic.clone(), self.content_topic.clone())
    }
}

/// Opaque continuation token returned by a store node.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(pub Vec<u8>);

impl Cursor {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor({})", hex::encode(&self.0))
    }
}

/// One time-bounded, topic-scoped unit of fetch work. Never spans more than one pubsub topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreBatch {
    /// Inclusive lower bound, unix seconds.
    pub from: u32,
    /// Exclusive upper bound, unix seconds.
    pub to: u32,
    pub pubsub_topic: String,
    pub content_topics: Vec<String>,
    pub chat_ids: Vec<String>,
    pub cursor: Option<Cursor>,
}

impl StoreBatch {
    pub fn new(from: u32, to: u32, pubsub_topic: impl Into<String>) -> Self {
        Self {
            from,
            to,
            pubsub_topic: pubsub_topic.into(),
            content_topics: Vec::new(),
            chat_ids: Vec::new(),
            cursor: None,
        }
    }

    pub fn with_topics(mut self, content_topics: Vec<String>) -> Self {
        self.content_topics = content_topics;
        self
    }

    pub fn with_chats(mut self, chat_ids: Vec<String>) -> Self {
        self.chat_ids = chat_ids;
        self
    }

    /// Length of the window in seconds.
    pub fn span(&self) -> u32 {
        self.to.saturating_sub(self.from)
    }
}

/// Kind of chat, as far as history sync cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    OneToOne,
    PrivateGroup,
    Public,
    Community,
    Timeline,
    ProfileUpdates,
}

/// Sync bookmarks and the few chat attributes sync decisions depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSyncState {
    pub id: String,
    pub kind: ChatKind,
    pub active: bool,
    /// Oldest timestamp (unix seconds) history has been fetched from; 0 when never synced.
    pub synced_from: u32,
    /// Newest timestamp history has been fetched up to; 0 when never synced.
    pub synced_to: u32,
    /// Clock of the last read message, used as the chat's sync priority.
    pub read_messages_at_clock: u64,
    /// Member public keys for private group chats.
    pub members: Vec<String>,
}

impl ChatSyncState {
    pub fn new(id: impl Into<String>, kind: ChatKind) -> Self {
        Self {
            id: id.into(),
            kind,
            active: true,
            synced_from: 0,
            synced_to: 0,
            read_messages_at_clock: 0,
            members: Vec::new(),
        }
    }

    pub fn with_sync_range(mut self, synced_from: u32, synced_to: u32) -> Self {
        self.synced_from = synced_from;
        self.synced_to = synced_to;
        self
    }

    /// Timeline and profile chats are kept in sync elsewhere and never get gap markers.
    pub fn tracks_history(&self) -> bool {
        self.active && !matches!(self.kind, ChatKind::Timeline | ChatKind::ProfileUpdates)
    }
}

/// Time range a gap marker stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapParameters {
    pub from: u32,
    pub to: u32,
}

/// A stored chat message. Sync only ever creates gap markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub chat_id: String,
    pub clock: u64,
    /// Milliseconds.
    pub timestamp: u64,
    pub gap: Option<GapParameters>,
}

impl StoredMessage {
    pub fn is_gap(&self) -> bool {
        self.gap.is_some()
    }
}

/// Routing information for a sharded community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard {
    pub cluster: u16,
    pub index: u16,
}

impl Shard {
    pub fn new(cluster: u16, index: u16) -> Self {
        Self {
            cluster,
            index,
        }
    }

    /// Pubsub topic carrying this shard's traffic.
    pub fn pubsub_topic(&self) -> String {
        format!("/waku/2/rs/{}/{}", self.cluster, self.index)
    }
}

impl Default for Shard {
    fn default() -> Self {
        Self::new(MAIN_SHARD_CLUSTER, DEFAULT_SHARD_INDEX)
    }
}

/// Topic a community's shard info is published on.
pub fn shard_info_topic(community_id: &str) -> String {
    format!("{}{}", community_id, SHARD_INFO_TOPIC_SUFFIX)
}

/// Community description as known locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    /// Description clock; a higher clock is a newer description.
    pub clock: u64,
    pub name: String,
    pub shard: Option<Shard>,
}

/// Contact profile as known locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub display_name: String,
}

/// Network connectivity as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub offline: bool,
    /// Metered connection (mobile data).
    pub expensive: bool,
}

impl ConnectionState {
    pub fn online() -> Self {
        Self {
            offline: false,
            expensive: false,
        }
    }

    pub fn offline() -> Self {
        Self {
            offline: true,
            expensive: false,
        }
    }
}

/// Summary of one history sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Number of 24h sub-batches executed.
    pub batches: usize,
    pub envelopes: usize,
    /// Topic bookmarks written.
    pub topics: Vec<TopicSyncState>,
    /// Gap markers created.
    pub gaps: Vec<StoredMessage>,
    /// Chats whose bookmarks moved.
    pub chats: Vec<ChatSyncState>,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.batches += other.batches;
        self.envelopes += other.envelopes;
        self.topics.extend(other.topics);
        self.gaps.extend(other.gaps);
        self.chats.extend(other.chats);
    }
}

/// Current unix time in whole seconds, rounded up.
pub fn unix_now() -> u32 {
    let now = chrono::Utc::now();
    let secs = now.timestamp();
    let ceil = if now.timestamp_subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    };
    u32::try_from(ceil).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_sync_chat_id_prefers_identity() {
        let public = Filter::new("status", "/waku/2/rs/16/32", "0x01020304");
        assert_eq!(public.sync_chat_id(), "status");

        let private = Filter::new("0xabc-negotiated", "/waku/2/rs/16/32", "0x0a0b0c0d")
            .with_identity("0x04deadbeef");
        assert_eq!(private.sync_chat_id(), "0x04deadbeef");
    }

    #[test]
    fn test_ephemeral_and_muted_filters_are_not_syncable() {
        let filter = Filter::new("c", "p", "t");
        assert!(filter.is_syncable());
        assert!(!filter.clone().with_listen(false).is_syncable());
        assert!(!filter.with_ephemeral(true).is_syncable());
    }

    #[test]
    fn test_default_shard_topic() {
        assert_eq!(Shard::default().pubsub_topic(), "/waku/2/rs/16/32");
        assert_eq!(shard_info_topic("0xab"), "0xab-shard-info");
    }

    #[test]
    fn test_chat_history_tracking() {
        assert!(ChatSyncState::new("a", ChatKind::Public).tracks_history());
        assert!(!ChatSyncState::new("b", ChatKind::Timeline).tracks_history());
        let mut inactive = ChatSyncState::new("c", ChatKind::OneToOne);
        inactive.active = false;
        assert!(!inactive.tracks_history());
    }
}
