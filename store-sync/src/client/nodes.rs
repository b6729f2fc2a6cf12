//! Store node settings and connectivity.

use std::collections::HashMap;

use crate::error::SyncResult;
use crate::types::{ConnectionState, StoreNode};

use super::SyncCoordinator;

impl SyncCoordinator {
    /// Enable or disable store nodes. Enabling selects a fresh node;
    /// disabling drops the active one.
    pub async fn toggle_use_mailservers(&self, enabled: bool) -> SyncResult<()> {
        self.storage.set_can_use_store_nodes(enabled).await?;
        if enabled {
            self.manager.cycle().await?;
        } else {
            self.manager.disconnect_active(self.config.graylist_backoff).await;
        }
        Ok(())
    }

    /// Replace the pinned node per fleet and reselect.
    pub async fn set_pinned_mailservers(&self, pinned: HashMap<String, String>) -> SyncResult<()> {
        self.storage.set_pinned_store_nodes(pinned).await?;
        self.manager.cycle().await?;
        Ok(())
    }

    pub async fn connection_changed(&self, state: ConnectionState) {
        self.manager.connection_changed(state).await;
    }

    /// Add a user-provided store node to the current candidates.
    pub async fn add_custom_store_node(&self, node: StoreNode) -> SyncResult<()> {
        let node = node.into_custom();
        self.storage.add_custom_store_node(node.clone()).await?;
        self.transport.add_store_peer(&node).await?;
        Ok(())
    }

    /// Dedicate a store node to one community, or clear it with `None`.
    pub async fn set_community_store_node(&self, community_id: &str, node: Option<StoreNode>) -> SyncResult<()> {
        if let Some(node) = &node {
            self.transport.add_store_peer(node).await?;
        }
        self.storage.set_community_store_node(community_id, node).await?;
        Ok(())
    }

    /// Node currently serving requests, globally or for `community`.
    pub async fn active_store_node(&self, community: Option<&str>) -> SyncResult<Option<StoreNode>> {
        self.manager.active_node(community).await
    }
}
