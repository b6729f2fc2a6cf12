//! On-demand community and contact fetches.

use crate::error::{SyncError, SyncResult};
use crate::sync::{RequestOutcome, Resource, ResourceRequest};
use crate::types::{Community, Contact, Shard};

use super::SyncCoordinator;

/// Parameters of a community fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityRequest {
    pub community_id: String,
    /// Shard the community is published on, when the caller knows it.
    pub shard: Option<Shard>,
    /// Return the locally stored community without asking the network, if there is one.
    pub try_database: bool,
    /// Wait for the network result. When false the fetch runs in the background.
    pub wait_for_response: bool,
}

impl CommunityRequest {
    pub fn new(community_id: impl Into<String>) -> Self {
        Self {
            community_id: community_id.into(),
            shard: None,
            try_database: false,
            wait_for_response: true,
        }
    }

    pub fn with_shard(mut self, shard: Shard) -> Self {
        self.shard = Some(shard);
        self
    }

    pub fn with_try_database(mut self, try_database: bool) -> Self {
        self.try_database = try_database;
        self
    }

    pub fn with_wait_for_response(mut self, wait: bool) -> Self {
        self.wait_for_response = wait;
        self
    }
}

impl SyncCoordinator {
    /// Fetch a community description from the network.
    ///
    /// Returns `Ok(None)` when the network has no newer description than the
    /// local one, and immediately when `wait_for_response` is false.
    pub async fn fetch_community(&self, request: CommunityRequest) -> SyncResult<Option<Community>> {
        if request.community_id.is_empty() {
            return Err(SyncError::InvalidRequest("community id is empty".to_string()));
        }

        if request.try_database {
            if let Some(community) = self.storage.community(&request.community_id).await? {
                return Ok(Some(community));
            }
        }

        if !request.wait_for_response {
            let coordinator = self.clone();
            self.spawn_task(async move {
                if let Err(e) = coordinator.fetch_community_from_network(&request).await {
                    tracing::warn!("Background fetch of community {} failed: {}", request.community_id, e);
                }
            })
            .await;
            return Ok(None);
        }

        self.fetch_community_from_network(&request).await
    }

    /// Start a fetch for every community without waiting for any of them.
    pub async fn fetch_communities(&self, requests: Vec<CommunityRequest>) -> SyncResult<()> {
        for request in requests {
            self.fetch_community(request.with_wait_for_response(false)).await?;
        }
        Ok(())
    }

    /// Fetch a contact's profile. `contact_id` is the contact's hex public key.
    pub async fn fetch_contact(&self, contact_id: &str, wait_for_response: bool) -> SyncResult<Option<Contact>> {
        let receiver = self.coalescer.subscribe(ResourceRequest::contact(contact_id)).await?;
        if !wait_for_response {
            return Ok(None);
        }

        let result = receiver
            .await
            .map_err(|_| SyncError::InvalidState("contact request dropped before completion".to_string()))?;
        match result.outcome? {
            RequestOutcome::Found(Resource::Contact(contact)) => Ok(Some(contact)),
            _ => Ok(None),
        }
    }

    /// Resolve the shard, then fetch the community on it.
    async fn fetch_community_from_network(&self, request: &CommunityRequest) -> SyncResult<Option<Community>> {
        let shard = match request.shard {
            Some(shard) => Some(shard),
            None => self.resolve_shard(&request.community_id).await?,
        };

        let result = self.coalescer.request(ResourceRequest::community(&request.community_id, shard)).await?;
        match result.outcome? {
            RequestOutcome::Found(Resource::Community(community)) => Ok(Some(community)),
            outcome => {
                tracing::debug!("Community {} not fetched: {:?}", request.community_id, outcome);
                Ok(None)
            }
        }
    }

    /// Shard of a community from storage, or from its shard info topic on the default shard.
    async fn resolve_shard(&self, community_id: &str) -> SyncResult<Option<Shard>> {
        if let Some(shard) = self.storage.community_shard(community_id).await? {
            return Ok(Some(shard));
        }

        let result = self.coalescer.request(ResourceRequest::community_shard(community_id)).await?;
        match result.outcome? {
            RequestOutcome::Found(Resource::Shard(shard)) => Ok(Some(shard)),
            _ => {
                tracing::debug!("No shard info for {}, using the default shard", community_id);
                Ok(None)
            }
        }
    }
}
