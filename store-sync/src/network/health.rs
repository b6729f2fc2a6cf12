//! Per store node connection status and backoff.
//!
//! A node moves disconnected → connecting → connected. Crossing the failure
//! threshold puts it back to disconnected with a graylist backoff; it becomes
//! eligible again once the backoff expires.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Health entry for one node, created on its first connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub status: ConnectionStatus,
    pub failed_requests: u32,
    /// Earliest instant selection may pick this node again.
    pub can_connect_after: Option<Instant>,
    pub last_connection_attempt: Option<Instant>,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            failed_requests: 0,
            can_connect_after: None,
            last_connection_attempt: None,
        }
    }
}

impl NodeStatus {
    /// Whether the node is outside its backoff window.
    pub fn is_eligible(&self, now: Instant) -> bool {
        self.can_connect_after.map_or(true, |after| after <= now)
    }

    pub fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        self.can_connect_after.and_then(|after| after.checked_duration_since(now)).filter(|d| !d.is_zero())
    }
}

/// Health map over all candidates. Not synchronized itself; the owner keeps it
/// under the same lock as the active node pointer.
#[derive(Debug)]
pub struct NodeHealthTracker {
    statuses: HashMap<String, NodeStatus>,
    max_failed_requests: u32,
    graylist_backoff: Duration,
    default_backoff: Duration,
}

impl NodeHealthTracker {
    pub fn new(max_failed_requests: u32, graylist_backoff: Duration, default_backoff: Duration) -> Self {
        Self {
            statuses: HashMap::new(),
            max_failed_requests,
            graylist_backoff,
            default_backoff,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_failed_requests, config.graylist_backoff, config.default_backoff)
    }

    pub fn status(&self, node_id: &str) -> Option<&NodeStatus> {
        self.statuses.get(node_id)
    }

    pub fn connection_status(&self, node_id: &str) -> ConnectionStatus {
        self.statuses.get(node_id).map_or(ConnectionStatus::Disconnected, |s| s.status)
    }

    pub fn failed_requests(&self, node_id: &str) -> u32 {
        self.statuses.get(node_id).map_or(0, |s| s.failed_requests)
    }

    /// Unknown nodes are eligible.
    pub fn is_eligible(&self, node_id: &str, now: Instant) -> bool {
        self.statuses.get(node_id).map_or(true, |s| s.is_eligible(now))
    }

    pub fn can_connect_after(&self, node_id: &str) -> Option<Instant> {
        self.statuses.get(node_id).and_then(|s| s.can_connect_after)
    }

    pub fn mark_connecting(&mut self, node_id: &str, now: Instant) {
        let entry = self.statuses.entry(node_id.to_string()).or_default();
        entry.status = ConnectionStatus::Connecting;
        entry.last_connection_attempt = Some(now);
    }

    /// Connected nodes start with a clean failure count and a short backoff so
    /// an immediate re-cycle does not land on the same node.
    pub fn mark_connected(&mut self, node_id: &str, now: Instant) {
        let entry = self.statuses.entry(node_id.to_string()).or_default();
        entry.status = ConnectionStatus::Connected;
        entry.failed_requests = 0;
        entry.can_connect_after = Some(now + self.default_backoff);
        entry.last_connection_attempt = Some(now);
    }

    pub fn mark_disconnected(&mut self, node_id: &str, now: Instant, backoff: Duration) {
        let entry = self.statuses.entry(node_id.to_string()).or_default();
        entry.status = ConnectionStatus::Disconnected;
        entry.can_connect_after = Some(now + backoff);
    }

    /// Count a failed request. Returns true once the threshold is reached.
    pub fn record_failure(&mut self, node_id: &str) -> bool {
        let entry = self.statuses.entry(node_id.to_string()).or_default();
        entry.failed_requests = entry.failed_requests.saturating_add(1);
        entry.failed_requests >= self.max_failed_requests
    }

    pub fn record_success(&mut self, node_id: &str) {
        if let Some(entry) = self.statuses.get_mut(node_id) {
            entry.failed_requests = 0;
        }
    }

    /// Disconnect and graylist a failing node.
    pub fn penalize(&mut self, node_id: &str, now: Instant) {
        let backoff = self.graylist_backoff;
        self.mark_disconnected(node_id, now, backoff);
        if let Some(entry) = self.statuses.get_mut(node_id) {
            entry.failed_requests = 0;
        }
        tracing::warn!("Store node {} graylisted for {:?}", node_id, backoff);
    }

    pub fn graylist_backoff(&self) -> Duration {
        self.graylist_backoff
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod health_tests;
