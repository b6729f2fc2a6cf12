//! Configuration for the store node sync coordinator.

use std::time::Duration;

use crate::network::constants::*;

/// Fleet used when settings do not name one.
pub const DEFAULT_FLEET: &str = "status.prod";

/// Configuration for [`SyncCoordinator`](crate::client::SyncCoordinator).
#[derive(Debug, Clone)]
pub struct Config {
    /// Fleet whose store nodes are candidates, unless settings override it.
    pub fleet: String,

    /// Own public key (hex). Used to find one-to-one chat filters.
    pub identity: Option<String>,

    // Timeouts
    /// Budget for one store query page.
    pub page_timeout: Duration,

    /// Pause between request executor attempts.
    pub retry_backoff: Duration,

    /// Budget for pinging one candidate during selection.
    pub ping_timeout: Duration,

    /// How long on-demand requests wait for a store node.
    pub node_available_timeout: Duration,

    /// Added on top of `node_available_timeout`.
    pub availability_grace: Duration,

    /// Deadline for one coalesced resource fetch once a node is available.
    pub fetch_deadline: Duration,

    // Health model
    /// Backoff applied to a node dropped for failing.
    pub graylist_backoff: Duration,

    /// Backoff applied to a node after a successful connection.
    pub default_backoff: Duration,

    /// Interval of the active node health check.
    pub health_check_interval: Duration,

    /// Request executor attempts per operation.
    pub max_request_tries: u32,

    /// Failures after which the active node is dropped.
    pub max_failed_requests: u32,

    // Pagination
    pub max_topics_per_request: usize,

    /// Concurrent store queries within one batch.
    pub max_concurrent_queries: usize,

    /// Delay between the producer releasing two topic groups.
    pub producer_delay: Duration,

    /// Page size for history sync.
    pub default_page_size: u32,

    /// First page size for on-demand resource requests.
    pub initial_page_size: u32,

    /// Page size for later pages of on-demand resource requests.
    pub further_page_size: u32,

    // Batching
    /// Sizes of the priority tiers, most active chats first.
    pub prioritized_batches: Vec<usize>,

    /// Slack (seconds) subtracted from a bookmark before re-fetching from it.
    pub tolerance_secs: u32,

    /// History window for on-demand resource requests.
    pub resource_window: Duration,

    /// History window for the backup fetch.
    pub backup_window: Duration,

    /// Start a history sync whenever a store node becomes available.
    pub auto_request_historic_messages: bool,

    /// Never select a store node.
    pub store_nodes_disabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fleet: DEFAULT_FLEET.to_string(),
            identity: None,
            page_timeout: PAGE_TIMEOUT,
            retry_backoff: RETRY_BACKOFF,
            ping_timeout: PING_TIMEOUT,
            node_available_timeout: NODE_AVAILABLE_TIMEOUT,
            availability_grace: AVAILABILITY_GRACE,
            fetch_deadline: FETCH_DEADLINE,
            graylist_backoff: GRAYLIST_BACKOFF,
            default_backoff: DEFAULT_BACKOFF,
            health_check_interval: HEALTH_CHECK_INTERVAL,
            max_request_tries: MAX_REQUEST_TRIES,
            max_failed_requests: MAX_FAILED_REQUESTS,
            max_topics_per_request: MAX_TOPICS_PER_REQUEST,
            max_concurrent_queries: MAX_CONCURRENT_QUERIES,
            producer_delay: PRODUCER_DELAY,
            default_page_size: DEFAULT_PAGE_SIZE,
            initial_page_size: INITIAL_PAGE_SIZE,
            further_page_size: FURTHER_PAGE_SIZE,
            prioritized_batches: PRIORITIZED_BATCHES.to_vec(),
            tolerance_secs: TOLERANCE_SECS,
            resource_window: ONE_MONTH,
            backup_window: ONE_MONTH,
            auto_request_historic_messages: true,
            store_nodes_disabled: false,
        }
    }
}

impl Config {
    /// Configuration for the given fleet.
    pub fn new(fleet: impl Into<String>) -> Self {
        Self {
            fleet: fleet.into(),
            ..Self::default()
        }
    }

    /// Production fleet.
    pub fn production() -> Self {
        Self::new("status.prod")
    }

    /// Staging fleet with sharded store nodes.
    pub fn staging() -> Self {
        Self::new("shards.test")
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_node_available_timeout(mut self, timeout: Duration) -> Self {
        self.node_available_timeout = timeout;
        self
    }

    pub fn with_fetch_deadline(mut self, deadline: Duration) -> Self {
        self.fetch_deadline = deadline;
        self
    }

    pub fn with_max_concurrent_queries(mut self, max: usize) -> Self {
        self.max_concurrent_queries = max;
        self
    }

    pub fn with_max_topics_per_request(mut self, max: usize) -> Self {
        self.max_topics_per_request = max;
        self
    }

    pub fn with_producer_delay(mut self, delay: Duration) -> Self {
        self.producer_delay = delay;
        self
    }

    pub fn with_prioritized_batches(mut self, tiers: Vec<usize>) -> Self {
        self.prioritized_batches = tiers;
        self
    }

    pub fn with_tolerance(mut self, secs: u32) -> Self {
        self.tolerance_secs = secs;
        self
    }

    pub fn with_auto_request_historic_messages(mut self, enabled: bool) -> Self {
        self.auto_request_historic_messages = enabled;
        self
    }

    pub fn with_store_nodes_disabled(mut self, disabled: bool) -> Self {
        self.store_nodes_disabled = disabled;
        self
    }

    /// Total time an on-demand request may wait for a store node.
    pub fn availability_wait(&self) -> Duration {
        self.node_available_timeout + self.availability_grace
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.fleet.is_empty() {
            return Err("fleet must not be empty".to_string());
        }

        if self.max_concurrent_queries == 0 {
            return Err("max_concurrent_queries must be > 0".to_string());
        }

        if self.max_topics_per_request == 0 {
            return Err("max_topics_per_request must be > 0".to_string());
        }

        if self.default_page_size == 0 || self.initial_page_size == 0 || self.further_page_size == 0
        {
            return Err("page sizes must be > 0".to_string());
        }

        if self.max_request_tries == 0 {
            return Err("max_request_tries must be > 0".to_string());
        }

        if self.max_failed_requests == 0 {
            return Err("max_failed_requests must be > 0".to_string());
        }

        if self.prioritized_batches.is_empty() || self.prioritized_batches.contains(&0) {
            return Err("prioritized_batches must be non-empty with non-zero sizes".to_string());
        }

        if self.page_timeout.is_zero() {
            return Err("page_timeout must be > 0".to_string());
        }

        Ok(())
    }
}
