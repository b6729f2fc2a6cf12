//! Store node protocol constants.

use std::time::Duration;

// Timeouts
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);
pub const PING_TIMEOUT: Duration = Duration::from_millis(500);
pub const NODE_AVAILABLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const AVAILABILITY_GRACE: Duration = Duration::from_secs(1);
pub const FETCH_DEADLINE: Duration = Duration::from_secs(60);

// Health model
pub const GRAYLIST_BACKOFF: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_REQUEST_TRIES: u32 = 2;
pub const MAX_FAILED_REQUESTS: u32 = 2;

// Pagination
pub const MAX_TOPICS_PER_REQUEST: usize = 10;
pub const MAX_CONCURRENT_QUERIES: usize = 3;
pub const PRODUCER_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const INITIAL_PAGE_SIZE: u32 = 4;
pub const FURTHER_PAGE_SIZE: u32 = 20;

// Batching
pub const PRIORITIZED_BATCHES: [usize; 3] = [1, 5, 10];
pub const TOLERANCE_SECS: u32 = 60;
pub const ONE_DAY_SECS: u32 = 24 * 60 * 60;
pub const ONE_MONTH: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// Transport version with multiaddr store peers and cursor pagination.
pub const WAKU_V2: u32 = 2;
