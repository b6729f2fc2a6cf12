//! History synchronization: batch planning, paginated execution, gap markers
//! and coalesced resource requests.

pub mod batching;
pub mod events;
pub mod gaps;
pub mod pipeline;
pub mod requests;
mod work_queue;

pub use batching::{split_into_day_windows, BatchBuilder, BatchPlan};
pub use events::SyncSignal;
pub use gaps::{calculate_gap, enclosing_range, gap_id};
pub use pipeline::{FetchOutcome, FollowAllPages, PageDecision, PagePolicy, PageStats, PaginatedFetcher};
pub use requests::{
    RequestCoalescer, RequestKey, RequestOutcome, RequestResult, RequestStats, RequestType, Resource,
    ResourceRequest,
};
