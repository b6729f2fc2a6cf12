//! Bounded-concurrency, cursor-following execution of one store batch.
//!
//! The batch's content topics are split into groups. A producer releases one
//! group at a time, consumers query pages concurrently, and every page with a
//! cursor puts a follow-up for the same group back on the queue. The loop ends
//! when the outstanding counter of the [`WorkQueue`] reaches zero.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::Config;
use crate::error::{SyncError, SyncResult};
use crate::network::{StorePage, StoreQuery};
use crate::sync::work_queue::WorkQueue;
use crate::types::{Cursor, StoreBatch};

/// What a policy sees after each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    /// Pages fetched so far for this topic group, including this one.
    pub pages_seen: u32,
    /// Envelopes in this page.
    pub envelopes: usize,
}

/// Whether to follow the page's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDecision {
    Continue {
        page_size: u32,
    },
    Stop,
}

/// Decides after every page whether the topic group's cursor is followed.
#[async_trait]
pub trait PagePolicy: Send + Sync {
    async fn on_page(&self, stats: PageStats) -> SyncResult<PageDecision>;
}

/// Follow every cursor with the same page size.
#[derive(Debug, Clone, Copy)]
pub struct FollowAllPages {
    pub page_size: u32,
}

#[async_trait]
impl PagePolicy for FollowAllPages {
    async fn on_page(&self, _stats: PageStats) -> SyncResult<PageDecision> {
        Ok(PageDecision::Continue {
            page_size: self.page_size,
        })
    }
}

/// Totals for one executed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub pages: usize,
    pub envelopes: usize,
}

/// One page request for one topic group.
#[derive(Debug, Clone)]
struct PageWork {
    group: usize,
    content_topics: Arc<Vec<String>>,
    cursor: Option<Cursor>,
    page_size: u32,
    pages_seen: u32,
}

impl PageWork {
    fn follow(&self, cursor: Cursor, page_size: u32) -> Self {
        Self {
            group: self.group,
            content_topics: self.content_topics.clone(),
            cursor: Some(cursor),
            page_size,
            pages_seen: self.pages_seen + 1,
        }
    }
}

type PageResult = (PageWork, SyncResult<StorePage>);

/// Executes store batches.
#[derive(Debug, Clone)]
pub struct PaginatedFetcher {
    max_topics_per_request: usize,
    max_concurrent: usize,
    page_timeout: Duration,
    producer_delay: Duration,
}

impl PaginatedFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            max_topics_per_request: config.max_topics_per_request.max(1),
            max_concurrent: config.max_concurrent_queries.max(1),
            page_timeout: config.page_timeout,
            producer_delay: config.producer_delay,
        }
    }

    pub fn page_timeout(&self) -> Duration {
        self.page_timeout
    }

    /// Run `batch` to completion.
    ///
    /// `query` performs one page request. The first failing page cancels all
    /// queued and in-flight work and its error is returned. Cancelling `cancel`
    /// returns [`SyncError::Cancelled`] once every spawned task is gone.
    pub async fn fetch<Q, P>(
        &self,
        batch: &StoreBatch,
        page_size: u32,
        policy: &P,
        query: Q,
        cancel: &CancellationToken,
    ) -> SyncResult<FetchOutcome>
    where
        Q: Fn(StoreQuery) -> BoxFuture<'static, SyncResult<StorePage>> + Send + Sync + Clone + 'static,
        P: PagePolicy + ?Sized,
    {
        let mut outcome = FetchOutcome::default();
        if batch.content_topics.is_empty() {
            return Ok(outcome);
        }

        let groups: Vec<PageWork> = batch
            .content_topics
            .chunks(self.max_topics_per_request)
            .enumerate()
            .map(|(group, topics)| PageWork {
                group,
                content_topics: Arc::new(topics.to_vec()),
                cursor: batch.cursor.clone(),
                page_size,
                pages_seen: 0,
            })
            .collect();

        tracing::debug!(
            "Fetching {} topic groups on {} for [{}, {})",
            groups.len(),
            batch.pubsub_topic,
            batch.from,
            batch.to
        );

        let pipeline = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut queue = WorkQueue::new();
        let mut tasks: JoinSet<PageResult> = JoinSet::new();

        queue.stage(groups);
        queue.release_next();
        let producer = tokio::time::sleep(self.producer_delay);
        tokio::pin!(producer);

        while !queue.is_done() {
            while queue.pending_count() > 0 {
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };
                let Some(work) = queue.take_next() else {
                    break;
                };

                let request = StoreQuery {
                    from: batch.from,
                    to: batch.to,
                    cursor: work.cursor.clone(),
                    pubsub_topic: batch.pubsub_topic.clone(),
                    content_topics: work.content_topics.as_ref().clone(),
                    page_size: work.page_size,
                };
                let page = query(request);
                let token = pipeline.clone();
                let page_timeout = self.page_timeout;

                tasks.spawn(async move {
                    let _permit = permit;
                    let result = tokio::select! {
                        _ = token.cancelled() => Err(SyncError::Cancelled),
                        page = tokio::time::timeout(page_timeout, page) => match page {
                            Ok(result) => result,
                            Err(_) => Err(SyncError::Timeout(format!(
                                "store query page exceeded {:?}",
                                page_timeout
                            ))),
                        },
                    };
                    (work, result)
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    shut_down(&pipeline, &mut queue, &mut tasks).await;
                    return Err(SyncError::Cancelled);
                }
                _ = &mut producer, if queue.has_unreleased() => {
                    queue.release_next();
                    producer.as_mut().reset(Instant::now() + self.producer_delay);
                }
                Some(joined) = tasks.join_next() => {
                    let step = match joined {
                        Ok((work, Ok(page))) => {
                            self.on_page(&work, page, policy, &mut outcome).await
                        }
                        Ok((work, Err(e))) => {
                            tracing::warn!(
                                "Page {} of topic group {} failed: {}",
                                work.pages_seen + 1,
                                work.group,
                                e
                            );
                            Err(e)
                        }
                        Err(e) => Err(SyncError::InvalidState(format!("page task failed: {}", e))),
                    };

                    match step {
                        Ok(follow_up) => queue.complete(follow_up),
                        Err(e) => {
                            shut_down(&pipeline, &mut queue, &mut tasks).await;
                            return Err(e);
                        }
                    }
                }
            }
        }

        // Completion: release anything still listening on the pipeline token.
        pipeline.cancel();
        tracing::debug!(
            "Batch on {} done: {} pages, {} envelopes",
            batch.pubsub_topic,
            queue.completed(),
            outcome.envelopes
        );
        Ok(outcome)
    }

    async fn on_page<P: PagePolicy + ?Sized>(
        &self,
        work: &PageWork,
        page: StorePage,
        policy: &P,
        outcome: &mut FetchOutcome,
    ) -> SyncResult<Option<PageWork>> {
        outcome.pages += 1;
        outcome.envelopes += page.envelopes;

        let decision = policy
            .on_page(PageStats {
                pages_seen: work.pages_seen + 1,
                envelopes: page.envelopes,
            })
            .await?;

        Ok(match (decision, page.cursor) {
            (
                PageDecision::Continue {
                    page_size,
                },
                Some(cursor),
            ) => Some(work.follow(cursor, page_size)),
            _ => None,
        })
    }
}

async fn shut_down(
    pipeline: &CancellationToken,
    queue: &mut WorkQueue<PageWork>,
    tasks: &mut JoinSet<PageResult>,
) {
    pipeline.cancel();
    let in_flight = queue.active_count();
    let dropped = queue.clear();
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    tracing::debug!("Pipeline stopped, {} in-flight and {} queued pages dropped", in_flight, dropped);
}
