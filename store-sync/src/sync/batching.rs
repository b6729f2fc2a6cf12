//! Turns filters and topic bookmarks into store batches.
//!
//! Filters are taken in priority order. The most active chats fill small
//! priority tiers first; everything else is grouped by pubsub topic and by the
//! bookmark it resumes from, so a topic that was partially synced never shares
//! a window with one that was never synced. Every batch is then split into 24h
//! windows, newest first.

use std::collections::{BTreeMap, HashMap};

use crate::client::Config;
use crate::network::constants::ONE_DAY_SECS;
use crate::types::{Filter, StoreBatch, TopicSyncState};

/// Key of a merged batch within one pubsub topic. Tiers sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum BatchKey {
    Tier(usize),
    Since(u32),
}

/// Output of [`BatchBuilder::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    /// One batch per (pubsub topic, tier or bookmark), before the 24h split.
    pub batches: Vec<StoreBatch>,
    /// 24h windows in execution order: round-robin over pubsub topics, newest first.
    pub windows: Vec<StoreBatch>,
    /// Bookmarks to persist once every window succeeded.
    pub topics: Vec<TopicSyncState>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Builds [`BatchPlan`]s.
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    tiers: Vec<usize>,
    tolerance: u32,
}

impl BatchBuilder {
    /// Zero-sized tiers hold nothing and are dropped.
    pub fn new(tiers: Vec<usize>, tolerance: u32) -> Self {
        Self {
            tiers: tiers.into_iter().filter(|&size| size > 0).collect(),
            tolerance,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.prioritized_batches.clone(), config.tolerance_secs)
    }

    /// Plan a sync up to `to`.
    ///
    /// `default_sync_period` bounds how far back a topic is fetched. A topic
    /// with no bookmark covers exactly that period. A non-zero `last_request`
    /// replaces every bookmark and is not capped.
    pub fn build(
        &self,
        filters: &[Filter],
        topics: &[TopicSyncState],
        to: u32,
        default_sync_period: u32,
        last_request: u32,
    ) -> BatchPlan {
        let bookmarks: HashMap<(String, String), u32> =
            topics.iter().map(|t| (t.key(), t.last_request)).collect();
        let default_from = to.saturating_sub(default_sync_period);

        let mut ordered: Vec<&Filter> = filters.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut remaining = self.tiers.clone();
        let mut tier = match ordered.first() {
            Some(top) if top.priority > 0 => 0,
            _ => remaining.len(),
        };
        // Bookmark of the first filter placed in each tier.
        let mut tier_seeds: HashMap<usize, u32> = HashMap::new();

        let mut merged: BTreeMap<(String, BatchKey), StoreBatch> = BTreeMap::new();
        let mut synced = Vec::new();

        for filter in ordered.into_iter().filter(|f| f.is_syncable()) {
            let key = (filter.pubsub_topic.clone(), filter.content_topic.clone());
            let (since, cap) = match bookmarks.get(&key) {
                None if last_request != 0 => (last_request, false),
                None => (default_from, false),
                Some(_) if last_request != 0 => (last_request, false),
                Some(&bookmark) => (bookmark, true),
            };

            let mut batch_key = BatchKey::Since(since);
            if tier < remaining.len() {
                if tier_seeds.get(&tier).is_some_and(|&seed| seed != since) {
                    tier += 1;
                }
                if tier < remaining.len() {
                    tier_seeds.entry(tier).or_insert(since);
                    batch_key = BatchKey::Tier(tier);
                    remaining[tier] -= 1;
                    if remaining[tier] == 0 {
                        tier += 1;
                    }
                }
            }

            let from = if cap {
                self.cap_to_default_sync_period(since, default_from)
            } else {
                since
            };
            let batch = merged
                .entry((filter.pubsub_topic.clone(), batch_key))
                .or_insert_with(|| StoreBatch::new(from, to, filter.pubsub_topic.clone()));
            batch.content_topics.push(filter.content_topic.clone());
            batch.chat_ids.push(filter.sync_chat_id().to_string());

            synced.push(TopicSyncState::new(&filter.pubsub_topic, &filter.content_topic, to));
        }

        let batches: Vec<StoreBatch> = merged.into_values().collect();
        let windows = interleave_by_topic(&batches);

        tracing::debug!(
            "Planned {} batches ({} windows) for {} topics",
            batches.len(),
            windows.len(),
            synced.len()
        );

        BatchPlan {
            batches,
            windows,
            topics: synced,
        }
    }

    /// Lower bound for a topic last fetched at `last_request`, never older than
    /// `default_from`. Refetches start `tolerance` seconds early.
    pub fn cap_to_default_sync_period(&self, last_request: u32, default_from: u32) -> u32 {
        if default_from > last_request {
            default_from
        } else {
            last_request.saturating_sub(self.tolerance)
        }
    }
}

/// Split `batch` into contiguous windows of at most 24h, newest first.
/// An empty window produces nothing.
pub fn split_into_day_windows(batch: &StoreBatch) -> Vec<StoreBatch> {
    let mut windows = Vec::new();
    let mut to = batch.to;
    while to > batch.from {
        let from = to.saturating_sub(ONE_DAY_SECS).max(batch.from);
        windows.push(StoreBatch {
            from,
            to,
            ..batch.clone()
        });
        to = from;
    }
    windows
}

/// Day windows of every batch. Round `i` takes the i-th newest window of each
/// batch, pubsub topics in order and batches within a topic in key order.
fn interleave_by_topic(batches: &[StoreBatch]) -> Vec<StoreBatch> {
    let mut per_topic: BTreeMap<&str, Vec<Vec<StoreBatch>>> = BTreeMap::new();
    for batch in batches {
        per_topic.entry(batch.pubsub_topic.as_str()).or_default().push(split_into_day_windows(batch));
    }

    let rounds = per_topic.values().flatten().map(Vec::len).max().unwrap_or(0);
    let mut windows = Vec::new();
    for round in 0..rounds {
        for topic_batches in per_topic.values() {
            windows.extend(topic_batches.iter().filter_map(|days| days.get(round)).cloned());
        }
    }
    windows
}
