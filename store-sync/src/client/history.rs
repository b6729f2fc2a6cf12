//! History sync, gap filling and per-chat syncs.

use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::network::node_query;
use crate::sync::{calculate_gap, enclosing_range, FetchOutcome, FollowAllPages, SyncSignal};
use crate::types::{unix_now, ChatKind, ChatSyncState, Filter, StoreBatch, SyncReport};

use super::SyncCoordinator;

fn secs(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}

impl SyncCoordinator {
    /// Sync every installed filter from its bookmark up to now.
    ///
    /// The user's backup topic is synced first when `force_backup` is set or
    /// it has never been fetched.
    pub async fn request_all_historic_messages(&self, force_backup: bool) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        if force_backup || !self.storage.backup_fetched().await? {
            report.merge(self.sync_backup().await?);
        }

        let filters = self.prioritized(self.transport.filters().await?).await?;
        report.merge(self.sync_filters_from(&filters, 0).await?);

        tracing::info!(
            "History sync done: {} windows, {} envelopes, {} gaps",
            report.batches,
            report.envelopes,
            report.gaps.len()
        );
        Ok(report)
    }

    async fn sync_backup(&self) -> SyncResult<SyncReport> {
        let Some(filter) = self.transport.personal_topic_filter().await? else {
            tracing::debug!("No personal topic filter, skipping backup fetch");
            return Ok(SyncReport::default());
        };

        let since = unix_now().saturating_sub(secs(self.config.backup_window));
        let report = self.sync_filters_from(&[filter], since).await?;
        self.storage.set_backup_fetched(true).await?;
        Ok(report)
    }

    /// Filters with their priority set from the chat's last read clock.
    async fn prioritized(&self, mut filters: Vec<Filter>) -> SyncResult<Vec<Filter>> {
        for filter in &mut filters {
            if let Some(chat) = self.storage.chat(filter.sync_chat_id()).await? {
                filter.priority = chat.read_messages_at_clock;
            }
        }
        Ok(filters)
    }

    /// Sync `filters` up to now, then move topic and chat bookmarks.
    ///
    /// A non-zero `last_request` replaces every topic bookmark.
    pub async fn sync_filters_from(&self, filters: &[Filter], last_request: u32) -> SyncResult<SyncReport> {
        let topics = self.storage.topics().await?;
        let default_sync_period = self.storage.default_sync_period().await?;
        let to = unix_now();

        let plan = self.batches.build(filters, &topics, to, default_sync_period, last_request);
        if plan.is_empty() {
            return Ok(SyncReport::default());
        }

        self.events.emit(SyncSignal::HistoryRequestStarted {
            batches: plan.windows.len(),
        });

        let mut report = SyncReport {
            batches: plan.windows.len(),
            ..SyncReport::default()
        };
        for window in &plan.windows {
            report.envelopes += self.process_batch(window, None).await?.envelopes;
        }

        self.events.emit(SyncSignal::HistoryRequestCompleted);
        self.storage.add_topics(&plan.topics).await?;
        report.topics = plan.topics;

        for batch in &plan.batches {
            for chat_id in &batch.chat_ids {
                let Some(mut chat) = self.storage.chat(chat_id).await? else {
                    continue;
                };
                if !chat.tracks_history() {
                    continue;
                }

                let gap = calculate_gap(&chat, batch.from);
                if chat.synced_from == 0 || chat.synced_from > batch.from {
                    chat.synced_from = batch.from;
                }
                chat.synced_to = to;
                self.storage.set_sync_timestamps(&chat.id, chat.synced_from, chat.synced_to).await?;

                report.gaps.extend(gap);
                report.chats.push(chat);
            }
        }

        if !report.gaps.is_empty() {
            tracing::debug!("Saving {} gap markers", report.gaps.len());
            self.storage.save_messages(&report.gaps).await?;
        }
        Ok(report)
    }

    /// Fetch one batch through the request executor.
    pub(crate) async fn process_batch(
        &self,
        batch: &StoreBatch,
        community: Option<&str>,
    ) -> SyncResult<FetchOutcome> {
        let policy = FollowAllPages {
            page_size: self.config.default_page_size,
        };
        let fetcher = &self.fetcher;
        let policy = &policy;
        let cancel = &self.cancel;
        let transport = self.transport.clone();
        let page_size = self.config.default_page_size;

        self.executor
            .perform(community, move |node| {
                fetcher.fetch(batch, page_size, policy, node_query(transport.clone(), node), cancel)
            })
            .await
    }

    /// Fetch the ranges of the given gap markers, then delete the markers.
    ///
    /// Unknown IDs are ignored, so filling the same gaps twice is a no-op.
    pub async fn fill_gaps(&self, chat_id: &str, message_ids: &[String]) -> SyncResult<()> {
        let messages = self.storage.messages_by_ids(message_ids).await?;
        if messages.is_empty() {
            return Ok(());
        }

        let chat = self.chat(chat_id).await?;
        let Some(range) = enclosing_range(&messages)? else {
            return Ok(());
        };
        let batch = self.chat_batch(&chat, range.from, range.to).await?;

        self.events.emit(SyncSignal::HistoryRequestStarted {
            batches: 1,
        });
        let result = self.process_batch(&batch, None).await;
        self.events.emit(SyncSignal::HistoryRequestCompleted);
        result?;

        self.storage.delete_messages(message_ids).await?;
        tracing::info!("Filled {} gaps in {} over [{}, {})", messages.len(), chat_id, range.from, range.to);
        Ok(())
    }

    /// Sync one more default period before the chat's `synced_from`.
    ///
    /// Returns the new `synced_from`.
    pub async fn sync_chat_from_synced_from(&self, chat_id: &str) -> SyncResult<u32> {
        let chat = self.chat(chat_id).await?;
        let default_sync_period = self.storage.default_sync_period().await?;

        let to = if chat.synced_from == 0 {
            unix_now()
        } else {
            chat.synced_from
        };
        let from = to.saturating_sub(default_sync_period);
        let batch = self.chat_batch(&chat, from, to).await?;

        self.events.emit(SyncSignal::HistoryRequestStarted {
            batches: 1,
        });
        let result = self.process_batch(&batch, None).await;
        self.events.emit(SyncSignal::HistoryRequestCompleted);
        result?;

        let synced_to = if chat.synced_to == 0 {
            to
        } else {
            chat.synced_to
        };
        self.storage.set_sync_timestamps(&chat.id, from, synced_to).await?;
        Ok(from)
    }

    /// Fetch the last `duration` of a chat's history. Returns the start of the window.
    pub async fn fetch_messages(&self, chat_id: &str, duration: Duration) -> SyncResult<u32> {
        let chat = self.chat(chat_id).await?;
        let to = unix_now();
        let from = to.saturating_sub(secs(duration));
        let batch = self.chat_batch(&chat, from, to).await?;

        self.events.emit(SyncSignal::HistoryRequestStarted {
            batches: 1,
        });
        let result = self.process_batch(&batch, None).await;
        self.events.emit(SyncSignal::HistoryRequestCompleted);
        result?;
        Ok(from)
    }

    /// Start a background sync of one chat if syncing is possible right now.
    ///
    /// The finished sync is published as [`SyncSignal::HistorySynced`].
    pub async fn schedule_sync_chat(&self, chat_id: &str) -> SyncResult<bool> {
        let chat = self.chat(chat_id).await?;
        let filters = self.filters_for_chat(&chat).await?;
        self.schedule_sync_filters(filters).await
    }

    /// Start a background sync of `filters` if syncing is possible right now.
    pub async fn schedule_sync_filters(&self, filters: Vec<Filter>) -> SyncResult<bool> {
        if !self.manager.should_sync().await? {
            tracing::debug!("Not scheduling sync: offline, no store node or disabled");
            return Ok(false);
        }

        let coordinator = self.clone();
        self.spawn_task(async move {
            match coordinator.sync_filters_from(&filters, 0).await {
                Ok(report) => coordinator.events.emit(SyncSignal::HistorySynced {
                    report,
                }),
                Err(e) => tracing::error!("Scheduled sync failed: {}", e),
            }
        })
        .await;
        Ok(true)
    }

    /// Filters a chat's messages arrive on.
    pub async fn filters_for_chat(&self, chat: &ChatSyncState) -> SyncResult<Vec<Filter>> {
        let filters = match chat.kind {
            ChatKind::OneToOne => {
                let mut identities: Vec<String> = self.config.identity.iter().cloned().collect();
                identities.push(chat.id.clone());
                self.transport.filters_by_identities(&identities).await?
            }
            ChatKind::PrivateGroup => self.transport.filters_by_identities(&chat.members).await?,
            _ => self.transport.filter_by_chat_id(&chat.id).await?.into_iter().collect(),
        };

        if filters.is_empty() {
            return Err(SyncError::NoFiltersForChat(chat.id.clone()));
        }
        Ok(filters)
    }

    async fn chat(&self, chat_id: &str) -> SyncResult<ChatSyncState> {
        self.storage.chat(chat_id).await?.ok_or_else(|| SyncError::ChatNotFound(chat_id.to_string()))
    }

    /// Single batch over `[from, to)` on the chat's pubsub topic (its first filter's).
    async fn chat_batch(&self, chat: &ChatSyncState, from: u32, to: u32) -> SyncResult<StoreBatch> {
        let filters = self.filters_for_chat(chat).await?;
        let pubsub_topic = filters[0].pubsub_topic.clone();
        let content_topics: Vec<String> = filters
            .iter()
            .filter(|f| f.pubsub_topic == pubsub_topic)
            .map(|f| f.content_topic.clone())
            .collect();

        Ok(StoreBatch::new(from, to, pubsub_topic)
            .with_topics(content_topics)
            .with_chats(vec![chat.id.clone()]))
    }
}
