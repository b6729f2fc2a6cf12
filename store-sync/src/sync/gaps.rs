//! Gap markers for time ranges a chat has not been synced over.

use crate::error::{SyncError, SyncResult};
use crate::types::{ChatSyncState, GapParameters, StoredMessage};

/// Marker for the range between a chat's last sync and a new window starting at `from`.
///
/// There is no gap when the chat was never synced or the window abuts or
/// overlaps the previous one.
pub fn calculate_gap(chat: &ChatSyncState, from: u32) -> Option<StoredMessage> {
    if chat.synced_to == 0 || chat.synced_to >= from {
        return None;
    }

    let timestamp = u64::from(from) * 1000;
    Some(StoredMessage {
        id: gap_id(&chat.id, chat.synced_to, from),
        chat_id: chat.id.clone(),
        clock: timestamp,
        timestamp,
        gap: Some(GapParameters {
            from: chat.synced_to,
            to: from,
        }),
    })
}

/// Deterministic ID, so recomputing the same gap yields the same marker.
pub fn gap_id(chat_id: &str, synced_to: u32, from: u32) -> String {
    let seed = format!("{}-{}-{}", chat_id, synced_to, from);
    hex::encode(blake3::hash(seed.as_bytes()).as_bytes())
}

/// Smallest range covering every marker. Fails on a message that is not a gap.
pub fn enclosing_range(messages: &[StoredMessage]) -> SyncResult<Option<GapParameters>> {
    let mut range: Option<GapParameters> = None;
    for message in messages {
        let gap = message.gap.ok_or_else(|| SyncError::NotAGap(message.id.clone()))?;
        range = Some(match range {
            None => gap,
            Some(current) => GapParameters {
                from: current.from.min(gap.from),
                to: current.to.max(gap.to),
            },
        });
    }
    Ok(range)
}
