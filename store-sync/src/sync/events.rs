use crate::types::{Community, StoreNode, SyncReport};

/// Signals published to the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSignal {
    /// A history sync is about to execute `batches` 24h windows.
    HistoryRequestStarted {
        batches: usize,
    },

    HistoryRequestCompleted,

    /// The active store node changed. Empty strings mean there is none.
    MailserverChanged {
        address: String,
        id: String,
    },

    /// The active store node is connected and can serve requests.
    MailserverAvailable {
        address: String,
        id: String,
    },

    /// The active store node crossed the failure threshold and was dropped.
    MailserverNotWorking,

    /// A coalesced community request found a newer description.
    CommunityFound {
        community: Community,
    },

    /// A scheduled background sync finished.
    HistorySynced {
        report: SyncReport,
    },
}

impl SyncSignal {
    pub(crate) fn changed_to(node: Option<&StoreNode>) -> Self {
        match node {
            Some(node) => SyncSignal::MailserverChanged {
                address: node.address.clone(),
                id: node.id.clone(),
            },
            None => SyncSignal::MailserverChanged {
                address: String::new(),
                id: String::new(),
            },
        }
    }

    pub(crate) fn available(node: &StoreNode) -> Self {
        SyncSignal::MailserverAvailable {
            address: node.address.clone(),
            id: node.id.clone(),
        }
    }

    /// Short description for logging.
    pub fn description(&self) -> String {
        match self {
            SyncSignal::HistoryRequestStarted {
                batches,
            } => format!("HistoryRequestStarted(batches={})", batches),
            SyncSignal::HistoryRequestCompleted => "HistoryRequestCompleted".to_string(),
            SyncSignal::MailserverChanged {
                id,
                ..
            } => format!("MailserverChanged(id={})", id),
            SyncSignal::MailserverAvailable {
                id,
                ..
            } => format!("MailserverAvailable(id={})", id),
            SyncSignal::MailserverNotWorking => "MailserverNotWorking".to_string(),
            SyncSignal::CommunityFound {
                community,
            } => format!("CommunityFound(id={}, clock={})", community.id, community.clock),
            SyncSignal::HistorySynced {
                report,
            } => format!("HistorySynced(batches={}, envelopes={})", report.batches, report.envelopes),
        }
    }
}
