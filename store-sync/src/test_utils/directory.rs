use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::network::{NodeDirectory, PingResult};

/// Ping directory answering from a script. Unscripted addresses are unreachable.
#[derive(Default)]
pub struct MockDirectory {
    rtts: Mutex<HashMap<String, Option<Duration>>>,
    rounds: AtomicUsize,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer pings to `address` after `rtt_ms`, or with an error for `None`.
    pub fn with_ping(self, address: impl Into<String>, rtt_ms: Option<u64>) -> Self {
        self.set_ping(address, rtt_ms);
        self
    }

    pub fn set_ping(&self, address: impl Into<String>, rtt_ms: Option<u64>) {
        self.rtts.lock().unwrap().insert(address.into(), rtt_ms.map(Duration::from_millis));
    }

    /// Number of ping rounds performed.
    pub fn rounds(&self) -> usize {
        self.rounds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeDirectory for MockDirectory {
    async fn ping(&self, addresses: &[String], timeout: Duration) -> Vec<PingResult> {
        self.rounds.fetch_add(1, Ordering::SeqCst);
        let rtts = self.rtts.lock().unwrap();
        addresses
            .iter()
            .map(|address| match rtts.get(address).copied().flatten() {
                Some(rtt) if rtt <= timeout => PingResult::reachable(address, rtt),
                Some(_) => PingResult::failed(address, "timed out"),
                None => PingResult::failed(address, "unreachable"),
            })
            .collect()
    }
}
