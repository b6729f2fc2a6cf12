//! Latency-based store node selection.
//!
//! Candidates are pinged, unreachable or backed-off ones dropped, the rest
//! ranked by round trip time. The pick is random within the fastest quartile so
//! that clients do not all pile onto the single fastest node.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::network::health::NodeHealthTracker;
use crate::network::PingResult;
use crate::types::StoreNode;

/// A reachable candidate with its measured latency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedNode {
    pub node: StoreNode,
    pub rtt: Duration,
}

/// Number of top-ranked nodes the pick is drawn from: `ceil((n - 1) / 4)`, at least 1.
pub fn pool_size(candidates: usize) -> usize {
    if candidates == 0 {
        return 0;
    }
    candidates.saturating_sub(1).div_ceil(4).max(1)
}

/// Rank reachable, eligible candidates by latency.
///
/// Equal latencies are ordered by backoff expiry, never-tried nodes first.
pub fn rank_candidates(
    candidates: &[StoreNode],
    pings: &[PingResult],
    health: &NodeHealthTracker,
    now: Instant,
) -> Vec<RankedNode> {
    let rtts: HashMap<&str, Duration> =
        pings.iter().filter_map(|p| p.rtt.map(|rtt| (p.address.as_str(), rtt))).collect();

    let mut ranked: Vec<RankedNode> = candidates
        .iter()
        .filter(|node| health.is_eligible(&node.id, now))
        .filter_map(|node| {
            rtts.get(node.address.as_str()).map(|rtt| RankedNode {
                node: node.clone(),
                rtt: *rtt,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.rtt.cmp(&b.rtt).then_with(|| {
            health.can_connect_after(&a.node.id).cmp(&health.can_connect_after(&b.node.id))
        })
    });
    ranked
}

/// Pick uniformly within the fastest pool.
pub fn choose<R: Rng + ?Sized>(ranked: &[RankedNode], rng: &mut R) -> Option<StoreNode> {
    let pool = pool_size(ranked.len());
    if pool == 0 {
        return None;
    }
    Some(ranked[rng.gen_range(0..pool)].node.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::constants::{DEFAULT_BACKOFF, GRAYLIST_BACKOFF, MAX_FAILED_REQUESTS};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn node(i: usize) -> StoreNode {
        StoreNode::new(
            format!("node-{:02}", i),
            format!("/ip4/10.0.0.{}/tcp/30303", i),
            "test.fleet",
            2,
        )
    }

    fn tracker() -> NodeHealthTracker {
        NodeHealthTracker::new(MAX_FAILED_REQUESTS, GRAYLIST_BACKOFF, DEFAULT_BACKOFF)
    }

    fn pings(nodes: &[StoreNode], millis: &[Option<u64>]) -> Vec<PingResult> {
        nodes
            .iter()
            .zip(millis)
            .map(|(n, ms)| match ms {
                Some(ms) => PingResult::reachable(&n.address, Duration::from_millis(*ms)),
                None => PingResult::failed(&n.address, "connection refused"),
            })
            .collect()
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(pool_size(0), 0);
        assert_eq!(pool_size(1), 1);
        assert_eq!(pool_size(2), 1);
        assert_eq!(pool_size(4), 1);
        assert_eq!(pool_size(5), 1);
        assert_eq!(pool_size(6), 2);
        assert_eq!(pool_size(9), 2);
        assert_eq!(pool_size(10), 3);
    }

    #[test]
    fn test_fastest_node_wins_with_single_pool() {
        let nodes: Vec<_> = (1..=5).map(node).collect();
        let results = pings(&nodes, &[Some(10), Some(20), Some(30), None, Some(40)]);
        let ranked = rank_candidates(&nodes, &results, &tracker(), Instant::now());

        assert_eq!(ranked.len(), 4);
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(choose(&ranked, &mut rng), Some(nodes[0].clone()));
        }
    }

    #[test]
    fn test_backed_off_nodes_are_excluded() {
        let nodes: Vec<_> = (1..=3).map(node).collect();
        let results = pings(&nodes, &[Some(5), Some(50), Some(60)]);
        let mut health = tracker();
        let now = Instant::now();
        health.penalize(&nodes[0].id, now);

        let ranked = rank_candidates(&nodes, &results, &health, now);
        assert!(ranked.iter().all(|r| r.node.id != nodes[0].id));
        assert_eq!(ranked[0].node, nodes[1]);

        let later = rank_candidates(&nodes, &results, &health, now + GRAYLIST_BACKOFF);
        assert_eq!(later[0].node, nodes[0]);
    }

    #[test]
    fn test_equal_latency_prefers_never_tried() {
        let nodes: Vec<_> = (1..=2).map(node).collect();
        let results = pings(&nodes, &[Some(20), Some(20)]);
        let mut health = tracker();
        let now = Instant::now();
        health.mark_disconnected(&nodes[0].id, now, Duration::ZERO);

        let ranked = rank_candidates(&nodes, &results, &health, now);
        assert_eq!(ranked[0].node, nodes[1]);
    }

    #[test]
    fn test_nothing_reachable() {
        let nodes: Vec<_> = (1..=3).map(node).collect();
        let results = pings(&nodes, &[None, None, None]);
        let ranked = rank_candidates(&nodes, &results, &tracker(), Instant::now());
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(choose(&ranked, &mut rng), None);
    }
}
