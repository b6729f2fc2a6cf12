//! Unit tests for the store node health tracker

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    fn tracker() -> NodeHealthTracker {
        NodeHealthTracker::new(2, Duration::from_secs(180), Duration::from_secs(10))
    }

    #[test]
    fn test_unknown_node_is_eligible_and_disconnected() {
        let tracker = tracker();
        let now = Instant::now();
        assert!(tracker.is_eligible("node-a", now));
        assert_eq!(tracker.connection_status("node-a"), ConnectionStatus::Disconnected);
        assert_eq!(tracker.failed_requests("node-a"), 0);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_connection_lifecycle() {
        let mut tracker = tracker();
        let now = Instant::now();

        tracker.mark_connecting("node-a", now);
        assert_eq!(tracker.connection_status("node-a"), ConnectionStatus::Connecting);

        tracker.mark_connected("node-a", now);
        let status = tracker.status("node-a").unwrap();
        assert_eq!(status.status, ConnectionStatus::Connected);
        assert_eq!(status.can_connect_after, Some(now + Duration::from_secs(10)));
        assert!(!tracker.is_eligible("node-a", now));
        assert!(tracker.is_eligible("node-a", now + Duration::from_secs(10)));
    }

    #[test]
    fn test_failure_threshold() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.mark_connected("node-a", now);

        assert!(!tracker.record_failure("node-a"));
        assert_eq!(tracker.failed_requests("node-a"), 1);
        assert!(tracker.record_failure("node-a"));
        assert_eq!(tracker.failed_requests("node-a"), 2);
    }

    #[test]
    fn test_success_resets_failures() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.mark_connected("node-a", now);

        tracker.record_failure("node-a");
        tracker.record_success("node-a");
        assert_eq!(tracker.failed_requests("node-a"), 0);
        assert!(!tracker.record_failure("node-a"));
    }

    #[test]
    fn test_penalize_graylists_for_backoff_window() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.mark_connected("node-a", now);
        tracker.record_failure("node-a");
        tracker.record_failure("node-a");

        tracker.penalize("node-a", now);

        let status = tracker.status("node-a").unwrap();
        assert_eq!(status.status, ConnectionStatus::Disconnected);
        assert_eq!(status.failed_requests, 0);
        assert!(!tracker.is_eligible("node-a", now + Duration::from_secs(179)));
        assert!(tracker.is_eligible("node-a", now + Duration::from_secs(180)));
        assert_eq!(
            status.backoff_remaining(now + Duration::from_secs(60)),
            Some(Duration::from_secs(120))
        );
        assert_eq!(status.backoff_remaining(now + Duration::from_secs(200)), None);
    }
}
