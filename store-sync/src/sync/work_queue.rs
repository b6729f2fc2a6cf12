//! Work queue for cursor-paginated fetches.
//!
//! Tracks three things for one batch:
//! - Originals that the producer has not released yet
//! - Released items waiting for a consumer
//! - An outstanding counter covering originals, follow-ups and in-flight items
//!
//! The batch is complete exactly when the outstanding counter drops to zero.

use std::collections::VecDeque;

#[derive(Debug)]
pub(crate) struct WorkQueue<T> {
    /// Originals the producer has not released yet.
    unreleased: VecDeque<T>,
    /// Items ready for a consumer.
    pending: VecDeque<T>,
    /// Items handed to a consumer and not completed.
    in_flight: usize,
    /// Unreleased + pending + in flight.
    outstanding: usize,
    /// Items completed so far.
    completed: usize,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            unreleased: VecDeque::new(),
            pending: VecDeque::new(),
            in_flight: 0,
            outstanding: 0,
            completed: 0,
        }
    }

    /// Stage original items. They become available one at a time through `release_next`.
    pub(crate) fn stage(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.unreleased.push_back(item);
            self.outstanding += 1;
        }
    }

    /// Move the next staged original to the pending queue.
    ///
    /// Returns false when nothing was left to release.
    pub(crate) fn release_next(&mut self) -> bool {
        match self.unreleased.pop_front() {
            Some(item) => {
                self.pending.push_back(item);
                true
            }
            None => false,
        }
    }

    pub(crate) fn has_unreleased(&self) -> bool {
        !self.unreleased.is_empty()
    }

    /// Take the next pending item, marking it in flight.
    pub(crate) fn take_next(&mut self) -> Option<T> {
        let item = self.pending.pop_front()?;
        self.in_flight += 1;
        Some(item)
    }

    /// Complete an in-flight item, queueing its follow-up (if any) before the
    /// counter is decremented so the batch cannot look finished in between.
    pub(crate) fn complete(&mut self, follow_up: Option<T>) {
        if let Some(item) = follow_up {
            self.pending.push_back(item);
            self.outstanding += 1;
        }

        self.in_flight = self.in_flight.saturating_sub(1);
        self.outstanding = self.outstanding.saturating_sub(1);
        self.completed += 1;
    }

    /// Drop everything not yet in flight. Returns the number of items dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.unreleased.len() + self.pending.len();
        self.unreleased.clear();
        self.pending.clear();
        self.outstanding = self.in_flight;
        dropped
    }

    /// True once every original and every follow-up has completed.
    pub(crate) fn is_done(&self) -> bool {
        self.outstanding() == 0
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.in_flight
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_queue_is_done() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        assert!(queue.is_done());
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.active_count(), 0);
    }

    #[test]
    fn test_staged_items_count_as_outstanding() {
        let mut queue = WorkQueue::new();
        queue.stage([1, 2, 3]);

        assert!(!queue.is_done());
        assert_eq!(queue.outstanding(), 3);
        assert_eq!(queue.pending_count(), 0);
        assert!(queue.take_next().is_none());
    }

    #[test]
    fn test_release_in_order() {
        let mut queue = WorkQueue::new();
        queue.stage([1, 2]);

        assert!(queue.release_next());
        assert_eq!(queue.take_next(), Some(1));
        assert!(queue.release_next());
        assert!(!queue.release_next());
        assert!(!queue.has_unreleased());
        assert_eq!(queue.take_next(), Some(2));
        assert_eq!(queue.active_count(), 2);
    }

    #[test]
    fn test_follow_up_keeps_queue_open() {
        let mut queue = WorkQueue::new();
        queue.stage(["page-1"]);
        queue.release_next();

        let _ = queue.take_next();
        queue.complete(Some("page-2"));
        assert!(!queue.is_done());
        assert_eq!(queue.outstanding(), 1);

        assert_eq!(queue.take_next(), Some("page-2"));
        queue.complete(None);
        assert!(queue.is_done());
        assert_eq!(queue.completed(), 2);
    }

    #[test]
    fn test_clear_keeps_in_flight_outstanding() {
        let mut queue = WorkQueue::new();
        queue.stage([1, 2, 3]);
        queue.release_next();
        queue.release_next();
        let _ = queue.take_next();

        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.outstanding(), 1);
        queue.complete(None);
        assert!(queue.is_done());
    }
}
