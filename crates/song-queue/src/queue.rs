//! Bounded, deduplicated request queue.
//!
//! Owns every queue mutation. All operations take the same mutex and never block on
//! I/O, so they are safe to call from ingress handlers, fetch workers and the advancer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::QueueError;
use crate::request::{MediaAsset, QueueEntry, RequestState, SongRequest};

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<SongRequest>,
}

impl QueueState {
    fn index_of(&self, url: &str) -> Option<usize> {
        self.items.iter().position(|r| r.url() == url)
    }
}

/// Shared handle to the request queue. Cloning yields another handle to the same queue.
#[derive(Clone, Debug)]
pub struct RequestQueue {
    inner: Arc<Mutex<QueueState>>,
    capacity: usize,
}

impl RequestQueue {
    /// Create an empty queue holding at most `capacity` requests.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueState::default())),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Append a new pending request and return its 1-based position.
    ///
    /// A full queue is reported before a duplicate; the duplicate check ignores state.
    pub fn add(&self, url: &str, requester: &str) -> Result<usize, QueueError> {
        let mut queue = self.lock();
        if queue.items.len() >= self.capacity {
            return Err(QueueError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        if queue.index_of(url).is_some() {
            return Err(QueueError::DuplicateRequest {
                url: url.to_string(),
            });
        }
        queue
            .items
            .push_back(SongRequest::new(url.to_string(), requester.to_string()));
        Ok(queue.items.len())
    }

    /// Current 1-based position of `url`, if queued.
    pub fn position_of(&self, url: &str) -> Option<usize> {
        self.lock().index_of(url).map(|idx| idx + 1)
    }

    /// Record that the fetch for `url` has started. Returns false if the request is gone.
    pub fn mark_fetching(&self, url: &str) -> bool {
        let mut queue = self.lock();
        let Some(idx) = queue.index_of(url) else {
            return false;
        };
        let request = &mut queue.items[idx];
        if request.state() == RequestState::Pending {
            request.set_state(RequestState::Fetching);
        }
        true
    }

    /// Attach a downloaded asset and mark the request ready.
    ///
    /// Returns the asset back when no fetching request claims it, so the caller can
    /// release it.
    pub fn mark_ready(&self, url: &str, asset: MediaAsset) -> Option<MediaAsset> {
        let mut queue = self.lock();
        match queue.index_of(url) {
            Some(idx) if queue.items[idx].state().is_awaiting_fetch() => {
                queue.items[idx].attach_asset(asset);
                None
            }
            _ => Some(asset),
        }
    }

    /// Drop a request whose fetch failed. No-op if the request is gone or already ready.
    pub fn remove_failed(&self, url: &str) -> Option<SongRequest> {
        let mut queue = self.lock();
        let idx = queue.index_of(url)?;
        if !queue.items[idx].state().is_awaiting_fetch() {
            return None;
        }
        let mut request = queue.items.remove(idx)?;
        request.set_state(RequestState::Failed);
        Some(request)
    }

    /// Remove and return the first ready request, marked as playing.
    ///
    /// Requests still fetching are skipped rather than waited on, so a fast fetch can
    /// overtake a slow one queued ahead of it.
    pub fn take_next_ready(&self) -> Option<SongRequest> {
        let mut queue = self.lock();
        let idx = queue
            .items
            .iter()
            .position(|r| r.state() == RequestState::Ready)?;
        let mut request = queue.items.remove(idx)?;
        request.set_state(RequestState::Playing);
        Some(request)
    }

    /// Snapshot of the queue in play order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.lock()
            .items
            .iter()
            .enumerate()
            .map(|(idx, r)| r.entry(idx + 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> MediaAsset {
        MediaAsset::new(format!("/nonexistent/song-queue/{name}.mp3"))
    }

    #[test]
    fn add_returns_positions_and_rejects_over_capacity() {
        let queue = RequestQueue::new(2);
        assert_eq!(queue.add("A", "alice"), Ok(1));
        assert_eq!(queue.add("B", "bob"), Ok(2));
        assert_eq!(
            queue.add("C", "carol"),
            Err(QueueError::CapacityExceeded { capacity: 2 })
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn add_rejects_duplicate_url() {
        let queue = RequestQueue::new(10);
        queue.add("A", "alice").unwrap();
        assert_eq!(
            queue.add("A", "bob"),
            Err(QueueError::DuplicateRequest { url: "A".into() })
        );
    }

    #[test]
    fn duplicate_check_ignores_state() {
        let queue = RequestQueue::new(10);
        queue.add("A", "alice").unwrap();
        queue.mark_fetching("A");
        assert!(queue.mark_ready("A", asset("a")).is_none());
        assert!(matches!(
            queue.add("A", "bob"),
            Err(QueueError::DuplicateRequest { .. })
        ));
    }

    #[test]
    fn full_queue_reported_before_duplicate() {
        let queue = RequestQueue::new(1);
        queue.add("A", "alice").unwrap();
        assert!(matches!(
            queue.add("A", "alice"),
            Err(QueueError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn capacity_never_exceeded_over_many_adds() {
        let queue = RequestQueue::new(5);
        for i in 0..20 {
            let _ = queue.add(&format!("url-{}", i % 8), "user");
            assert!(queue.len() <= queue.capacity());
        }
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn take_next_ready_returns_none_while_fetching() {
        let queue = RequestQueue::new(10);
        queue.add("A", "alice").unwrap();
        queue.add("B", "bob").unwrap();
        queue.mark_fetching("A");
        assert!(queue.take_next_ready().is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn take_next_ready_skips_slow_fetch_ahead() {
        let queue = RequestQueue::new(10);
        queue.add("A", "alice").unwrap();
        queue.add("B", "bob").unwrap();
        queue.mark_fetching("A");
        queue.mark_fetching("B");
        assert!(queue.mark_ready("B", asset("b")).is_none());

        let next = queue.take_next_ready().expect("ready request");
        assert_eq!(next.url(), "B");
        assert_eq!(next.state(), RequestState::Playing);
        assert!(next.asset().is_some());
        assert_eq!(queue.position_of("A"), Some(1));
        assert_eq!(queue.position_of("B"), None);
    }

    #[test]
    fn take_next_ready_is_fifo_among_ready() {
        let queue = RequestQueue::new(10);
        for url in ["A", "B", "C"] {
            queue.add(url, "user").unwrap();
        }
        queue.mark_ready("C", asset("c"));
        queue.mark_ready("A", asset("a"));
        assert_eq!(queue.take_next_ready().unwrap().url(), "A");
        assert_eq!(queue.take_next_ready().unwrap().url(), "C");
        assert!(queue.take_next_ready().is_none());
    }

    #[test]
    fn remove_failed_drops_request_and_positions_shift() {
        let queue = RequestQueue::new(10);
        queue.add("A", "alice").unwrap();
        queue.add("B", "bob").unwrap();
        queue.mark_fetching("A");

        let failed = queue.remove_failed("A").expect("removed");
        assert_eq!(failed.state(), RequestState::Failed);
        assert_eq!(queue.position_of("A"), None);
        assert_eq!(queue.position_of("B"), Some(1));
        assert!(queue.take_next_ready().is_none());
    }

    #[test]
    fn transitions_for_missing_request_are_noops() {
        let queue = RequestQueue::new(10);
        assert!(!queue.mark_fetching("gone"));
        assert!(queue.remove_failed("gone").is_none());
        let returned = queue.mark_ready("gone", asset("gone")).expect("asset handed back");
        assert!(returned.path().ends_with("gone.mp3"));
        assert!(queue.is_empty());
    }

    #[test]
    fn remove_failed_leaves_ready_request_alone() {
        let queue = RequestQueue::new(10);
        queue.add("A", "alice").unwrap();
        queue.mark_ready("A", asset("a"));
        assert!(queue.remove_failed("A").is_none());
        assert_eq!(queue.position_of("A"), Some(1));
    }

    #[test]
    fn url_can_be_requested_again_once_dequeued() {
        let queue = RequestQueue::new(10);
        queue.add("A", "alice").unwrap();
        queue.mark_ready("A", asset("a"));
        let _playing = queue.take_next_ready().unwrap();
        assert_eq!(queue.add("A", "bob"), Ok(1));
    }

    #[test]
    fn snapshot_reports_positions_and_states() {
        let queue = RequestQueue::new(10);
        queue.add("A", "alice").unwrap();
        queue.add("B", "bob").unwrap();
        queue.mark_fetching("A");
        queue.mark_ready("B", asset("b"));

        let entries = queue.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].position, 1);
        assert_eq!(entries[0].state, RequestState::Fetching);
        assert_eq!(entries[1].requester, "bob");
        assert_eq!(entries[1].state, RequestState::Ready);
    }

    #[test]
    fn concurrent_adds_respect_capacity_and_uniqueness() {
        let queue = RequestQueue::new(16);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let _ = queue.add(&format!("url-{}", (t + i) % 12), "user");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let entries = queue.snapshot();
        assert_eq!(entries.len(), 12);
        let mut urls: Vec<_> = entries.iter().map(|e| e.url.clone()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 12);
    }
}
