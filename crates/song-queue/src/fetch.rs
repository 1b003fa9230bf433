//! Background media fetching for accepted requests.
//!
//! Every accepted request gets its own worker thread. Workers report back through the
//! queue's transition methods, which tolerate requests that disappeared meanwhile.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::QueueConfig;
use crate::error::{FetchError, QueueError};
use crate::queue::RequestQueue;
use crate::request::MediaAsset;

/// Turns a requested URL into a playable local asset.
///
/// Implementations are called from many worker threads at once.
pub trait MediaFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<MediaAsset, FetchError>;
}

/// Launches and tracks one fetch per accepted request.
#[derive(Clone)]
pub struct FetchOrchestrator {
    queue: RequestQueue,
    fetcher: Arc<dyn MediaFetcher>,
    attempts: u32,
    retry_backoff: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl FetchOrchestrator {
    pub fn new(queue: RequestQueue, fetcher: Arc<dyn MediaFetcher>, config: &QueueConfig) -> Self {
        Self {
            queue,
            fetcher,
            attempts: config.fetch_attempts.max(1),
            retry_backoff: config.fetch_retry_backoff,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Number of fetch workers still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Admit a request and start fetching its media in the background.
    ///
    /// Returns the 1-based queue position; never waits for the fetch.
    pub fn enqueue(&self, url: &str, requester: &str) -> Result<usize, QueueError> {
        let position = self.queue.add(url, requester)?;
        tracing::info!(url, requester, position, "song request accepted");
        self.launch(url.to_string());
        Ok(position)
    }

    fn launch(&self, url: String) {
        self.queue.mark_fetching(&url);
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let worker = FetchWorker {
            queue: self.queue.clone(),
            fetcher: self.fetcher.clone(),
            attempts: self.attempts,
            retry_backoff: self.retry_backoff,
            in_flight: self.in_flight.clone(),
            url: url.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name("song-fetch".to_string())
            .spawn(move || worker.run());
        if let Err(e) = spawned {
            // Dropping the unspawned closure already decremented `in_flight`.
            tracing::warn!(url = %url, error = %e, "failed to spawn fetch worker");
            self.queue.remove_failed(&url);
        }
    }
}

struct FetchWorker {
    queue: RequestQueue,
    fetcher: Arc<dyn MediaFetcher>,
    attempts: u32,
    retry_backoff: Duration,
    in_flight: Arc<AtomicUsize>,
    url: String,
}

impl Drop for FetchWorker {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FetchWorker {
    fn run(self) {
        let mut attempt = 1;
        let result = loop {
            match self.fetch_once() {
                Ok(asset) => break Ok(asset),
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(
                        url = %self.url,
                        attempt,
                        error = %e,
                        "fetch attempt failed; retrying"
                    );
                    std::thread::sleep(self.retry_backoff * attempt);
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(asset) => {
                let path = asset.path().to_path_buf();
                match self.queue.mark_ready(&self.url, asset) {
                    None => tracing::info!(url = %self.url, path = ?path, "downloaded audio"),
                    Some(orphan) => {
                        tracing::info!(url = %self.url, "request gone before fetch completed; discarding asset");
                        if let Err(e) = orphan.release() {
                            tracing::warn!(path = ?e.path, error = %e.source, "failed to discard orphaned asset");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "failed to download audio");
                self.queue.remove_failed(&self.url);
            }
        }
    }

    fn fetch_once(&self) -> Result<MediaAsset, FetchError> {
        match catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch(&self.url))) {
            Ok(result) => result,
            Err(_) => Err(FetchError::Failed("fetcher panicked".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    use crossbeam_channel::{Receiver, Sender};

    use crate::request::RequestState;

    /// Fetcher whose per-URL outcome is released by the test through a channel.
    struct GatedFetcher {
        gates: Mutex<HashMap<String, Receiver<bool>>>,
    }

    impl GatedFetcher {
        fn new() -> Self {
            Self {
                gates: Mutex::new(HashMap::new()),
            }
        }

        fn gate(&self, url: &str) -> Sender<bool> {
            let (tx, rx) = crossbeam_channel::bounded(1);
            self.gates.lock().unwrap().insert(url.to_string(), rx);
            tx
        }
    }

    impl MediaFetcher for GatedFetcher {
        fn fetch(&self, url: &str) -> Result<MediaAsset, FetchError> {
            let rx = self.gates.lock().unwrap().get(url).cloned();
            let ok = rx.map(|rx| rx.recv().unwrap_or(false)).unwrap_or(true);
            if ok {
                Ok(MediaAsset::new(format!("/nonexistent/song-queue/{url}.mp3")))
            } else {
                Err(FetchError::NoAsset)
            }
        }
    }

    struct PanickingFetcher;

    impl MediaFetcher for PanickingFetcher {
        fn fetch(&self, _url: &str) -> Result<MediaAsset, FetchError> {
            panic!("boom");
        }
    }

    struct FlakyFetcher {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl MediaFetcher for FlakyFetcher {
        fn fetch(&self, url: &str) -> Result<MediaAsset, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(FetchError::Failed("transient".to_string()))
            } else {
                Ok(MediaAsset::new(format!("/nonexistent/song-queue/{url}.mp3")))
            }
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn orchestrator(fetcher: Arc<dyn MediaFetcher>, config: QueueConfig) -> FetchOrchestrator {
        let queue = RequestQueue::new(config.capacity);
        FetchOrchestrator::new(queue, fetcher, &config)
    }

    #[test]
    fn enqueue_marks_fetching_without_waiting() {
        let fetcher = Arc::new(GatedFetcher::new());
        let gate = fetcher.gate("A");
        let orch = orchestrator(fetcher, QueueConfig::default());

        assert_eq!(orch.enqueue("A", "alice"), Ok(1));
        assert_eq!(orch.queue().snapshot()[0].state, RequestState::Fetching);
        assert_eq!(orch.in_flight(), 1);

        gate.send(true).unwrap();
        wait_until(|| orch.in_flight() == 0);
        assert_eq!(orch.queue().snapshot()[0].state, RequestState::Ready);
    }

    #[test]
    fn fast_fetch_plays_before_slow_fetch() {
        let fetcher = Arc::new(GatedFetcher::new());
        let gate_a = fetcher.gate("A");
        let gate_b = fetcher.gate("B");
        let orch = orchestrator(fetcher, QueueConfig::default());

        orch.enqueue("A", "alice").unwrap();
        orch.enqueue("B", "bob").unwrap();
        gate_b.send(true).unwrap();
        wait_until(|| orch.in_flight() == 1);

        let first = orch.queue().take_next_ready().expect("B ready");
        assert_eq!(first.url(), "B");

        gate_a.send(true).unwrap();
        wait_until(|| orch.in_flight() == 0);
        assert_eq!(orch.queue().take_next_ready().unwrap().url(), "A");
    }

    #[test]
    fn failed_fetch_removes_request() {
        let fetcher = Arc::new(GatedFetcher::new());
        let gate = fetcher.gate("A");
        let orch = orchestrator(fetcher, QueueConfig::default());

        orch.enqueue("A", "alice").unwrap();
        gate.send(false).unwrap();
        wait_until(|| orch.in_flight() == 0);

        assert_eq!(orch.queue().position_of("A"), None);
        assert!(orch.queue().take_next_ready().is_none());
    }

    #[test]
    fn duplicate_enqueue_does_not_launch_second_fetch() {
        let fetcher = Arc::new(GatedFetcher::new());
        let gate = fetcher.gate("A");
        let orch = orchestrator(fetcher, QueueConfig::default());

        orch.enqueue("A", "alice").unwrap();
        assert!(matches!(
            orch.enqueue("A", "bob"),
            Err(QueueError::DuplicateRequest { .. })
        ));
        assert_eq!(orch.in_flight(), 1);
        gate.send(true).unwrap();
        wait_until(|| orch.in_flight() == 0);
    }

    #[test]
    fn panicking_fetcher_counts_as_failure() {
        let orch = orchestrator(Arc::new(PanickingFetcher), QueueConfig::default());
        orch.enqueue("A", "alice").unwrap();
        wait_until(|| orch.in_flight() == 0);
        assert!(orch.queue().is_empty());
    }

    #[test]
    fn retries_until_success_when_configured() {
        let fetcher = Arc::new(FlakyFetcher {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let config = QueueConfig {
            fetch_attempts: 3,
            fetch_retry_backoff: Duration::from_millis(1),
            ..QueueConfig::default()
        };
        let orch = orchestrator(fetcher.clone(), config);

        orch.enqueue("A", "alice").unwrap();
        wait_until(|| orch.in_flight() == 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(orch.queue().snapshot()[0].state, RequestState::Ready);
    }

    #[test]
    fn single_attempt_by_default() {
        let fetcher = Arc::new(FlakyFetcher {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        let orch = orchestrator(fetcher.clone(), QueueConfig::default());

        orch.enqueue("A", "alice").unwrap();
        wait_until(|| orch.in_flight() == 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(orch.queue().is_empty());
    }
}
