//! Playback advancement loop.
//!
//! A single worker thread owns the "now playing" slot: when the slot is empty it takes
//! the next ready request from the queue, holds the slot for the configured duration,
//! then retires the request and releases its asset.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::QueueConfig;
use crate::queue::RequestQueue;
use crate::request::SongRequest;

/// Snapshot of the request currently holding the playback slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub url: String,
    pub requester: String,
    pub asset_path: Option<PathBuf>,
    pub started_at: Instant,
}

#[derive(Debug, Default)]
struct SlotState {
    current: Option<NowPlaying>,
    /// Bumped on every occupy; identifies one hold.
    hold: u64,
}

/// The single system-wide "currently playing" position.
#[derive(Clone, Debug, Default)]
pub struct PlaybackSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl PlaybackSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<NowPlaying> {
        self.lock().current.clone()
    }

    pub fn is_occupied(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Id of the hold in progress, if any.
    fn current_hold(&self) -> Option<u64> {
        let state = self.lock();
        state.current.as_ref().map(|_| state.hold)
    }

    fn occupy(&self, now_playing: NowPlaying) -> u64 {
        let mut state = self.lock();
        state.hold += 1;
        state.current = Some(now_playing);
        state.hold
    }

    fn clear(&self) {
        self.lock().current.take();
    }
}

/// Commands accepted by the advancer thread. Dropping the sender stops the thread.
#[derive(Debug)]
enum AdvancerCommand {
    /// End hold `hold` early, as if playback finished. Ignored once that hold is over.
    Skip { hold: u64 },
}

struct AdvancerWorker {
    cmd_tx: Sender<AdvancerCommand>,
    join: JoinHandle<()>,
}

/// Drives requests through the playback slot on a background thread.
pub struct PlaybackAdvancer {
    queue: RequestQueue,
    slot: PlaybackSlot,
    poll_interval: Duration,
    play_duration: Duration,
    worker: Mutex<Option<AdvancerWorker>>,
}

impl PlaybackAdvancer {
    pub fn new(queue: RequestQueue, config: &QueueConfig) -> Self {
        Self {
            queue,
            slot: PlaybackSlot::default(),
            poll_interval: config.poll_interval,
            play_duration: config.play_duration,
            worker: Mutex::new(None),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<AdvancerWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn slot(&self) -> &PlaybackSlot {
        &self.slot
    }

    /// True while the advancer thread is alive.
    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|worker| !worker.join.is_finished())
    }

    /// Spawn the advancer thread. Calling this while already running does nothing; a
    /// thread that died is reaped and replaced.
    pub fn start(&self) -> std::io::Result<()> {
        let mut worker = self.lock_worker();
        match worker.take() {
            Some(alive) if !alive.join.is_finished() => {
                tracing::debug!("playback advancer already running");
                *worker = Some(alive);
                return Ok(());
            }
            Some(dead) => {
                if dead.join.join().is_err() {
                    tracing::warn!("playback advancer thread had panicked; restarting");
                }
            }
            None => {}
        }

        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let queue = self.queue.clone();
        let slot = self.slot.clone();
        let poll_interval = self.poll_interval;
        let play_duration = self.play_duration;
        let join = std::thread::Builder::new()
            .name("playback-advancer".to_string())
            .spawn(move || advancer_main(queue, slot, poll_interval, play_duration, cmd_rx))?;
        *worker = Some(AdvancerWorker { cmd_tx, join });
        tracing::info!(
            poll_interval_ms = poll_interval.as_millis() as u64,
            play_duration_ms = play_duration.as_millis() as u64,
            "playback advancer started"
        );
        Ok(())
    }

    /// Stop the advancer thread and wait for it to exit.
    ///
    /// A request still holding the slot is retired first. Safe to call repeatedly.
    pub fn stop(&self) {
        let Some(worker) = self.lock_worker().take() else {
            return;
        };
        drop(worker.cmd_tx);
        if worker.join.join().is_err() {
            tracing::warn!("playback advancer thread panicked");
        }
        tracing::info!("playback advancer stopped");
    }

    /// End the current hold early. Returns false when the advancer is not running or
    /// nothing is playing.
    ///
    /// The skip targets the song playing right now; repeated skips never carry over to
    /// the song after it.
    pub fn skip(&self) -> bool {
        let guard = self.lock_worker();
        let (Some(worker), Some(hold)) = (guard.as_ref(), self.slot.current_hold()) else {
            return false;
        };
        worker.cmd_tx.send(AdvancerCommand::Skip { hold }).is_ok()
    }
}

impl Drop for PlaybackAdvancer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum HoldOutcome {
    Finished,
    Skipped,
    Stopped,
}

fn advancer_main(
    queue: RequestQueue,
    slot: PlaybackSlot,
    poll_interval: Duration,
    play_duration: Duration,
    cmd_rx: Receiver<AdvancerCommand>,
) {
    loop {
        if !slot.is_occupied() {
            if let Some(request) = queue.take_next_ready() {
                if hold_slot(&slot, request, play_duration, &cmd_rx) == HoldOutcome::Stopped {
                    break;
                }
            }
        }
        match cmd_rx.recv_timeout(poll_interval) {
            Ok(AdvancerCommand::Skip { .. }) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Occupy the slot with `request` for up to `play_duration`.
///
/// Retirement happens when the guard drops, on every return path.
fn hold_slot(
    slot: &PlaybackSlot,
    request: SongRequest,
    play_duration: Duration,
    cmd_rx: &Receiver<AdvancerCommand>,
) -> HoldOutcome {
    let retirement = Retirement::begin(slot, request);
    let deadline = Instant::now().checked_add(play_duration);
    loop {
        let received = match deadline {
            Some(deadline) => cmd_rx.recv_deadline(deadline),
            None => cmd_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Err(RecvTimeoutError::Timeout) => return HoldOutcome::Finished,
            Ok(AdvancerCommand::Skip { hold }) if hold == retirement.hold => {
                return HoldOutcome::Skipped;
            }
            Ok(AdvancerCommand::Skip { hold }) => {
                tracing::debug!(hold, current = retirement.hold, "ignoring stale skip");
            }
            Err(RecvTimeoutError::Disconnected) => return HoldOutcome::Stopped,
        }
    }
}

/// Slot occupancy guard: releases the asset and clears the slot when dropped.
struct Retirement<'a> {
    slot: &'a PlaybackSlot,
    request: SongRequest,
    hold: u64,
}

impl<'a> Retirement<'a> {
    fn begin(slot: &'a PlaybackSlot, request: SongRequest) -> Self {
        let hold = slot.occupy(NowPlaying {
            url: request.url().to_string(),
            requester: request.requester().to_string(),
            asset_path: request.asset().map(|a| a.path().to_path_buf()),
            started_at: Instant::now(),
        });
        tracing::info!(
            url = %request.url(),
            requester = %request.requester(),
            "now playing"
        );
        Self {
            slot,
            request,
            hold,
        }
    }
}

impl Drop for Retirement<'_> {
    fn drop(&mut self) {
        if let Some(asset) = self.request.take_asset() {
            if let Err(e) = asset.release() {
                tracing::warn!(path = ?e.path, error = %e.source, "error deleting audio file");
            }
        }
        self.slot.clear();
        tracing::info!(url = %self.request.url(), "finished playing");
    }
}
