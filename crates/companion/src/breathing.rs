//! Box-breathing timer.
//!
//! The exercise runs on a spawned tokio task that walks through the four
//! phases until stopped. Front ends watch the current phase through a
//! `tokio::sync::watch` receiver.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default length of each phase
pub const DEFAULT_PHASE_DURATION: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreathingPhase {
    Idle,
    Inhale,
    HoldFull,
    Exhale,
    HoldEmpty,
}

impl BreathingPhase {
    /// The running order of one breath
    pub const CYCLE: [BreathingPhase; 4] = [
        BreathingPhase::Inhale,
        BreathingPhase::HoldFull,
        BreathingPhase::Exhale,
        BreathingPhase::HoldEmpty,
    ];

    pub fn instruction(&self) -> &'static str {
        match self {
            BreathingPhase::Idle => "Tap Start",
            BreathingPhase::Inhale => "Inhale...",
            BreathingPhase::HoldFull | BreathingPhase::HoldEmpty => "Hold...",
            BreathingPhase::Exhale => "Exhale...",
        }
    }

    /// How long the phase lasts with the given per-phase duration
    pub fn duration(&self, phase_duration: Duration) -> Duration {
        match self {
            BreathingPhase::Idle => Duration::ZERO,
            _ => phase_duration,
        }
    }

    pub fn next(&self) -> BreathingPhase {
        match self {
            BreathingPhase::Idle | BreathingPhase::HoldEmpty => BreathingPhase::Inhale,
            BreathingPhase::Inhale => BreathingPhase::HoldFull,
            BreathingPhase::HoldFull => BreathingPhase::Exhale,
            BreathingPhase::Exhale => BreathingPhase::HoldEmpty,
        }
    }
}

/// Phase channel plus a run counter. A timer task may only publish while its
/// run is current, so a task that wakes as it is being aborted cannot
/// overwrite the `Idle` written by `stop`.
struct PhaseBoard {
    tx: watch::Sender<BreathingPhase>,
    run: AtomicU64,
}

impl PhaseBoard {
    fn current_run(&self) -> u64 {
        self.run.load(Ordering::SeqCst)
    }

    /// Publishes `phase` if `run` has not been retired. The check happens
    /// under the channel's write lock.
    fn publish(&self, run: u64, phase: BreathingPhase) -> bool {
        self.tx.send_if_modified(|current| {
            if self.run.load(Ordering::SeqCst) != run {
                return false;
            }
            *current = phase;
            true
        })
    }

    /// Retires the current run and shows `Idle`
    fn reset(&self) {
        self.run.fetch_add(1, Ordering::SeqCst);
        self.tx.send_replace(BreathingPhase::Idle);
    }
}

pub struct BreathingExercise {
    phase_duration: Duration,
    board: Arc<PhaseBoard>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for BreathingExercise {
    fn default() -> Self {
        Self::new(DEFAULT_PHASE_DURATION)
    }
}

impl BreathingExercise {
    pub fn new(phase_duration: Duration) -> Self {
        let (tx, _) = watch::channel(BreathingPhase::Idle);
        Self {
            phase_duration,
            board: Arc::new(PhaseBoard {
                tx,
                run: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BreathingPhase> {
        self.board.tx.subscribe()
    }

    pub fn current(&self) -> BreathingPhase {
        *self.board.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Starts cycling. Does nothing if already running. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let board = Arc::clone(&self.board);
        let run = board.current_run();
        let phase_duration = self.phase_duration;
        debug!("Breathing exercise started ({:?} per phase)", phase_duration);

        *task = Some(tokio::spawn(async move {
            let mut phase = BreathingPhase::Inhale;
            while board.publish(run, phase) {
                tokio::time::sleep(phase.duration(phase_duration)).await;
                phase = phase.next();
            }
        }));
    }

    /// Cancels the timer and resets to `Idle`
    pub fn stop(&self) {
        let handle = self.task.lock().take();
        self.board.reset();
        if let Some(handle) = handle {
            handle.abort();
            debug!("Breathing exercise stopped");
        }
    }

    /// Starts when idle, stops when running. Returns whether it is now running.
    pub fn toggle(&self) -> bool {
        if self.is_running() {
            self.stop();
            false
        } else {
            self.start();
            true
        }
    }
}

impl Drop for BreathingExercise {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
