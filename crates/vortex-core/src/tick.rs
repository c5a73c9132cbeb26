//! Tick engine thread.
//!
//! One dedicated OS thread steps the engine for the life of the process.
//! Each iteration:
//!
//! 1. Check the stop flag
//! 2. Acquire the [`PauseGate`]
//! 3. Tick the engine and copy its LEDs into the [`LedShadow`]
//! 4. Apply a pending tickrate change
//! 5. Release the gate and sleep until the next tick deadline
//!
//! Shutdown is cooperative: the stop flag is checked once per iteration
//! and the owner waits a bounded time for the thread to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::gate::{GateHolder, LedShadow, PauseGate};

pub use crate::clock::MIN_TICKRATE;

/// Default bound on how long [`TickThread::stop`] waits.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

const NO_PENDING_TICKRATE: u32 = 0;

/// Errors that can occur when starting the tick thread.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The OS refused to create the thread.
    #[error("failed to spawn tick thread: {source}")]
    Spawn {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Control state shared between the tick thread and its owner.
///
/// Lock-free so the owner never contends with the tick loop.
#[derive(Debug)]
pub struct TickControl {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Tickrate to apply on the next tick (0 = none pending).
    requested_tickrate: AtomicU32,

    /// Real ticks completed since spawn.
    ticks: AtomicU64,
}

impl TickControl {
    /// Fresh control state: running, no pending tickrate change.
    pub const fn new() -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            requested_tickrate: AtomicU32::new(NO_PENDING_TICKRATE),
            ticks: AtomicU64::new(0),
        }
    }

    /// Ask the tick loop to exit after its current iteration.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Ask for a new tickrate. Applied under the gate on the next tick and
    /// clamped to [`MIN_TICKRATE`].
    pub fn request_tickrate(&self, tickrate: u32) {
        self.requested_tickrate
            .store(tickrate.max(MIN_TICKRATE), Ordering::Release);
    }

    fn take_requested_tickrate(&self) -> Option<u32> {
        match self
            .requested_tickrate
            .swap(NO_PENDING_TICKRATE, Ordering::AcqRel)
        {
            NO_PENDING_TICKRATE => None,
            rate => Some(rate),
        }
    }

    /// Real ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Default for TickControl {
    fn default() -> Self {
        Self::new()
    }
}

/// What the tick thread is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    /// Ticking normally.
    Running,
    /// Blocked on the gate while a preview is rendered.
    PausedForSnapshot,
    /// Stop requested; exiting after the current iteration.
    ShuttingDown,
}

/// Why the tick loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEnd {
    /// Stop was requested.
    Stopped,
    /// `Engine::tick` returned an error.
    EngineFailed,
    /// The gate was poisoned by a panicking holder.
    GatePoisoned,
}

/// Result of a finished tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Real ticks completed.
    pub ticks: u64,
    /// Why the loop ended.
    pub end: TickEnd,
}

/// Outcome of [`TickThread::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The thread exited within the timeout.
    Joined(TickSummary),
    /// The thread did not exit in time and was left detached.
    TimedOut,
    /// The thread panicked.
    Panicked,
}

/// Handle to the running tick thread.
#[derive(Debug)]
pub struct TickThread<E> {
    gate: Arc<PauseGate<E>>,
    control: Arc<TickControl>,
    handle: JoinHandle<TickSummary>,
    done: mpsc::Receiver<()>,
}

impl<E: Engine + 'static> TickThread<E> {
    /// Spawn the tick thread.
    ///
    /// With `instant` set the loop runs unpaced, as fast as the engine can
    /// tick.
    pub fn spawn(
        gate: Arc<PauseGate<E>>,
        shadow: Arc<LedShadow>,
        control: Arc<TickControl>,
        instant: bool,
    ) -> Result<Self, TickError> {
        let (done_tx, done) = mpsc::channel();

        let handle = {
            let gate = Arc::clone(&gate);
            let control = Arc::clone(&control);
            thread::Builder::new()
                .name("vortex-tick".to_owned())
                .spawn(move || {
                    let summary = run(&gate, &shadow, &control, instant);
                    // The owner may have given up waiting already.
                    let _ = done_tx.send(());
                    summary
                })
                .map_err(|source| TickError::Spawn { source })?
        };

        info!(instant, "Tick thread started");

        Ok(Self {
            gate,
            control,
            handle,
            done,
        })
    }

    /// Shared control state.
    pub fn control(&self) -> &Arc<TickControl> {
        &self.control
    }

    /// What the thread is doing right now.
    pub fn state(&self) -> TickState {
        if self.control.is_stop_requested() {
            TickState::ShuttingDown
        } else if self.gate.holder() == Some(GateHolder::Snapshot) {
            TickState::PausedForSnapshot
        } else {
            TickState::Running
        }
    }

    /// Whether the loop has already exited on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request a stop and wait up to `timeout` for the thread to exit.
    pub fn stop(self, timeout: Duration) -> ShutdownOutcome {
        self.control.request_stop();

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.handle.join() {
                Ok(summary) => {
                    info!(ticks = summary.ticks, end = ?summary.end, "Tick thread joined");
                    ShutdownOutcome::Joined(summary)
                }
                Err(_panic) => {
                    error!("Tick thread panicked");
                    ShutdownOutcome::Panicked
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis(),
                    "Tick thread did not stop in time, leaving it detached"
                );
                ShutdownOutcome::TimedOut
            }
        }
    }
}

fn run<E: Engine>(
    gate: &PauseGate<E>,
    shadow: &LedShadow,
    control: &TickControl,
    instant: bool,
) -> TickSummary {
    let mut next_tick = Instant::now();

    let end = loop {
        if control.is_stop_requested() {
            break TickEnd::Stopped;
        }

        let tick_duration = {
            let mut engine = match gate.lock(GateHolder::TickThread) {
                Ok(engine) => engine,
                Err(e) => {
                    error!(error = %e, "Tick thread cannot acquire the pause gate");
                    break TickEnd::GatePoisoned;
                }
            };

            if let Err(e) = engine.tick() {
                error!(error = %e, tick = engine.clock().tick(), "Engine tick failed");
                break TickEnd::EngineFailed;
            }
            shadow.copy_from(engine.leds());

            if let Some(requested) = control.take_requested_tickrate() {
                let applied = engine.set_tickrate(requested);
                info!(requested, applied, "Tickrate changed");
            }

            engine.clock().tick_duration()
        };

        control.ticks.fetch_add(1, Ordering::Relaxed);

        if instant {
            thread::yield_now();
        } else {
            pace(&mut next_tick, tick_duration);
        }
    };

    let ticks = control.ticks();
    debug!(ticks, ?end, "Tick loop exited");
    TickSummary { ticks, end }
}

/// Sleep until the next tick deadline.
///
/// When more than two ticks behind (a long preview render, a debugger
/// pause) the schedule restarts from now instead of bursting to catch up.
fn pace(next_tick: &mut Instant, tick_duration: Duration) {
    let now = Instant::now();
    let max_drift = tick_duration.saturating_mul(2);
    if next_tick
        .checked_add(max_drift)
        .is_some_and(|limit| now > limit)
    {
        *next_tick = now;
    }

    *next_tick = next_tick.checked_add(tick_duration).unwrap_or(now);
    let sleep = next_tick.saturating_duration_since(now);
    if !sleep.is_zero() {
        thread::sleep(sleep);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::ClockSource;
    use crate::test_engine::TestEngine;

    type Spawned = (
        TickThread<TestEngine>,
        Arc<PauseGate<TestEngine>>,
        Arc<LedShadow>,
    );

    fn spawn(engine: TestEngine, instant: bool) -> Spawned {
        let gate = Arc::new(PauseGate::new(engine));
        let shadow = Arc::new(LedShadow::new());
        let thread = TickThread::spawn(
            Arc::clone(&gate),
            Arc::clone(&shadow),
            Arc::new(TickControl::new()),
            instant,
        )
        .unwrap();
        (thread, gate, shadow)
    }

    fn wait_for_ticks(control: &TickControl, ticks: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while control.ticks() < ticks {
            assert!(Instant::now() < deadline, "tick thread stalled");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn stop_joins_with_summary() {
        let (thread, gate, shadow) = spawn(TestEngine::new(4), true);
        wait_for_ticks(thread.control(), 20);
        assert_eq!(thread.state(), TickState::Running);

        let ShutdownOutcome::Joined(summary) = thread.stop(DEFAULT_JOIN_TIMEOUT) else {
            panic!("tick thread did not join");
        };
        assert_eq!(summary.end, TickEnd::Stopped);
        assert!(summary.ticks >= 20);

        let engine = gate.lock(GateHolder::Snapshot).unwrap();
        assert_eq!(engine.clock().tick(), summary.ticks);
        assert_eq!(shadow.snapshot(), engine.leds());
    }

    #[test]
    fn paced_loop_follows_tickrate() {
        let (thread, _gate, _shadow) = spawn(TestEngine::with_tickrate(4, 100), false);
        thread::sleep(Duration::from_millis(300));
        let ShutdownOutcome::Joined(summary) = thread.stop(DEFAULT_JOIN_TIMEOUT) else {
            panic!("tick thread did not join");
        };
        // 100 ticks/s for ~300 ms; generous bounds for loaded CI machines.
        assert!(summary.ticks >= 10, "only {} ticks", summary.ticks);
        assert!(summary.ticks <= 60, "{} ticks", summary.ticks);
    }

    #[test]
    fn tickrate_request_is_clamped_and_applied() {
        let (thread, gate, _shadow) = spawn(TestEngine::new(1), true);
        thread.control().request_tickrate(3);
        let applied_at = thread.control().ticks();
        wait_for_ticks(thread.control(), applied_at + 5);

        let tickrate = gate.lock(GateHolder::Snapshot).unwrap().clock().tickrate();
        assert_eq!(tickrate, MIN_TICKRATE);
        thread.stop(DEFAULT_JOIN_TIMEOUT);
    }

    #[test]
    fn engine_failure_ends_the_loop() {
        let (thread, _gate, shadow) = spawn(TestEngine::new(1).fail_at(5), true);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !thread.is_finished() {
            assert!(Instant::now() < deadline, "tick thread kept running");
            thread::sleep(Duration::from_millis(1));
        }

        let ShutdownOutcome::Joined(summary) = thread.stop(DEFAULT_JOIN_TIMEOUT) else {
            panic!("tick thread did not join");
        };
        assert_eq!(summary.end, TickEnd::EngineFailed);
        assert_eq!(summary.ticks, 4);
        // The shadow keeps the last good frame.
        assert_eq!(shadow.snapshot(), TestEngine::frame_at(4, 1));
    }

    #[test]
    fn snapshot_holder_pauses_ticking() {
        let (thread, gate, _shadow) = spawn(TestEngine::new(1), true);
        wait_for_ticks(thread.control(), 1);

        {
            let _held = gate.lock(GateHolder::Snapshot).unwrap();
            assert_eq!(thread.state(), TickState::PausedForSnapshot);
            let frozen = thread.control().ticks();
            thread::sleep(Duration::from_millis(20));
            assert_eq!(thread.control().ticks(), frozen);
        }

        let resumed_from = thread.control().ticks();
        wait_for_ticks(thread.control(), resumed_from + 1);
        thread.stop(DEFAULT_JOIN_TIMEOUT);
    }

    #[test]
    fn stalled_thread_times_out() {
        let entered = Arc::new(AtomicBool::new(false));
        let engine = TestEngine::new(1).stall_at(2, Duration::from_millis(500), Arc::clone(&entered));
        let (thread, gate, _shadow) = spawn(engine, true);
        while !entered.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }

        // Stuck inside tick 2, past the stop check.
        assert_eq!(
            thread.stop(Duration::from_millis(50)),
            ShutdownOutcome::TimedOut
        );

        // The detached thread still finishes its tick and exits.
        let engine = gate.lock(GateHolder::Snapshot).unwrap();
        assert_eq!(engine.clock().real_tick(), 2);
    }

    #[test]
    fn pace_resets_after_long_stall() {
        let tick = Duration::from_millis(10);
        let mut next = Instant::now().checked_sub(Duration::from_secs(1)).unwrap();
        let before = Instant::now();
        pace(&mut next, tick);
        // Rescheduled from now, so no catch-up burst of 100 ticks.
        assert!(next >= before + tick);
    }
}
