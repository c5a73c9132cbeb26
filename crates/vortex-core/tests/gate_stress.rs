//! Stress tests for the tick thread and preview builder sharing one engine.
//!
//! The engine records whenever two parties are inside it at once. Previews
//! are rebuilt at random intervals while the tick thread runs unpaced.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use rand::Rng;
use vortex_core::clock::{ClockSource, EngineClock};
use vortex_core::engine::{Engine, EngineError, Rgb};
use vortex_core::gate::{GateHolder, LedShadow, PauseGate};
use vortex_core::preview::{PreviewBuilder, PreviewSettings};
use vortex_core::tick::{DEFAULT_JOIN_TIMEOUT, ShutdownOutcome, TickControl, TickEnd, TickThread};

#[derive(Default)]
struct Occupancy {
    inside: AtomicUsize,
    violations: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        if self.inside.fetch_add(1, Ordering::SeqCst) != 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        thread::yield_now();
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }
}

struct StressEngine {
    clock: EngineClock,
    leds: Vec<Rgb>,
    mode: u8,
    occupancy: Arc<Occupancy>,
}

impl StressEngine {
    fn new(occupancy: Arc<Occupancy>) -> Self {
        Self {
            clock: EngineClock::new(1_000),
            leds: vec![Rgb::default(); 4],
            mode: 1,
            occupancy,
        }
    }

    fn color(mode: u8, tick: u64) -> Rgb {
        let low = u8::try_from(tick & 0xff).unwrap();
        Rgb::new(mode, low, low.wrapping_mul(mode))
    }
}

impl ClockSource for StressEngine {
    fn clock(&self) -> &EngineClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut EngineClock {
        &mut self.clock
    }
}

impl Engine for StressEngine {
    type Mode = u8;

    fn tick(&mut self) -> Result<(), EngineError> {
        self.occupancy.enter();
        let tick = self.clock.advance()?;
        self.leds.fill(Self::color(self.mode, tick));
        Ok(())
    }

    fn leds(&self) -> &[Rgb] {
        &self.leds
    }

    fn leds_mut(&mut self) -> &mut [Rgb] {
        &mut self.leds
    }

    fn active_mode(&self) -> Option<&u8> {
        Some(&self.mode)
    }

    fn play_mode(&mut self, mode: &mut u8, led: usize) {
        self.occupancy.enter();
        let color = Self::color(*mode, self.clock.tick());
        if let Some(slot) = self.leds.get_mut(led) {
            *slot = color;
        }
    }
}

fn settings() -> PreviewSettings {
    PreviewSettings {
        width: 64,
        height: 2,
        sample_led: 2,
    }
}

#[test]
fn tick_thread_and_previews_never_overlap() {
    let occupancy = Arc::new(Occupancy::default());
    let gate = Arc::new(PauseGate::new(StressEngine::new(Arc::clone(&occupancy))));
    let shadow = Arc::new(LedShadow::new());
    let control = Arc::new(TickControl::new());
    let builder = PreviewBuilder::new(Arc::clone(&gate), settings());

    let ticker = TickThread::spawn(
        Arc::clone(&gate),
        Arc::clone(&shadow),
        Arc::clone(&control),
        true,
    )
    .unwrap();

    let mut rng = rand::rng();
    for round in 0..100u8 {
        thread::sleep(Duration::from_micros(rng.random_range(0..2_000)));
        if round % 10 == 0 {
            gate.lock(GateHolder::Snapshot).unwrap().mode = round.wrapping_add(1);
        }
        builder.rebuild().unwrap();
        // Ad hoc shadow reads never need the gate.
        let _ = shadow.get(0);
    }

    let ShutdownOutcome::Joined(summary) = ticker.stop(DEFAULT_JOIN_TIMEOUT) else {
        panic!("tick thread did not join");
    };
    assert_eq!(summary.end, TickEnd::Stopped);
    assert_eq!(occupancy.violations.load(Ordering::SeqCst), 0);

    // Previews ran ahead thousands of simulated ticks; none leaked into
    // real time.
    let engine = gate.lock(GateHolder::Snapshot).unwrap();
    assert_eq!(engine.clock().tick(), summary.ticks);
    assert!(!engine.clock().is_simulating());
}

#[test]
fn preview_is_deterministic_for_a_paused_engine() {
    let occupancy = Arc::new(Occupancy::default());
    let gate = Arc::new(PauseGate::new(StressEngine::new(occupancy)));
    {
        let mut engine = gate.lock(GateHolder::TickThread).unwrap();
        for _ in 0..37 {
            engine.tick().unwrap();
        }
    }
    let builder = PreviewBuilder::new(Arc::clone(&gate), settings());

    let first = builder.rebuild().unwrap().unwrap();
    let second = builder.rebuild().unwrap().unwrap();
    assert_eq!(first, second);
    for x in 0..64u64 {
        let column = usize::try_from(x).unwrap();
        assert_eq!(first.column(column), Some(StressEngine::color(1, 37 + x)));
    }
}

#[test]
fn snapshot_reports_pause_while_rendering() {
    let gate = Arc::new(PauseGate::new(StressEngine::new(Arc::default())));
    let ticker = TickThread::spawn(
        Arc::clone(&gate),
        Arc::new(LedShadow::new()),
        Arc::new(TickControl::new()),
        true,
    )
    .unwrap();

    let held = gate.lock(GateHolder::Snapshot).unwrap();
    assert_eq!(ticker.state(), vortex_core::tick::TickState::PausedForSnapshot);
    drop(held);

    assert!(matches!(
        ticker.stop(DEFAULT_JOIN_TIMEOUT),
        ShutdownOutcome::Joined(_)
    ));
}
