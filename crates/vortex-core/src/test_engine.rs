//! Deterministic engine for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::clock::{ClockError, ClockSource, EngineClock};
use crate::engine::{Engine, EngineError, Rgb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TestMode {
    Solid(Rgb),
    Ramp { step: u8 },
}

impl TestMode {
    pub(crate) fn color_at(self, tick: u64) -> Rgb {
        match self {
            Self::Solid(color) => color,
            Self::Ramp { step } => Rgb::new(
                low_byte(tick.wrapping_mul(u64::from(step))),
                low_byte(tick),
                step,
            ),
        }
    }
}

fn low_byte(value: u64) -> u8 {
    u8::try_from(value & 0xff).unwrap_or_default()
}

#[derive(Debug)]
pub(crate) struct TestEngine {
    clock: EngineClock,
    leds: Vec<Rgb>,
    mode: Option<TestMode>,
    fail_at: Option<u64>,
    stall: Option<Stall>,
}

/// A tick that blocks inside the engine, flagging when it has started.
#[derive(Debug)]
struct Stall {
    at: u64,
    duration: Duration,
    entered: Arc<AtomicBool>,
}

impl TestEngine {
    pub(crate) fn new(led_count: usize) -> Self {
        Self::with_tickrate(led_count, 150)
    }

    pub(crate) fn with_tickrate(led_count: usize, tickrate: u32) -> Self {
        Self {
            clock: EngineClock::new(tickrate),
            leds: vec![Rgb::default(); led_count],
            mode: None,
            fail_at: None,
            stall: None,
        }
    }

    /// Make the tick that would reach `tick` fail.
    pub(crate) const fn fail_at(mut self, tick: u64) -> Self {
        self.fail_at = Some(tick);
        self
    }

    /// Make the tick that would reach `tick` block for `duration`.
    /// `entered` is set once that tick is underway.
    pub(crate) fn stall_at(mut self, tick: u64, duration: Duration, entered: Arc<AtomicBool>) -> Self {
        self.stall = Some(Stall {
            at: tick,
            duration,
            entered,
        });
        self
    }

    pub(crate) const fn set_mode(&mut self, mode: TestMode) {
        self.mode = Some(mode);
    }

    /// LEDs after a real tick reaching `tick` with no mode set.
    pub(crate) fn frame_at(tick: u64, led_count: usize) -> Vec<Rgb> {
        vec![Rgb::new(low_byte(tick), 0, 0); led_count]
    }
}

impl ClockSource for TestEngine {
    fn clock(&self) -> &EngineClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut EngineClock {
        &mut self.clock
    }
}

impl Engine for TestEngine {
    type Mode = TestMode;

    fn tick(&mut self) -> Result<(), EngineError> {
        if self.fail_at.is_some() && self.fail_at == self.clock.real_tick().checked_add(1) {
            return Err(ClockError::TickOverflow.into());
        }
        if let Some(stall) = &self.stall
            && Some(stall.at) == self.clock.real_tick().checked_add(1)
        {
            stall.entered.store(true, Ordering::Release);
            thread::sleep(stall.duration);
        }
        let tick = self.clock.advance()?;
        let color = self
            .mode
            .map_or_else(|| Rgb::new(low_byte(tick), 0, 0), |mode| mode.color_at(tick));
        self.leds.fill(color);
        Ok(())
    }

    fn leds(&self) -> &[Rgb] {
        &self.leds
    }

    fn leds_mut(&mut self) -> &mut [Rgb] {
        &mut self.leds
    }

    fn active_mode(&self) -> Option<&TestMode> {
        self.mode.as_ref()
    }

    fn play_mode(&mut self, mode: &mut TestMode, led: usize) {
        let color = mode.color_at(self.clock.tick());
        if let Some(slot) = self.leds.get_mut(led) {
            *slot = color;
        }
    }
}
