//! Demo LED engine.
//!
//! Stands in for the real Vortex engine: a small catalog of flashing and
//! rainbow modes whose colors are pure functions of (tick, LED), so preview
//! rendering is deterministic. One instance of a linked pair is the
//! *sender*: it cycles through the catalog and beacons its mode over IR.
//! The other is the *receiver* and switches to whatever mode it decodes.

use std::sync::Arc;

use smart_leds::hsv::{Hsv, hsv2rgb};
use tracing::{debug, info};
use vortex_core::clock::{ClockSource, EngineClock};
use vortex_core::engine::{Engine, EngineError, EngineHooks, PinLevel, Rgb};

use crate::ir::{IrInbox, ModeDecoder, encode_mode};

/// Input pin wired to the mode button.
pub const BUTTON_PIN: u32 = 1;

const OFF: Rgb = Rgb::new(0, 0, 0);

/// How a mode animates its colorset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Short bright flashes.
    Strobe,
    /// Slow even on/off.
    Blink,
    /// Very short flashes with long gaps.
    Dops,
    /// Hue sweep across the strip; ignores the colorset.
    Rainbow,
}

impl Pattern {
    /// On and off durations in ticks for flashing patterns.
    const fn timing(self) -> Option<(u64, u64)> {
        match self {
            Self::Strobe => Some((5, 8)),
            Self::Blink => Some((30, 30)),
            Self::Dops => Some((2, 13)),
            Self::Rainbow => None,
        }
    }
}

/// A playable mode: a pattern plus the colors it cycles through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoMode {
    /// Animation.
    pub pattern: Pattern,
    /// Colors, one per flash in turn.
    pub colors: Vec<Rgb>,
}

impl DemoMode {
    /// Build a mode.
    pub fn new(pattern: Pattern, colors: &[Rgb]) -> Self {
        Self {
            pattern,
            colors: colors.to_vec(),
        }
    }

    /// Color of LED `led` at `tick`.
    pub fn color_at(&self, tick: u64, led: usize) -> Rgb {
        let Some((on, off)) = self.pattern.timing() else {
            let offset = u64::try_from(led).unwrap_or(0).wrapping_mul(16);
            let [hue, ..] = tick.wrapping_add(offset).to_le_bytes();
            return hsv2rgb(Hsv {
                hue,
                sat: 255,
                val: 255,
            });
        };

        let period = on.saturating_add(off);
        let phase = tick.checked_rem(period).unwrap_or(0);
        if phase >= on {
            return OFF;
        }
        let flash = tick.checked_div(period).unwrap_or(0);
        let count = u64::try_from(self.colors.len()).unwrap_or(0);
        flash
            .checked_rem(count)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.colors.get(index).copied())
            .unwrap_or(OFF)
    }
}

/// The built-in mode list.
pub fn catalog() -> Vec<DemoMode> {
    vec![
        DemoMode::new(
            Pattern::Strobe,
            &[Rgb::new(255, 0, 0), Rgb::new(0, 255, 0), Rgb::new(0, 0, 255)],
        ),
        DemoMode::new(
            Pattern::Dops,
            &[Rgb::new(255, 0, 255), Rgb::new(0, 255, 255)],
        ),
        DemoMode::new(Pattern::Blink, &[Rgb::new(255, 160, 0)]),
        DemoMode::new(Pattern::Rainbow, &[]),
        DemoMode::new(Pattern::Strobe, &[Rgb::new(255, 255, 255)]),
        DemoMode::new(
            Pattern::Dops,
            &[
                Rgb::new(255, 0, 0),
                Rgb::new(255, 255, 0),
                Rgb::new(0, 255, 0),
                Rgb::new(0, 255, 255),
                Rgb::new(0, 0, 255),
                Rgb::new(255, 0, 255),
            ],
        ),
    ]
}

/// Mode cycling and beaconing for the sending side of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSchedule {
    /// Ticks between mode changes (0 = never).
    pub cycle_ticks: u64,
    /// Ticks between beacons (0 = never).
    pub beacon_ticks: u64,
}

fn due(tick: u64, every: u64) -> bool {
    tick.checked_rem(every) == Some(0)
}

/// Demo engine driving `H` hooks.
#[derive(Debug)]
pub struct DemoEngine<H> {
    clock: EngineClock,
    leds: Vec<Rgb>,
    modes: Vec<DemoMode>,
    current: usize,
    active: DemoMode,
    hooks: H,
    inbox: Arc<IrInbox>,
    decoder: ModeDecoder,
    sender: Option<SendSchedule>,
    button_held: bool,
    initialized: bool,
}

impl<H: EngineHooks> DemoEngine<H> {
    /// A receiving engine with `led_count` LEDs playing the first mode.
    pub fn new(led_count: usize, tickrate: u32, hooks: H, inbox: Arc<IrInbox>) -> Self {
        let modes = catalog();
        let active = modes.first().cloned().unwrap_or_else(|| DemoMode::new(Pattern::Rainbow, &[]));
        Self {
            clock: EngineClock::new(tickrate),
            leds: vec![OFF; led_count],
            modes,
            current: 0,
            active,
            hooks,
            inbox,
            decoder: ModeDecoder::new(),
            sender: None,
            button_held: false,
            initialized: false,
        }
    }

    /// Make this engine the sending side.
    #[must_use]
    pub const fn with_sender(mut self, schedule: SendSchedule) -> Self {
        self.sender = Some(schedule);
        self
    }

    /// Index of the playing mode in the catalog.
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// Number of modes in the catalog.
    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    /// The host hooks.
    pub const fn hooks(&self) -> &H {
        &self.hooks
    }

    /// The host hooks, mutably.
    pub const fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Switch to catalog entry `index`. Out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) -> bool {
        let Some(mode) = self.modes.get(index) else {
            return false;
        };
        self.current = index;
        self.active = mode.clone();
        debug!(index, pattern = ?self.active.pattern, "Mode selected");
        true
    }

    fn next_mode(&mut self) {
        let next = self
            .current
            .saturating_add(1)
            .checked_rem(self.modes.len())
            .unwrap_or(0);
        self.select(next);
    }

    fn receive(&mut self) {
        for frame in self.inbox.drain() {
            let Some(index) = self.decoder.push(frame) else {
                continue;
            };
            let index = usize::from(index);
            if index != self.current && self.select(index) {
                info!(index, "Switched to mode shared over IR");
            }
        }
    }

    fn poll_button(&mut self) {
        let pressed = self.hooks.check_pin(BUTTON_PIN) == PinLevel::Low;
        if pressed && !self.button_held {
            self.next_mode();
        }
        self.button_held = pressed;
    }

    fn beacon(&mut self) {
        let Ok(index) = u8::try_from(self.current) else {
            return;
        };
        for frame in encode_mode(index) {
            self.hooks
                .infrared_write(frame.is_mark(), frame.duration_micros());
        }
        debug!(index, "Mode beacon sent");
    }
}

impl<H: EngineHooks> ClockSource for DemoEngine<H> {
    fn clock(&self) -> &EngineClock {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut EngineClock {
        &mut self.clock
    }
}

impl<H: EngineHooks> Engine for DemoEngine<H> {
    type Mode = DemoMode;

    fn tick(&mut self) -> Result<(), EngineError> {
        if !self.initialized {
            self.hooks.leds_init(self.leds.len());
            self.initialized = true;
        }

        let tick = self.clock.advance()?;
        self.receive();
        self.poll_button();

        if let Some(schedule) = self.sender {
            if due(tick, schedule.cycle_ticks) {
                self.next_mode();
            }
            if due(tick, schedule.beacon_ticks) {
                self.beacon();
            }
        }

        for (led, slot) in self.leds.iter_mut().enumerate() {
            *slot = self.active.color_at(tick, led);
        }
        self.hooks.leds_show(&self.leds);
        Ok(())
    }

    fn leds(&self) -> &[Rgb] {
        &self.leds
    }

    fn leds_mut(&mut self) -> &mut [Rgb] {
        &mut self.leds
    }

    fn active_mode(&self) -> Option<&DemoMode> {
        Some(&self.active)
    }

    fn play_mode(&mut self, mode: &mut DemoMode, led: usize) {
        let color = mode.color_at(self.clock.tick(), led);
        if let Some(slot) = self.leds.get_mut(led) {
            *slot = color;
        }
    }
}
