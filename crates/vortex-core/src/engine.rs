//! Seams between the harness and the LED engine it drives.
//!
//! The engine is an external collaborator. The harness only needs to step
//! it, read its LED buffer, and ask it to play an arbitrary mode on one LED
//! for preview rendering. In the other direction the engine calls back into
//! the host through [`EngineHooks`] for LED output, button reads, and IR
//! transmission.

use smart_leds::RGB8;

use crate::clock::{ClockError, ClockSource};

/// 8-bit RGB color of one LED.
pub type Rgb = RGB8;

/// Logic level read from an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinLevel {
    /// Pulled low (button pressed on the reference hardware).
    Low,
    /// Pulled high (idle).
    #[default]
    High,
}

/// Host callbacks the engine invokes while ticking.
///
/// Every method has a do-nothing default so a headless host only overrides
/// what it needs.
pub trait EngineHooks: Send {
    /// The engine is about to drive `count` LEDs.
    fn leds_init(&mut self, count: usize) {
        let _ = count;
    }

    /// Present the current LED colors.
    fn leds_show(&mut self, leds: &[Rgb]) {
        let _ = leds;
    }

    /// Read an input pin.
    fn check_pin(&mut self, pin: u32) -> PinLevel {
        let _ = pin;
        PinLevel::High
    }

    /// Transmit one IR timing event.
    fn infrared_write(&mut self, is_mark: bool, duration_micros: u32) {
        let _ = (is_mark, duration_micros);
    }
}

/// Errors surfaced by [`Engine::tick`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine clock refused to advance.
    #[error("engine clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// The LED engine as seen by the tick thread and the preview builder.
pub trait Engine: ClockSource + Send {
    /// A playable mode. Compared structurally to detect mode changes.
    type Mode: Clone + PartialEq + Send;

    /// Run one real tick: advance the clock, update the LEDs, run hooks.
    fn tick(&mut self) -> Result<(), EngineError>;

    /// Current LED colors.
    fn leds(&self) -> &[Rgb];

    /// Mutable LED colors.
    fn leds_mut(&mut self) -> &mut [Rgb];

    /// The mode currently playing, if any.
    fn active_mode(&self) -> Option<&Self::Mode>;

    /// Render one frame of `mode` onto LED `led` at the current clock tick.
    ///
    /// Takes the mode mutably because playing may advance its internal
    /// pattern state.
    fn play_mode(&mut self, mode: &mut Self::Mode, led: usize);

    /// Change the engine tickrate. Returns the rate actually applied.
    fn set_tickrate(&mut self, tickrate: u32) -> u32 {
        self.clock_mut().set_tickrate(tickrate)
    }
}
