//! Preview snapshot builder.
//!
//! A preview is a strip of colors showing how the active mode will look
//! over the next `width` ticks. Rendering it means running the mode ahead
//! of real time, so the builder pauses the tick thread (holds the
//! [`PauseGate`]), virtualizes the engine clock, samples one LED per
//! simulated tick, and then puts everything back: the real tick counter and
//! the sampled LED's color are exactly what they were before.
//!
//! Finished buffers are published on a `tokio::sync::watch` channel so
//! consumers always see a complete buffer, never a half-rendered one.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::clock::{ClockError, Simulation};
use crate::engine::{Engine, Rgb};
use crate::gate::{GateError, GateHolder, PauseGate};

/// Errors raised while rendering a preview.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// The pause gate could not be acquired.
    #[error("pause gate unavailable: {source}")]
    Gate {
        /// The underlying gate error.
        #[from]
        source: GateError,
    },

    /// Time virtualization failed.
    #[error("preview simulation failed: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The preview geometry is empty or larger than [`MAX_PREVIEW_PIXELS`].
    #[error(
        "preview geometry {width}x{height} must be non-empty and at most {max} pixels",
        max = MAX_PREVIEW_PIXELS
    )]
    Geometry {
        /// Requested columns.
        width: usize,
        /// Requested rows.
        height: usize,
    },

    /// The configured sample LED does not exist on this engine.
    #[error("sample LED {led} out of range (engine has {count} LEDs)")]
    LedOutOfRange {
        /// Requested LED index.
        led: usize,
        /// Number of LEDs on the engine.
        count: usize,
    },
}

/// Largest preview the builder renders, in pixels.
pub const MAX_PREVIEW_PIXELS: usize = 1 << 22;

/// Preview geometry and sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSettings {
    /// Columns, one per simulated tick.
    pub width: usize,
    /// Rows; every row repeats the sampled strip.
    pub height: usize,
    /// LED whose color is sampled each tick.
    pub sample_led: usize,
}

impl PreviewSettings {
    /// Check that the geometry is non-empty and within [`MAX_PREVIEW_PIXELS`].
    ///
    /// # Errors
    ///
    /// Returns [`PreviewError::Geometry`] otherwise.
    pub const fn check(self) -> Result<(), PreviewError> {
        match self.width.checked_mul(self.height) {
            Some(pixels) if pixels > 0 && pixels <= MAX_PREVIEW_PIXELS => Ok(()),
            _ => Err(PreviewError::Geometry {
                width: self.width,
                height: self.height,
            }),
        }
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 30,
            sample_led: 0,
        }
    }
}

/// A rendered preview: `width * height` colors, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewBuffer {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl PreviewBuffer {
    fn from_columns(columns: &[Rgb], height: usize) -> Self {
        let mut pixels = Vec::with_capacity(columns.len().saturating_mul(height));
        for _ in 0..height {
            pixels.extend_from_slice(columns);
        }
        Self {
            width: columns.len(),
            height,
            pixels,
        }
    }

    /// Number of columns.
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub const fn height(&self) -> usize {
        self.height
    }

    /// All pixels, row-major.
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// Pixel at column `x`, row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width {
            return None;
        }
        let index = y.checked_mul(self.width)?.checked_add(x)?;
        self.pixels.get(index).copied()
    }

    /// Row `y`, left to right.
    pub fn row(&self, y: usize) -> Option<&[Rgb]> {
        let start = y.checked_mul(self.width)?;
        let end = start.checked_add(self.width)?;
        self.pixels.get(start..end)
    }

    /// The sampled color for simulated tick `x` (first row).
    pub fn column(&self, x: usize) -> Option<Rgb> {
        self.pixel(x, 0)
    }
}

/// Renders previews of the engine's active mode.
pub struct PreviewBuilder<E: Engine> {
    gate: Arc<PauseGate<E>>,
    settings: PreviewSettings,
    /// Mode the current preview was rendered from.
    last_mode: Mutex<Option<E::Mode>>,
    published: watch::Sender<Option<Arc<PreviewBuffer>>>,
}

impl<E: Engine> PreviewBuilder<E> {
    /// Create a builder over the gate that owns the engine.
    pub fn new(gate: Arc<PauseGate<E>>, settings: PreviewSettings) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            gate,
            settings,
            last_mode: Mutex::new(None),
            published,
        }
    }

    /// Preview geometry.
    pub const fn settings(&self) -> PreviewSettings {
        self.settings
    }

    /// Receive every newly published preview.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<PreviewBuffer>>> {
        self.published.subscribe()
    }

    /// The most recently published preview.
    pub fn latest(&self) -> Option<Arc<PreviewBuffer>> {
        self.published.borrow().clone()
    }

    /// Re-render if the active mode changed since the last render.
    ///
    /// Returns the new buffer, or `None` when nothing changed.
    pub fn refresh(&self) -> Result<Option<Arc<PreviewBuffer>>, PreviewError> {
        self.render(false)
    }

    /// Re-render unconditionally.
    pub fn rebuild(&self) -> Result<Option<Arc<PreviewBuffer>>, PreviewError> {
        self.render(true)
    }

    fn render(&self, force: bool) -> Result<Option<Arc<PreviewBuffer>>, PreviewError> {
        self.settings.check()?;
        let mut last_mode = self
            .last_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut engine = self.gate.lock(GateHolder::Snapshot)?;

        let Some(active) = engine.active_mode().cloned() else {
            *last_mode = None;
            return Ok(None);
        };
        if !force && last_mode.as_ref() == Some(&active) {
            return Ok(None);
        }

        let start_tick = engine.clock().tick();
        let mut mode = active.clone();
        let columns = render_columns(&mut *engine, &mut mode, self.settings)?;
        drop(engine);

        *last_mode = Some(active);
        let buffer = Arc::new(PreviewBuffer::from_columns(&columns, self.settings.height));
        self.published.send_replace(Some(Arc::clone(&buffer)));

        info!(
            width = buffer.width(),
            height = buffer.height(),
            start_tick,
            "Preview rebuilt"
        );
        Ok(Some(buffer))
    }
}

/// Sample the mode on one LED for `width` simulated ticks.
///
/// The sampled LED's color is restored whether or not rendering succeeds.
fn render_columns<E: Engine + ?Sized>(
    engine: &mut E,
    mode: &mut E::Mode,
    settings: PreviewSettings,
) -> Result<Vec<Rgb>, PreviewError> {
    let led = settings.sample_led;
    let backup = engine
        .leds()
        .get(led)
        .copied()
        .ok_or_else(|| PreviewError::LedOutOfRange {
            led,
            count: engine.leds().len(),
        })?;

    let sampled = sample_columns(engine, mode, settings);

    if let Some(slot) = engine.leds_mut().get_mut(led) {
        *slot = backup;
    }
    sampled
}

fn sample_columns<E: Engine + ?Sized>(
    engine: &mut E,
    mode: &mut E::Mode,
    settings: PreviewSettings,
) -> Result<Vec<Rgb>, PreviewError> {
    let led = settings.sample_led;
    let mut sim = Simulation::begin(engine)?;
    let mut columns = Vec::with_capacity(settings.width);

    for _ in 0..settings.width {
        sim.play_mode(mode, led);
        columns.push(sim.leds().get(led).copied().unwrap_or_default());
        sim.advance()?;
    }

    let discarded = sim.end()?;
    debug!(discarded, "Preview simulation ended");
    Ok(columns)
}
