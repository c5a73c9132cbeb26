//! Pause gate and LED shadow.
//!
//! The [`PauseGate`] owns the engine. The tick thread holds it for one tick
//! at a time; the preview builder holds it for a whole preview render,
//! which pauses real ticking for that long. Because the engine lives inside
//! the gate there is no way to touch it without holding the gate.
//!
//! The [`LedShadow`] is a copy of the LED buffer taken at the end of every
//! tick. Status displays read it without the gate, so they never stall the
//! tick thread and may be one tick stale.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::engine::Rgb;

/// Which party holds the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateHolder {
    /// The tick engine thread, for one tick.
    TickThread = 1,
    /// The preview builder, for one render.
    Snapshot = 2,
}

const FREE: u8 = 0;

impl GateHolder {
    const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::TickThread),
            2 => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// Errors raised when acquiring the gate.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GateError {
    /// A previous holder panicked; the engine state is untrusted.
    #[error("pause gate poisoned by a panicking holder")]
    Poisoned,
}

/// Mutual exclusion token owning the engine.
#[derive(Debug)]
pub struct PauseGate<E> {
    engine: Mutex<E>,
    holder: AtomicU8,
}

impl<E> PauseGate<E> {
    /// Wrap `engine` in a gate.
    pub const fn new(engine: E) -> Self {
        Self {
            engine: Mutex::new(engine),
            holder: AtomicU8::new(FREE),
        }
    }

    /// Block until the gate is free, then hold it as `holder`.
    pub fn lock(&self, holder: GateHolder) -> Result<GateGuard<'_, E>, GateError> {
        let engine = self.engine.lock().map_err(|_poisoned| GateError::Poisoned)?;
        let previous = self.holder.swap(holder as u8, Ordering::AcqRel);
        debug_assert_eq!(previous, FREE, "pause gate held twice");
        Ok(GateGuard {
            engine,
            holder: &self.holder,
        })
    }

    /// Current holder, `None` when the gate is free.
    pub fn holder(&self) -> Option<GateHolder> {
        GateHolder::from_raw(self.holder.load(Ordering::Acquire))
    }

    /// Take the engine back out of the gate.
    pub fn into_inner(self) -> Result<E, GateError> {
        self.engine.into_inner().map_err(|_poisoned| GateError::Poisoned)
    }
}

/// Exclusive access to the engine while the gate is held.
#[derive(Debug)]
pub struct GateGuard<'a, E> {
    engine: MutexGuard<'a, E>,
    holder: &'a AtomicU8,
}

impl<E> Deref for GateGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.engine
    }
}

impl<E> DerefMut for GateGuard<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

impl<E> Drop for GateGuard<'_, E> {
    fn drop(&mut self) {
        // Runs before the mutex guard field is dropped, so the holder is
        // cleared while the lock is still held.
        self.holder.store(FREE, Ordering::Release);
    }
}

/// Last-known-good LED colors, readable without the gate.
#[derive(Debug, Default)]
pub struct LedShadow {
    leds: RwLock<Vec<Rgb>>,
}

impl LedShadow {
    /// An empty shadow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the shadow with `leds`.
    pub fn copy_from(&self, leds: &[Rgb]) {
        let mut shadow = self.leds.write().unwrap_or_else(PoisonError::into_inner);
        shadow.clear();
        shadow.extend_from_slice(leds);
    }

    /// Color of LED `n`, if the engine has that many.
    pub fn get(&self, n: usize) -> Option<Rgb> {
        self.leds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(n)
            .copied()
    }

    /// Copy of all LED colors.
    pub fn snapshot(&self) -> Vec<Rgb> {
        self.leds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of LEDs in the shadow.
    pub fn len(&self) -> usize {
        self.leds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no tick has published LEDs yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
