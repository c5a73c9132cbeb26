//! Engine clock and time virtualization.
//!
//! The clock owns the engine's tick counter. Normally it advances once per
//! real tick. For preview rendering the clock can be switched into a
//! *simulation*: the real counter is saved, a simulated counter is stepped
//! freely, and ending the simulation puts the real counter back exactly as
//! it was. Nothing observes time passing in between.
//!
//! # Design Principles
//!
//! - All counter arithmetic is checked (no silent overflow).
//! - Simulations never nest, and misuse is an error value rather than a
//!   silently tolerated no-op.
//! - [`Simulation`] pairs begin and end through RAII, so an early return
//!   out of a preview render still restores the real counter.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tracing::warn;

/// Slowest tickrate the engine accepts (ticks per second).
pub const MIN_TICKRATE: u32 = 10;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// A simulation was started while another was still active.
    #[error("simulation already active (real tick {real_tick})")]
    AlreadySimulating {
        /// Real tick saved by the simulation that is still running.
        real_tick: u64,
    },

    /// A simulation-only operation was called with no simulation active.
    #[error("no simulation is active")]
    NotSimulating,

    /// The real counter was advanced while a simulation was active.
    #[error("cannot advance real time while a simulation is active")]
    SimulationActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SimulationState {
    saved_tick: u64,
    simulated_tick: u64,
}

/// Tick counter and tickrate of one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineClock {
    /// Real tick counter.
    tick: u64,

    /// Ticks per second, never below [`MIN_TICKRATE`].
    tickrate: u32,

    /// Present while time is virtualized.
    simulation: Option<SimulationState>,
}

impl EngineClock {
    /// Create a clock at tick 0. `tickrate` is clamped to [`MIN_TICKRATE`].
    pub fn new(tickrate: u32) -> Self {
        Self::from_parts(0, tickrate)
    }

    /// Create a clock at an explicit tick (useful for tests).
    pub fn from_parts(tick: u64, tickrate: u32) -> Self {
        Self {
            tick,
            tickrate: tickrate.max(MIN_TICKRATE),
            simulation: None,
        }
    }

    /// Advance the real clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::SimulationActive`] while time is virtualized
    /// and [`ClockError::TickOverflow`] at `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        if self.simulation.is_some() {
            return Err(ClockError::SimulationActive);
        }
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// The tick the engine should see: simulated while a simulation is
    /// active, real otherwise.
    pub fn tick(&self) -> u64 {
        self.simulation
            .map_or(self.tick, |state| state.simulated_tick)
    }

    /// The real tick counter, regardless of simulation.
    pub const fn real_tick(&self) -> u64 {
        self.tick
    }

    /// Whether time is currently virtualized.
    pub const fn is_simulating(&self) -> bool {
        self.simulation.is_some()
    }

    /// Save the real counter and start simulated time from it.
    ///
    /// Returns the simulated start tick.
    pub fn begin_simulation(&mut self) -> Result<u64, ClockError> {
        if let Some(state) = self.simulation {
            return Err(ClockError::AlreadySimulating {
                real_tick: state.saved_tick,
            });
        }
        self.simulation = Some(SimulationState {
            saved_tick: self.tick,
            simulated_tick: self.tick,
        });
        Ok(self.tick)
    }

    /// Step simulated time by one tick. Returns the new simulated tick.
    pub fn advance_simulated_tick(&mut self) -> Result<u64, ClockError> {
        let state = self.simulation.as_mut().ok_or(ClockError::NotSimulating)?;
        state.simulated_tick = state
            .simulated_tick
            .checked_add(1)
            .ok_or(ClockError::TickOverflow)?;
        Ok(state.simulated_tick)
    }

    /// Leave simulated time and restore the saved real counter.
    ///
    /// Returns how many simulated ticks were discarded.
    pub fn end_simulation(&mut self) -> Result<u64, ClockError> {
        let state = self.simulation.take().ok_or(ClockError::NotSimulating)?;
        self.tick = state.saved_tick;
        Ok(state.simulated_tick.saturating_sub(state.saved_tick))
    }

    /// Ticks per second.
    pub const fn tickrate(&self) -> u32 {
        self.tickrate
    }

    /// Change the tickrate, clamped to [`MIN_TICKRATE`]. Returns the rate
    /// actually applied.
    pub fn set_tickrate(&mut self, tickrate: u32) -> u32 {
        self.tickrate = tickrate.max(MIN_TICKRATE);
        self.tickrate
    }

    /// Wall-clock length of one tick at the current tickrate.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1)
            .checked_div(self.tickrate)
            .unwrap_or(Duration::from_secs(1))
    }
}

/// Anything that owns an [`EngineClock`].
pub trait ClockSource {
    /// Shared access to the clock.
    fn clock(&self) -> &EngineClock;

    /// Exclusive access to the clock.
    fn clock_mut(&mut self) -> &mut EngineClock;
}

impl ClockSource for EngineClock {
    fn clock(&self) -> &EngineClock {
        self
    }

    fn clock_mut(&mut self) -> &mut EngineClock {
        self
    }
}

/// Scoped simulated time over an engine.
///
/// Created by [`Simulation::begin`]; derefs to the engine so it can be
/// driven while time is virtualized. The real counter is restored by
/// [`Simulation::end`] or, on early exit, when the guard is dropped.
#[derive(Debug)]
pub struct Simulation<'a, E: ClockSource + ?Sized> {
    engine: &'a mut E,
    ended: bool,
}

impl<'a, E: ClockSource + ?Sized> Simulation<'a, E> {
    /// Begin simulated time on `engine`.
    pub fn begin(engine: &'a mut E) -> Result<Self, ClockError> {
        engine.clock_mut().begin_simulation()?;
        Ok(Self {
            engine,
            ended: false,
        })
    }

    /// Step simulated time by one tick.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.engine.clock_mut().advance_simulated_tick()
    }

    /// End the simulation now. Returns the discarded tick count.
    pub fn end(mut self) -> Result<u64, ClockError> {
        self.ended = true;
        self.engine.clock_mut().end_simulation()
    }
}

impl<E: ClockSource + ?Sized> Deref for Simulation<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine
    }
}

impl<E: ClockSource + ?Sized> DerefMut for Simulation<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.engine
    }
}

impl<E: ClockSource + ?Sized> Drop for Simulation<'_, E> {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        if let Err(e) = self.engine.clock_mut().end_simulation() {
            warn!(error = %e, "Simulation guard dropped without an active simulation");
        }
    }
}
