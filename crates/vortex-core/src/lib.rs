//! Tick thread, pause gate, time virtualization, and preview rendering for
//! the Vortex desktop harness.
//!
//! This crate steps an LED engine on a dedicated thread and lets a second
//! party pause it to render pattern previews ahead of real time.
//!
//! # Modules
//!
//! - [`clock`] -- Engine clock with real and simulated tick counters and the
//!   [`Simulation`] guard.
//! - [`config`] -- Configuration loading from `vortex-harness.yaml` into
//!   strongly-typed structs.
//! - [`engine`] -- [`Engine`] and [`EngineHooks`] seams to the LED engine.
//! - [`gate`] -- [`PauseGate`] owning the engine, and the lock-free-read
//!   [`LedShadow`].
//! - [`preview`] -- [`PreviewBuilder`] rendering and publishing previews.
//! - [`tick`] -- The [`TickThread`] loop with pacing and bounded shutdown.
//!
//! [`Simulation`]: clock::Simulation
//! [`Engine`]: engine::Engine
//! [`EngineHooks`]: engine::EngineHooks
//! [`PauseGate`]: gate::PauseGate
//! [`LedShadow`]: gate::LedShadow
//! [`PreviewBuilder`]: preview::PreviewBuilder
//! [`TickThread`]: tick::TickThread

pub mod clock;
pub mod config;
pub mod engine;
pub mod gate;
pub mod preview;
pub mod tick;

#[cfg(test)]
pub(crate) mod test_engine;
