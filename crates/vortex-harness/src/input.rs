//! Keyboard control of the virtual button.
//!
//! Each line typed on stdin is one key:
//!
//! | Key | Action |
//! |-----|--------|
//! | `a` | short click |
//! | `s` | long click |
//! | `f` | toggle the button held down |
//! | `q` | quit |

use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};

use tokio::sync::watch;
use tracing::debug;

/// Ticks a short click keeps the button down.
pub const CLICK_TICKS: u32 = 2;

/// Ticks a long click keeps the button down.
pub const LONG_CLICK_TICKS: u32 = 150;

/// Usage line shown at startup.
pub const USAGE: &str = "keys (then Enter): a = click, s = long click, f = toggle pressed, q = quit";

/// Button state shared between the input thread and the engine hooks.
#[derive(Debug, Default)]
pub struct Button {
    held: AtomicBool,
    press_ticks: AtomicU32,
}

impl Button {
    /// A released button.
    pub fn new() -> Self {
        Self::default()
    }

    /// Press for [`CLICK_TICKS`] ticks.
    pub fn click(&self) {
        self.press_ticks.store(CLICK_TICKS, Ordering::Release);
    }

    /// Press for [`LONG_CLICK_TICKS`] ticks.
    pub fn long_click(&self) {
        self.press_ticks.store(LONG_CLICK_TICKS, Ordering::Release);
    }

    /// Flip the held state; returns whether it is now held.
    pub fn toggle(&self) -> bool {
        !self.held.fetch_xor(true, Ordering::AcqRel)
    }

    /// Read the button for one tick. A pending click uses up one tick.
    pub fn sample(&self) -> bool {
        let held = self.held.load(Ordering::Acquire);
        let clicked = self
            .press_ticks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        held || clicked
    }
}

/// One line of keyboard input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Short click.
    Click,
    /// Long click.
    LongClick,
    /// Toggle held.
    Toggle,
    /// Quit the harness.
    Quit,
}

impl Key {
    /// Parse a typed line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "a" => Some(Self::Click),
            "s" => Some(Self::LongClick),
            "f" => Some(Self::Toggle),
            "q" => Some(Self::Quit),
            _ => None,
        }
    }

    /// Apply a button key. Returns `false` for [`Key::Quit`].
    pub fn apply(self, button: &Button) -> bool {
        match self {
            Self::Click => button.click(),
            Self::LongClick => button.long_click(),
            Self::Toggle => {
                let held = button.toggle();
                debug!(held, "Button toggled");
            }
            Self::Quit => return false,
        }
        true
    }
}

/// Read keys from stdin on a detached thread until EOF or `q`.
///
/// `q` sets `quit`. EOF just ends the thread.
pub fn spawn_stdin(button: Arc<Button>, quit: watch::Sender<bool>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("vortex-input".to_owned())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match Key::parse(&line) {
                    Some(key) if key.apply(&button) => debug!(?key, "Button input"),
                    Some(_) => {
                        quit.send_replace(true);
                        break;
                    }
                    None => debug!(input = %line.trim(), "Unknown key"),
                }
            }
        })
}

/// Resolve once quit was requested; never resolves if input ended first.
pub async fn quit_requested(quit: &mut watch::Receiver<bool>) {
    if quit.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}
