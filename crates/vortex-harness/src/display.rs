//! Terminal rendering of the LED strip.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;
use vortex_core::engine::Rgb;
use vortex_core::preview::PreviewBuffer;

const RESET: &str = "\x1b[0m";
const CLEAR_LINE: &str = "\x1b[2K\r";

/// How LED colors are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayStyle {
    /// ANSI truecolor blocks instead of hex triplets.
    pub color: bool,
    /// Redraw one line instead of scrolling.
    pub in_place: bool,
}

/// Format one strip state as a single line (without terminator).
pub fn render_line(leds: &[Rgb], style: DisplayStyle) -> String {
    let mut line = String::new();
    if style.in_place {
        line.push_str(CLEAR_LINE);
    }
    for led in leds {
        // Writing to a String cannot fail.
        let _ = if style.color {
            write!(
                line,
                "{RESET}|\x1b[48;2;{};{};{}m  {RESET}|",
                led.r, led.g, led.b
            )
        } else {
            write!(line, "{:02X}{:02X}{:02X}", led.r, led.g, led.b)
        };
    }
    line
}

/// Writes the strip to `W` whenever it changes.
#[derive(Debug)]
pub struct TerminalDisplay<W = io::Stdout> {
    out: W,
    style: DisplayStyle,
    last: Vec<Rgb>,
    failed: bool,
}

impl TerminalDisplay {
    /// Display on standard output.
    pub fn stdout(style: DisplayStyle) -> Self {
        Self::new(io::stdout(), style)
    }
}

impl<W: Write> TerminalDisplay<W> {
    /// Display on an arbitrary writer.
    pub const fn new(out: W, style: DisplayStyle) -> Self {
        Self {
            out,
            style,
            last: Vec::new(),
            failed: false,
        }
    }

    /// Show `leds` if they differ from the last frame shown.
    pub fn show(&mut self, leds: &[Rgb]) {
        if self.failed || self.last == leds {
            return;
        }
        self.last.clear();
        self.last.extend_from_slice(leds);

        let mut line = render_line(leds, self.style);
        if !self.style.in_place {
            line.push('\n');
        }
        let written = self
            .out
            .write_all(line.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            warn!(error = %e, "LED output failed, display disabled");
            self.failed = true;
        }
    }

    /// The underlying writer.
    #[cfg(test)]
    pub const fn writer(&self) -> &W {
        &self.out
    }
}

/// Print the first row of every preview published on `updates`.
///
/// Runs until the builder is dropped or `out` fails, then hands `out` back.
pub async fn print_previews<W: Write>(
    mut updates: watch::Receiver<Option<Arc<PreviewBuffer>>>,
    mut out: W,
    style: DisplayStyle,
) -> W {
    let style = DisplayStyle {
        in_place: false,
        ..style
    };
    while updates.changed().await.is_ok() {
        let Some(buffer) = updates.borrow_and_update().clone() else {
            continue;
        };
        let Some(row) = buffer.row(0) else {
            continue;
        };
        let line = format!("preview {}\n", render_line(row, style));
        if let Err(e) = out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
            warn!(error = %e, "Preview output failed");
            break;
        }
    }
    out
}
