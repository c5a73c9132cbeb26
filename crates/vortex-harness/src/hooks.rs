//! Host callbacks wiring the engine to the terminal and the IR link.

use std::io::Write;
use std::sync::Arc;

use tracing::debug;
use vortex_core::engine::{EngineHooks, PinLevel, Rgb};
use vortex_link::LinkConnector;

use crate::demo::BUTTON_PIN;
use crate::display::TerminalDisplay;
use crate::input::Button;

/// The harness side of [`EngineHooks`].
///
/// LEDs go to an optional terminal display; IR writes go to the outbound
/// connector when this instance is the Peer. The button pin reads the
/// keyboard-driven [`Button`]. With nothing attached the hooks are silent
/// and every pin reads high.
#[derive(Debug)]
pub struct HarnessHooks<W = std::io::Stdout> {
    display: Option<TerminalDisplay<W>>,
    outbound: Option<LinkConnector>,
    button: Option<Arc<Button>>,
}

impl<W: Write> HarnessHooks<W> {
    /// Hooks with the given display and outbound link.
    pub const fn new(display: Option<TerminalDisplay<W>>, outbound: Option<LinkConnector>) -> Self {
        Self {
            display,
            outbound,
            button: None,
        }
    }

    /// Attach the button read on [`BUTTON_PIN`].
    #[must_use]
    pub fn with_button(mut self, button: Arc<Button>) -> Self {
        self.button = Some(button);
        self
    }

    /// The outbound connector, if any.
    pub const fn outbound(&self) -> Option<&LinkConnector> {
        self.outbound.as_ref()
    }

    /// Close the outbound connector.
    pub fn close_outbound(&mut self) {
        if let Some(connector) = self.outbound.as_mut() {
            connector.close();
        }
    }
}

impl<W: Write + Send> EngineHooks for HarnessHooks<W> {
    fn leds_init(&mut self, count: usize) {
        debug!(count, "LEDs initialized");
    }

    fn leds_show(&mut self, leds: &[Rgb]) {
        if let Some(display) = self.display.as_mut() {
            display.show(leds);
        }
    }

    fn check_pin(&mut self, pin: u32) -> PinLevel {
        // The button pulls its pin low while pressed.
        let pressed = pin == BUTTON_PIN && self.button.as_ref().is_some_and(|b| b.sample());
        if pressed { PinLevel::Low } else { PinLevel::High }
    }

    fn infrared_write(&mut self, is_mark: bool, duration_micros: u32) {
        if let Some(connector) = self.outbound.as_mut() {
            connector.send_frame(duration_micros, is_mark);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Duration;

    use vortex_core::engine::Engine;
    use vortex_link::frame::FRAME_LEN;
    use vortex_link::{IrFrame, LinkListener};

    use super::*;
    use crate::demo::{DemoEngine, SendSchedule};
    use crate::display::DisplayStyle;
    use crate::input::{CLICK_TICKS, Key};
    use crate::ir::{BURST_LEN, IrInbox};

    #[test]
    fn leds_reach_the_display() {
        let display = TerminalDisplay::new(Vec::new(), DisplayStyle::default());
        let mut hooks = HarnessHooks::new(Some(display), None);
        hooks.leds_show(&[Rgb::new(1, 2, 3)]);
        let shown = hooks.display.as_ref().unwrap().writer().clone();
        assert_eq!(shown, b"010203\n");
    }

    #[test]
    fn silent_hooks_accept_everything() {
        let mut hooks: HarnessHooks = HarnessHooks::new(None, None);
        hooks.leds_init(3);
        hooks.leds_show(&[Rgb::default()]);
        hooks.infrared_write(true, 560);
        assert!(hooks.outbound().is_none());
    }

    #[test]
    fn button_pin_follows_keyboard_clicks() {
        let button = Arc::new(Button::new());
        let mut hooks = HarnessHooks::<Vec<u8>>::new(None, None).with_button(Arc::clone(&button));
        assert_eq!(hooks.check_pin(BUTTON_PIN), PinLevel::High);

        assert!(Key::Click.apply(&button));
        // Other pins never see the button.
        assert_eq!(hooks.check_pin(BUTTON_PIN.wrapping_add(1)), PinLevel::High);
        for _ in 0..CLICK_TICKS {
            assert_eq!(hooks.check_pin(BUTTON_PIN), PinLevel::Low);
        }
        assert_eq!(hooks.check_pin(BUTTON_PIN), PinLevel::High);
    }

    #[test]
    fn click_advances_the_running_engine() {
        let button = Arc::new(Button::new());
        let hooks = HarnessHooks::<Vec<u8>>::new(None, None).with_button(Arc::clone(&button));
        let mut engine = DemoEngine::new(2, 150, hooks, Arc::new(IrInbox::new()));
        engine.tick().unwrap();
        assert_eq!(engine.current_index(), 0);

        button.click();
        for _ in 0..4 {
            engine.tick().unwrap();
        }
        assert_eq!(engine.current_index(), 1);

        // Held across many ticks still counts as one press.
        button.toggle();
        for _ in 0..10 {
            engine.tick().unwrap();
        }
        assert_eq!(engine.current_index(), 2);
    }

    #[test]
    fn infrared_writes_go_out_on_the_link() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = LinkConnector::connect("127.0.0.1", port).unwrap();
        let (mut accepted, _) = listener.accept().unwrap();
        accepted
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let mut hooks: HarnessHooks = HarnessHooks::new(None, Some(connector));
        hooks.infrared_write(true, 9_000);
        hooks.infrared_write(false, 4_500);

        let mut bytes = [0u8; 2 * FRAME_LEN];
        accepted.read_exact(&mut bytes).unwrap();
        let (first, second) = bytes.split_at(FRAME_LEN);
        assert_eq!(
            IrFrame::decode(first.try_into().unwrap()),
            IrFrame::mark(9_000)
        );
        assert_eq!(
            IrFrame::decode(second.try_into().unwrap()),
            IrFrame::space(4_500)
        );
        assert_eq!(hooks.outbound().unwrap().sent(), 2);

        hooks.close_outbound();
        assert!(hooks.outbound().unwrap().is_closed());
    }

    #[tokio::test]
    async fn beaconed_mode_reaches_the_receiving_engine() {
        let inbox = Arc::new(IrInbox::new());
        let listener = LinkListener::start(
            "127.0.0.1:0".parse().unwrap(),
            Arc::<IrInbox>::clone(&inbox),
        )
        .await
        .unwrap();
        let port = listener.local_addr().port();
        let connector =
            tokio::task::spawn_blocking(move || LinkConnector::connect("127.0.0.1", port))
                .await
                .unwrap()
                .unwrap();

        let hooks = HarnessHooks::<Vec<u8>>::new(None, Some(connector));
        let mut sender = DemoEngine::new(2, 150, hooks, Arc::new(IrInbox::new())).with_sender(
            SendSchedule {
                cycle_ticks: 0,
                beacon_ticks: 1,
            },
        );
        assert!(sender.select(4));
        sender.tick().unwrap();

        let burst = u64::try_from(BURST_LEN).unwrap();
        for _ in 0..200 {
            if listener.frames_relayed() >= burst {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(listener.frames_relayed(), burst);

        let silent = HarnessHooks::<Vec<u8>>::new(None, None);
        let mut receiver = DemoEngine::new(2, 150, silent, Arc::clone(&inbox));
        receiver.tick().unwrap();
        assert_eq!(receiver.current_index(), 4);

        sender.hooks_mut().close_outbound();
        listener.shutdown().await;
    }
}
