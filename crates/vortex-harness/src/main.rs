//! Desktop harness for the Vortex LED engine.
//!
//! Runs the engine on its own tick thread, renders LED output to the
//! terminal, keeps a preview of upcoming frames fresh, and pairs with a
//! second instance over the emulated IR link.
//!
//! # Startup Sequence
//!
//! 1. Parse the command line and load `vortex-harness.yaml`
//! 2. Initialize structured logging (tracing, stderr)
//! 3. Elect an IR role and bring up the link (Host launches its Peer)
//! 4. Build the engine with terminal and IR hooks
//! 5. Start the tick thread behind the pause gate
//! 6. Read button keys from stdin
//! 7. Refresh previews and report status until Ctrl-C or `q`
//! 8. Stop the tick thread, tear down the link, reap the Peer

mod cli;
mod demo;
mod display;
mod error;
mod hooks;
mod input;
mod ir;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use vortex_core::config::HarnessConfig;
use vortex_core::gate::{GateHolder, LedShadow, PauseGate};
use vortex_core::preview::PreviewBuilder;
use vortex_core::tick::{ShutdownOutcome, TickControl, TickThread};
use vortex_link::{
    CurrentExeLauncher, FileLockElection, IrLink, LaunchError, LinkRole, LinkStatus,
    NoLaunch, ProcessLauncher, RoleElector,
};

use crate::cli::Cli;
use crate::demo::{DemoEngine, SendSchedule};
use crate::display::{DisplayStyle, TerminalDisplay};
use crate::error::HarnessError;
use crate::hooks::HarnessHooks;
use crate::input::Button;
use crate::ir::IrInbox;

/// The engine as the harness runs it.
type HarnessEngine = DemoEngine<HarnessHooks>;

/// How often the status line is logged.
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

/// Peer launching as selected by `link.launch_peer`.
#[derive(Debug)]
enum PeerLauncher {
    Auto(CurrentExeLauncher),
    Manual(NoLaunch),
}

impl ProcessLauncher for PeerLauncher {
    fn launch_peer(&self) -> Result<(), LaunchError> {
        match self {
            Self::Auto(launcher) => launcher.launch_peer(),
            Self::Manual(launcher) => launcher.launch_peer(),
        }
    }

    fn reap(&self) -> Option<std::process::ExitStatus> {
        match self {
            Self::Auto(launcher) => launcher.reap(),
            Self::Manual(launcher) => launcher.reap(),
        }
    }
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), HarnessError> {
    // 1. Command line and configuration.
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    // 2. Structured logging. LED output owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        config = %cli.config.display(),
        tickrate = config.engine.tickrate,
        led_count = config.engine.led_count,
        "vortex-harness starting"
    );

    // 3. IR role and link. The elector holds the role lock until exit.
    let inbox = Arc::new(IrInbox::new());
    let ir_enabled = config.link.enabled && !cli.no_ir;
    let elector = ir_enabled.then(|| {
        let launcher = if config.link.launch_peer {
            // The Peer must load the same file or it elects against other settings.
            let path = std::path::absolute(&cli.config).unwrap_or_else(|_| cli.config.clone());
            PeerLauncher::Auto(CurrentExeLauncher::with_config(path))
        } else {
            PeerLauncher::Manual(NoLaunch)
        };
        RoleElector::new(FileLockElection::named(&config.link.election_name), launcher)
    });

    let link = match elector.as_ref() {
        Some(elector) => {
            vortex_link::link::establish(
                elector,
                &config.link.host,
                config.link.port,
                Arc::<IrInbox>::clone(&inbox),
            )
            .await
        }
        None => {
            info!("IR link disabled");
            IrLink::Disabled
        }
    };
    let role = elector.as_ref().map_or(LinkRole::Unelected, RoleElector::role);
    info!(role = ?role, connected = !link.is_disabled(), "IR link ready");

    let (host, outbound) = match link {
        IrLink::Host(listener) => (Some(listener), None),
        IrLink::Peer(connector) => (None, Some(connector)),
        IrLink::Disabled => (None, None),
    };
    let link_watch = host.as_ref().map(|listener| watch_link(listener.subscribe()));

    // 4. Engine and hooks. The Peer is the sending side of the pair.
    let display = (!cli.quiet).then(|| {
        TerminalDisplay::stdout(DisplayStyle {
            color: cli.color,
            in_place: cli.in_place,
        })
    });
    let button = Arc::new(Button::new());
    let mut engine: HarnessEngine = DemoEngine::new(
        config.engine.led_count,
        config.engine.tickrate,
        HarnessHooks::new(display, outbound).with_button(Arc::clone(&button)),
        Arc::clone(&inbox),
    );
    if role == LinkRole::Peer {
        engine = engine.with_sender(SendSchedule {
            cycle_ticks: config.engine.cycle_ticks,
            beacon_ticks: config.engine.beacon_ticks,
        });
    }
    info!(
        modes = engine.mode_count(),
        mode = engine.current_index(),
        sender = role == LinkRole::Peer,
        "Demo engine ready"
    );

    // 5. Tick thread.
    let gate = Arc::new(PauseGate::new(engine));
    let shadow = Arc::new(LedShadow::new());
    let control = Arc::new(TickControl::new());
    let ticker = TickThread::spawn(
        Arc::clone(&gate),
        Arc::clone(&shadow),
        Arc::clone(&control),
        cli.no_timestep || config.engine.instant_timestep,
    )?;

    // 6. Keyboard. The thread is detached; it ends on EOF or `q`.
    let (quit_tx, mut quit_rx) = watch::channel(false);
    match input::spawn_stdin(button, quit_tx) {
        Ok(_) => info!("{}", input::USAGE),
        Err(e) => warn!(error = %e, "Keyboard input unavailable"),
    }

    // 7. Preview refresh and status until Ctrl-C or `q`.
    let builder = Arc::new(PreviewBuilder::new(
        Arc::clone(&gate),
        config.preview.settings(),
    ));
    let preview_printer = cli.preview.then(|| {
        tokio::spawn(display::print_previews(
            builder.subscribe(),
            std::io::stdout(),
            DisplayStyle {
                color: cli.color,
                in_place: false,
            },
        ))
    });
    let mut refresh = tokio::time::interval(config.preview.refresh_interval());
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut exit = Ok(());
    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                match signal {
                    Ok(()) => info!("Ctrl-C received, shutting down"),
                    Err(source) => exit = Err(HarnessError::Signal { source }),
                }
                break;
            }
            () = input::quit_requested(&mut quit_rx) => {
                info!("Quit requested, shutting down");
                break;
            }
            _ = refresh.tick() => refresh_preview(&builder).await,
            _ = status.tick() => {
                info!(
                    ticks = control.ticks(),
                    leds = shadow.len(),
                    first_led = ?shadow.get(0),
                    ir_dropped = inbox.dropped(),
                    "Engine status"
                );
                if let Some(elector) = elector.as_ref() {
                    elector.launcher().reap();
                }
            }
        }

        if ticker.is_finished() {
            warn!("Tick thread stopped on its own, shutting down");
            break;
        }
    }

    // 8. Shutdown: tick thread first so nothing writes to the link after it closes.
    drop(builder);
    if let Some(printer) = preview_printer
        && let Err(e) = printer.await
    {
        warn!(error = %e, "Preview printer failed");
    }
    let join_timeout = config.shutdown.join_timeout();
    // The tick thread logs its own outcome.
    match tokio::task::spawn_blocking(move || ticker.stop(join_timeout)).await {
        Ok(ShutdownOutcome::Joined(_)) => close_outbound(&gate),
        Ok(ShutdownOutcome::TimedOut | ShutdownOutcome::Panicked) => {}
        Err(e) => error!(error = %e, "Tick shutdown task failed"),
    }

    if let Some(listener) = host {
        let stats = listener.shutdown().await;
        info!(frames = stats.frames, end = ?stats.end, "IR relay stopped");
    }
    if let Some(handle) = link_watch
        && let Err(e) = handle.await
    {
        warn!(error = %e, "Link status task failed");
    }
    // A Peer that already exited is collected; a running one is left alone.
    if let Some(elector) = elector.as_ref() {
        elector.launcher().reap();
    }

    info!("vortex-harness stopped");
    exit
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> Result<HarnessConfig, HarnessError> {
    if path.exists() {
        return Ok(HarnessConfig::from_file(path)?);
    }
    let mut config = HarnessConfig::default();
    config.link.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Follow the Host's link status until the relay closes.
fn watch_link(mut status: watch::Receiver<LinkStatus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            debug!(status = ?current, "IR link status changed");
            if current == LinkStatus::Closed {
                break;
            }
        }
    })
}

/// Rebuild the preview off the async runtime; it waits on the pause gate.
async fn refresh_preview(builder: &Arc<PreviewBuilder<HarnessEngine>>) {
    let builder = Arc::clone(builder);
    match tokio::task::spawn_blocking(move || builder.refresh()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "Preview refresh failed"),
        Err(e) => warn!(error = %e, "Preview task failed"),
    }
}

/// Close the Peer's outbound connection once the tick thread is gone.
fn close_outbound(gate: &PauseGate<HarnessEngine>) {
    match gate.lock(GateHolder::Snapshot) {
        Ok(mut engine) => {
            if let Some(connector) = engine.hooks().outbound() {
                info!(
                    sent = connector.sent(),
                    dropped = connector.dropped(),
                    "Outbound IR totals"
                );
            }
            engine.hooks_mut().close_outbound();
        }
        Err(e) => warn!(error = %e, "Engine unavailable for link teardown"),
    }
}
