//! Command-line options.

use std::path::PathBuf;

use clap::Parser;

/// Desktop harness for the Vortex LED engine with an emulated IR link.
#[derive(Debug, Parser)]
#[command(name = "vortex-harness")]
#[command(about = "Run the Vortex LED engine on a PC and relay IR between two instances")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults are used when it does not exist).
    #[arg(
        short = 'f',
        long = "config",
        env = "VORTEX_HARNESS_CONFIG",
        default_value = "vortex-harness.yaml"
    )]
    pub config: PathBuf,

    /// Use console color codes to represent LED colors.
    #[arg(short = 'c', long = "color")]
    pub color: bool,

    /// Redraw the LED line in place instead of printing a new line.
    #[arg(short = 'i', long = "in-place")]
    pub in_place: bool,

    /// Bypass the timestep and tick as fast as possible.
    #[arg(short = 't', long = "no-timestep")]
    pub no_timestep: bool,

    /// Run without the emulated IR link.
    #[arg(long = "no-ir")]
    pub no_ir: bool,

    /// Do not print LED colors.
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Print the first row of each rebuilt pattern preview.
    #[arg(short = 'p', long = "preview")]
    pub preview: bool,
}
