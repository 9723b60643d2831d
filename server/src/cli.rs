//! Process argument parsing: the config file location and debug-logging toggle.

use clap::Parser;

use crate::const_settings::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(name = "pixelcanvasd", about = "A shared-canvas pixel server")]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Enable debug-level logging regardless of `logging.level` in the config file.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}
