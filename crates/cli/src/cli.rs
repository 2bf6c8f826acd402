use std::path::PathBuf;

use clap::Parser;

use crate::commands::Command;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true, env("ECC_CONFIG"), default_value = "~/.config/ecc/config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}
