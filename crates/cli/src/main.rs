use clap::Parser;
use color_eyre::Result;
use tracing_error::ErrorLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ecc_node::config::Config;

mod cli;
mod commands;

#[cfg(not(any(feature = "sgx", feature = "nosgx")))]
compile_error!("enable either the `sgx` or the `nosgx` feature");

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(ErrorLayer::default())
        .try_init()?;

    let args = cli::Args::parse();
    let config = Config::load(&args.config)?;
    args.command.execute(config)
}
