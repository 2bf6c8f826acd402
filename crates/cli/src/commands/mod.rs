use std::sync::Arc;

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use tracing::info;

use ecc_node::{config::Config, enclave::default_backend, Enclave};

mod attest;
mod invoke;
mod mrenclave;

#[derive(Subcommand)]
pub enum Command {
    /// Print the expected enclave measurement
    Mrenclave(mrenclave::MrEnclaveArgs),
    /// Create the enclave and print its attestation evidence
    Attest(attest::AttestArgs),
    /// Run transactions against the enclave over an in-memory ledger
    Invoke(invoke::InvokeArgs),
}

impl Command {
    /// Run the given command
    pub fn execute(self, config: Config) -> Result<()> {
        tokio::runtime::Runtime::new()?.block_on(async move {
            match self {
                Command::Mrenclave(args) => args.execute(config),
                Command::Attest(args) => args.execute(config).await,
                Command::Invoke(args) => args.execute(config).await,
            }
        })
    }
}

/// Run a blocking enclave call off the async runtime
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| eyre!("enclave task panicked: {e}"))
}

/// Create the configured enclave, returning it with its credentials
async fn start_enclave(config: &Config) -> Result<(Arc<Enclave>, Vec<u8>)> {
    let enclave = Arc::new(Enclave::from_config(default_backend(), &config.enclave)?);
    let library = config.enclave.library_path().to_string_lossy().into_owned();
    info!(library, "Starting enclave ...");

    let credentials = {
        let enclave = enclave.clone();
        blocking(move || enclave.create(&library, &[], &[], &[])).await??
    };
    Ok((enclave, credentials))
}

/// Destroy the enclave once calls still running inside it have returned
async fn stop_enclave(enclave: Arc<Enclave>) -> Result<()> {
    blocking(move || enclave.destroy()).await??;
    Ok(())
}
