use std::{sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{eyre::bail, Result};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use ecc_node::{
    config::Config,
    mock::{MockLedger, MockStub},
};

use super::{blocking, start_enclave, stop_enclave};

#[derive(Parser)]
pub struct InvokeArgs {
    /// Number of concurrent invocations to run
    #[arg(short, long, default_value_t = 1)]
    pub repeat: usize,
    /// Deadline for each invocation, in seconds
    #[arg(short, long, default_value_t = 30)]
    pub timeout: u64,
    /// Chaincode function followed by its arguments
    #[arg(required = true, trailing_var_arg = true)]
    pub args: Vec<String>,
}

impl InvokeArgs {
    pub async fn execute(self, config: Config) -> Result<()> {
        let (enclave, _) = start_enclave(&config).await?;
        {
            let enclave = enclave.clone();
            blocking(move || enclave.bind(None, None)).await??;
        }

        let ledger = MockLedger::default();
        let deadline = Duration::from_secs(self.timeout);
        let mut calls = JoinSet::new();
        for i in 0..self.repeat {
            let enclave = enclave.clone();
            let stub = Arc::new(MockStub::new(ledger.clone(), self.args.clone()));
            calls.spawn(async move {
                let res = tokio::time::timeout(deadline, blocking(move || enclave.invoke(stub))).await;
                (i, res)
            });
        }

        let mut failed = 0;
        while let Some(joined) = calls.join_next().await {
            let Ok((i, res)) = joined else {
                failed += 1;
                continue;
            };
            match res {
                Ok(Ok(Ok(response))) => {
                    info!(call = i, len = response.len(), "Invocation succeeded");
                    println!("{i}: {}", String::from_utf8_lossy(&response));
                }
                Ok(Ok(Err(e))) => {
                    error!(call = i, error = format!("{e:#}"), "Invocation failed");
                    failed += 1;
                }
                Ok(Err(e)) => {
                    error!(call = i, error = format!("{e:#}"));
                    failed += 1;
                }
                // the call keeps its enclave slot until the enclave returns
                Err(_) => {
                    warn!(call = i, "Invocation timed out after {}s", self.timeout);
                    failed += 1;
                }
            }
        }

        stop_enclave(enclave).await?;
        if failed > 0 {
            bail!("{failed} of {} invocations failed", self.repeat);
        }
        Ok(())
    }
}
