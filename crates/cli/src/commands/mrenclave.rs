use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;

use ecc_node::{config::Config, mrenclave::read_mr_enclave};

#[derive(Parser)]
pub struct MrEnclaveArgs {
    /// File holding the measurement. Defaults to the configured path.
    #[arg(short, long)]
    pub path: Option<PathBuf>,
}

impl MrEnclaveArgs {
    pub fn execute(self, config: Config) -> Result<()> {
        let path = self.path.unwrap_or(config.enclave.mrenclave_path);
        println!("{}", read_mr_enclave(path)?);
        Ok(())
    }
}
