use clap::Parser;
use color_eyre::{eyre::Context, Result};
use sha2::{Digest, Sha256};

use ecc_node::config::Config;
use ecc_types::SPID_SIZE;

use super::{blocking, start_enclave, stop_enclave};

#[derive(Parser)]
pub struct AttestArgs {
    /// Hex encoded service provider id, overriding the configured one
    #[arg(long)]
    pub spid: Option<String>,
}

impl AttestArgs {
    pub async fn execute(self, mut config: Config) -> Result<()> {
        if let Some(spid) = self.spid {
            config.attestation.spid = spid;
        }
        let spid: [u8; SPID_SIZE] = config.attestation.spid()?;
        let sig_rl = config.attestation.sig_rl()?;

        let (enclave, credentials) = start_enclave(&config).await?;
        println!("credentials: {}", String::from_utf8_lossy(&credentials));

        let evidence = {
            let enclave = enclave.clone();
            blocking(move || {
                let target_info = enclave.get_target_info()?;
                let material = enclave.get_remote_attestation_report(&spid, sig_rl.as_deref())?;
                Ok::<_, ecc_node::EnclaveError>((target_info, material))
            })
            .await?
        };
        let res = stop_enclave(enclave).await;

        let (target_info, material) = evidence.context("failed to collect attestation evidence")?;
        println!("target info sha256: {}", hex::encode(Sha256::digest(target_info)));
        println!("quote: {}", hex::encode(&material.quote));
        println!("enclave pk: {}", hex::encode(&material.enclave_pk));
        res
    }
}
