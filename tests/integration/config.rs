use std::sync::Arc;

use ecc_enclave::SimEnclave;
use ecc_node::{config::Config, mock::MockLedger, Enclave};
use ecc_types::MAX_RESPONSE_SIZE;
use eyre::Result;
use tempfile::TempDir;

use crate::common::{init_test_logging, tx, write_mrenclave, LIBRARY};

#[test]
fn test_enclave_from_partial_config() -> Result<()> {
    init_test_logging();
    let dir = TempDir::new()?;
    let mrenclave = write_mrenclave(&dir, &"ab".repeat(32));
    let path = dir.path().join("ecc").join("config.toml");
    std::fs::create_dir_all(path.parent().expect("parent"))?;
    std::fs::write(
        &path,
        format!(
            "[enclave]\ntcs_num = 2\nmrenclave_path = {:?}\n\n[attestation]\nspid = \"{}\"\n",
            mrenclave,
            "01".repeat(16)
        ),
    )?;

    let config = Config::load(&path)?;
    assert_eq!(config.enclave.tcs_num, 2);
    assert_eq!(config.enclave.max_response_size, MAX_RESPONSE_SIZE);
    assert_eq!(config.attestation.spid()?, [1; 16]);
    assert_eq!(config.attestation.sig_rl()?, None);

    // defaults were written back next to the values we set
    let written = std::fs::read_to_string(&path)?;
    assert!(written.contains("max_response_size"));
    assert_eq!(Config::load(&path)?, config);

    let sim = Arc::new(SimEnclave::new());
    let enclave = Enclave::from_config(sim.clone(), &config.enclave)?;
    assert_eq!(enclave.gate().slots(), 2);
    assert_eq!(enclave.mr_enclave()?, "ab".repeat(32));

    enclave.create(LIBRARY, b"", b"", b"")?;
    enclave.bind(None, None)?;
    let ledger = MockLedger::default();
    enclave.invoke(tx(&ledger, &["put", "k", "v"]))?;
    assert_eq!(enclave.invoke(tx(&ledger, &["get", "k"]))?, b"v");
    enclave.destroy()?;
    assert_eq!(sim.live_instances(), 0);
    Ok(())
}

#[test]
fn test_sig_rl_read_from_file() -> Result<()> {
    init_test_logging();
    let dir = TempDir::new()?;
    let sig_rl = dir.path().join("sig_rl.bin");
    std::fs::write(&sig_rl, [7u8; 24])?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!("[attestation]\nsig_rl_path = {:?}\n", sig_rl),
    )?;

    let config = Config::load(&path)?;
    assert_eq!(config.attestation.spid()?, [0; 16]);
    assert_eq!(config.attestation.sig_rl()?, Some(vec![7; 24]));
    Ok(())
}
