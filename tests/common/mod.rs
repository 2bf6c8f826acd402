use std::{path::PathBuf, sync::Arc};

use ecc_enclave::SimEnclave;
use ecc_node::{
    mock::{MockLedger, MockStub},
    registry::Registry,
    Enclave,
};
use ecc_types::ChaincodeStub;
use tempfile::TempDir;
use tracing::Level;

pub const LIBRARY: &str = "/opt/ecc/enclave.signed.so";

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Enclave manager over a fresh simulated enclave and a private registry
pub fn sim_enclave() -> (Arc<SimEnclave>, Enclave) {
    let sim = Arc::new(SimEnclave::new());
    let enclave = Enclave::with_registry(sim.clone(), Arc::new(Registry::new()));
    (sim, enclave)
}

/// Created and self-bound enclave, ready for transactions
pub fn ready_enclave() -> eyre::Result<(Arc<SimEnclave>, Enclave)> {
    let (sim, enclave) = sim_enclave();
    enclave.create(LIBRARY, b"cc params", b"attestation params", b"host params")?;
    enclave.bind(None, None)?;
    Ok((sim, enclave))
}

/// Transaction with the given arguments over a shared ledger
pub fn tx(ledger: &MockLedger, args: &[&str]) -> Arc<dyn ChaincodeStub> {
    Arc::new(MockStub::new(ledger.clone(), args.iter().copied()))
}

/// Write an mrenclave artifact into `dir`, returning its path
pub fn write_mrenclave(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("mrenclave");
    std::fs::write(&path, content).expect("failed to write mrenclave artifact");
    path
}
