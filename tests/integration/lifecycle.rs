use ecc_enclave::{measurement, SimCredentials, SimQuote};
use ecc_node::{mock::MockLedger, EnclaveError, State};
use ecc_types::{EnclavePublicKey, REPORT_SIZE};
use eyre::Result;
use tempfile::TempDir;
use tracing::info;

use crate::common::{init_test_logging, ready_enclave, sim_enclave, tx, write_mrenclave, LIBRARY};

/// Full lifecycle of one instance: create, attest, bind, transact, destroy
#[test]
fn test_full_lifecycle() -> Result<()> {
    init_test_logging();

    let (sim, enclave) = sim_enclave();
    let credentials = enclave.create(LIBRARY, b"cc", b"attestation", b"host")?;
    let credentials: SimCredentials = serde_json::from_slice(&credentials)?;
    info!(?credentials, "Enclave created");

    let target_info = enclave.get_target_info()?;
    assert_eq!(target_info[..32], measurement(LIBRARY));

    let material = enclave.get_remote_attestation_report(&[1; 16], None)?;
    let quote = SimQuote::parse(&material.quote).expect("simulated quote");
    assert_eq!(quote.measurement, measurement(LIBRARY));
    assert!(quote.sig_rl.is_empty());

    // the attested key is the one announced in the credentials
    assert_eq!(hex::encode(&material.enclave_pk), credentials.enclave_pk);
    let key = EnclavePublicKey::from_der(&material.enclave_pk)?;
    assert!(quote.attests(&key.to_native()));

    // bind to a second trusted component
    let (_, peer) = sim_enclave();
    peer.create("/opt/ecc/tlcc.signed.so", b"", b"", b"")?;
    let peer_material = peer.get_remote_attestation_report(&[1; 16], None)?;
    enclave.bind(Some(&[0; REPORT_SIZE][..]), Some(peer_material.enclave_pk.as_slice()))?;
    assert!(enclave.is_bound());
    assert_eq!(
        sim.peer(1),
        Some(EnclavePublicKey::from_der(&peer_material.enclave_pk)?.to_native())
    );

    let ledger = MockLedger::default();
    enclave.invoke(tx(&ledger, &["put", "asset1", "100"]))?;
    assert_eq!(enclave.invoke(tx(&ledger, &["get", "asset1"]))?, b"100");

    enclave.destroy()?;
    assert_eq!(enclave.state(), State::Destroyed);
    assert_eq!(sim.live_instances(), 0);
    peer.destroy()?;
    Ok(())
}

#[test]
fn test_invoke_before_create_fails() {
    init_test_logging();
    let (_, enclave) = sim_enclave();
    let ledger = MockLedger::default();
    assert!(matches!(
        enclave.invoke(tx(&ledger, &["get", "k"])),
        Err(EnclaveError::NotCreated)
    ));
    assert!(matches!(
        enclave.get_remote_attestation_report(&[0; 16], None),
        Err(EnclaveError::NotCreated)
    ));
    assert!(matches!(enclave.bind(None, None), Err(EnclaveError::NotCreated)));
}

#[test]
fn test_enclave_entering_operations_fail_after_destroy() -> Result<()> {
    init_test_logging();
    let (_, enclave) = ready_enclave()?;
    enclave.destroy()?;

    let ledger = MockLedger::default();
    assert!(matches!(
        enclave.invoke(tx(&ledger, &["get", "k"])),
        Err(EnclaveError::Destroyed)
    ));
    assert!(matches!(enclave.get_target_info(), Err(EnclaveError::Destroyed)));
    assert!(matches!(
        enclave.get_remote_attestation_report(&[0; 16], None),
        Err(EnclaveError::Destroyed)
    ));
    assert!(matches!(
        enclave.get_local_attestation_report(&[]),
        Err(EnclaveError::Destroyed)
    ));
    assert!(matches!(enclave.bind(None, None), Err(EnclaveError::Destroyed)));

    // a second destroy is rejected and leaves the state alone
    assert!(matches!(enclave.destroy(), Err(EnclaveError::Destroyed)));
    assert_eq!(enclave.state(), State::Destroyed);
    Ok(())
}

#[test]
fn test_mr_enclave_artifact() -> Result<()> {
    init_test_logging();
    let dir = TempDir::new()?;
    let digest = hex::encode(measurement(LIBRARY));
    let (_, enclave) = sim_enclave();

    let path = write_mrenclave(&dir, &format!("{digest}\n"));
    let enclave = enclave.with_mrenclave_path(path);
    assert_eq!(enclave.mr_enclave()?, digest);

    write_mrenclave(&dir, &digest[..63]);
    assert!(enclave.mr_enclave().is_err());
    Ok(())
}
