use std::{io::Write, sync::Arc, thread};

use ecc_enclave::{measurement, SimEnclave, SimQuote, ERR_CHAINCODE, ERR_OUT_OF_MEMORY};
use ecc_types::{ChaincodeStub, EnclavePublicKey, REPORT_SIZE, TARGET_INFO_SIZE};
use p256::SecretKey;

use super::*;
use crate::mock::{MockLedger, MockStub};

const LIBRARY: &str = "enclave.signed.so";

fn enclave() -> (Arc<SimEnclave>, Enclave) {
    let sim = Arc::new(SimEnclave::new());
    let enclave = Enclave::with_registry(sim.clone(), Arc::new(Registry::new()));
    (sim, enclave)
}

fn created() -> (Arc<SimEnclave>, Enclave) {
    let (sim, enclave) = enclave();
    enclave.create(LIBRARY, b"cc", b"attestation", b"host").unwrap();
    (sim, enclave)
}

fn tx(ledger: &MockLedger, args: &[&str]) -> Arc<dyn ChaincodeStub> {
    Arc::new(MockStub::new(ledger.clone(), args.iter().copied()))
}

#[test]
fn invoke_before_create_fails() {
    let (_, enclave) = enclave();
    let ledger = MockLedger::default();
    assert!(matches!(
        enclave.invoke(tx(&ledger, &["get", "k"])),
        Err(EnclaveError::NotCreated)
    ));
    assert!(matches!(enclave.get_target_info(), Err(EnclaveError::NotCreated)));
    assert!(matches!(enclave.destroy(), Err(EnclaveError::NotCreated)));
    assert_eq!(enclave.state(), State::Uninitialized);
}

#[test]
fn create_returns_credentials() {
    let (_, enclave) = enclave();
    let credentials = enclave.create(LIBRARY, b"cc", b"", b"").unwrap();
    let credentials: ecc_enclave::SimCredentials = serde_json::from_slice(&credentials).unwrap();
    assert_eq!(credentials.mrenclave, hex::encode(measurement(LIBRARY)));
    assert_eq!(enclave.state(), State::Created { eid: 1, bound: false });

    assert!(matches!(
        enclave.create(LIBRARY, b"cc", b"", b""),
        Err(EnclaveError::AlreadyCreated)
    ));
}

#[test]
fn failed_create_leaves_instance_uninitialized() {
    let (sim, enclave) = enclave();
    sim.fail_next("create_enclave", 5);
    assert!(matches!(
        enclave.create(LIBRARY, b"", b"", b""),
        Err(EnclaveError::Native { op: "create_enclave", code: 5 })
    ));
    assert_eq!(enclave.state(), State::Uninitialized);
    enclave.create(LIBRARY, b"", b"", b"").unwrap();
}

#[test]
fn invoke_round_trips_through_callbacks() {
    let (_, enclave) = created();
    let ledger = MockLedger::default();

    assert_eq!(enclave.invoke(tx(&ledger, &["put", "k", "v"])).unwrap(), b"OK");
    assert_eq!(ledger.lock().get("k").map(Vec::as_slice), Some(&b"v"[..]));
    assert_eq!(enclave.invoke(tx(&ledger, &["get", "k"])).unwrap(), b"v");

    enclave.invoke(tx(&ledger, &["put", ".obj.b.", "v2"])).unwrap();
    enclave.invoke(tx(&ledger, &["put", ".obj.a.", "v1"])).unwrap();
    assert_eq!(
        enclave.invoke(tx(&ledger, &["range", ".obj."])).unwrap(),
        br#"[{"key":".obj.a.","value":"v1"},{"key":".obj.b.","value":"v2"}]"#
    );

    let creator = enclave.invoke(tx(&ledger, &["creator"])).unwrap();
    let creator = String::from_utf8(creator).unwrap();
    assert!(creator.starts_with("Org1MSP\nCN=User1@org1.example.com,"));
    assert!(enclave.registry().is_empty());
}

#[test]
fn enclave_status_surfaces_as_invoke_error() {
    let (_, enclave) = created();
    let ledger = MockLedger::default();
    assert!(matches!(
        enclave.invoke(tx(&ledger, &["transfer"])),
        Err(EnclaveError::Invoke(ERR_CHAINCODE))
    ));
    assert!(enclave.registry().is_empty());
}

#[test]
fn callback_failure_fails_the_call() {
    let (_, enclave) = created();
    let stub = MockStub::new(MockLedger::default(), ["put", "k", "v"]).with_failing_writes();
    match enclave.invoke(Arc::new(stub)) {
        Err(EnclaveError::Callback { op, .. }) => assert_eq!(op, "put_state"),
        other => panic!("expected callback failure, got {other:?}"),
    }
    assert!(enclave.registry().is_empty());

    // the next transaction is unaffected
    let ledger = MockLedger::default();
    enclave.invoke(tx(&ledger, &["put", "k", "v"])).unwrap();
}

#[test]
fn oversized_response_is_reported_by_enclave() {
    let (_, enclave) = enclave();
    let enclave = enclave.with_max_response_size(4096);
    enclave.create(LIBRARY, b"", b"", b"").unwrap();

    let ledger = MockLedger::default();
    ledger.lock().insert("big".into(), vec![b'x'; 4000]);
    assert_eq!(enclave.invoke(tx(&ledger, &["get", "big"])).unwrap().len(), 4000);
    ledger.lock().insert("big".into(), vec![b'x'; 4096]);
    assert!(matches!(
        enclave.invoke(tx(&ledger, &["get", "big"])),
        Err(EnclaveError::Invoke(ERR_OUT_OF_MEMORY))
    ));
}

#[test]
fn operations_after_destroy_fail() {
    let (sim, enclave) = created();
    enclave.destroy().unwrap();
    assert_eq!(enclave.state(), State::Destroyed);
    assert_eq!(sim.live_instances(), 0);

    let ledger = MockLedger::default();
    assert!(matches!(
        enclave.invoke(tx(&ledger, &["get", "k"])),
        Err(EnclaveError::Destroyed)
    ));
    assert!(matches!(enclave.bind(None, None), Err(EnclaveError::Destroyed)));
    assert!(matches!(
        enclave.get_remote_attestation_report(&[0; 16], None),
        Err(EnclaveError::Destroyed)
    ));
    assert!(matches!(
        enclave.create(LIBRARY, b"", b"", b""),
        Err(EnclaveError::Destroyed)
    ));
    assert!(matches!(enclave.destroy(), Err(EnclaveError::Destroyed)));
    assert_eq!(enclave.state(), State::Destroyed);
}

#[test]
fn failed_destroy_makes_instance_unusable() {
    let (sim, enclave) = created();
    sim.fail_next("destroy_enclave", 9);
    assert!(matches!(
        enclave.destroy(),
        Err(EnclaveError::Native { op: "destroy_enclave", code: 9 })
    ));
    assert_eq!(enclave.state(), State::Unusable);
    assert!(matches!(enclave.get_target_info(), Err(EnclaveError::Unusable)));
    assert!(matches!(enclave.destroy(), Err(EnclaveError::Unusable)));
}

#[test]
fn target_info_is_full_descriptor() {
    let (_, enclave) = created();
    let target_info = enclave.get_target_info().unwrap();
    assert_eq!(target_info.len(), TARGET_INFO_SIZE);
    assert_eq!(target_info[..32], measurement(LIBRARY));
}

#[test]
fn degenerate_and_peer_bind() {
    let (sim, enclave) = created();
    enclave.bind(None, Some(&b"ignored"[..])).unwrap();
    assert!(enclave.is_bound());
    assert!(sim.is_bound(1));
    assert_eq!(sim.peer(1), None);

    let peer = EnclavePublicKey::from(SecretKey::from_slice(&[3; 32]).unwrap().public_key());
    let der = peer.to_der().unwrap();
    enclave.bind(Some(&[0; REPORT_SIZE][..]), Some(der.as_slice())).unwrap();
    assert_eq!(sim.peer(1), Some(peer.to_native()));

    assert!(matches!(
        enclave.bind(Some(&[0; 10][..]), Some(der.as_slice())),
        Err(EnclaveError::InvalidReport(10))
    ));
    assert!(matches!(
        enclave.bind(Some(&[0; REPORT_SIZE][..]), Some(&b"not der"[..])),
        Err(EnclaveError::PublicKey(_))
    ));
}

#[test]
fn failed_bind_status_is_checked() {
    let (sim, enclave) = created();
    sim.fail_next("bind", 4);
    assert!(matches!(
        enclave.bind(None, None),
        Err(EnclaveError::Native { op: "bind", code: 4 })
    ));
    assert!(!enclave.is_bound());
}

#[test]
fn remote_attestation_returns_der_key() {
    let (_, enclave) = created();
    let material = enclave
        .get_remote_attestation_report(&[7; 16], Some(&b"sig rl"[..]))
        .unwrap();
    let quote = SimQuote::parse(&material.quote).unwrap();
    assert_eq!(quote.spid, [7; 16]);
    assert_eq!(quote.sig_rl, b"sig rl");

    let key = EnclavePublicKey::from_der(&material.enclave_pk).unwrap();
    assert!(quote.attests(&key.to_native()));

    assert!(matches!(
        enclave.get_remote_attestation_report(&[7; 3], None),
        Err(EnclaveError::InvalidSpid(3))
    ));
}

#[test]
fn local_attestation_is_not_implemented() {
    let (_, enclave) = enclave();
    assert!(matches!(
        enclave.get_local_attestation_report(&[0; TARGET_INFO_SIZE]),
        Err(EnclaveError::NotCreated)
    ));

    let (_, enclave) = created();
    assert!(matches!(
        enclave.get_local_attestation_report(&[0; TARGET_INFO_SIZE]),
        Err(EnclaveError::NotImplemented("get_local_attestation_report"))
    ));
}

#[test]
fn from_config_rejects_zero_slots() {
    let config = EnclaveConfig {
        tcs_num: 0,
        ..Default::default()
    };
    assert!(matches!(
        Enclave::from_config(Arc::new(SimEnclave::new()), &config),
        Err(ConfigError::NoThreadSlots)
    ));

    let config = EnclaveConfig {
        tcs_num: 3,
        ..Default::default()
    };
    let enclave = Enclave::from_config(Arc::new(SimEnclave::new()), &config).unwrap();
    assert_eq!(enclave.gate().slots(), 3);
}

#[test]
fn mr_enclave_reads_configured_artifact() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", hex::encode(measurement(LIBRARY))).unwrap();
    let (_, enclave) = enclave();
    let enclave = enclave.with_mrenclave_path(file.path());
    assert_eq!(enclave.mr_enclave().unwrap(), hex::encode(measurement(LIBRARY)));
}

#[test]
fn concurrent_invokes_respect_slot_count() {
    let sim = Arc::new(SimEnclave::new());
    let enclave = Enclave::with_registry(sim.clone(), Arc::new(Registry::new())).with_slots(2);
    enclave.create(LIBRARY, b"", b"", b"").unwrap();

    let ledger = MockLedger::default();
    thread::scope(|s| {
        for _ in 0..6 {
            s.spawn(|| enclave.invoke(tx(&ledger, &["sleep", "30"])).unwrap());
        }
    });
    assert!(sim.peak_concurrency() <= 2);
    assert_eq!(enclave.gate().held(), 0);
    assert!(enclave.registry().is_empty());
}
