use std::{sync::Arc, thread};

use ecc_enclave::MAX_VALUE_SIZE;
use ecc_node::{
    mock::{MockLedger, MockStub},
    EnclaveError,
};
use eyre::Result;
use tracing::info;

use crate::common::{init_test_logging, ready_enclave, tx};

#[test]
fn test_range_query_through_enclave() -> Result<()> {
    init_test_logging();
    let (_, enclave) = ready_enclave()?;
    let ledger = MockLedger::default();

    enclave.invoke(tx(&ledger, &["put", ".obj.b.", "v2"]))?;
    enclave.invoke(tx(&ledger, &["put", ".obj.a.", "v1"]))?;
    enclave.invoke(tx(&ledger, &["put", ".other.c.", "v3"]))?;
    enclave.invoke(tx(&ledger, &["put", "plain", "v4"]))?;

    // composite keys are stored in the ledger's native form
    assert!(ledger.lock().contains_key("\u{0}obj\u{0}a\u{0}"));
    assert!(ledger.lock().contains_key("plain"));

    let stub = MockStub::new(ledger.clone(), ["range", ".obj."]);
    let response = enclave.invoke(Arc::new(stub.clone()))?;
    assert_eq!(
        String::from_utf8(response)?,
        r#"[{"key":".obj.a.","value":"v1"},{"key":".obj.b.","value":"v2"}]"#
    );
    assert_eq!(stub.closed_iterators(), 1);
    Ok(())
}

#[test]
fn test_absent_and_oversized_values_read_as_empty() -> Result<()> {
    init_test_logging();
    let (_, enclave) = ready_enclave()?;
    let ledger = MockLedger::default();
    ledger
        .lock()
        .insert("huge".into(), vec![b'x'; MAX_VALUE_SIZE + 1]);
    ledger.lock().insert("fits".into(), vec![b'x'; MAX_VALUE_SIZE]);

    assert!(enclave.invoke(tx(&ledger, &["get", "missing"]))?.is_empty());
    assert!(enclave.invoke(tx(&ledger, &["get", "huge"]))?.is_empty());
    assert_eq!(enclave.invoke(tx(&ledger, &["get", "fits"]))?.len(), MAX_VALUE_SIZE);
    Ok(())
}

#[test]
fn test_creator_identity() -> Result<()> {
    init_test_logging();
    let (_, enclave) = ready_enclave()?;
    let response = enclave.invoke(tx(&MockLedger::default(), &["creator"]))?;
    let response = String::from_utf8(response)?;
    let (msp_id, dn) = response.split_once('\n').expect("msp id and dn");
    info!(msp_id, dn, "Creator");
    assert_eq!(msp_id, "Org1MSP");
    assert_eq!(
        dn,
        "CN=User1@org1.example.com,OU=client,O=org1.example.com,L=San Francisco,ST=California,C=US"
    );
    Ok(())
}

#[test]
fn test_malformed_creator_aborts_call() -> Result<()> {
    init_test_logging();
    let (_, enclave) = ready_enclave()?;
    let stub = MockStub::new(MockLedger::default(), ["creator"]).with_creator(b"garbage".to_vec());
    match enclave.invoke(Arc::new(stub)) {
        Err(EnclaveError::Callback { op, .. }) => assert_eq!(op, "get_creator_name"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(enclave.registry().is_empty());
    Ok(())
}

#[test]
fn test_store_failure_aborts_call() -> Result<()> {
    init_test_logging();
    let (_, enclave) = ready_enclave()?;
    let ledger = MockLedger::default();
    let stub = MockStub::new(ledger.clone(), ["put", "k", "v"]).with_failing_writes();
    assert!(matches!(
        enclave.invoke(Arc::new(stub)),
        Err(EnclaveError::Callback { op: "put_state", .. })
    ));
    assert!(ledger.lock().is_empty());
    Ok(())
}

/// Concurrent transactions each see only their own ledger
#[test]
fn test_concurrent_calls_are_isolated() -> Result<()> {
    init_test_logging();
    let (_, enclave) = ready_enclave()?;
    let ledgers = (0..16).map(|_| MockLedger::default()).collect::<Vec<_>>();

    thread::scope(|s| {
        for (i, ledger) in ledgers.iter().enumerate() {
            let enclave = &enclave;
            s.spawn(move || {
                let value = format!("value-{i}");
                for _ in 0..10 {
                    enclave
                        .invoke(tx(ledger, &["put", "k", &value]))
                        .expect("put");
                    let read = enclave.invoke(tx(ledger, &["get", "k"])).expect("get");
                    assert_eq!(read, value.as_bytes());
                }
            });
        }
    });

    for (i, ledger) in ledgers.iter().enumerate() {
        let ledger = ledger.lock();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("k"), Some(&format!("value-{i}").into_bytes()));
    }
    assert!(enclave.registry().is_empty());
    Ok(())
}
