use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use ecc_enclave::SimEnclave;
use ecc_node::{mock::MockLedger, registry::Registry, Enclave};
use ecc_types::ENCLAVE_TCS_NUM;
use eyre::Result;
use tracing::info;

use crate::common::{init_test_logging, tx, LIBRARY};

fn enclave_with_slots(slots: usize) -> Result<(Arc<SimEnclave>, Arc<Enclave>)> {
    let sim = Arc::new(SimEnclave::new());
    let enclave =
        Enclave::with_registry(sim.clone(), Arc::new(Registry::new())).with_slots(slots);
    enclave.create(LIBRARY, b"", b"", b"")?;
    Ok((sim, Arc::new(enclave)))
}

#[test]
fn test_gate_bounds_threads_inside_enclave() -> Result<()> {
    init_test_logging();
    let (sim, enclave) = enclave_with_slots(ENCLAVE_TCS_NUM)?;
    let ledger = MockLedger::default();

    let start = Instant::now();
    thread::scope(|s| {
        for _ in 0..ENCLAVE_TCS_NUM + 4 {
            s.spawn(|| enclave.invoke(tx(&ledger, &["sleep", "100"])).expect("sleep"));
        }
    });
    let elapsed = start.elapsed();
    info!(?elapsed, peak = sim.peak_concurrency(), "All invocations returned");

    assert!(sim.peak_concurrency() <= ENCLAVE_TCS_NUM);
    // twelve calls through eight slots need at least two rounds
    assert!(elapsed >= Duration::from_millis(200));
    assert_eq!(enclave.gate().held(), 0);
    Ok(())
}

#[test]
fn test_destroy_waits_for_calls_in_flight() -> Result<()> {
    init_test_logging();
    let (sim, enclave) = enclave_with_slots(2)?;
    let ledger = MockLedger::default();

    thread::scope(|s| {
        let call = s.spawn(|| enclave.invoke(tx(&ledger, &["sleep", "200"])));
        // let the call get inside the enclave
        while enclave.gate().held() == 0 {
            thread::yield_now();
        }
        enclave.destroy().expect("destroy");
        assert_eq!(call.join().expect("join").expect("invoke"), b"OK");
    });
    assert_eq!(sim.live_instances(), 0);
    Ok(())
}

/// A caller side deadline does not free the slot of a call still inside the enclave
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_caller_keeps_slot_until_return() -> Result<()> {
    init_test_logging();
    let (_, enclave) = enclave_with_slots(1)?;
    let ledger = MockLedger::default();

    let call = {
        let enclave = enclave.clone();
        let stub = tx(&ledger, &["sleep", "300"]);
        tokio::task::spawn_blocking(move || enclave.invoke(stub))
    };
    let res = tokio::time::timeout(Duration::from_millis(50), call).await;
    assert!(res.is_err(), "call should outlive the caller deadline");
    assert_eq!(enclave.gate().held(), 1);

    let waiting = {
        let enclave = enclave.clone();
        let stub = tx(&ledger, &["put", "k", "v"]);
        tokio::task::spawn_blocking(move || enclave.invoke(stub))
    };
    let response = tokio::time::timeout(Duration::from_secs(5), waiting).await???;
    assert_eq!(response, b"OK");
    assert_eq!(enclave.gate().held(), 0);
    Ok(())
}
