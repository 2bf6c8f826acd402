//! In-process simulation of the enclave library, for hosts without SGX.
//!
//! [`SimEnclave`] honors the same calling convention as the native library:
//! status codes, caller allocated buffers and out-lengths, and callbacks into
//! the host during invoke. It provides no isolation and its attestation
//! evidence is not verifiable by any real attestation service.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use ecc_types::{
    proto::{ChaincodeRequestMessage, ChaincodeResponseMessage, SignedProposal},
    CallContext, EnclaveBackend, EnclaveId, EnclavePublicKey, HostCalls, Status, PUB_KEY_SIZE,
    SPID_SIZE, SUCCESS, TARGET_INFO_SIZE,
};
use p256::SecretKey;
use parking_lot::Mutex;
use prost::Message;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

mod chaincode;
pub mod quote;

pub use chaincode::{MAX_RANGE_SIZE, MAX_VALUE_SIZE};
pub use quote::{SimQuote, QUOTE_BASE_SIZE};

/// Status of a transaction the chaincode rejected
pub const ERR_CHAINCODE: Status = 1;
pub const ERR_INVALID_PARAMETER: Status = 0x0002;
pub const ERR_OUT_OF_MEMORY: Status = 0x0003;
pub const ERR_INVALID_ENCLAVE_ID: Status = 0x2002;

/// Credentials document returned by the simulated enclave on creation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SimCredentials {
    /// Hex encoded DER public key of the enclave
    pub enclave_pk: String,
    /// Hex encoded measurement
    pub mrenclave: String,
}

struct Instance {
    key: SecretKey,
    measurement: [u8; 32],
    peer: Option<[u8; PUB_KEY_SIZE]>,
    bound: bool,
}

impl Instance {
    fn native_pk(&self) -> [u8; PUB_KEY_SIZE] {
        EnclavePublicKey::from(self.key.public_key()).to_native()
    }
}

/// Simulated enclave library
#[derive(Default)]
pub struct SimEnclave {
    instances: Mutex<HashMap<EnclaveId, Instance>>,
    next_eid: AtomicU64,
    inside: AtomicUsize,
    peak: AtomicUsize,
    failures: Mutex<HashMap<&'static str, Status>>,
}

/// Tracks one thread inside the simulated enclave
struct Inside<'a>(&'a SimEnclave);

impl<'a> Inside<'a> {
    fn enter(sim: &'a SimEnclave) -> Self {
        let now = sim.inside.fetch_add(1, Ordering::SeqCst) + 1;
        sim.peak.fetch_max(now, Ordering::SeqCst);
        Self(sim)
    }
}

impl Drop for Inside<'_> {
    fn drop(&mut self) {
        self.0.inside.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Measurement of the enclave built from `enclave_file`
pub fn measurement(enclave_file: &str) -> [u8; 32] {
    Sha256::digest(enclave_file.as_bytes()).into()
}

impl SimEnclave {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of entry point `op` fail with `status`
    pub fn fail_next(&self, op: &'static str, status: Status) {
        self.failures.lock().insert(op, status);
    }

    /// Highest number of threads seen inside the enclave at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn live_instances(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_bound(&self, eid: EnclaveId) -> bool {
        self.instances
            .lock()
            .get(&eid)
            .is_some_and(|instance| instance.bound)
    }

    /// Native public key of the peer an instance was bound to
    pub fn peer(&self, eid: EnclaveId) -> Option<[u8; PUB_KEY_SIZE]> {
        self.instances.lock().get(&eid).and_then(|i| i.peer)
    }

    fn injected(&self, op: &'static str) -> Option<Status> {
        self.failures.lock().remove(op)
    }

    fn with_instance<T>(
        &self,
        eid: EnclaveId,
        f: impl FnOnce(&mut Instance) -> Result<T, Status>,
    ) -> Result<T, Status> {
        match self.instances.lock().get_mut(&eid) {
            Some(instance) => f(instance),
            None => Err(ERR_INVALID_ENCLAVE_ID),
        }
    }
}

fn write_out(dst: &mut [u8], src: &[u8], out_len: &mut u32) -> Status {
    match u32::try_from(src.len()) {
        Ok(len) if src.len() <= dst.len() => {
            dst[..src.len()].copy_from_slice(src);
            *out_len = len;
            SUCCESS
        }
        _ => {
            *out_len = 0;
            ERR_OUT_OF_MEMORY
        }
    }
}

fn status_of(res: Result<(), Status>) -> Status {
    res.err().unwrap_or(SUCCESS)
}

impl EnclaveBackend for SimEnclave {
    fn create_enclave(
        &self,
        eid: &mut EnclaveId,
        enclave_file: &str,
        attestation_parameters: &[u8],
        cc_parameters: &[u8],
        host_parameters: &[u8],
        credentials: &mut [u8],
        credentials_len: &mut u32,
    ) -> Status {
        let _inside = Inside::enter(self);
        if let Some(status) = self.injected("create_enclave") {
            return status;
        }

        let seed = Sha256::new()
            .chain_update(attestation_parameters)
            .chain_update(cc_parameters)
            .chain_update(host_parameters)
            .finalize();
        let Ok(key) = SecretKey::from_slice(&seed) else {
            return ERR_INVALID_PARAMETER;
        };
        let instance = Instance {
            key,
            measurement: measurement(enclave_file),
            peer: None,
            bound: false,
        };

        let Ok(der) = EnclavePublicKey::from(instance.key.public_key()).to_der() else {
            return ERR_INVALID_PARAMETER;
        };
        let document = SimCredentials {
            enclave_pk: hex::encode(der),
            mrenclave: hex::encode(instance.measurement),
        };
        let Ok(document) = serde_json::to_vec(&document) else {
            return ERR_INVALID_PARAMETER;
        };
        let status = write_out(credentials, &document, credentials_len);
        if status != SUCCESS {
            return status;
        }

        *eid = self.next_eid.fetch_add(1, Ordering::SeqCst) + 1;
        self.instances.lock().insert(*eid, instance);
        info!(eid = *eid, "simulated enclave created");
        SUCCESS
    }

    fn destroy_enclave(&self, eid: EnclaveId) -> Status {
        if let Some(status) = self.injected("destroy_enclave") {
            return status;
        }
        match self.instances.lock().remove(&eid) {
            Some(_) => SUCCESS,
            None => ERR_INVALID_ENCLAVE_ID,
        }
    }

    fn get_target_info(&self, eid: EnclaveId, target_info: &mut [u8; TARGET_INFO_SIZE]) -> Status {
        let _inside = Inside::enter(self);
        if let Some(status) = self.injected("get_target_info") {
            return status;
        }
        status_of(self.with_instance(eid, |instance| {
            target_info.fill(0);
            target_info[..32].copy_from_slice(&instance.measurement);
            Ok(())
        }))
    }

    fn get_quote_size(&self, sig_rl: Option<&[u8]>, quote_size: &mut u32) -> Status {
        let size = SimQuote::size(sig_rl.map_or(0, <[u8]>::len));
        match u32::try_from(size) {
            Ok(size) => {
                *quote_size = size;
                SUCCESS
            }
            Err(_) => ERR_INVALID_PARAMETER,
        }
    }

    fn get_remote_attestation_report(
        &self,
        eid: EnclaveId,
        quote: &mut [u8],
        pubkey: &mut [u8; PUB_KEY_SIZE],
        spid: &[u8; SPID_SIZE],
        sig_rl: Option<&[u8]>,
    ) -> Status {
        let _inside = Inside::enter(self);
        if let Some(status) = self.injected("get_remote_attestation_report") {
            return status;
        }
        status_of(self.with_instance(eid, |instance| {
            let native = instance.native_pk();
            let bytes =
                SimQuote::new(*spid, instance.measurement, &native, sig_rl.unwrap_or_default())
                    .to_vec();
            if quote.len() < bytes.len() {
                return Err(ERR_INVALID_PARAMETER);
            }
            quote[..bytes.len()].copy_from_slice(&bytes);
            *pubkey = native;
            Ok(())
        }))
    }

    fn bind(
        &self,
        eid: EnclaveId,
        report: Option<&[u8]>,
        pubkey: Option<&[u8; PUB_KEY_SIZE]>,
    ) -> Status {
        let _inside = Inside::enter(self);
        if let Some(status) = self.injected("bind") {
            return status;
        }
        status_of(self.with_instance(eid, |instance| {
            instance.peer = match (report, pubkey) {
                (Some(_), Some(pubkey)) => {
                    if EnclavePublicKey::from_native(pubkey).is_err() {
                        return Err(ERR_INVALID_PARAMETER);
                    }
                    Some(*pubkey)
                }
                _ => None,
            };
            instance.bound = true;
            Ok(())
        }))
    }

    fn invoke(
        &self,
        eid: EnclaveId,
        signed_proposal: &[u8],
        request: &[u8],
        response: &mut [u8],
        response_len: &mut u32,
        ctx: CallContext,
        host: &dyn HostCalls,
    ) -> Status {
        let _inside = Inside::enter(self);
        *response_len = 0;
        if let Some(status) = self.injected("invoke") {
            return status;
        }
        if !self.instances.lock().contains_key(&eid) {
            return ERR_INVALID_ENCLAVE_ID;
        }
        if SignedProposal::decode(signed_proposal).is_err() {
            return ERR_INVALID_PARAMETER;
        }
        let Ok(args) = ChaincodeRequestMessage::decode(request).and_then(|m| m.args()) else {
            return ERR_INVALID_PARAMETER;
        };

        // the instance lock is not held here, callbacks may take a while
        let payload = match chaincode::execute(&args, host, ctx) {
            Ok(payload) => payload,
            Err(message) => {
                warn!(%ctx, reason = %message, "chaincode rejected transaction");
                return ERR_CHAINCODE;
            }
        };
        debug!(%ctx, len = payload.len(), "transaction executed");

        let envelope = ChaincodeResponseMessage {
            encrypted_response: payload,
        }
        .encode_to_vec();
        write_out(response, &envelope, response_len)
    }
}
