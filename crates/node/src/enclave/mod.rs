//! Lifecycle and entry points of a single enclave instance.

use std::{path::PathBuf, sync::Arc};

use ecc_types::{
    pubkey::PublicKeyError, ChaincodeStub, EnclaveBackend, EnclaveId, EnclavePublicKey, Status,
    StubError, ENCLAVE_TCS_NUM, MAX_RESPONSE_SIZE, REPORT_SIZE, SUCCESS, TARGET_INFO_SIZE,
};
use opentelemetry::{global::meter_provider, metrics::Counter};
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard};
use sgx_isa::{Report, Targetinfo};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    callbacks::{CallbackError, Callbacks},
    config::{ConfigError, EnclaveConfig},
    gate::Gate,
    marshal::{self, MarshalError, ResponseBuffer},
    mrenclave::{read_mr_enclave, MrEnclaveError},
    registry::Registry,
};

mod attestation;
#[cfg(feature = "sgx")]
pub mod sgx;

pub use attestation::AttestationMaterial;

#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("{op} failed with status {code}")]
    Native { op: &'static str, code: Status },
    #[error("invoke failed with status {0}")]
    Invoke(Status),
    #[error("enclave has not been created")]
    NotCreated,
    #[error("enclave is already created")]
    AlreadyCreated,
    #[error("enclave has been destroyed")]
    Destroyed,
    #[error("enclave failed to tear down and can not be used anymore")]
    Unusable,
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("callback {op} failed: {source}")]
    Callback {
        op: &'static str,
        #[source]
        source: CallbackError,
    },
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    #[error("failed to decode response envelope: {0}")]
    Envelope(#[from] prost::DecodeError),
    #[error("invalid enclave public key: {0}")]
    PublicKey(#[from] PublicKeyError),
    #[error(transparent)]
    Stub(#[from] StubError),
    #[error("spid must be 16 bytes, got {0}")]
    InvalidSpid(usize),
    #[error("report must be {REPORT_SIZE} bytes, got {0}")]
    InvalidReport(usize),
    #[error("enclave returned a malformed target info")]
    InvalidTargetInfo,
}

/// Lifecycle state of the managed instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Created { eid: EnclaveId, bound: bool },
    Destroyed,
    /// Destroy failed, the instance is in an unknown state
    Unusable,
}

impl State {
    /// Id of the live instance, for operations that enter the enclave
    fn eid(&self) -> Result<EnclaveId, EnclaveError> {
        match *self {
            State::Created { eid, .. } => Ok(eid),
            State::Uninitialized => Err(EnclaveError::NotCreated),
            State::Destroyed => Err(EnclaveError::Destroyed),
            State::Unusable => Err(EnclaveError::Unusable),
        }
    }
}

/// Host side manager of one enclave instance.
///
/// Operations that enter the enclave run concurrently up to the number of
/// enclave thread slots. Create and destroy are exclusive.
pub struct Enclave {
    backend: Arc<dyn EnclaveBackend>,
    callbacks: Callbacks,
    gate: Gate,
    state: RwLock<State>,
    max_response_size: usize,
    mrenclave_path: PathBuf,
    success: Counter<u64>,
    failure: Counter<u64>,
}

impl Enclave {
    /// Manager using the process wide callback registry.
    ///
    /// The native backend delivers callbacks through exported symbols that
    /// can only reach [`Registry::global`], so it must be driven this way.
    pub fn new(backend: Arc<dyn EnclaveBackend>) -> Self {
        Self::with_registry(backend, Registry::global())
    }

    /// Manager with its own callback registry
    pub fn with_registry(backend: Arc<dyn EnclaveBackend>, registry: Arc<Registry>) -> Self {
        let meter = meter_provider().meter("ecc");
        let success = meter
            .u64_counter("invoke_success")
            .with_description("Number of successful enclave invocations")
            .build();
        let failure = meter
            .u64_counter("invoke_failure")
            .with_description("Number of failed enclave invocations")
            .build();

        Self {
            backend,
            callbacks: Callbacks::new(registry),
            gate: Gate::new(ENCLAVE_TCS_NUM),
            state: RwLock::new(State::Uninitialized),
            max_response_size: MAX_RESPONSE_SIZE,
            mrenclave_path: "mrenclave".into(),
            success,
            failure,
        }
    }

    pub fn from_config(
        backend: Arc<dyn EnclaveBackend>,
        config: &EnclaveConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(backend)
            .with_slots(config.tcs_num)
            .with_max_response_size(config.max_response_size)
            .with_mrenclave_path(config.mrenclave_path.clone()))
    }

    /// Number of threads allowed inside the enclave at once
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.gate = Gate::new(slots);
        self
    }

    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    pub fn with_mrenclave_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mrenclave_path = path.into();
        self
    }

    pub fn state(&self) -> State {
        *self.state.read()
    }

    pub fn is_bound(&self) -> bool {
        matches!(*self.state.read(), State::Created { bound: true, .. })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.callbacks.registry()
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Read lock on a created instance, returning its id
    fn live(&self) -> Result<(RwLockReadGuard<'_, State>, EnclaveId), EnclaveError> {
        let state = self.state.read();
        let eid = state.eid()?;
        Ok((state, eid))
    }

    /// Load and initialize the enclave, returning its credentials
    #[instrument(skip(self, cc_parameters, attestation_parameters, host_parameters))]
    pub fn create(
        &self,
        library_path: &str,
        cc_parameters: &[u8],
        attestation_parameters: &[u8],
        host_parameters: &[u8],
    ) -> Result<Vec<u8>, EnclaveError> {
        let mut state = self.state.write();
        match *state {
            State::Uninitialized => {}
            State::Created { .. } => return Err(EnclaveError::AlreadyCreated),
            State::Destroyed => return Err(EnclaveError::Destroyed),
            State::Unusable => return Err(EnclaveError::Unusable),
        }

        let mut eid = 0;
        let mut credentials = ResponseBuffer::new(self.max_response_size);
        let status = {
            let (buf, len) = credentials.parts();
            let _permit = self.gate.acquire();
            self.backend.create_enclave(
                &mut eid,
                library_path,
                attestation_parameters,
                cc_parameters,
                host_parameters,
                buf,
                len,
            )
        };
        if status != SUCCESS {
            error!(status, "Can not create enclave");
            return Err(EnclaveError::Native {
                op: "create_enclave",
                code: status,
            });
        }

        let credentials = match credentials.into_bytes() {
            Ok(credentials) => credentials,
            Err(e) => {
                // the instance exists but its output can not be trusted
                let status = self.backend.destroy_enclave(eid);
                if status != SUCCESS {
                    warn!(eid, status, "failed to tear down enclave after bad credentials");
                }
                return Err(e.into());
            }
        };

        *state = State::Created { eid, bound: false };
        info!("Enclave created with {eid}");
        Ok(credentials)
    }

    /// Local attestation target descriptor of the enclave
    #[instrument(skip(self))]
    pub fn get_target_info(&self) -> Result<[u8; TARGET_INFO_SIZE], EnclaveError> {
        let (_state, eid) = self.live()?;
        let mut target_info = [0u8; TARGET_INFO_SIZE];
        let status = {
            let _permit = self.gate.acquire();
            self.backend.get_target_info(eid, &mut target_info)
        };
        if status != SUCCESS {
            return Err(EnclaveError::Native {
                op: "get_target_info",
                code: status,
            });
        }
        Targetinfo::try_copy_from(&target_info).ok_or(EnclaveError::InvalidTargetInfo)?;
        Ok(target_info)
    }

    /// Bind the enclave to a peer trusted component.
    ///
    /// With either argument missing this is the degenerate bind used for
    /// self initialization. `enclave_pk` is a DER encoded public key.
    #[instrument(skip_all, fields(degenerate = report.is_none() || enclave_pk.is_none()))]
    pub fn bind(
        &self,
        report: Option<&[u8]>,
        enclave_pk: Option<&[u8]>,
    ) -> Result<(), EnclaveError> {
        let state = self.state.upgradable_read();
        let eid = state.eid()?;

        let status = match (report, enclave_pk) {
            (Some(report), Some(enclave_pk)) => {
                if report.len() != REPORT_SIZE || Report::try_copy_from(report).is_none() {
                    return Err(EnclaveError::InvalidReport(report.len()));
                }
                let native = EnclavePublicKey::from_der(enclave_pk)?.to_native();
                let _permit = self.gate.acquire();
                self.backend.bind(eid, Some(report), Some(&native))
            }
            _ => {
                let _permit = self.gate.acquire();
                self.backend.bind(eid, None, None)
            }
        };
        if status != SUCCESS {
            return Err(EnclaveError::Native {
                op: "bind",
                code: status,
            });
        }

        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        *state = State::Created { eid, bound: true };
        debug!(eid, "Enclave bound");
        Ok(())
    }

    /// Run one transaction in the enclave, returning its opaque response
    #[instrument(skip_all)]
    pub fn invoke(&self, stub: Arc<dyn ChaincodeStub>) -> Result<Vec<u8>, EnclaveError> {
        let res = self.invoke_inner(stub);
        match &res {
            Ok(_) => self.success.add(1, &[]),
            Err(e) => {
                warn!(error = format!("{e:#}"), "Invoke failed");
                self.failure.add(1, &[]);
            }
        }
        res
    }

    fn invoke_inner(&self, stub: Arc<dyn ChaincodeStub>) -> Result<Vec<u8>, EnclaveError> {
        let (_state, eid) = self.live()?;

        let args = stub.get_string_args();
        for (i, arg) in args.iter().enumerate() {
            debug!("arg {i}: {arg}");
        }
        let request = marshal::encode_request(&args);
        let proposal = marshal::encode_signed_proposal(&stub.get_signed_proposal()?);
        marshal::len_u32(&request)?;
        marshal::len_u32(&proposal)?;

        let registration = self.callbacks.registry().scoped(stub);
        let mut response = ResponseBuffer::new(self.max_response_size);
        let status = {
            let (buf, len) = response.parts();
            let _permit = self.gate.acquire();
            self.backend.invoke(
                eid,
                &proposal,
                &request,
                buf,
                len,
                registration.context(),
                &self.callbacks,
            )
        };

        if let Some(fault) = registration.take_fault() {
            return Err(EnclaveError::Callback {
                op: fault.op,
                source: fault.error,
            });
        }
        if status != SUCCESS {
            return Err(EnclaveError::Invoke(status));
        }
        Ok(marshal::decode_response(&response.into_bytes()?)?)
    }

    /// Tear down the enclave. Waits for calls in flight to leave it.
    #[instrument(skip(self))]
    pub fn destroy(&self) -> Result<(), EnclaveError> {
        let mut state = self.state.write();
        let eid = state.eid()?;
        let status = self.backend.destroy_enclave(eid);
        if status != SUCCESS {
            error!(eid, status, "Failed to destroy enclave");
            *state = State::Unusable;
            return Err(EnclaveError::Native {
                op: "destroy_enclave",
                code: status,
            });
        }
        *state = State::Destroyed;
        info!("Enclave {eid} destroyed");
        Ok(())
    }

    /// Expected enclave measurement, read from the configured artifact
    pub fn mr_enclave(&self) -> Result<String, MrEnclaveError> {
        read_mr_enclave(&self.mrenclave_path)
    }
}

/// Backend selected by the enabled features: the native library under `sgx`,
/// else the in-process simulation.
#[cfg(feature = "sgx")]
pub fn default_backend() -> Arc<dyn EnclaveBackend> {
    Arc::new(sgx::SgxBackend)
}

/// Backend selected by the enabled features: the native library under `sgx`,
/// else the in-process simulation.
#[cfg(all(feature = "nosgx", not(feature = "sgx")))]
pub fn default_backend() -> Arc<dyn EnclaveBackend> {
    Arc::new(ecc_enclave::SimEnclave::new())
}

#[cfg(test)]
mod tests;
