//! Shared types for the enclave chaincode bridge.
//!
//! The [`abi`] module describes the calling convention between the host and
//! the enclave library; the remaining modules hold the data that crosses it.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod abi;
pub mod composite;
pub mod proto;
pub mod pubkey;
pub mod stub;

pub use abi::{EnclaveBackend, HostCalls};
pub use composite::CompositeKey;
pub use pubkey::EnclavePublicKey;
pub use stub::{ChaincodeStub, KeyValue, StateQueryIterator, StubError};

/// Identifier of a live enclave instance, as handed out by the enclave library
pub type EnclaveId = u64;

/// Integer status returned by every enclave entry point
pub type Status = i32;

/// Status code reported by a successful enclave call
pub const SUCCESS: Status = 0;

pub const EPID_SIZE: usize = 8;
pub const SPID_SIZE: usize = 16;
pub const SIGNATURE_SIZE: usize = 64;
pub const PUB_KEY_SIZE: usize = 64;
pub const TARGET_INFO_SIZE: usize = 512;
pub const REPORT_SIZE: usize = 432;
pub const CMAC_SIZE: usize = 16;

/// Number of thread control structures the enclave is built with
pub const ENCLAVE_TCS_NUM: usize = 8;

/// Upper bound for every variable length response read back from the enclave
pub const MAX_RESPONSE_SIZE: usize = 1024 * 100;

/// Handle identifying one in-flight host initiated call.
///
/// The enclave receives it as opaque context and hands it back on every
/// callback, so the host can find the ledger accessor for that call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallContext(pub u64);

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}
