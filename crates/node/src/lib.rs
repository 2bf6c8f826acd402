//! Host side bridge to the chaincode enclave.
//!
//! [`enclave::Enclave`] drives one enclave instance through its lifecycle.
//! Transactions enter through [`enclave::Enclave::invoke`], which registers
//! the transaction's ledger accessor in the [`registry::Registry`] for the
//! duration of the call, so callbacks coming out of the enclave reach the
//! right ledger view.

pub mod callbacks;
pub mod config;
pub mod enclave;
#[cfg(feature = "sgx")]
pub mod ffi;
pub mod gate;
pub mod identity;
pub mod marshal;
pub mod mock;
pub mod mrenclave;
pub mod registry;

pub use enclave::{AttestationMaterial, Enclave, EnclaveError, State};
