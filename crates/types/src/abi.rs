//! Calling convention of the enclave library.
//!
//! Both directions follow the same buffer contract: inputs are passed as
//! slices (pointer + length), variable sized outputs are written into a
//! caller allocated slice whose length is the capacity, and the callee
//! reports the number of bytes it actually wrote through a separate `u32`.
//! A callee that cannot fit its output reports zero and writes nothing.

use crate::{CallContext, EnclaveId, Status, PUB_KEY_SIZE, SPID_SIZE, TARGET_INFO_SIZE};

/// Host to enclave entry points ("ecalls").
///
/// Implemented by the native SGX binding and by the simulated enclave.
/// Every method returns [`crate::SUCCESS`] or a non-zero status code.
pub trait EnclaveBackend: Send + Sync {
    /// Load the enclave binary and run its initialization with the given
    /// parameter blobs, writing the enclave credentials into `credentials`.
    #[allow(clippy::too_many_arguments)]
    fn create_enclave(
        &self,
        eid: &mut EnclaveId,
        enclave_file: &str,
        attestation_parameters: &[u8],
        cc_parameters: &[u8],
        host_parameters: &[u8],
        credentials: &mut [u8],
        credentials_len: &mut u32,
    ) -> Status;

    fn destroy_enclave(&self, eid: EnclaveId) -> Status;

    fn get_target_info(&self, eid: EnclaveId, target_info: &mut [u8; TARGET_INFO_SIZE]) -> Status;

    /// Size of the quote the enclave will produce for a given revocation list
    fn get_quote_size(&self, sig_rl: Option<&[u8]>, quote_size: &mut u32) -> Status;

    fn get_remote_attestation_report(
        &self,
        eid: EnclaveId,
        quote: &mut [u8],
        pubkey: &mut [u8; PUB_KEY_SIZE],
        spid: &[u8; SPID_SIZE],
        sig_rl: Option<&[u8]>,
    ) -> Status;

    /// Bind to a peer trusted component. `None` for both arguments is the
    /// degenerate bind used for self initialization.
    fn bind(
        &self,
        eid: EnclaveId,
        report: Option<&[u8]>,
        pubkey: Option<&[u8; PUB_KEY_SIZE]>,
    ) -> Status;

    /// Process one transaction. While running, the enclave may call back into
    /// `host` any number of times, always passing `ctx` along.
    #[allow(clippy::too_many_arguments)]
    fn invoke(
        &self,
        eid: EnclaveId,
        signed_proposal: &[u8],
        request: &[u8],
        response: &mut [u8],
        response_len: &mut u32,
        ctx: CallContext,
        host: &dyn HostCalls,
    ) -> Status;
}

/// Enclave to host callbacks ("ocalls").
///
/// There is no error channel in this direction. A callback that fails is
/// expected to record the failure against `ctx` on the host side.
pub trait HostCalls: Send + Sync {
    /// Write the caller's MSP id and subject DN as NUL terminated strings
    fn get_creator_name(&self, msp_id: &mut [u8], dn: &mut [u8], ctx: CallContext);

    fn get_state(&self, key: &[u8], val: &mut [u8], val_len: &mut u32, ctx: CallContext);

    fn put_state(&self, key: &[u8], val: &[u8], ctx: CallContext);

    fn get_state_by_partial_composite_key(
        &self,
        comp_key: &[u8],
        values: &mut [u8],
        values_len: &mut u32,
        ctx: CallContext,
    );
}
