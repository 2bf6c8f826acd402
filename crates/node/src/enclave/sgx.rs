//! Binding to the native enclave library, `libsgxcc`.
//!
//! Callbacks out of the enclave arrive through the symbols exported in
//! [`crate::ffi`], which resolve contexts via [`crate::registry::Registry::global`].

use std::{
    ffi::{c_char, c_void, CString},
    ptr,
};

use ecc_types::{
    CallContext, EnclaveBackend, EnclaveId, HostCalls, Status, PUB_KEY_SIZE, SPID_SIZE,
    TARGET_INFO_SIZE,
};
use tracing::warn;

/// Status reported for inputs the native calling convention can not carry
const INVALID_INPUT: Status = -1;

#[link(name = "sgxcc")]
extern "C" {
    fn sgxcc_create_enclave(
        eid: *mut EnclaveId,
        enclave_file: *const c_char,
        attestation_parameters: *const u8,
        ap_size: u32,
        cc_parameters: *const u8,
        ccp_size: u32,
        host_parameters: *const u8,
        hp_size: u32,
        credentials: *mut u8,
        credentials_max_size: u32,
        credentials_size: *mut u32,
    ) -> Status;

    fn sgxcc_destroy_enclave(eid: EnclaveId) -> Status;

    fn sgxcc_get_target_info(eid: EnclaveId, target_info: *mut u8) -> Status;

    fn sgxcc_get_quote_size(sig_rl: *const u8, sig_rl_size: u32, quote_size: *mut u32) -> Status;

    fn sgxcc_get_remote_attestation_report(
        eid: EnclaveId,
        quote: *mut u8,
        quote_size: u32,
        pubkey: *mut u8,
        spid: *const u8,
        sig_rl: *const u8,
        sig_rl_size: u32,
    ) -> Status;

    fn sgxcc_bind(eid: EnclaveId, report: *const u8, pubkey: *const u8) -> Status;

    fn sgxcc_invoke(
        eid: EnclaveId,
        signed_proposal: *const u8,
        signed_proposal_size: u32,
        request: *const u8,
        request_size: u32,
        response: *mut u8,
        response_max_size: u32,
        response_size: *mut u32,
        ctx: *mut c_void,
    ) -> Status;
}

/// Pointer and length of an optional input, null for `None`
fn optional(input: Option<&[u8]>) -> Option<(*const u8, u32)> {
    match input {
        None => Some((ptr::null(), 0)),
        Some(input) => Some((input.as_ptr(), u32::try_from(input.len()).ok()?)),
    }
}

fn sized(input: &[u8]) -> Option<(*const u8, u32)> {
    Some((input.as_ptr(), u32::try_from(input.len()).ok()?))
}

/// Capacity of an output buffer, clamped to what a `u32` can express
fn capacity(output: &[u8]) -> u32 {
    u32::try_from(output.len()).unwrap_or(u32::MAX)
}

/// Enclave backend calling into `libsgxcc`
#[derive(Clone, Copy, Debug, Default)]
pub struct SgxBackend;

impl EnclaveBackend for SgxBackend {
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
        let Ok(enclave_file) = CString::new(enclave_file) else {
            warn!("enclave path contains a NUL byte");
            return INVALID_INPUT;
        };
        let (Some(ap), Some(ccp), Some(hp)) = (
            sized(attestation_parameters),
            sized(cc_parameters),
            sized(host_parameters),
        ) else {
            return INVALID_INPUT;
        };
        // SAFETY: every pointer is valid for its stated length for the whole call
        unsafe {
            sgxcc_create_enclave(
                eid,
                enclave_file.as_ptr(),
                ap.0,
                ap.1,
                ccp.0,
                ccp.1,
                hp.0,
                hp.1,
                credentials.as_mut_ptr(),
                capacity(credentials),
                credentials_len,
            )
        }
    }

    fn destroy_enclave(&self, eid: EnclaveId) -> Status {
        // SAFETY: plain value arguments
        unsafe { sgxcc_destroy_enclave(eid) }
    }

    fn get_target_info(&self, eid: EnclaveId, target_info: &mut [u8; TARGET_INFO_SIZE]) -> Status {
        // SAFETY: the enclave writes exactly TARGET_INFO_SIZE bytes
        unsafe { sgxcc_get_target_info(eid, target_info.as_mut_ptr()) }
    }

    fn get_quote_size(&self, sig_rl: Option<&[u8]>, quote_size: &mut u32) -> Status {
        let Some((sig_rl, sig_rl_size)) = optional(sig_rl) else {
            return INVALID_INPUT;
        };
        // SAFETY: sig_rl is null or valid for sig_rl_size bytes
        unsafe { sgxcc_get_quote_size(sig_rl, sig_rl_size, quote_size) }
    }

    fn get_remote_attestation_report(
        &self,
        eid: EnclaveId,
        quote: &mut [u8],
        pubkey: &mut [u8; PUB_KEY_SIZE],
        spid: &[u8; SPID_SIZE],
        sig_rl: Option<&[u8]>,
    ) -> Status {
        let Some((sig_rl, sig_rl_size)) = optional(sig_rl) else {
            return INVALID_INPUT;
        };
        // SAFETY: buffers are valid for their stated sizes for the whole call
        unsafe {
            sgxcc_get_remote_attestation_report(
                eid,
                quote.as_mut_ptr(),
                capacity(quote),
                pubkey.as_mut_ptr(),
                spid.as_ptr(),
                sig_rl,
                sig_rl_size,
            )
        }
    }

    fn bind(
        &self,
        eid: EnclaveId,
        report: Option<&[u8]>,
        pubkey: Option<&[u8; PUB_KEY_SIZE]>,
    ) -> Status {
        let (report, pubkey) = match (report, pubkey) {
            (Some(report), Some(pubkey)) => (report.as_ptr(), pubkey.as_ptr()),
            _ => (ptr::null(), ptr::null()),
        };
        // SAFETY: both pointers are null or point at a full report and key
        unsafe { sgxcc_bind(eid, report, pubkey) }
    }

    fn invoke(
        &self,
        eid: EnclaveId,
        signed_proposal: &[u8],
        request: &[u8],
        response: &mut [u8],
        response_len: &mut u32,
        ctx: CallContext,
        _host: &dyn HostCalls,
    ) -> Status {
        let (Some(sp), Some(req)) = (sized(signed_proposal), sized(request)) else {
            return INVALID_INPUT;
        };
        let mut ctx = ctx.0;
        // SAFETY: buffers outlive the call; ctx is read back by the exported
        // callbacks only while the enclave is running this call
        unsafe {
            sgxcc_invoke(
                eid,
                sp.0,
                sp.1,
                req.0,
                req.1,
                response.as_mut_ptr(),
                capacity(response),
                response_len,
                (&mut ctx as *mut u64).cast(),
            )
        }
    }
}
