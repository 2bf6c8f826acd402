//! Buffer contracts for calls crossing the enclave boundary.
//!
//! Outbound payloads are handed over as exact length slices. Inbound payloads
//! use caller-allocates-max, callee-reports-actual: the receiver provides a
//! fixed capacity buffer and the producer reports the written length through
//! a separate out-parameter. A producer that cannot fit its output reports
//! zero and writes nothing, which the receiver cannot tell apart from an
//! empty result.

use ecc_types::proto::{ChaincodeRequestMessage, ChaincodeResponseMessage, SignedProposal};
use prost::Message;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("payload of {0} bytes does not fit a 32-bit length")]
    TooLarge(usize),
    #[error("enclave reported {reported} bytes for a {capacity} byte buffer")]
    Overrun { reported: u32, capacity: usize },
}

/// Length of an outbound payload as carried by the calling convention
pub fn len_u32(payload: &[u8]) -> Result<u32, MarshalError> {
    u32::try_from(payload.len()).map_err(|_| MarshalError::TooLarge(payload.len()))
}

/// Copy `src` into `dst` if it fits, reporting its length in `out_len`.
///
/// Reports zero and leaves `dst` untouched if it does not fit.
pub fn write_bounded(dst: &mut [u8], src: &[u8], out_len: &mut u32) -> bool {
    match u32::try_from(src.len()) {
        Ok(len) if src.len() <= dst.len() => {
            dst[..src.len()].copy_from_slice(src);
            *out_len = len;
            true
        }
        _ => {
            *out_len = 0;
            false
        }
    }
}

/// Copy `s` plus a NUL terminator into `dst` if both fit, else write nothing
pub fn write_c_string(dst: &mut [u8], s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() >= dst.len() {
        return false;
    }
    dst[..bytes.len()].copy_from_slice(bytes);
    dst[bytes.len()] = 0;
    true
}

/// Host allocated buffer the enclave writes a variable length response into
pub struct ResponseBuffer {
    buf: Vec<u8>,
    len: u32,
}

impl ResponseBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Buffer and out-length, as passed to the enclave
    pub fn parts(&mut self) -> (&mut [u8], &mut u32) {
        (&mut self.buf, &mut self.len)
    }

    /// The bytes the enclave reported writing
    pub fn into_bytes(mut self) -> Result<Vec<u8>, MarshalError> {
        let len = self.len as usize;
        if len > self.buf.len() {
            return Err(MarshalError::Overrun {
                reported: self.len,
                capacity: self.buf.len(),
            });
        }
        self.buf.truncate(len);
        Ok(self.buf)
    }
}

/// Build the request envelope for an argument list
pub fn encode_request<S: AsRef<str>>(args: &[S]) -> Vec<u8> {
    ChaincodeRequestMessage::from_args(args.iter().map(|arg| arg.as_ref().as_bytes().to_vec()))
        .encode_to_vec()
}

pub fn encode_signed_proposal(proposal: &SignedProposal) -> Vec<u8> {
    proposal.encode_to_vec()
}

/// Extract the opaque response payload from a response envelope
pub fn decode_response(bytes: &[u8]) -> Result<Vec<u8>, prost::DecodeError> {
    Ok(ChaincodeResponseMessage::decode(bytes)?.encrypted_response)
}
