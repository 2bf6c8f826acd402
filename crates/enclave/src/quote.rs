//! Stand-in quote format of the simulated enclave.
//!
//! ```text
//! [ "SIMQ" . 16 byte spid . 32 byte measurement . sha256(native pk) . sig_rl ]
//! ```

use arrayref::array_ref;
use ecc_types::{PUB_KEY_SIZE, SPID_SIZE};
use sha2::{Digest, Sha256};

pub const QUOTE_MAGIC: [u8; 4] = *b"SIMQ";

/// Size of a quote over an empty revocation list
pub const QUOTE_BASE_SIZE: usize = QUOTE_MAGIC.len() + SPID_SIZE + 32 + 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimQuote {
    pub spid: [u8; SPID_SIZE],
    pub measurement: [u8; 32],
    /// sha256 of the attested key in native layout
    pub key_digest: [u8; 32],
    pub sig_rl: Vec<u8>,
}

impl SimQuote {
    pub fn new(
        spid: [u8; SPID_SIZE],
        measurement: [u8; 32],
        native_pk: &[u8; PUB_KEY_SIZE],
        sig_rl: &[u8],
    ) -> Self {
        Self {
            spid,
            measurement,
            key_digest: Sha256::digest(native_pk).into(),
            sig_rl: sig_rl.to_vec(),
        }
    }

    /// Quote size for a revocation list of `sig_rl_len` bytes
    pub fn size(sig_rl_len: usize) -> usize {
        QUOTE_BASE_SIZE + sig_rl_len
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::size(self.sig_rl.len()));
        buf.extend_from_slice(&QUOTE_MAGIC);
        buf.extend_from_slice(&self.spid);
        buf.extend_from_slice(&self.measurement);
        buf.extend_from_slice(&self.key_digest);
        buf.extend_from_slice(&self.sig_rl);
        buf
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < QUOTE_BASE_SIZE || bytes[..4] != QUOTE_MAGIC {
            return None;
        }
        Some(Self {
            spid: *array_ref![bytes, 4, SPID_SIZE],
            measurement: *array_ref![bytes, 4 + SPID_SIZE, 32],
            key_digest: *array_ref![bytes, 4 + SPID_SIZE + 32, 32],
            sig_rl: bytes[QUOTE_BASE_SIZE..].to_vec(),
        })
    }

    /// Whether the quote attests `native_pk`
    pub fn attests(&self, native_pk: &[u8; PUB_KEY_SIZE]) -> bool {
        self.key_digest == <[u8; 32]>::from(Sha256::digest(native_pk))
    }
}
