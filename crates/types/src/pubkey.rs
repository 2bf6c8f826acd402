//! Enclave public key encodings.
//!
//! The enclave exports its P-256 key in the SGX native layout: the affine x
//! and y coordinates, each 32 bytes little endian. Everything outside the
//! bridge uses DER encoded PKIX (SubjectPublicKeyInfo).

use p256::{
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::{DecodePublicKey, EncodePublicKey},
    PublicKey,
};
use thiserror::Error;

use crate::PUB_KEY_SIZE;

const COORDINATE_SIZE: usize = PUB_KEY_SIZE / 2;

#[derive(Debug, Error)]
pub enum PublicKeyError {
    #[error("expected a {PUB_KEY_SIZE} byte native key, got {0} bytes")]
    Length(usize),
    #[error("key is not a valid P-256 point: {0}")]
    Point(p256::elliptic_curve::Error),
    #[error("invalid PKIX encoding: {0}")]
    Spki(p256::pkcs8::spki::Error),
}

/// P-256 enclave public key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnclavePublicKey(PublicKey);

impl EnclavePublicKey {
    /// Parse the SGX native little endian `gx || gy` layout
    pub fn from_native(native: &[u8]) -> Result<Self, PublicKeyError> {
        if native.len() != PUB_KEY_SIZE {
            return Err(PublicKeyError::Length(native.len()));
        }
        let mut sec1 = [0u8; 1 + PUB_KEY_SIZE];
        sec1[0] = 0x04;
        for (i, byte) in native[..COORDINATE_SIZE].iter().rev().enumerate() {
            sec1[1 + i] = *byte;
        }
        for (i, byte) in native[COORDINATE_SIZE..].iter().rev().enumerate() {
            sec1[1 + COORDINATE_SIZE + i] = *byte;
        }
        PublicKey::from_sec1_bytes(&sec1)
            .map(Self)
            .map_err(PublicKeyError::Point)
    }

    /// Parse a DER encoded SubjectPublicKeyInfo
    pub fn from_der(der: &[u8]) -> Result<Self, PublicKeyError> {
        PublicKey::from_public_key_der(der)
            .map(Self)
            .map_err(PublicKeyError::Spki)
    }

    /// Encode in the SGX native layout
    pub fn to_native(&self) -> [u8; PUB_KEY_SIZE] {
        let point = self.0.to_encoded_point(false);
        let mut native = [0u8; PUB_KEY_SIZE];
        // uncompressed points of a valid public key always carry both coordinates
        if let (Some(x), Some(y)) = (point.x(), point.y()) {
            for (i, byte) in x.iter().rev().enumerate() {
                native[i] = *byte;
            }
            for (i, byte) in y.iter().rev().enumerate() {
                native[COORDINATE_SIZE + i] = *byte;
            }
        }
        native
    }

    /// Encode as DER SubjectPublicKeyInfo
    pub fn to_der(&self) -> Result<Vec<u8>, PublicKeyError> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(PublicKeyError::Spki)
    }
}

impl From<PublicKey> for EnclavePublicKey {
    fn from(key: PublicKey) -> Self {
        Self(key)
    }
}
