use std::path::{Path, PathBuf};

use thiserror::Error;

/// Number of hex characters of an enclave measurement
pub const MRENCLAVE_HEX_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum MrEnclaveError {
    #[error("failed to read mrenclave from {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("mrenclave has wrong size: expected {MRENCLAVE_HEX_LEN} hex characters, got {len}")]
    Size { len: usize },
    #[error("mrenclave is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Read the expected enclave measurement from the first line of `path`.
///
/// The value must be exactly 64 hex characters; it is returned as written.
pub fn read_mr_enclave(path: impl AsRef<Path>) -> Result<String, MrEnclaveError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| MrEnclaveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let line = content
        .lines()
        .next()
        .unwrap_or_default()
        .trim_end_matches(['\r', '\n']);
    if line.len() != MRENCLAVE_HEX_LEN {
        return Err(MrEnclaveError::Size { len: line.len() });
    }
    hex::decode(line)?;
    Ok(line.to_string())
}
