use std::path::PathBuf;

use ecc_types::{ENCLAVE_TCS_NUM, MAX_RESPONSE_SIZE, SPID_SIZE};
use resolve_path::PathResolveExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("tcs_num must be at least 1")]
    NoThreadSlots,
    #[error("failed to create configuration directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write configuration to {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to read signature revocation list from {path:?}: {source}")]
    SigRl {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("spid must be {SPID_SIZE} hex encoded bytes")]
    Spid,
}

/// Top level config layout
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub enclave: EnclaveConfig,
    pub attestation: AttestationConfig,
}

/// Configuration for the enclave
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EnclaveConfig {
    /// Path to the signed enclave library
    pub library_path: PathBuf,
    /// Path to the file holding the expected enclave measurement
    pub mrenclave_path: PathBuf,
    /// Number of thread control structures the enclave was built with
    pub tcs_num: usize,
    /// Capacity for variable sized responses read back from the enclave
    pub max_response_size: usize,
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self {
            library_path: "~/.config/ecc/enclave.signed.so".into(),
            mrenclave_path: "mrenclave".into(),
            tcs_num: ENCLAVE_TCS_NUM,
            max_response_size: MAX_RESPONSE_SIZE,
        }
    }
}

impl EnclaveConfig {
    pub fn library_path(&self) -> PathBuf {
        self.library_path.resolve().to_path_buf()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tcs_num == 0 {
            return Err(ConfigError::NoThreadSlots);
        }
        Ok(())
    }
}

/// Parameters for remote attestation
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct AttestationConfig {
    /// Hex encoded service provider id
    pub spid: String,
    /// Optional signature revocation list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig_rl_path: Option<PathBuf>,
}

impl AttestationConfig {
    /// Decode the configured spid. An empty value is the all-zero spid.
    pub fn spid(&self) -> Result<[u8; SPID_SIZE], ConfigError> {
        let mut spid = [0u8; SPID_SIZE];
        if !self.spid.is_empty() {
            hex::decode_to_slice(&self.spid, &mut spid).map_err(|_| ConfigError::Spid)?;
        }
        Ok(spid)
    }

    pub fn sig_rl(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let Some(path) = self.sig_rl_path.as_ref().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(None);
        };
        let path = path.resolve().to_path_buf();
        std::fs::read(&path)
            .map(Some)
            .map_err(|source| ConfigError::SigRl { path, source })
    }
}

impl Config {
    /// Load the config, filling in missing values with defaults, and writing to disk after.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into().resolve().to_path_buf();
        debug!(config_path = ?path);

        // Read config or get the default if there is none yet
        let config: Config = match std::fs::read_to_string(&path) {
            Ok(s) => toml::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        config.enclave.validate()?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        // Write config (with potentially new items)
        std::fs::write(&path, toml::to_string_pretty(&config)?)
            .map_err(|source| ConfigError::Write { path, source })?;

        Ok(config)
    }
}
