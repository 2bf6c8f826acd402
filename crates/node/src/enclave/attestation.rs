use ecc_types::{EnclavePublicKey, PUB_KEY_SIZE, SPID_SIZE, SUCCESS};
use tracing::{debug, instrument};

use super::{Enclave, EnclaveError};

/// Remote attestation evidence of the enclave
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationMaterial {
    pub quote: Vec<u8>,
    /// DER encoded SubjectPublicKeyInfo of the enclave key
    pub enclave_pk: Vec<u8>,
}

impl Enclave {
    /// Produce a quote over the enclave report together with the enclave
    /// public key, for verification by a remote party.
    #[instrument(skip_all, fields(sig_rl_len = sig_rl.map(<[u8]>::len)))]
    pub fn get_remote_attestation_report(
        &self,
        spid: &[u8],
        sig_rl: Option<&[u8]>,
    ) -> Result<AttestationMaterial, EnclaveError> {
        let spid: &[u8; SPID_SIZE] = spid
            .try_into()
            .map_err(|_| EnclaveError::InvalidSpid(spid.len()))?;
        let sig_rl = sig_rl.filter(|sig_rl| !sig_rl.is_empty());
        let (_state, eid) = self.live()?;

        let mut quote_size = 0;
        let status = self.backend.get_quote_size(sig_rl, &mut quote_size);
        if status != SUCCESS {
            return Err(EnclaveError::Native {
                op: "get_quote_size",
                code: status,
            });
        }
        debug!(quote_size);

        let mut quote = vec![0u8; quote_size as usize];
        let mut pubkey = [0u8; PUB_KEY_SIZE];
        let status = {
            let _permit = self.gate.acquire();
            self.backend
                .get_remote_attestation_report(eid, &mut quote, &mut pubkey, spid, sig_rl)
        };
        if status != SUCCESS {
            return Err(EnclaveError::Native {
                op: "get_remote_attestation_report",
                code: status,
            });
        }

        let enclave_pk = EnclavePublicKey::from_native(&pubkey)?.to_der()?;
        Ok(AttestationMaterial { quote, enclave_pk })
    }

    /// Local attestation report for a peer enclave on the same host.
    ///
    /// Not supported by the enclave library yet.
    pub fn get_local_attestation_report(
        &self,
        _target_info: &[u8],
    ) -> Result<Vec<u8>, EnclaveError> {
        let (_state, _) = self.live()?;
        Err(EnclaveError::NotImplemented("get_local_attestation_report"))
    }
}
