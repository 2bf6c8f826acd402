//! Dispatch of enclave initiated callbacks to the ledger accessor of the
//! call in progress.
//!
//! Every callback first resolves its [`CallContext`] through the
//! [`Registry`]. A failure after that point is recorded against the context
//! and turns the rest of the call's callbacks into no-ops; the host side of
//! the call reports it once the enclave returns. A context the registry has
//! never seen means the enclave handed back a corrupted or foreign handle and
//! the process is aborted.

use std::{str::Utf8Error, sync::Arc};

use ecc_types::{
    composite::{is_fpc_composite_key, transform_to_fpc_key, CompositeKeyError},
    CallContext, ChaincodeStub, CompositeKey, HostCalls, StateQueryIterator, StubError,
};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    identity::{CreatorName, IdentityError},
    marshal::{write_bounded, write_c_string},
    registry::{Registry, RegistryError},
};

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error(transparent)]
    Stub(#[from] StubError),
    #[error("key is not valid UTF-8: {0}")]
    InvalidKey(#[from] Utf8Error),
    #[error(transparent)]
    CompositeKey(#[from] CompositeKeyError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Bytes of `{"key":"","value":""}` around each range query entry
const ENTRY_FRAMING: usize = 21;

/// Host side of the enclave callbacks
#[derive(Clone)]
pub struct Callbacks {
    registry: Arc<Registry>,
}

impl Callbacks {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolve `ctx` and run `f` against its accessor, recording any failure
    fn dispatch<F>(&self, op: &'static str, ctx: CallContext, f: F)
    where
        F: FnOnce(&dyn ChaincodeStub) -> Result<(), CallbackError>,
    {
        let stub = match self.registry.resolve(ctx) {
            Ok(stub) => stub,
            Err(RegistryError::Aborted(_)) => {
                debug!(%ctx, op, "skipping callback of aborted call");
                return;
            }
            Err(e @ RegistryError::UnknownContext(_)) => {
                error!(%ctx, op, "{e}; call context registry can no longer be trusted");
                std::process::abort();
            }
        };
        if let Err(error) = f(stub.as_ref()) {
            warn!(%ctx, op, %error, "callback failed, aborting call");
            self.registry.record_fault(ctx, op, error);
        }
    }

    /// Write the creator's MSP id and subject DN into the given buffers.
    ///
    /// A string that does not fit its buffer (with terminator) is not written.
    pub fn creator_name(
        stub: &dyn ChaincodeStub,
        msp_id: &mut [u8],
        dn: &mut [u8],
    ) -> Result<(), CallbackError> {
        let creator = CreatorName::from_serialized(&stub.get_creator()?)?;
        if !write_c_string(msp_id, &creator.msp_id) {
            warn!(len = creator.msp_id.len(), cap = msp_id.len(), "msp id exceeds buffer");
        }
        if !write_c_string(dn, &creator.dn) {
            warn!(len = creator.dn.len(), cap = dn.len(), "subject dn exceeds buffer");
        }
        Ok(())
    }

    /// Point read. Absent keys and values larger than `val` both report zero.
    pub fn read_state(
        stub: &dyn ChaincodeStub,
        key: &[u8],
        val: &mut [u8],
        val_len: &mut u32,
    ) -> Result<(), CallbackError> {
        *val_len = 0;
        let key = ledger_key(stub, key)?;
        let Some(data) = stub.get_state(&key)? else {
            return Ok(());
        };
        if !write_bounded(val, &data, val_len) {
            // indistinguishable from an absent key for the enclave; a key that
            // exists but reads as absent fails its integrity checks there
            warn!(len = data.len(), cap = val.len(), "state value exceeds buffer");
        }
        Ok(())
    }

    pub fn write_state(
        stub: &dyn ChaincodeStub,
        key: &[u8],
        val: &[u8],
    ) -> Result<(), CallbackError> {
        let key = ledger_key(stub, key)?;
        stub.put_state(&key, val)?;
        Ok(())
    }

    /// Prefix range scan, serialized as
    /// `[{"key":"<key>","value":"<value>"},...]` with keys in bridge form.
    /// A result larger than `values` reports zero.
    pub fn scan_state(
        stub: &dyn ChaincodeStub,
        comp_key: &[u8],
        values: &mut [u8],
        values_len: &mut u32,
    ) -> Result<(), CallbackError> {
        *values_len = 0;
        let prefix = CompositeKey::parse(std::str::from_utf8(comp_key)?)?;
        let mut iter = ClosingIterator::new(
            stub.get_state_by_partial_composite_key(&prefix.object_type, &prefix.attributes)?,
        );

        // stop building the result once it cannot fit, but keep draining so
        // ledger errors still surface
        let mut buf = Vec::from(*b"[");
        let mut total = buf.len() + 1;
        for item in iter.by_ref() {
            let item = item?;
            let key = transform_to_fpc_key(&item.key);
            let separator = usize::from(total > 2);
            total += separator + ENTRY_FRAMING + key.len() + item.value.len();
            if total > values.len() {
                buf = Vec::new();
                continue;
            }
            if separator == 1 {
                buf.push(b',');
            }
            buf.extend_from_slice(b"{\"key\":\"");
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(b"\",\"value\":\"");
            buf.extend_from_slice(&item.value);
            buf.extend_from_slice(b"\"}");
        }
        iter.close()?;

        if total > values.len() {
            warn!(len = total, cap = values.len(), "range query result exceeds buffer");
            return Ok(());
        }
        buf.push(b']');
        write_bounded(values, &buf, values_len);
        Ok(())
    }
}

/// Translate a callback supplied key into the key used by the ledger
fn ledger_key(stub: &dyn ChaincodeStub, key: &[u8]) -> Result<String, CallbackError> {
    let key = std::str::from_utf8(key)?;
    if is_fpc_composite_key(key) {
        let composite = CompositeKey::parse(key)?;
        return Ok(stub.create_composite_key(&composite.object_type, &composite.attributes)?);
    }
    Ok(key.to_string())
}

/// Range query iterator that is closed exactly once, whichever way the scan ends
struct ClosingIterator<'a> {
    inner: Box<dyn StateQueryIterator + 'a>,
    closed: bool,
}

impl<'a> ClosingIterator<'a> {
    fn new(inner: Box<dyn StateQueryIterator + 'a>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    fn close(&mut self) -> Result<(), StubError> {
        self.closed = true;
        self.inner.close()
    }
}

impl Iterator for ClosingIterator<'_> {
    type Item = Result<ecc_types::KeyValue, StubError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl Drop for ClosingIterator<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(error) = self.inner.close() {
                warn!(%error, "failed to close range query iterator");
            }
        }
    }
}

impl HostCalls for Callbacks {
    fn get_creator_name(&self, msp_id: &mut [u8], dn: &mut [u8], ctx: CallContext) {
        self.dispatch("get_creator_name", ctx, |stub| {
            Self::creator_name(stub, msp_id, dn)
        });
    }

    fn get_state(&self, key: &[u8], val: &mut [u8], val_len: &mut u32, ctx: CallContext) {
        *val_len = 0;
        self.dispatch("get_state", ctx, |stub| {
            Self::read_state(stub, key, val, val_len)
        });
    }

    fn put_state(&self, key: &[u8], val: &[u8], ctx: CallContext) {
        self.dispatch("put_state", ctx, |stub| Self::write_state(stub, key, val));
    }

    fn get_state_by_partial_composite_key(
        &self,
        comp_key: &[u8],
        values: &mut [u8],
        values_len: &mut u32,
        ctx: CallContext,
    ) {
        *values_len = 0;
        self.dispatch("get_state_by_partial_composite_key", ctx, |stub| {
            Self::scan_state(stub, comp_key, values, values_len)
        });
    }
}
