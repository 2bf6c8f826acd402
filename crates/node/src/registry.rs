//! Table of live call contexts.
//!
//! Every host initiated call that may receive callbacks registers its ledger
//! accessor here and passes the returned [`CallContext`] into the enclave.
//! Callbacks resolve the context back to the accessor. All operations take a
//! single short lived lock and never perform I/O while holding it.

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use ecc_types::{CallContext, ChaincodeStub};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

use crate::callbacks::CallbackError;

static GLOBAL: LazyLock<Arc<Registry>> = LazyLock::new(Default::default);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no ledger accessor registered for {0}")]
    UnknownContext(CallContext),
    #[error("call {0} was already aborted by a failed callback")]
    Aborted(CallContext),
}

/// A callback failure recorded against a call context
#[derive(Debug)]
pub struct CallbackFault {
    /// Name of the callback that failed
    pub op: &'static str,
    pub error: CallbackError,
}

struct Entry {
    stub: Arc<dyn ChaincodeStub>,
    fault: Option<CallbackFault>,
}

#[derive(Default)]
struct Table {
    counter: u64,
    entries: HashMap<CallContext, Entry>,
}

/// Mapping from call context to ledger accessor
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Table>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process wide registry, used by the exported native callback symbols
    pub fn global() -> Arc<Registry> {
        GLOBAL.clone()
    }

    /// Register an accessor, returning a strictly increasing context id
    pub fn register(&self, stub: Arc<dyn ChaincodeStub>) -> CallContext {
        let mut table = self.inner.lock();
        table.counter += 1;
        let ctx = CallContext(table.counter);
        table.entries.insert(ctx, Entry { stub, fault: None });
        trace!(%ctx, "registered call context");
        ctx
    }

    /// Register an accessor for the lifetime of the returned guard
    pub fn scoped(self: &Arc<Self>, stub: Arc<dyn ChaincodeStub>) -> Registration {
        Registration {
            ctx: self.register(stub),
            registry: self.clone(),
        }
    }

    /// Remove a mapping. Any recorded fault is returned to the caller.
    pub fn release(&self, ctx: CallContext) -> Option<CallbackFault> {
        let entry = self.inner.lock().entries.remove(&ctx);
        trace!(%ctx, "released call context");
        entry.and_then(|entry| entry.fault)
    }

    /// Look up the accessor for a live, not yet aborted context
    pub fn resolve(&self, ctx: CallContext) -> Result<Arc<dyn ChaincodeStub>, RegistryError> {
        let table = self.inner.lock();
        match table.entries.get(&ctx) {
            None => Err(RegistryError::UnknownContext(ctx)),
            Some(Entry { fault: Some(_), .. }) => Err(RegistryError::Aborted(ctx)),
            Some(entry) => Ok(entry.stub.clone()),
        }
    }

    /// Record a callback failure against a context. Only the first fault is kept.
    pub fn record_fault(&self, ctx: CallContext, op: &'static str, error: CallbackError) {
        if let Some(entry) = self.inner.lock().entries.get_mut(&ctx) {
            entry.fault.get_or_insert(CallbackFault { op, error });
        }
    }

    /// Take the recorded fault of a context, if any
    pub fn take_fault(&self, ctx: CallContext) -> Option<CallbackFault> {
        self.inner
            .lock()
            .entries
            .get_mut(&ctx)
            .and_then(|entry| entry.fault.take())
    }

    /// Number of live contexts
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry entry that is released exactly once, when dropped
pub struct Registration {
    ctx: CallContext,
    registry: Arc<Registry>,
}

impl Registration {
    pub fn context(&self) -> CallContext {
        self.ctx
    }

    /// Take the fault recorded by a callback during this call
    pub fn take_fault(&self) -> Option<CallbackFault> {
        self.registry.take_fault(self.ctx)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(self.ctx);
    }
}
