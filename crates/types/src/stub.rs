//! Capability interface to the external ledger for one transaction.

use thiserror::Error;

use crate::{composite::CompositeKeyError, proto::SignedProposal};

#[derive(Debug, Error)]
pub enum StubError {
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error(transparent)]
    CompositeKey(#[from] CompositeKeyError),
    #[error("iterator already closed")]
    IteratorClosed,
}

/// A single ledger entry returned by a range query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    /// Native ledger key
    pub key: String,
    pub value: Vec<u8>,
}

/// Forward iterator over a range query. Must be closed once consumed.
pub trait StateQueryIterator: Iterator<Item = Result<KeyValue, StubError>> + Send {
    fn close(&mut self) -> Result<(), StubError>;
}

/// Access to ledger state and transaction data for a single transaction
pub trait ChaincodeStub: Send + Sync {
    /// Serialized identity of the transaction creator
    fn get_creator(&self) -> Result<Vec<u8>, StubError>;

    /// Read a key, `None` if absent
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StubError>;

    fn put_state(&self, key: &str, value: &[u8]) -> Result<(), StubError>;

    /// Iterate over all keys sharing the given composite key prefix
    fn get_state_by_partial_composite_key(
        &self,
        object_type: &str,
        attributes: &[String],
    ) -> Result<Box<dyn StateQueryIterator + '_>, StubError>;

    /// Build the native composite key for an object type and attributes
    fn create_composite_key(
        &self,
        object_type: &str,
        attributes: &[String],
    ) -> Result<String, StubError> {
        Ok(crate::composite::create_composite_key(object_type, attributes)?)
    }

    fn get_signed_proposal(&self) -> Result<SignedProposal, StubError>;

    /// Transaction arguments, function name first
    fn get_string_args(&self) -> Vec<String>;
}
