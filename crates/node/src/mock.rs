//! In-memory ledger accessor for tests and local runs without a peer.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use ecc_types::{
    composite::create_composite_key,
    proto::{SerializedIdentity, SignedProposal},
    ChaincodeStub, KeyValue, StateQueryIterator, StubError,
};
use parking_lot::Mutex;
use prost::Message;

/// Certificate of the default mock transaction creator
pub const SAMPLE_CREATOR_CERT: &str = include_str!("../testdata/user1-cert.pem");

/// MSP id of the default mock transaction creator
pub const SAMPLE_MSP_ID: &str = "Org1MSP";

/// Shared, ordered key-value state
pub type MockLedger = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// Ledger accessor backed by an in-memory ordered map.
///
/// Stubs sharing one [`MockLedger`] see each other's writes, like
/// transactions against the same channel.
#[derive(Clone)]
pub struct MockStub {
    ledger: MockLedger,
    args: Vec<String>,
    creator: Vec<u8>,
    proposal: SignedProposal,
    fail_writes: bool,
    closed_iterators: Arc<AtomicUsize>,
}

impl Default for MockStub {
    fn default() -> Self {
        Self {
            ledger: Default::default(),
            args: vec![],
            creator: SerializedIdentity {
                mspid: SAMPLE_MSP_ID.into(),
                id_bytes: SAMPLE_CREATOR_CERT.as_bytes().to_vec(),
            }
            .encode_to_vec(),
            proposal: SignedProposal {
                proposal_bytes: b"mock proposal".to_vec(),
                signature: vec![0; 64],
            },
            fail_writes: false,
            closed_iterators: Default::default(),
        }
    }
}

impl MockStub {
    /// Stub for a transaction with the given arguments over a shared ledger
    pub fn new<S: Into<String>>(ledger: MockLedger, args: impl IntoIterator<Item = S>) -> Self {
        Self {
            ledger,
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_creator(mut self, creator: Vec<u8>) -> Self {
        self.creator = creator;
        self
    }

    /// Make every `put_state` fail
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn ledger(&self) -> &MockLedger {
        &self.ledger
    }

    /// Number of range query iterators closed so far
    pub fn closed_iterators(&self) -> usize {
        self.closed_iterators.load(Ordering::SeqCst)
    }
}

impl ChaincodeStub for MockStub {
    fn get_creator(&self) -> Result<Vec<u8>, StubError> {
        Ok(self.creator.clone())
    }

    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, StubError> {
        Ok(self.ledger.lock().get(key).cloned())
    }

    fn put_state(&self, key: &str, value: &[u8]) -> Result<(), StubError> {
        if self.fail_writes {
            return Err(StubError::Ledger(format!("write to {key:?} rejected")));
        }
        self.ledger.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_state_by_partial_composite_key(
        &self,
        object_type: &str,
        attributes: &[String],
    ) -> Result<Box<dyn StateQueryIterator + '_>, StubError> {
        let prefix = create_composite_key(object_type, attributes)?;
        let items = self
            .ledger
            .lock()
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, value)| KeyValue {
                key: key.clone(),
                value: value.clone(),
            })
            .collect::<Vec<_>>();
        Ok(Box::new(MockIterator {
            items: items.into_iter(),
            closed: false,
            counter: self.closed_iterators.clone(),
        }))
    }

    fn get_signed_proposal(&self) -> Result<SignedProposal, StubError> {
        Ok(self.proposal.clone())
    }

    fn get_string_args(&self) -> Vec<String> {
        self.args.clone()
    }
}

struct MockIterator {
    items: std::vec::IntoIter<KeyValue>,
    closed: bool,
    counter: Arc<AtomicUsize>,
}

impl Iterator for MockIterator {
    type Item = Result<KeyValue, StubError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return Some(Err(StubError::IteratorClosed));
        }
        self.items.next().map(Ok)
    }
}

impl StateQueryIterator for MockIterator {
    fn close(&mut self) -> Result<(), StubError> {
        if self.closed {
            return Err(StubError::IteratorClosed);
        }
        self.closed = true;
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
