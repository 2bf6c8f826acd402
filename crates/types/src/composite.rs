//! Translation between the bridge's composite key strings and the ledger's
//! native composite keys.
//!
//! ```text
//! bridge:  .asset.red.42.
//! ledger:  \0asset\0red\042\0
//! ```

use thiserror::Error;

/// Segment separator of composite keys as seen by the enclave
pub const SEPARATOR: char = '.';

/// Segment separator (and namespace prefix) of native ledger composite keys
pub const NATIVE_SEPARATOR: char = '\u{0}';

const MAX_UNICODE_RUNE: char = '\u{10FFFF}';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositeKeyError {
    #[error("not a composite key: {0:?}")]
    NotComposite(String),
    #[error("composite key {0:?} has no object type")]
    MissingObjectType(String),
    #[error("composite key segment {0:?} contains a reserved character")]
    InvalidSegment(String),
}

/// A structured key made of an object type and ordered attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeKey {
    pub object_type: String,
    pub attributes: Vec<String>,
}

/// Returns true if `key` uses the bridge's composite key form
pub fn is_fpc_composite_key(key: &str) -> bool {
    key.starts_with(SEPARATOR) && key.ends_with(SEPARATOR)
}

/// Map a native ledger key back to the bridge form
pub fn transform_to_fpc_key(native: &str) -> String {
    native.replace(NATIVE_SEPARATOR, ".")
}

/// Build the ledger's native composite key for an object type and attributes
pub fn create_composite_key(
    object_type: &str,
    attributes: &[String],
) -> Result<String, CompositeKeyError> {
    validate_segment(object_type)?;
    let mut key = String::with_capacity(
        2 + object_type.len() + attributes.iter().map(|a| a.len() + 1).sum::<usize>(),
    );
    key.push(NATIVE_SEPARATOR);
    key.push_str(object_type);
    key.push(NATIVE_SEPARATOR);
    for attribute in attributes {
        validate_segment(attribute)?;
        key.push_str(attribute);
        key.push(NATIVE_SEPARATOR);
    }
    Ok(key)
}

fn validate_segment(segment: &str) -> Result<(), CompositeKeyError> {
    if segment.contains([NATIVE_SEPARATOR, MAX_UNICODE_RUNE]) {
        return Err(CompositeKeyError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

impl CompositeKey {
    pub fn new(object_type: impl Into<String>, attributes: Vec<String>) -> Self {
        Self {
            object_type: object_type.into(),
            attributes,
        }
    }

    /// Split a bridge form composite key into its object type and attributes
    pub fn parse(key: &str) -> Result<Self, CompositeKeyError> {
        if key.len() < 2 || !is_fpc_composite_key(key) {
            return Err(CompositeKeyError::NotComposite(key.to_string()));
        }
        let mut segments = key[1..key.len() - 1].split(SEPARATOR).map(String::from);
        let object_type = segments.next().unwrap_or_default();
        if object_type.is_empty() {
            return Err(CompositeKeyError::MissingObjectType(key.to_string()));
        }
        Ok(Self {
            object_type,
            attributes: segments.collect(),
        })
    }

    /// Render in the bridge form
    pub fn to_fpc_key(&self) -> String {
        let mut key = String::from(SEPARATOR);
        key.push_str(&self.object_type);
        key.push(SEPARATOR);
        for attribute in &self.attributes {
            key.push_str(attribute);
            key.push(SEPARATOR);
        }
        key
    }

    /// Render in the ledger's native form
    pub fn to_native_key(&self) -> Result<String, CompositeKeyError> {
        create_composite_key(&self.object_type, &self.attributes)
    }
}
