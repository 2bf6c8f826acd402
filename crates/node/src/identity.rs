//! Caller identity as exposed to the enclave: MSP id and subject DN.

use ecc_types::proto::SerializedIdentity;
use prost::Message;
use thiserror::Error;
use x509_parser::{
    certificate::X509Certificate,
    prelude::FromDer,
    x509::{AttributeTypeAndValue, X509Name},
};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("could not deserialize a SerializedIdentity: {0}")]
    Envelope(#[from] prost::DecodeError),
    #[error("failed to decode PEM structure: {0}")]
    Pem(#[from] ::pem::PemError),
    #[error("unable to parse certificate: {0}")]
    Certificate(String),
}

/// Issuing domain and subject of a transaction creator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatorName {
    pub msp_id: String,
    pub dn: String,
}

impl CreatorName {
    /// Parse a serialized identity envelope carrying a PEM certificate
    pub fn from_serialized(serialized: &[u8]) -> Result<Self, IdentityError> {
        let identity = SerializedIdentity::decode(serialized)?;
        let pem = ::pem::parse(&identity.id_bytes)?;
        let (_, cert) = X509Certificate::from_der(pem.contents())
            .map_err(|e| IdentityError::Certificate(e.to_string()))?;
        Ok(Self {
            msp_id: identity.mspid,
            dn: distinguished_name(cert.subject()),
        })
    }
}

/// Attribute types with a short name, in the order a name is laid out
/// before it is reversed for display
const KNOWN_ATTRIBUTES: [(&str, &str); 9] = [
    ("2.5.4.6", "C"),
    ("2.5.4.8", "ST"),
    ("2.5.4.7", "L"),
    ("2.5.4.9", "STREET"),
    ("2.5.4.17", "POSTALCODE"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("2.5.4.3", "CN"),
    ("2.5.4.5", "SERIALNUMBER"),
];

/// Single valued attribute types; the last occurrence wins
const SINGLE_VALUED: [usize; 2] = [7, 8];

/// Render a subject the way the ledger names identities.
///
/// Values are grouped by type in a fixed order, independent of the order in
/// the certificate. Each type becomes one RDN whose values are joined with
/// `+`, and the sequence is printed last RDN first. Attributes of unknown
/// type follow as `oid=#<hex DER>`.
pub fn distinguished_name(name: &X509Name<'_>) -> String {
    let mut values: [Vec<String>; KNOWN_ATTRIBUTES.len()] = Default::default();
    let mut unknown = Vec::new();
    for attr in name.iter_attributes() {
        let oid = attr.attr_type().to_id_string();
        match KNOWN_ATTRIBUTES.iter().position(|(known, _)| *known == oid) {
            // known types only carry string values
            Some(i) => {
                if let Ok(value) = attr.as_str() {
                    values[i].push(value.to_string());
                }
            }
            None => unknown.push(format!("{oid}=#{}", hex::encode(unknown_value_der(attr)))),
        }
    }
    for i in SINGLE_VALUED {
        let last = values[i].pop().filter(|v| !v.is_empty());
        values[i] = last.into_iter().collect();
    }

    let known = KNOWN_ATTRIBUTES
        .iter()
        .zip(&values)
        .filter(|(_, values)| !values.is_empty())
        .map(|((_, short), values)| {
            values
                .iter()
                .map(|value| format!("{short}={}", escape_value(value)))
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>();
    known
        .into_iter()
        .rev()
        .chain(unknown.into_iter().rev())
        .collect::<Vec<_>>()
        .join(",")
}

/// DER of an unknown attribute's value. Strings are re-encoded as a
/// PrintableString when their characters allow it, else as a UTF8String.
fn unknown_value_der(attr: &AttributeTypeAndValue<'_>) -> Vec<u8> {
    const PRINTABLE_STRING: u8 = 0x13;
    const UTF8_STRING: u8 = 0x0c;

    if let Ok(value) = attr.as_str() {
        let tag = if value.bytes().all(is_printable) {
            PRINTABLE_STRING
        } else {
            UTF8_STRING
        };
        return der_tlv(tag, value.as_bytes());
    }
    let value = attr.attr_value();
    let tag = value.header.tag().0;
    if tag >= 0x1f {
        return value.as_bytes().to_vec();
    }
    let constructed = if value.header.is_constructed() { 0x20 } else { 0 };
    der_tlv(((value.header.class() as u8) << 6) | constructed | tag as u8, value.as_bytes())
}

fn is_printable(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b" '()+,-./:=?".contains(&b)
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    if content.len() < 0x80 {
        out.push(content.len() as u8);
    } else {
        let len = content.len().to_be_bytes();
        let skip = len.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (len.len() - skip) as u8);
        out.extend_from_slice(&len[skip..]);
    }
    out.extend_from_slice(content);
    out
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let special = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && matches!(c, ' ' | '#'))
            || (i == last && c == ' ');
        if special {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
