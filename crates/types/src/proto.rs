//! Protobuf messages exchanged with the ledger and the enclave.
//!
//! Only the fields the bridge reads or writes are declared; tags match the
//! upstream definitions so unknown fields are skipped on decode.

use prost::Message;

/// Serialized identity of a transaction creator
#[derive(Clone, PartialEq, Message)]
pub struct SerializedIdentity {
    /// Membership service provider the identity was issued by
    #[prost(string, tag = "1")]
    pub mspid: String,
    /// PEM encoded X.509 certificate
    #[prost(bytes = "vec", tag = "2")]
    pub id_bytes: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignedProposal {
    #[prost(bytes = "vec", tag = "1")]
    pub proposal_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChaincodeInput {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub args: Vec<Vec<u8>>,
    #[prost(bool, tag = "3")]
    pub is_init: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct CleartextChaincodeRequest {
    #[prost(message, optional, tag = "1")]
    pub input: Option<ChaincodeInput>,
}

/// Outer request envelope handed to the enclave
#[derive(Clone, PartialEq, Message)]
pub struct ChaincodeRequestMessage {
    /// Encoded [`CleartextChaincodeRequest`]. Not yet encrypted.
    #[prost(bytes = "vec", tag = "1")]
    pub encrypted_request: Vec<u8>,
}

/// Response envelope produced by the enclave
#[derive(Clone, PartialEq, Message)]
pub struct ChaincodeResponseMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub encrypted_response: Vec<u8>,
}

impl ChaincodeRequestMessage {
    /// Wrap an ordered argument list into the request envelope
    pub fn from_args<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        let cleartext = CleartextChaincodeRequest {
            input: Some(ChaincodeInput {
                args: args.into_iter().map(Into::into).collect(),
                is_init: false,
            }),
        };
        Self {
            encrypted_request: cleartext.encode_to_vec(),
        }
    }

    /// Decode the inner cleartext request and return its argument list
    pub fn args(&self) -> Result<Vec<Vec<u8>>, prost::DecodeError> {
        let cleartext = CleartextChaincodeRequest::decode(self.encrypted_request.as_slice())?;
        Ok(cleartext.input.map(|input| input.args).unwrap_or_default())
    }
}
