//! Protobuf flavour of the format adapter. Messages are wrapped in a `google.protobuf.Any` before
//! they are encoded, so one decode path can hand out differently typed messages. The type url in
//! the `Any` tells which message is inside.
use prost::{Message, Name};
use prost_types::Any;

use crate::error::SRCError;

/// Nothing needs to be compiled for the `Any` wrapping, the type url carries the message name.
#[derive(Debug, Default, PartialEq)]
pub struct ProtoAdapter;

impl ProtoAdapter {
    pub fn new() -> ProtoAdapter {
        ProtoAdapter
    }

    pub fn serialize<M: Message + Name>(&self, message: &M) -> Result<Vec<u8>, SRCError> {
        let any = Any::from_msg(message)
            .map_err(|e| SRCError::codec(e, "failed to add message into Any"))?;
        Ok(any.encode_to_vec())
    }

    pub fn deserialize<M: Message + Name + Default>(&self, bytes: &[u8]) -> Result<M, SRCError> {
        let any =
            Any::decode(bytes).map_err(|e| SRCError::codec(e, "failed to unmarshal Any wrapper"))?;
        let expected = M::full_name();
        if message_name(&any.type_url) != expected {
            return Err(SRCError::type_mismatch(&format!(
                "message is of type {}, while {} was requested",
                any.type_url, expected
            )));
        }
        M::decode(any.value.as_slice())
            .map_err(|e| SRCError::codec(e, "failed to unmarshal message from Any"))
    }
}

/// Only the part after the last slash identifies the message, the domain in front may differ
/// between the languages producing the message.
fn message_name(type_url: &str) -> &str {
    match type_url.rfind('/') {
        Some(i) => &type_url[i + 1..],
        None => type_url,
    }
}
