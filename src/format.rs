//! The format adapter used for a schema depends on the type the registry reports for it. All the
//! format specific work is done here, so the cache and the wire format don't need to know which
//! format is in use.
use apache_avro::types::Value;
use prost::{Message, Name};
use serde::de::DeserializeOwned;
use serde::ser::Serialize;

use crate::avro::AvroAdapter;
use crate::error::SRCError;
use crate::proto::ProtoAdapter;
use crate::schema_registry_common::SchemaType;

#[derive(Debug, PartialEq)]
pub enum FormatAdapter {
    Avro(AvroAdapter),
    Protobuf(ProtoAdapter),
}

impl FormatAdapter {
    /// Creates the adapter for the schema, parsing the schema once.
    pub fn init(schema_type: &SchemaType, schema: &str) -> Result<FormatAdapter, SRCError> {
        match schema_type {
            SchemaType::Avro => Ok(FormatAdapter::Avro(AvroAdapter::new(schema)?)),
            SchemaType::Protobuf => Ok(FormatAdapter::Protobuf(ProtoAdapter::new())),
            t => Err(SRCError::schema_parse(
                None::<String>,
                &format!("type {:?}, is not supported", t),
            )),
        }
    }

    pub fn schema_type(&self) -> SchemaType {
        match self {
            FormatAdapter::Avro(_) => SchemaType::Avro,
            FormatAdapter::Protobuf(_) => SchemaType::Protobuf,
        }
    }

    pub(crate) fn serialize(&self, item: impl Serialize) -> Result<Vec<u8>, SRCError> {
        match self {
            FormatAdapter::Avro(a) => a.serialize(item),
            FormatAdapter::Protobuf(_) => Err(SRCError::type_mismatch(
                "a protobuf schema can only encode protobuf messages",
            )),
        }
    }

    pub(crate) fn serialize_value(&self, value: Value) -> Result<Vec<u8>, SRCError> {
        match self {
            FormatAdapter::Avro(a) => a.serialize_value(value),
            FormatAdapter::Protobuf(_) => Err(SRCError::type_mismatch(
                "a protobuf schema can only encode protobuf messages",
            )),
        }
    }

    pub(crate) fn serialize_proto<M: Message + Name>(&self, message: &M) -> Result<Vec<u8>, SRCError> {
        match self {
            FormatAdapter::Protobuf(p) => p.serialize(message),
            FormatAdapter::Avro(_) => Err(SRCError::type_mismatch(
                "an avro schema can't encode protobuf messages",
            )),
        }
    }
}

/// Given to the decode function of a subject, to deserialize the message into the type the
/// caller wants. Which of the functions can be used depends on the format of the schema, using the
/// wrong one returns an error with kind [TypeMismatch](crate::error::ErrorKind::TypeMismatch).
pub struct Unmarshaler<'a> {
    adapter: &'a FormatAdapter,
    bytes: &'a [u8],
}

impl<'a> Unmarshaler<'a> {
    pub(crate) fn new(adapter: &'a FormatAdapter, bytes: &'a [u8]) -> Unmarshaler<'a> {
        Unmarshaler { adapter, bytes }
    }

    /// Deserializes avro data into anything implementing serde's Deserialize.
    pub fn unmarshal<D: DeserializeOwned>(&self) -> Result<D, SRCError> {
        match self.adapter {
            FormatAdapter::Avro(a) => a.deserialize(self.bytes),
            FormatAdapter::Protobuf(_) => Err(SRCError::type_mismatch(
                "protobuf data can only be unmarshalled into a protobuf message",
            )),
        }
    }

    /// Deserializes avro data into a generic avro value.
    pub fn unmarshal_value(&self) -> Result<Value, SRCError> {
        match self.adapter {
            FormatAdapter::Avro(a) => a.deserialize_value(self.bytes),
            FormatAdapter::Protobuf(_) => Err(SRCError::type_mismatch(
                "protobuf data can only be unmarshalled into a protobuf message",
            )),
        }
    }

    /// Deserializes protobuf data into the message, the message has to be the one that was wrapped.
    pub fn unmarshal_proto<M: Message + Name + Default>(&self) -> Result<M, SRCError> {
        match self.adapter {
            FormatAdapter::Protobuf(p) => p.deserialize(self.bytes),
            FormatAdapter::Avro(_) => Err(SRCError::type_mismatch(
                "avro data can't be unmarshalled into a protobuf message",
            )),
        }
    }
}
