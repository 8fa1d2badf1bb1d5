//! Avro flavour of the format adapter, using [apache-avro] to go from and to bytes.
//!
//! [apache-avro]: https://crates.io/crates/apache-avro
use std::io::Cursor;

use apache_avro::schema::{Name, Schema};
use apache_avro::types::Value;
use apache_avro::{from_avro_datum, from_value, to_avro_datum, to_value};
use serde::de::DeserializeOwned;
use serde::ser::Serialize;

use crate::error::SRCError;

/// Keeps the parsed schema, so it's only parsed once for every registered subject version.
#[derive(Debug, PartialEq)]
pub struct AvroAdapter {
    parsed: Schema,
}

impl AvroAdapter {
    pub fn new(raw: &str) -> Result<AvroAdapter, SRCError> {
        match Schema::parse_str(raw) {
            Ok(parsed) => Ok(AvroAdapter { parsed }),
            Err(e) => Err(SRCError::schema_parse(
                Some(e),
                &format!("Supplied raw value {:?} cant be turned into a Schema", raw),
            )),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.parsed
    }

    /// Full name of the record, none for other schema's.
    pub fn name(&self) -> Option<Name> {
        match &self.parsed {
            Schema::Record(record_schema) => Some(record_schema.name.clone()),
            _ => None,
        }
    }

    /// Using the schema with an item implementing serialize the item will be correctly serialized
    /// according to the avro specification.
    pub fn serialize(&self, item: impl Serialize) -> Result<Vec<u8>, SRCError> {
        match to_value(item) {
            Ok(v) => self.serialize_value(v),
            Err(e) => Err(SRCError::codec(e, "Could not transform to apache_avro value")),
        }
    }

    pub fn serialize_value(&self, value: Value) -> Result<Vec<u8>, SRCError> {
        let resolved = value
            .resolve(&self.parsed)
            .map_err(|e| SRCError::codec(e, "Failed to resolve"))?;
        to_avro_datum(&self.parsed, resolved)
            .map_err(|e| SRCError::codec(e, "Could not get Avro bytes"))
    }

    pub fn deserialize_value(&self, bytes: &[u8]) -> Result<Value, SRCError> {
        let mut reader = Cursor::new(bytes);
        from_avro_datum(&self.parsed, &mut reader, None)
            .map_err(|e| SRCError::codec(e, "Could not transform bytes using schema"))
    }

    pub fn deserialize<D: DeserializeOwned>(&self, bytes: &[u8]) -> Result<D, SRCError> {
        let value = self.deserialize_value(bytes)?;
        from_value::<D>(&value).map_err(|e| SRCError::codec(e, "Could not transform value to target"))
    }
}
