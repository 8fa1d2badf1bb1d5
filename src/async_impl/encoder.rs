use std::sync::Arc;

use apache_avro::types::Value;
use prost::{Message, Name};
use serde::ser::Serialize;

use crate::async_impl::registry::Registry;
use crate::error::SRCError;
use crate::subject_cache::Subject;

/// Encodes messages for one version of a subject. Created with
/// [with_schema](Registry::with_schema) or [with_latest_schema](Registry::with_latest_schema).
pub struct Encoder<T> {
    subject: Arc<Subject<T>>,
    registry: Registry<T>,
}

impl<T: 'static> Encoder<T> {
    pub(crate) fn new(subject: Arc<Subject<T>>, registry: Registry<T>) -> Encoder<T> {
        Encoder { subject, registry }
    }

    pub fn subject(&self) -> &Arc<Subject<T>> {
        &self.subject
    }

    /// Encodes anything serde can serialize, only for avro schemas.
    pub fn encode(&self, item: impl Serialize) -> Result<Vec<u8>, SRCError> {
        self.subject.encode(item)
    }

    pub fn encode_value(&self, value: Value) -> Result<Vec<u8>, SRCError> {
        self.subject.encode_value(value)
    }

    /// Encodes the message wrapped in an `Any`, only for protobuf schemas.
    pub fn encode_proto<M: Message + Name>(&self, message: &M) -> Result<Vec<u8>, SRCError> {
        self.subject.encode_proto(message)
    }

    /// Decodes by the schema id in the bytes, so also messages of other subjects and versions.
    pub async fn decode(&self, bytes: &[u8]) -> Result<T, SRCError> {
        self.registry.decode(bytes).await
    }
}

/// Handle that can only decode, useful for consumers of multiple subjects.
pub struct GenericDecoder<T> {
    registry: Registry<T>,
}

impl<T: 'static> GenericDecoder<T> {
    pub(crate) fn new(registry: Registry<T>) -> GenericDecoder<T> {
        GenericDecoder { registry }
    }

    pub async fn decode(&self, bytes: &[u8]) -> Result<T, SRCError> {
        self.registry.decode(bytes).await
    }
}

impl<T> Clone for GenericDecoder<T> {
    fn clone(&self) -> Self {
        GenericDecoder {
            registry: self.registry.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use mockito::Server;
    use test_utils::{
        avro_heartbeat_schema, get_typed_subject_body, proto_heartbeat_schema, Heartbeat,
        ProtoHeartbeat,
    };

    use crate::async_impl::registry::Registry;
    use crate::async_impl::schema_registry::SrSettings;
    use crate::error::{ErrorKind, SRCError};
    use crate::format::Unmarshaler;
    use crate::schema_registry_common::VersionSelector;

    #[derive(Debug, PartialEq)]
    enum Beat {
        Avro(i64),
        Proto(u64),
    }

    fn beat(u: &Unmarshaler<'_>) -> Result<Beat, SRCError> {
        match u.unmarshal::<Heartbeat>() {
            Ok(h) => Ok(Beat::Avro(h.beat)),
            Err(_) => u.unmarshal_proto::<ProtoHeartbeat>().map(|h| Beat::Proto(h.beat)),
        }
    }

    #[tokio::test]
    async fn encode_both_formats_with_one_registry() {
        let mut server = Server::new_async().await;
        let _avro = server
            .mock("GET", "/subjects/avro-beat/versions/latest")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_typed_subject_body(
                "avro-beat",
                1,
                5,
                avro_heartbeat_schema(),
                "AVRO",
            ))
            .create_async()
            .await;
        let _proto = server
            .mock("GET", "/subjects/proto-beat/versions/latest")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_typed_subject_body(
                "proto-beat",
                4,
                6,
                proto_heartbeat_schema(),
                "PROTOBUF",
            ))
            .create_async()
            .await;

        let registry: Registry<Beat> = Registry::new(SrSettings::new(server.url()));
        registry
            .register("avro-beat", VersionSelector::Latest, beat)
            .await
            .unwrap();
        registry
            .register("proto-beat", VersionSelector::Latest, beat)
            .await
            .unwrap();

        let avro_encoder = registry.with_latest_schema("avro-beat");
        let proto_encoder = registry.with_schema("proto-beat", 4);
        let avro_bytes = avro_encoder.encode(Heartbeat { beat: 3 }).unwrap();
        let proto_bytes = proto_encoder
            .encode_proto(&ProtoHeartbeat { beat: 101 })
            .unwrap();
        assert_eq!(vec![0, 0, 0, 0, 5, 6], avro_bytes);
        assert_eq!(&[0, 0, 0, 0, 6], &proto_bytes[..5]);

        let decoder = registry.generic_decoder();
        assert_eq!(Beat::Avro(3), decoder.decode(&avro_bytes).await.unwrap());
        assert_eq!(Beat::Proto(101), avro_encoder.decode(&proto_bytes).await.unwrap());

        let err = proto_encoder.encode(Heartbeat { beat: 3 }).unwrap_err();
        assert_eq!(ErrorKind::TypeMismatch, err.kind);
    }
}
