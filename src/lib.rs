//! Rust cache of subjects, versions and schema ids, to encode and decode messages using the
//! [confluent schema-registry].
//!
//! Subjects are registered up front with the function used to turn messages into the type the
//! application works with. Encoding is done for a specific version of a subject, decoding uses the
//! schema id in the message. An unknown id is looked up in the registry once, and added when it's
//! a version of a registered subject.
//!
//! The bytes are compatible with the [confluent java serde]: a magic byte, the schema id as four
//! big endian bytes, and the encoded message. Avro is encoded using [apache-avro], protobuf messages
//! are encoded using [prost] wrapped in a `google.protobuf.Any`.
//!
//! New versions of registered subjects can be picked up in the background, either by polling the
//! registry, or by reading the topic the registry stores its schemas in with the `kafka` feature.
//!
//! Errors are [SRCError](error::SRCError), besides the kind of error they also tell whether it
//! might help to retry. The library itself doesn't retry.
//!
//! [confluent schema-registry]: https://docs.confluent.io/current/schema-registry/docs/index.html
//! [confluent java serde]: https://github.com/confluentinc/schema-registry/tree/master/avro-serde/src/main/java/io/confluent/kafka/streams/serdes/avro
//! [apache-avro]: https://crates.io/crates/apache-avro
//! [prost]: https://crates.io/crates/prost

pub mod async_impl;
pub mod avro;
pub mod error;
pub mod format;
pub mod proto;
pub mod schema_registry_common;
pub mod subject_cache;
