use serde::{Deserialize, Serialize};

pub fn avro_heartbeat_schema() -> &'static str {
    r#"{"type":"record","name":"Heartbeat","namespace":"nl.openweb.data","fields":[{"name":"beat","type":"long"}]}"#
}

pub fn avro_sample_v1_schema() -> &'static str {
    r#"{"type":"record","name":"Sample","namespace":"nl.openweb.data","fields":[{"name":"field1","type":"long"},{"name":"field2","type":"double"},{"name":"field3","type":"string"}]}"#
}

pub fn avro_sample_v2_schema() -> &'static str {
    r#"{"type":"record","name":"Sample","namespace":"nl.openweb.data","fields":[{"name":"field1","type":"long"},{"name":"field2","type":"double"},{"name":"field3","type":"string"},{"name":"field4","type":"string","default":""}]}"#
}

pub fn proto_heartbeat_schema() -> &'static str {
    r#"syntax = "proto3";package nl.openweb.data;message Heartbeat {uint64 beat = 1;}"#
}

/// Escapes a schema so it can be put inside a json string.
pub fn escape(schema: &str) -> String {
    schema.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Body as returned for `/subjects/{subject}/versions/{version}`.
pub fn get_subject_body(subject: &str, version: u32, id: u32, schema: &str) -> String {
    format!(
        "{{\"subject\":\"{}\",\"version\":{},\"id\":{},\"schema\":\"{}\"}}",
        subject,
        version,
        id,
        escape(schema)
    )
}

/// Same as [get_subject_body] but with an explicit schema type.
pub fn get_typed_subject_body(
    subject: &str,
    version: u32,
    id: u32,
    schema: &str,
    schema_type: &str,
) -> String {
    format!(
        "{{\"subject\":\"{}\",\"version\":{},\"id\":{},\"schemaType\":\"{}\",\"schema\":\"{}\"}}",
        subject,
        version,
        id,
        schema_type,
        escape(schema)
    )
}

/// Body as returned for `/schemas/ids/{id}`.
pub fn get_id_body(schema: &str) -> String {
    format!("{{\"schema\":\"{}\"}}", escape(schema))
}

/// Body as returned for `/schemas/ids/{id}/versions`.
pub fn get_subject_versions_body(subject: &str, version: u32) -> String {
    format!("[{{\"subject\":\"{}\",\"version\":{}}}]", subject, version)
}

/// Key of a record on the `_schemas` topic.
pub fn change_log_key(subject: &str, keytype: &str, version: u32) -> Vec<u8> {
    format!(
        "{{\"keytype\":\"{}\",\"subject\":\"{}\",\"version\":{},\"magic\":1}}",
        keytype, subject, version
    )
    .into_bytes()
}

/// Value of a record on the `_schemas` topic.
pub fn change_log_value(subject: &str, version: u32, id: u32, schema: &str) -> Vec<u8> {
    format!(
        "{{\"subject\":\"{}\",\"version\":{},\"id\":{},\"schema\":\"{}\",\"deleted\":false}}",
        subject,
        version,
        id,
        escape(schema)
    )
    .into_bytes()
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct Heartbeat {
    pub beat: i64,
}

#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct SampleV1 {
    pub field1: i64,
    pub field2: f64,
    pub field3: String,
}

#[derive(Debug, PartialEq, Clone, Deserialize, Serialize)]
pub struct SampleV2 {
    pub field1: i64,
    pub field2: f64,
    pub field3: String,
    pub field4: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoHeartbeat {
    #[prost(uint64, tag = "1")]
    pub beat: u64,
}

impl prost::Name for ProtoHeartbeat {
    const NAME: &'static str = "Heartbeat";
    const PACKAGE: &'static str = "nl.openweb.data";

    fn type_url() -> String {
        format!("type.googleapis.com/{}", Self::full_name())
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtoResult {
    #[prost(string, tag = "1")]
    pub up: String,
    #[prost(string, tag = "2")]
    pub down: String,
}

impl prost::Name for ProtoResult {
    const NAME: &'static str = "Result";
    const PACKAGE: &'static str = "org.schema_registry_test_app.proto";

    fn type_url() -> String {
        format!("type.googleapis.com/{}", Self::full_name())
    }
}
