//! Contains structs, enums' and functions dealing with the responses from schema registry, the
//! version selection used when registering, and the wire format of the encoded bytes.
use core::fmt;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use crate::error::SRCError;

#[derive(Clone)]
pub(crate) enum SrAuthorization {
    None,
    Token(String),
    Basic(String, Option<String>),
}

impl fmt::Debug for SrAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SrAuthorization::None => write!(f, "None"),
            SrAuthorization::Token(_) => write!(f, "Token"),
            SrAuthorization::Basic(_, _) => write!(f, "Basic"),
        }
    }
}

/// By default the schema registry supports three types. It's possible there will be more in the future
/// or to add your own. Therefore the other is one of the schema types.
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaType {
    Avro,
    Protobuf,
    Json,
    Other(String),
}

impl SchemaType {
    /// Maps the `schemaType` of a registry response, the registry leaves it out for avro.
    pub fn from_tag(tag: Option<&str>) -> SchemaType {
        match tag {
            Some("AVRO") | None => SchemaType::Avro,
            Some("PROTOBUF") => SchemaType::Protobuf,
            Some("JSON") => SchemaType::Json,
            Some(s) => SchemaType::Other(String::from(s)),
        }
    }
}

/// Which version(s) of a subject to register. The registry itself only knows positive versions,
/// `Latest` and `All` are only used to make the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionSelector {
    Version(u32),
    Latest,
    All,
}

impl From<u32> for VersionSelector {
    fn from(version: u32) -> Self {
        VersionSelector::Version(version)
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VersionSelector::Version(v) => write!(f, "{}", v),
            VersionSelector::Latest => write!(f, "Latest"),
            VersionSelector::All => write!(f, "All"),
        }
    }
}

/// Schema as retrieved from the schema registry. It's close to the json received and doesn't do
/// type specific transformations. Subject and version are only known when the schema was
/// retrieved by subject.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisteredSchema {
    pub id: u32,
    pub subject: Option<String>,
    pub version: Option<u32>,
    pub schema_type: SchemaType,
    pub schema: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawRegisteredSchema {
    pub subject: Option<String>,
    pub version: Option<u32>,
    pub id: Option<u32>,
    pub schema_type: Option<String>,
    pub schema: Option<String>,
}

/// One of the subject/version combinations a schema id is registered under.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectVersion {
    pub subject: String,
    pub version: u32,
}

/// Error body as returned by the schema registry for non successful calls.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawError {
    pub error_code: u32,
    pub message: String,
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "error code {}: {}", self.error_code, self.message)
    }
}

impl RawRegisteredSchema {
    /// Validates the raw response. When the id is already known, for example because it was used
    /// to do the call, it doesn't need to be in the response.
    pub(crate) fn into_registered_schema(self, id: Option<u32>) -> Result<RegisteredSchema, SRCError> {
        let id = match id.or(self.id) {
            Some(v) => v,
            None => return Err(SRCError::response("Could not get id from response")),
        };
        let schema = match self.schema {
            Some(v) => v,
            None => return Err(SRCError::response("Could not get raw schema from response")),
        };
        Ok(RegisteredSchema {
            id,
            subject: self.subject,
            version: self.version,
            schema_type: SchemaType::from_tag(self.schema_type.as_deref()),
            schema,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SrCall<'a> {
    GetById(u32),
    GetSubjectVersionsById(u32),
    GetLatest(&'a str),
    GetBySubjectAndVersion(&'a str, u32),
    GetSubjects,
    GetVersions(&'a str),
}

pub(crate) fn url_for_call(call: &SrCall, base_url: &str) -> String {
    match call {
        SrCall::GetById(id) => format!("{}/schemas/ids/{}?deleted=true", base_url, id),
        SrCall::GetSubjectVersionsById(id) => format!("{}/schemas/ids/{}/versions", base_url, id),
        SrCall::GetLatest(subject) => {
            // Use escape sequences instead of slashes in the subject
            format!("{}/subjects/{}/versions/latest", base_url, subject.replace('/', "%2F"))
        }
        SrCall::GetBySubjectAndVersion(subject, version) => {
            // Use escape sequences instead of slashes in the subject
            format!("{}/subjects/{}/versions/{}", base_url, subject.replace('/', "%2F"), version)
        }
        SrCall::GetSubjects => format!("{}/subjects", base_url),
        SrCall::GetVersions(subject) => {
            format!("{}/subjects/{}/versions", base_url, subject.replace('/', "%2F"))
        }
    }
}

/// Size of the magic byte plus the schema id in front of every encoded message.
pub const HEADER_LENGTH: usize = 5;

/// Creates payload that can be included as a key or value on a kafka record
///
///  | magic byte (0) | schema id, 4 bytes big endian | encoded message |
pub fn get_payload(id: u32, encoded_bytes: Vec<u8>) -> Vec<u8> {
    let mut payload = Vec::with_capacity(HEADER_LENGTH + encoded_bytes.len());
    payload.push(0u8);
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, id);
    payload.extend_from_slice(&buf);
    payload.extend_from_slice(encoded_bytes.as_slice());
    payload
}

/// Splits the bytes contained in the key or value of a kafka record into the schema id and the
/// encoded message. Only bytes starting with a zero and having at least the 4 bytes of the id are
/// valid.
pub fn read_payload(bytes: &[u8]) -> Result<(u32, &[u8]), SRCError> {
    if bytes.len() < HEADER_LENGTH {
        return Err(SRCError::envelope(&format!(
            "Invalid bytes {:?}, need at least {} bytes",
            bytes, HEADER_LENGTH
        )));
    }
    if bytes[0] != 0 {
        return Err(SRCError::envelope(&format!(
            "Invalid magic byte {}, expected 0",
            bytes[0]
        )));
    }
    let id = BigEndian::read_u32(&bytes[1..HEADER_LENGTH]);
    Ok((id, &bytes[HEADER_LENGTH..]))
}

#[cfg(test)]
mod test {
    use crate::error::ErrorKind;
    use crate::schema_registry_common::{
        get_payload, read_payload, url_for_call, RawRegisteredSchema, SchemaType,
        SrAuthorization, SrCall, VersionSelector,
    };

    #[test]
    fn display_authorization_token() {
        let authorization =
            SrAuthorization::Token(String::from("some token that should not be displayed"));
        assert_eq!("Token", format!("{:?}", authorization))
    }

    #[test]
    fn display_authorization_basic() {
        let authorization = SrAuthorization::Basic(
            String::from("some username that should not be displayed"),
            None,
        );
        assert_eq!("Basic", format!("{:?}", authorization))
    }

    #[test]
    fn display_version_selector() {
        assert_eq!("3", format!("{}", VersionSelector::from(3)));
        assert_eq!("Latest", format!("{}", VersionSelector::Latest));
        assert_eq!("All", format!("{}", VersionSelector::All));
    }

    #[test]
    fn schema_type_from_tag() {
        assert_eq!(SchemaType::Avro, SchemaType::from_tag(None));
        assert_eq!(SchemaType::Avro, SchemaType::from_tag(Some("AVRO")));
        assert_eq!(SchemaType::Protobuf, SchemaType::from_tag(Some("PROTOBUF")));
        assert_eq!(SchemaType::Json, SchemaType::from_tag(Some("JSON")));
        assert_eq!(
            SchemaType::Other(String::from("YANG")),
            SchemaType::from_tag(Some("YANG"))
        );
    }

    #[test]
    fn raw_schema_without_id() {
        let raw = RawRegisteredSchema {
            subject: None,
            version: None,
            id: None,
            schema_type: None,
            schema: Some(String::from("\"string\"")),
        };
        let err = raw.into_registered_schema(None).unwrap_err();
        assert_eq!(err.error, "Could not get id from response");
        assert_eq!(err.kind, ErrorKind::Response);
    }

    #[test]
    fn raw_schema_id_from_call() {
        let raw = RawRegisteredSchema {
            subject: None,
            version: None,
            id: None,
            schema_type: Some(String::from("PROTOBUF")),
            schema: Some(String::from("syntax = \"proto3\";")),
        };
        let registered = raw.into_registered_schema(Some(8)).unwrap();
        assert_eq!(8, registered.id);
        assert_eq!(SchemaType::Protobuf, registered.schema_type);
    }

    #[test]
    fn subject_with_slash_is_escaped() {
        let url = url_for_call(&SrCall::GetVersions("a/b"), "http://localhost:8081");
        assert_eq!("http://localhost:8081/subjects/a%2Fb/versions", url);
    }

    #[test]
    fn payload_has_magic_byte_and_id() {
        let payload = get_payload(7, vec![101, 99]);
        assert_eq!(vec![0, 0, 0, 0, 7, 101, 99], payload)
    }

    #[test]
    fn read_payload_valid() {
        let (id, bytes) = read_payload(&[0, 0, 0, 0, 7, 101, 99]).unwrap();
        assert_eq!(7, id);
        assert_eq!(&[101, 99], bytes)
    }

    #[test]
    fn read_payload_big_id_and_empty_message() {
        let payload = get_payload(u32::MAX, vec![]);
        assert_eq!(vec![0, 255, 255, 255, 255], payload);
        let (id, bytes) = read_payload(&payload).unwrap();
        assert_eq!(u32::MAX, id);
        assert!(bytes.is_empty())
    }

    #[test]
    fn read_payload_too_short() {
        for length in 0..5 {
            let bytes = vec![0u8; length];
            let err = read_payload(&bytes).unwrap_err();
            assert_eq!(ErrorKind::Envelope, err.kind)
        }
    }

    #[test]
    fn read_payload_wrong_magic_byte() {
        let err = read_payload(&[1, 0, 0, 0, 7, 101]).unwrap_err();
        assert_eq!(ErrorKind::Envelope, err.kind);
        assert_eq!("Invalid magic byte 1, expected 0", err.error)
    }
}
