//! In memory cache of the registered subjects, both by subject and version, and by schema id.
//! The cache is shared between the callers encoding and decoding messages, and the background
//! sync adding new versions. Both maps are behind one lock, so a subject is always visible in
//! both or in neither.
use core::fmt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use apache_avro::types::Value;
use parking_lot::RwLock;
use prost::{Message, Name};
use serde::ser::Serialize;

use crate::error::SRCError;
use crate::format::{FormatAdapter, Unmarshaler};
use crate::schema_registry_common::{get_payload, RegisteredSchema};

/// Function used to turn the bytes of a message into the value of the application. The same
/// function is normally used for all the versions of a subject.
pub type DecodeFn<T> = Arc<dyn Fn(&Unmarshaler<'_>) -> Result<T, SRCError> + Send + Sync>;

/// One registered version of a subject. Once in the cache it's never changed, a new version is
/// always a new subject.
pub struct Subject<T> {
    schema: String,
    subject: String,
    version: u32,
    id: u32,
    decode_fn: DecodeFn<T>,
    adapter: FormatAdapter,
}

impl<T> Subject<T> {
    /// Creates the subject, initializing the format adapter for the schema type.
    pub fn new(
        subject: &str,
        version: u32,
        registered_schema: RegisteredSchema,
        decode_fn: DecodeFn<T>,
    ) -> Result<Subject<T>, SRCError> {
        let adapter = FormatAdapter::init(&registered_schema.schema_type, &registered_schema.schema)
            .map_err(|e| {
                with_context(
                    e,
                    &format!("{}#{}(Schema ID:{})", subject, version, registered_schema.id),
                )
            })?;
        Ok(Subject {
            schema: registered_schema.schema,
            subject: String::from(subject),
            version,
            id: registered_schema.id,
            decode_fn,
            adapter,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn decode_fn(&self) -> &DecodeFn<T> {
        &self.decode_fn
    }

    pub fn adapter(&self) -> &FormatAdapter {
        &self.adapter
    }

    /// Serializes the item and puts the magic byte and schema id in front.
    pub fn encode(&self, item: impl Serialize) -> Result<Vec<u8>, SRCError> {
        let bytes = self
            .adapter
            .serialize(item)
            .map_err(|e| with_context(e, &self.to_string()))?;
        Ok(get_payload(self.id, bytes))
    }

    pub fn encode_value(&self, value: Value) -> Result<Vec<u8>, SRCError> {
        let bytes = self
            .adapter
            .serialize_value(value)
            .map_err(|e| with_context(e, &self.to_string()))?;
        Ok(get_payload(self.id, bytes))
    }

    pub fn encode_proto<M: Message + Name>(&self, message: &M) -> Result<Vec<u8>, SRCError> {
        let bytes = self
            .adapter
            .serialize_proto(message)
            .map_err(|e| with_context(e, &self.to_string()))?;
        Ok(get_payload(self.id, bytes))
    }

    /// Hands the message, without the magic byte and id, to the decode function.
    pub fn decode(&self, bytes: &[u8]) -> Result<T, SRCError> {
        (self.decode_fn)(&Unmarshaler::new(&self.adapter, bytes))
            .map_err(|e| with_context(e, &self.to_string()))
    }
}

impl<T> fmt::Display for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}(Schema ID:{})", self.subject, self.version, self.id)
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subject")
            .field("subject", &self.subject)
            .field("version", &self.version)
            .field("id", &self.id)
            .field("schema_type", &self.adapter.schema_type())
            .finish()
    }
}

fn with_context(error: SRCError, subject: &str) -> SRCError {
    SRCError {
        error: format!("{} for {}", error.error, subject),
        ..error
    }
}

struct Maps<T> {
    by_subject_version: HashMap<String, BTreeMap<u32, Arc<Subject<T>>>>,
    by_id: HashMap<u32, Arc<Subject<T>>>,
}

pub struct SubjectCache<T> {
    maps: RwLock<Maps<T>>,
}

impl<T> Default for SubjectCache<T> {
    fn default() -> Self {
        SubjectCache::new()
    }
}

impl<T> SubjectCache<T> {
    pub fn new() -> SubjectCache<T> {
        SubjectCache {
            maps: RwLock::new(Maps {
                by_subject_version: HashMap::new(),
                by_id: HashMap::new(),
            }),
        }
    }

    /// Adds the subject, replacing the one with the same subject and version if present, which is
    /// returned. When the replaced one had another id, that id no longer resolves.
    pub fn insert(&self, subject: Arc<Subject<T>>) -> Option<Arc<Subject<T>>> {
        let mut maps = self.maps.write();
        let previous = maps
            .by_subject_version
            .entry(subject.subject.clone())
            .or_default()
            .insert(subject.version, subject.clone());
        if let Some(previous) = &previous {
            let stale = previous.id != subject.id
                && maps
                    .by_id
                    .get(&previous.id)
                    .is_some_and(|current| Arc::ptr_eq(current, previous));
            if stale {
                maps.by_id.remove(&previous.id);
            }
        }
        maps.by_id.insert(subject.id, subject);
        previous
    }

    pub fn lookup_by_version(&self, subject: &str, version: u32) -> Option<Arc<Subject<T>>> {
        let maps = self.maps.read();
        maps.by_subject_version
            .get(subject)
            .and_then(|versions| versions.get(&version))
            .cloned()
    }

    pub fn lookup_by_id(&self, id: u32) -> Option<Arc<Subject<T>>> {
        self.maps.read().by_id.get(&id).cloned()
    }

    /// The highest version in the cache, which might not be the latest in the registry yet.
    pub fn lookup_latest(&self, subject: &str) -> Option<Arc<Subject<T>>> {
        let maps = self.maps.read();
        maps.by_subject_version
            .get(subject)
            .and_then(|versions| versions.values().next_back())
            .cloned()
    }

    /// The highest version in the cache that is lower than the given version.
    pub fn nearest_lower(&self, subject: &str, version: u32) -> Option<Arc<Subject<T>>> {
        let maps = self.maps.read();
        maps.by_subject_version
            .get(subject)
            .and_then(|versions| versions.range(..version).next_back())
            .map(|(_, s)| s.clone())
    }

    pub fn has_version(&self, subject: &str, version: u32) -> bool {
        let maps = self.maps.read();
        maps.by_subject_version
            .get(subject)
            .map(|versions| versions.contains_key(&version))
            .unwrap_or(false)
    }

    pub fn is_registered(&self, subject: &str) -> bool {
        self.maps.read().by_subject_version.contains_key(subject)
    }

    /// All the subjects in the cache, ordered by subject and version.
    pub fn subjects(&self) -> Vec<Arc<Subject<T>>> {
        let maps = self.maps.read();
        let mut names: Vec<&String> = maps.by_subject_version.keys().collect();
        names.sort();
        names
            .into_iter()
            .flat_map(|n| maps.by_subject_version[n].values().cloned())
            .collect()
    }
}
