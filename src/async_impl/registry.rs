//! The registry is the entry point of the crate. Subjects are registered up front, each with the
//! function used to turn decoded messages into the application type. After that messages can be
//! encoded for a specific subject, and decoded by the schema id in the message.
//!
//! ```no_run
//! # async fn run() -> Result<(), schema_registry_cache::error::SRCError> {
//! use schema_registry_cache::async_impl::registry::Registry;
//! use schema_registry_cache::async_impl::schema_registry::SrSettings;
//! use schema_registry_cache::schema_registry_common::VersionSelector;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Heartbeat {
//!     beat: i64,
//! }
//!
//! let registry: Registry<i64> =
//!     Registry::new(SrSettings::new(String::from("http://localhost:8081")));
//! registry
//!     .register("heartbeat", VersionSelector::All, |u| {
//!         u.unmarshal::<Heartbeat>().map(|h| h.beat)
//!     })
//!     .await?;
//! let bytes = registry
//!     .with_latest_schema("heartbeat")
//!     .encode(Heartbeat { beat: 3 })?;
//! assert_eq!(3, registry.decode(&bytes).await?);
//! # Ok(())
//! # }
//! ```
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{info, warn};

use crate::async_impl::encoder::{Encoder, GenericDecoder};
use crate::async_impl::schema_registry::{SchemaRegistryClient, SrSettings};
use crate::async_impl::sync_handle::SyncHandle;
use crate::error::SRCError;
use crate::format::Unmarshaler;
use crate::schema_registry_common::{read_payload, RegisteredSchema, VersionSelector};
use crate::subject_cache::{DecodeFn, Subject, SubjectCache};

/// Interval used for polling when none is given.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How the cache is kept up to date with versions added to the registry after startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackgroundSync {
    /// Asks the registry for new versions of the registered subjects every interval.
    Polling { interval: Duration },
    /// Reads the topic the registry stores its schemas in, normally `_schemas`.
    #[cfg(feature = "kafka")]
    ChangeLog {
        bootstrap_servers: String,
        topic: String,
    },
}

impl Default for BackgroundSync {
    fn default() -> Self {
        BackgroundSync::Polling {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrySettings {
    pub background_sync: Option<BackgroundSync>,
}

/// Builder for a [Registry], needed to use another client than [SrSettings] or to configure a
/// background sync.
pub struct RegistryBuilder<T> {
    client: Arc<dyn SchemaRegistryClient>,
    settings: RegistrySettings,
    output: PhantomData<fn() -> T>,
}

impl<T> RegistryBuilder<T> {
    /// Polls the registry every interval once [Registry::start_background_sync] is called.
    pub fn with_polling_sync(&mut self, interval: Duration) -> &mut RegistryBuilder<T> {
        self.settings.background_sync = Some(BackgroundSync::Polling { interval });
        self
    }

    /// Reads the topic the registry stores its schemas in once [Registry::start_background_sync]
    /// is called.
    #[cfg(feature = "kafka")]
    pub fn with_change_log_sync(
        &mut self,
        bootstrap_servers: &str,
        topic: &str,
    ) -> &mut RegistryBuilder<T> {
        self.settings.background_sync = Some(BackgroundSync::ChangeLog {
            bootstrap_servers: String::from(bootstrap_servers),
            topic: String::from(topic),
        });
        self
    }

    pub fn build(&mut self) -> Registry<T> {
        Registry {
            inner: Arc::new(RegistryInner {
                client: self.client.clone(),
                cache: Arc::new(SubjectCache::new()),
                settings: self.settings.clone(),
                pending: DashMap::new(),
            }),
        }
    }
}

type PendingRefresh = Shared<BoxFuture<'static, Result<(), SRCError>>>;

struct RegistryInner<T> {
    client: Arc<dyn SchemaRegistryClient>,
    cache: Arc<SubjectCache<T>>,
    settings: RegistrySettings,
    pending: DashMap<u32, PendingRefresh>,
}

/// Handle to the cache of registered subjects. Cloning is cheap, all clones share the same cache.
pub struct Registry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Registry {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Registry<T> {
    /// Creates a registry using the schema registry from the settings, without background sync.
    pub fn new(sr_settings: SrSettings) -> Registry<T> {
        Registry::new_builder(sr_settings).build()
    }

    pub fn new_builder(client: impl SchemaRegistryClient + 'static) -> RegistryBuilder<T> {
        RegistryBuilder {
            client: Arc::new(client),
            settings: RegistrySettings::default(),
            output: PhantomData,
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.inner.settings
    }

    pub fn cache(&self) -> &SubjectCache<T> {
        &self.inner.cache
    }

    pub(crate) fn client(&self) -> &dyn SchemaRegistryClient {
        self.inner.client.as_ref()
    }

    /// Fetches the selected version(s) of the subject and adds them to the cache. Messages for
    /// these versions are decoded using `decode_fn`.
    pub async fn register<F>(
        &self,
        subject: &str,
        selector: impl Into<VersionSelector>,
        decode_fn: F,
    ) -> Result<(), SRCError>
    where
        F: Fn(&Unmarshaler<'_>) -> Result<T, SRCError> + Send + Sync + 'static,
    {
        let decode_fn: DecodeFn<T> = Arc::new(decode_fn);
        self.register_with(subject, selector.into(), decode_fn).await
    }

    /// Same as [Registry::register], but with a decode function that might be shared with other
    /// subjects.
    pub async fn register_with(
        &self,
        subject: &str,
        selector: VersionSelector,
        decode_fn: DecodeFn<T>,
    ) -> Result<(), SRCError> {
        match selector {
            VersionSelector::Version(version) => {
                let registered_schema = self.client().get_schema(subject, version).await?;
                self.add_subject(subject, version, registered_schema, decode_fn)?;
            }
            VersionSelector::Latest => {
                let registered_schema = self.client().get_latest_schema(subject).await?;
                let version = match registered_schema.version {
                    Some(v) => v,
                    None => return Err(SRCError::response("Could not get version from response")),
                };
                self.add_subject(subject, version, registered_schema, decode_fn)?;
            }
            VersionSelector::All => {
                for version in self.client().list_versions(subject).await? {
                    let registered_schema = self.client().get_schema(subject, version).await?;
                    self.add_subject(subject, version, registered_schema, decode_fn.clone())?;
                }
            }
        }
        Ok(())
    }

    /// Encoder for a specific version of the subject.
    ///
    /// # Panics
    ///
    /// When the version of the subject is not in the cache. Use [Registry::try_with_schema] when
    /// that might be the case.
    pub fn with_schema(&self, subject: &str, version: u32) -> Encoder<T> {
        match self.try_with_schema(subject, version) {
            Ok(encoder) => encoder,
            Err(_) => panic!("schema registry: unregistered subject {}:{}", subject, version),
        }
    }

    pub fn try_with_schema(&self, subject: &str, version: u32) -> Result<Encoder<T>, SRCError> {
        match self.inner.cache.lookup_by_version(subject, version) {
            Some(s) => Ok(Encoder::new(s, self.clone())),
            None => Err(SRCError::not_registered(&format!(
                "unregistered subject {}:{}",
                subject, version
            ))),
        }
    }

    /// Encoder for the highest version of the subject in the cache. This might not be the latest
    /// version in the registry when the background sync didn't pick it up yet.
    ///
    /// # Panics
    ///
    /// When the subject is not registered.
    pub fn with_latest_schema(&self, subject: &str) -> Encoder<T> {
        match self.try_with_latest_schema(subject) {
            Ok(encoder) => encoder,
            Err(_) => panic!("schema registry: unregistered subject {}", subject),
        }
    }

    pub fn try_with_latest_schema(&self, subject: &str) -> Result<Encoder<T>, SRCError> {
        match self.inner.cache.lookup_latest(subject) {
            Some(s) => Ok(Encoder::new(s, self.clone())),
            None => Err(SRCError::not_registered(&format!(
                "unregistered subject {}",
                subject
            ))),
        }
    }

    pub fn generic_decoder(&self) -> GenericDecoder<T> {
        GenericDecoder::new(self.clone())
    }

    /// Decodes a message using the schema id in front of it. When the id is not known yet the
    /// registry is asked once which subject and version it belongs to. Only ids belonging to a
    /// registered subject are added.
    pub async fn decode(&self, bytes: &[u8]) -> Result<T, SRCError> {
        let (id, payload) = read_payload(bytes)?;
        let mut refreshed = false;
        loop {
            if let Some(subject) = self.inner.cache.lookup_by_id(id) {
                return subject.decode(payload);
            }
            if refreshed {
                return Err(SRCError::not_registered(&format!(
                    "schema id [{}] is not registered",
                    id
                )));
            }
            self.refresh(id).await.map_err(|e| {
                SRCError::not_registered_with_cause(
                    e,
                    &format!("schema id [{}] could not be resolved", id),
                )
            })?;
            refreshed = true;
        }
    }

    /// Callers missing the same id share one fetch. The fetch only holds the client and the cache,
    /// so a fetch left behind by a cancelled caller doesn't keep the registry alive.
    async fn refresh(&self, id: u32) -> Result<(), SRCError> {
        let pending = match self.inner.pending.entry(id) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let client = self.inner.client.clone();
                let cache = self.inner.cache.clone();
                let v = async move { fetch_by_id(client.as_ref(), &cache, id).await }
                    .boxed()
                    .shared();
                e.insert(v).clone()
            }
        };
        let result = pending.clone().await;
        self.inner
            .pending
            .remove_if(&id, |_, current| current.ptr_eq(&pending));
        result
    }

    /// The decode function of the closest lower version, or of the latest version when there is no
    /// lower one.
    pub(crate) fn inherited_decode_fn(
        &self,
        subject: &str,
        version: u32,
    ) -> Result<DecodeFn<T>, SRCError> {
        inherited_decode_fn(&self.inner.cache, subject, version)
    }

    /// Adds the subject to the cache, any version with the same subject and version is replaced.
    pub(crate) fn add_subject(
        &self,
        subject: &str,
        version: u32,
        registered_schema: RegisteredSchema,
        decode_fn: DecodeFn<T>,
    ) -> Result<Arc<Subject<T>>, SRCError> {
        add_subject(&self.inner.cache, subject, version, registered_schema, decode_fn)
    }

    /// Logs every subject in the cache.
    pub fn log_subjects(&self) {
        for s in self.inner.cache.subjects() {
            info!(
                subject = s.subject(),
                version = s.version(),
                schema_id = s.id(),
                schema_type = ?s.adapter().schema_type(),
                "cached subject"
            );
        }
    }

    /// Starts the background sync from the settings, if any.
    pub async fn start_background_sync(&self) -> Result<Option<SyncHandle>, SRCError> {
        match &self.inner.settings.background_sync {
            None => Ok(None),
            Some(BackgroundSync::Polling { interval }) => {
                self.start_polling_sync(*interval).map(Some)
            }
            #[cfg(feature = "kafka")]
            Some(BackgroundSync::ChangeLog {
                bootstrap_servers,
                topic,
            }) => {
                let transport =
                    crate::async_impl::kafka::KafkaChangeLog::new(bootstrap_servers, topic)?;
                self.start_change_log_sync(transport).await.map(Some)
            }
        }
    }
}

async fn fetch_by_id<T>(
    client: &dyn SchemaRegistryClient,
    cache: &SubjectCache<T>,
    id: u32,
) -> Result<(), SRCError> {
    let registered_schema = client.get_schema_by_id(id).await?;
    let subject_versions = client.get_subject_versions_for_id(id).await?;
    let subject_version = match subject_versions
        .into_iter()
        .find(|sv| cache.is_registered(&sv.subject))
    {
        Some(sv) => sv,
        None => {
            return Err(SRCError::not_registered(&format!(
                "schema id [{}] doesn't belong to a registered subject",
                id
            )))
        }
    };
    let decode_fn = inherited_decode_fn(cache, &subject_version.subject, subject_version.version)?;
    add_subject(
        cache,
        &subject_version.subject,
        subject_version.version,
        registered_schema,
        decode_fn,
    )?;
    Ok(())
}

fn inherited_decode_fn<T>(
    cache: &SubjectCache<T>,
    subject: &str,
    version: u32,
) -> Result<DecodeFn<T>, SRCError> {
    match cache
        .nearest_lower(subject, version)
        .or_else(|| cache.lookup_latest(subject))
    {
        Some(s) => Ok(s.decode_fn().clone()),
        None => Err(SRCError::not_registered(&format!(
            "unregistered subject {}",
            subject
        ))),
    }
}

fn add_subject<T>(
    cache: &SubjectCache<T>,
    subject: &str,
    version: u32,
    registered_schema: RegisteredSchema,
    decode_fn: DecodeFn<T>,
) -> Result<Arc<Subject<T>>, SRCError> {
    let s = Arc::new(Subject::new(subject, version, registered_schema, decode_fn)?);
    match cache.insert(s.clone()) {
        Some(_) => warn!(
            subject,
            version,
            schema_id = s.id(),
            "subject was already registered, replaced it"
        ),
        None => info!(subject, version, schema_id = s.id(), "added subject"),
    }
    Ok(s)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use mockito::Server;
    use test_utils::{
        avro_heartbeat_schema, escape, get_id_body, get_subject_body, get_subject_versions_body,
        Heartbeat,
    };

    use crate::async_impl::registry::{BackgroundSync, Registry, DEFAULT_POLL_INTERVAL};
    use crate::async_impl::schema_registry::{SchemaRegistryClient, SrSettings};
    use crate::error::{ErrorKind, SRCError};
    use crate::format::Unmarshaler;
    use crate::schema_registry_common::{
        get_payload, RegisteredSchema, SubjectVersion, VersionSelector,
    };

    /// Client for which every call hangs.
    struct Unresponsive;

    #[async_trait]
    impl SchemaRegistryClient for Unresponsive {
        async fn list_subjects(&self) -> Result<Vec<String>, SRCError> {
            futures::future::pending().await
        }
        async fn list_versions(&self, _subject: &str) -> Result<Vec<u32>, SRCError> {
            futures::future::pending().await
        }
        async fn get_schema(
            &self,
            _subject: &str,
            _version: u32,
        ) -> Result<RegisteredSchema, SRCError> {
            futures::future::pending().await
        }
        async fn get_latest_schema(&self, _subject: &str) -> Result<RegisteredSchema, SRCError> {
            futures::future::pending().await
        }
        async fn get_schema_by_id(&self, _id: u32) -> Result<RegisteredSchema, SRCError> {
            futures::future::pending().await
        }
        async fn get_subject_versions_for_id(
            &self,
            _id: u32,
        ) -> Result<Vec<SubjectVersion>, SRCError> {
            futures::future::pending().await
        }
    }

    fn beat(u: &Unmarshaler<'_>) -> Result<i64, SRCError> {
        u.unmarshal::<Heartbeat>().map(|h| h.beat)
    }

    #[test]
    fn default_background_sync_is_polling() {
        assert_eq!(
            BackgroundSync::Polling {
                interval: DEFAULT_POLL_INTERVAL
            },
            BackgroundSync::default()
        );
    }

    #[tokio::test]
    async fn register_latest_without_version() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/subjects/heartbeat/versions/latest")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(format!(
                "{{\"id\":3,\"schema\":\"{}\"}}",
                escape(avro_heartbeat_schema())
            ))
            .create_async()
            .await;

        let registry: Registry<i64> = Registry::new(SrSettings::new(server.url()));
        let err = registry
            .register("heartbeat", VersionSelector::Latest, beat)
            .await
            .unwrap_err();
        assert_eq!("Could not get version from response", err.error);
        assert!(!registry.cache().is_registered("heartbeat"));
    }

    #[tokio::test]
    async fn register_twice_replaces() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/subjects/heartbeat/versions/1")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_subject_body("heartbeat", 1, 3, avro_heartbeat_schema()))
            .expect(2)
            .create_async()
            .await;

        let registry: Registry<i64> = Registry::new(SrSettings::new(server.url()));
        registry.register("heartbeat", 1, beat).await.unwrap();
        let first = registry.with_schema("heartbeat", 1);
        registry.register("heartbeat", 1, beat).await.unwrap();
        let second = registry.with_schema("heartbeat", 1);
        assert!(!Arc::ptr_eq(first.subject(), second.subject()));
        assert_eq!(1, registry.cache().subjects().len());
        m.assert_async().await;
    }

    #[tokio::test]
    #[should_panic(expected = "schema registry: unregistered subject heartbeat:1")]
    async fn with_schema_unregistered() {
        let registry: Registry<i64> =
            Registry::new(SrSettings::new(String::from("http://localhost:1")));
        registry.with_schema("heartbeat", 1);
    }

    #[tokio::test]
    #[should_panic(expected = "schema registry: unregistered subject heartbeat")]
    async fn with_latest_schema_unregistered() {
        let registry: Registry<i64> =
            Registry::new(SrSettings::new(String::from("http://localhost:1")));
        registry.with_latest_schema("heartbeat");
    }

    #[tokio::test]
    async fn try_with_schema_unregistered() {
        let registry: Registry<i64> =
            Registry::new(SrSettings::new(String::from("http://localhost:1")));
        let err = registry.try_with_schema("heartbeat", 1).err().unwrap();
        assert_eq!(ErrorKind::NotRegistered, err.kind);
    }

    #[tokio::test]
    async fn decode_envelope_error_does_no_call() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let registry: Registry<i64> = Registry::new(SrSettings::new(server.url()));
        let err = registry.decode(&[0, 0, 0]).await.unwrap_err();
        assert_eq!(ErrorKind::Envelope, err.kind);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_misses_share_refresh() {
        let mut server = Server::new_async().await;
        let _v1 = server
            .mock("GET", "/subjects/heartbeat/versions/1")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_subject_body("heartbeat", 1, 3, avro_heartbeat_schema()))
            .create_async()
            .await;
        let by_id = server
            .mock("GET", "/schemas/ids/4?deleted=true")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_id_body(avro_heartbeat_schema()))
            .expect(1)
            .create_async()
            .await;
        let _versions = server
            .mock("GET", "/schemas/ids/4/versions")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_subject_versions_body("heartbeat", 2))
            .create_async()
            .await;

        let registry: Registry<i64> = Registry::new(SrSettings::new(server.url()));
        registry.register("heartbeat", 1, beat).await.unwrap();
        let bytes = get_payload(4, vec![6]);
        let (a, b) = tokio::join!(registry.decode(&bytes), registry.decode(&bytes));
        assert_eq!(3, a.unwrap());
        assert_eq!(3, b.unwrap());
        assert_eq!(2, registry.with_latest_schema("heartbeat").subject().version());
        by_id.assert_async().await;
    }

    #[tokio::test]
    async fn cancelled_decode_does_not_keep_registry_alive() {
        let registry: Registry<i64> = Registry::new_builder(Unresponsive).build();
        let bytes = get_payload(4, vec![6]);
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), registry.decode(&bytes)).await;
        assert!(cancelled.is_err());
        assert_eq!(1, registry.inner.pending.len());

        let inner = Arc::downgrade(&registry.inner);
        drop(registry);
        assert!(inner.upgrade().is_none());
    }
}
