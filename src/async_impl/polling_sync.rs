//! Keeps the cache up to date by asking the schema registry for new versions of the registered
//! subjects on an interval.
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::async_impl::registry::Registry;
use crate::async_impl::sync_handle::{SyncHandle, SyncState};
use crate::error::SRCError;

impl<T: 'static> Registry<T> {
    /// Spawns a task checking the registry every interval, the first check is one interval from
    /// now. A check is never started while another one is still running. The interval can't be
    /// zero.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_polling_sync(&self, interval: Duration) -> Result<SyncHandle, SRCError> {
        if interval.is_zero() {
            return Err(SRCError::config("polling interval must be larger than zero"));
        }
        self.log_subjects();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (state_tx, state_rx) = watch::channel(SyncState::Idle);
        let registry = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "polling sync started");
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        state_tx.send_replace(SyncState::Ticking);
                        check_registry_and_add(&registry).await;
                        state_tx.send_replace(SyncState::Idle);
                    }
                }
            }
            state_tx.send_replace(SyncState::Stopped);
            info!("polling sync stopped");
        });
        Ok(SyncHandle::new(stop_tx, task, state_rx))
    }
}

/// One polling cycle. Returns the number of versions added, failures are logged and skipped.
pub(crate) async fn check_registry_and_add<T: 'static>(registry: &Registry<T>) -> usize {
    debug!("checking schema registry for new versions");
    let subjects = match registry.client().list_subjects().await {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "could not get the subjects from the schema registry");
            return 0;
        }
    };
    let mut added = 0;
    for subject in subjects
        .iter()
        .filter(|s| registry.cache().is_registered(s))
    {
        let versions = match registry.client().list_versions(subject).await {
            Ok(v) => v,
            Err(e) => {
                error!(subject = %subject, error = %e, "could not get the versions");
                continue;
            }
        };
        for version in versions {
            if registry.cache().has_version(subject, version) {
                continue;
            }
            match add_version(registry, subject, version).await {
                Ok(()) => added += 1,
                Err(e) => error!(subject = %subject, version, error = %e, "could not add version"),
            }
        }
    }
    debug!(added, "done checking schema registry");
    added
}

async fn add_version<T: 'static>(
    registry: &Registry<T>,
    subject: &str,
    version: u32,
) -> Result<(), SRCError> {
    let decode_fn = registry.inherited_decode_fn(subject, version)?;
    let registered_schema = registry.client().get_schema(subject, version).await?;
    registry.add_subject(subject, version, registered_schema, decode_fn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mockito::Server;
    use test_utils::{avro_sample_v1_schema, avro_sample_v2_schema, get_subject_body, SampleV1};

    use crate::async_impl::polling_sync::check_registry_and_add;
    use crate::async_impl::registry::Registry;
    use crate::async_impl::schema_registry::SrSettings;
    use crate::async_impl::sync_handle::SyncState;
    use crate::error::{ErrorKind, SRCError};
    use crate::format::Unmarshaler;

    fn field1(u: &Unmarshaler<'_>) -> Result<i64, SRCError> {
        u.unmarshal::<SampleV1>().map(|s| s.field1)
    }

    #[tokio::test]
    async fn adds_new_versions_of_registered_subjects() {
        let mut server = Server::new_async().await;
        let _v1 = server
            .mock("GET", "/subjects/sample/versions/1")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_subject_body("sample", 1, 10, avro_sample_v1_schema()))
            .create_async()
            .await;
        let _subjects = server
            .mock("GET", "/subjects")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(r#"["sample","unrelated"]"#)
            .create_async()
            .await;
        let _versions = server
            .mock("GET", "/subjects/sample/versions")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body("[1,2]")
            .create_async()
            .await;
        let v2 = server
            .mock("GET", "/subjects/sample/versions/2")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_subject_body("sample", 2, 11, avro_sample_v2_schema()))
            .expect(1)
            .create_async()
            .await;
        let unrelated = server
            .mock("GET", "/subjects/unrelated/versions")
            .expect(0)
            .create_async()
            .await;

        let registry: Registry<i64> = Registry::new(SrSettings::new(server.url()));
        registry.register("sample", 1, field1).await.unwrap();

        assert_eq!(1, check_registry_and_add(&registry).await);
        assert_eq!(0, check_registry_and_add(&registry).await);

        let v1_subject = registry.cache().lookup_by_version("sample", 1).unwrap();
        let v2_subject = registry.cache().lookup_by_id(11).unwrap();
        assert_eq!(2, v2_subject.version());
        assert!(Arc::ptr_eq(v1_subject.decode_fn(), v2_subject.decode_fn()));
        v2.assert_async().await;
        unrelated.assert_async().await;
    }

    #[tokio::test]
    async fn failing_version_is_skipped() {
        let mut server = Server::new_async().await;
        let _v1 = server
            .mock("GET", "/subjects/sample/versions/1")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_subject_body("sample", 1, 10, avro_sample_v1_schema()))
            .create_async()
            .await;
        let _subjects = server
            .mock("GET", "/subjects")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(r#"["sample"]"#)
            .create_async()
            .await;
        let _versions = server
            .mock("GET", "/subjects/sample/versions")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body("[1,2,3]")
            .create_async()
            .await;
        let _v2 = server
            .mock("GET", "/subjects/sample/versions/2")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_subject_body("sample", 2, 11, "{not avro"))
            .create_async()
            .await;
        let _v3 = server
            .mock("GET", "/subjects/sample/versions/3")
            .with_status(200)
            .with_header("content-type", "application/vnd.schemaregistry.v1+json")
            .with_body(get_subject_body("sample", 3, 12, avro_sample_v2_schema()))
            .create_async()
            .await;

        let registry: Registry<i64> = Registry::new(SrSettings::new(server.url()));
        registry.register("sample", 1, field1).await.unwrap();

        assert_eq!(1, check_registry_and_add(&registry).await);
        assert!(!registry.cache().has_version("sample", 2));
        assert_eq!(3, registry.with_latest_schema("sample").subject().version());
    }

    #[tokio::test]
    async fn unreachable_registry_adds_nothing() {
        let registry: Registry<i64> =
            Registry::new(SrSettings::new(String::from("http://localhost:1")));
        assert_eq!(0, check_registry_and_add(&registry).await);
    }

    #[tokio::test]
    async fn zero_interval_is_refused() {
        let registry: Registry<i64> = Registry::new_builder(SrSettings::new(String::from(
            "http://localhost:1",
        )))
        .with_polling_sync(Duration::ZERO)
        .build();
        let err = registry.start_background_sync().await.err().unwrap();
        assert_eq!(ErrorKind::Config, err.kind);
        let err = registry.start_polling_sync(Duration::ZERO).err().unwrap();
        assert_eq!(ErrorKind::Config, err.kind);
    }

    #[tokio::test]
    async fn polling_task_stops() {
        let registry: Registry<i64> =
            Registry::new(SrSettings::new(String::from("http://localhost:1")));
        let handle = registry
            .start_polling_sync(Duration::from_secs(3600))
            .unwrap();
        assert_eq!(SyncState::Idle, handle.state());
        handle.stop().await;
    }
}
