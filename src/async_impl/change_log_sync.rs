//! Keeps the cache up to date by reading the compacted topic the schema registry stores all its
//! schemas in. Only new versions of subjects that are registered are added, using the decode
//! function of the closest lower version.
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

use crate::async_impl::registry::Registry;
use crate::async_impl::sync_handle::{SyncHandle, SyncState};
use crate::error::SRCError;
use crate::schema_registry_common::{RegisteredSchema, SchemaType};

#[derive(Debug)]
pub enum ChangeLogEvent {
    Record { key: Vec<u8>, value: Vec<u8> },
    /// All records present at the time were read.
    PartitionEnd,
    Error(SRCError),
}

/// Source of the records of the change log topic.
#[async_trait]
pub trait ChangeLogTransport: Send + 'static {
    /// The next event, `None` once the transport is closed.
    async fn next_event(&mut self) -> Option<ChangeLogEvent>;
}

#[async_trait]
impl ChangeLogTransport for mpsc::Receiver<ChangeLogEvent> {
    async fn next_event(&mut self) -> Option<ChangeLogEvent> {
        self.recv().await
    }
}

#[derive(Debug, Deserialize)]
struct ChangeLogKey {
    keytype: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeLogValue {
    #[serde(default)]
    subject: String,
    version: u32,
    id: u32,
    schema: String,
    #[serde(default)]
    deleted: bool,
    schema_type: Option<String>,
}

impl<T: 'static> Registry<T> {
    /// Spawns a task reading the change log. Returns once all the records already in the change
    /// log are read, or with an error when the transport closed before that.
    pub async fn start_change_log_sync(
        &self,
        transport: impl ChangeLogTransport,
    ) -> Result<SyncHandle, SRCError> {
        self.log_subjects();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (caught_up_tx, caught_up_rx) = oneshot::channel::<()>();
        let (state_tx, state_rx) = watch::channel(SyncState::Starting);
        let task = tokio::spawn(tail_change_log(
            self.clone(),
            transport,
            stop_rx,
            caught_up_tx,
            state_tx,
        ));
        let handle = SyncHandle::new(stop_tx, task, state_rx);
        // the sender is dropped without sending when the task ends before catching up
        match caught_up_rx.await {
            Ok(()) => Ok(handle),
            Err(_) => Err(SRCError::retryable_with_cause(
                "transport closed",
                "change log closed before all existing records were read",
            )),
        }
    }
}

async fn tail_change_log<T: 'static, C: ChangeLogTransport>(
    registry: Registry<T>,
    mut transport: C,
    mut stop: oneshot::Receiver<()>,
    caught_up: oneshot::Sender<()>,
    state: watch::Sender<SyncState>,
) {
    state.send_replace(SyncState::CatchingUp);
    info!("change log sync started");
    let mut caught_up = Some(caught_up);
    loop {
        let event = tokio::select! {
            _ = &mut stop => break,
            event = transport.next_event() => event,
        };
        match event {
            None => {
                info!("change log closed");
                break;
            }
            Some(ChangeLogEvent::Record { key, value }) => {
                if let Err(e) = apply_record(&registry, &key, &value) {
                    error!(error = %e, "could not apply change log record");
                }
            }
            Some(ChangeLogEvent::PartitionEnd) => {
                if let Some(caught_up) = caught_up.take() {
                    state.send_replace(SyncState::Steady);
                    let _ = caught_up.send(());
                    info!("change log sync caught up");
                }
            }
            Some(ChangeLogEvent::Error(e)) => {
                error!(error = %e, "could not read from change log");
            }
        }
    }
    state.send_replace(SyncState::Stopped);
    info!("change log sync stopped");
}

/// Adds the version from the record when it's a new version of a registered subject. Returns
/// whether it was added.
pub(crate) fn apply_record<T: 'static>(
    registry: &Registry<T>,
    key: &[u8],
    value: &[u8],
) -> Result<bool, SRCError> {
    if key.is_empty() || value.is_empty() {
        return Ok(false);
    }
    let key: ChangeLogKey = serde_json::from_slice(key)
        .map_err(|e| SRCError::codec(e, "could not parse change log key"))?;
    if key.keytype != "SCHEMA" {
        return Ok(false);
    }
    let value: ChangeLogValue = serde_json::from_slice(value)
        .map_err(|e| SRCError::codec(e, "could not parse change log value"))?;
    let cache = registry.cache();
    if value.subject.is_empty()
        || value.deleted
        || !cache.is_registered(&value.subject)
        || cache.has_version(&value.subject, value.version)
    {
        return Ok(false);
    }
    let lower = match cache.nearest_lower(&value.subject, value.version) {
        Some(s) => s,
        None => return Ok(false),
    };
    let registered_schema = RegisteredSchema {
        id: value.id,
        subject: Some(value.subject.clone()),
        version: Some(value.version),
        schema_type: SchemaType::from_tag(value.schema_type.as_deref()),
        schema: value.schema,
    };
    registry.add_subject(
        &value.subject,
        value.version,
        registered_schema,
        lower.decode_fn().clone(),
    )?;
    Ok(true)
}
