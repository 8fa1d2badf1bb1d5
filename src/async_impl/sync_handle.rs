use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::error;

/// Where a background sync is at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Polling, waiting for the next tick.
    Idle,
    /// Polling, checking the registry for new versions.
    Ticking,
    /// Change log, the transport is being set up.
    Starting,
    /// Change log, reading the records that were already there.
    CatchingUp,
    /// Change log, all records were read once, new ones are added as they come.
    Steady,
    Stopped,
}

/// Owns the task of a background sync. Dropping the handle without calling [SyncHandle::stop]
/// aborts the task.
pub struct SyncHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    state: watch::Receiver<SyncState>,
}

impl SyncHandle {
    pub(crate) fn new(
        stop: oneshot::Sender<()>,
        task: JoinHandle<()>,
        state: watch::Receiver<SyncState>,
    ) -> SyncHandle {
        SyncHandle {
            stop: Some(stop),
            task: Some(task),
            state,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Signals the task to stop and waits till it did. A polling cycle in progress is finished
    /// first.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "background sync ended abnormally");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
