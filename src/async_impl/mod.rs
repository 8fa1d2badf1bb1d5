pub mod change_log_sync;
pub mod encoder;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod polling_sync;
pub mod registry;
pub mod schema_registry;
pub mod sync_handle;
