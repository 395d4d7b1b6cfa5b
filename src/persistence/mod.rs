//! Key/value storage backends for the durable queue and session state.
//!
//! The interface is synchronous, matching the browser's web storage API. Native builds persist
//! origin-scoped data to files and keep tab-scoped data in memory for the life of the process.
mod error;
mod memory;

#[cfg(not(target_arch = "wasm32"))]
mod file;

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
mod web;

use std::sync::Arc;

pub use error::{
    io_error, quota_exceeded, serialization_error, unavailable, StorageError, StorageErrorCode,
    StorageResult,
};
pub use memory::InMemoryStorage;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use web::{WebStorage, WebStorageDriver};

/// Minimal string key/value store.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

pub type StorageHandle = Arc<dyn KeyValueStorage>;

/// Origin-scoped storage that survives restarts: `localStorage` in the browser, files natively.
///
/// Natively each `scope` (see [`ObservabilityConfig::storage_scope`]) gets its own directory; the
/// browser already scopes `localStorage` by origin.
///
/// [`ObservabilityConfig::storage_scope`]: crate::config::ObservabilityConfig::storage_scope
#[cfg_attr(target_arch = "wasm32", allow(unused_variables))]
pub fn default_local_storage(scope: &str) -> StorageHandle {
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        return Arc::new(WebStorage::new(WebStorageDriver::Local));
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        match FileStorage::for_scope(scope) {
            Ok(storage) => return Arc::new(storage),
            Err(err) => log::warn!("falling back to in-memory observability storage: {err}"),
        }
    }

    #[allow(unreachable_code)]
    Arc::new(InMemoryStorage::default())
}

/// Short-lived storage scoped to the current tab (browser) or process (native).
pub fn default_session_storage() -> StorageHandle {
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        return Arc::new(WebStorage::new(WebStorageDriver::Session));
    }

    #[allow(unreachable_code)]
    Arc::new(InMemoryStorage::default())
}
