use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use web_sys::{DomException, Storage, Window};

use crate::persistence::error::{io_error, quota_exceeded, unavailable, StorageError, StorageResult};
use crate::persistence::KeyValueStorage;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WebStorageDriver {
    Local,
    Session,
}

/// `localStorage` / `sessionStorage` backend. The handle is resolved on every call so the type
/// stays `Send + Sync`.
#[derive(Clone, Copy, Debug)]
pub struct WebStorage {
    driver: WebStorageDriver,
}

impl WebStorage {
    pub fn new(driver: WebStorageDriver) -> Self {
        Self { driver }
    }

    fn storage(&self) -> StorageResult<Storage> {
        let window = Self::window()?;
        match self.driver {
            WebStorageDriver::Local => window.local_storage().map_err(map_js_error)?,
            WebStorageDriver::Session => window.session_storage().map_err(map_js_error)?,
        }
        .ok_or_else(|| unavailable("Web storage API is unavailable"))
    }

    fn window() -> StorageResult<Window> {
        web_sys::window().ok_or_else(|| unavailable("window object is not available in this environment"))
    }
}

impl KeyValueStorage for WebStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.storage()?.get_item(key).map_err(map_js_error)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.storage()?.set_item(key, value).map_err(map_js_error)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.storage()?.remove_item(key).map_err(map_js_error)
    }
}

fn map_js_error(err: JsValue) -> StorageError {
    if let Some(exception) = err.dyn_ref::<DomException>() {
        let name = exception.name();
        if name == "QuotaExceededError" || name == "NS_ERROR_DOM_QUOTA_REACHED" {
            return quota_exceeded(exception.message());
        }
        return io_error(format!("{name}: {}", exception.message()));
    }
    io_error(format!("Web storage error: {}", stringify_js_error(err)))
}

fn stringify_js_error(err: JsValue) -> String {
    if let Some(string) = err.as_string() {
        return string;
    }

    if let Ok(stringified) = js_sys::JSON::stringify(&err) {
        if let Some(text) = stringified.as_string() {
            return text;
        }
    }

    format!("{err:?}")
}
