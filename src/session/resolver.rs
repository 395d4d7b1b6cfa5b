use std::time::Duration;

use serde_json::Value;

use crate::client::Diagnostics;
use crate::persistence::StorageHandle;
use crate::util::{now_millis, random_base36};

pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const SESSION_ID_KEY: &str = "observability_session_id";
pub const SESSION_ACTIVITY_KEY: &str = "observability_session_last_activity";
pub const USER_ID_KEY: &str = "observability_user_id";

/// Storage keys commonly holding a serialized "current user" object.
pub const USER_OBJECT_KEYS: &[&str] = &["user", "currentUser", "auth_user", "authUser"];
/// Storage keys commonly holding a bare numeric user id.
pub const USER_ID_KEYS: &[&str] = &["userId", "user_id"];

const SESSION_SUFFIX_LEN: usize = 9;

/// Derives the session id and the optional user id attached to every payload.
///
/// Sessions live in tab-scoped storage and expire after 30 minutes of inactivity. The user id is
/// resolved from origin-scoped storage on every call.
#[derive(Clone)]
pub struct SessionResolver {
    session_storage: StorageHandle,
    local_storage: StorageHandle,
    diagnostics: Diagnostics,
}

impl SessionResolver {
    pub fn new(
        session_storage: StorageHandle,
        local_storage: StorageHandle,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            session_storage,
            local_storage,
            diagnostics,
        }
    }

    /// Returns the current session id, minting a new one when absent or expired.
    pub fn get_session_id(&self) -> String {
        self.session_id_at(now_millis())
    }

    pub(crate) fn session_id_at(&self, now_ms: i64) -> String {
        let stored_id = self.read_session(SESSION_ID_KEY);
        let last_activity = self
            .read_session(SESSION_ACTIVITY_KEY)
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        match (stored_id, last_activity) {
            (Some(id), Some(last)) if !id.is_empty() && !is_expired(last, now_ms) => {
                self.write_session(SESSION_ACTIVITY_KEY, &now_ms.to_string());
                id
            }
            _ => self.mint_session(now_ms, None),
        }
    }

    /// Unconditionally replaces the session, e.g. on logout.
    pub fn reset_session(&self) -> String {
        let previous = self.read_session(SESSION_ID_KEY);
        self.mint_session(now_millis(), previous.as_deref())
    }

    fn mint_session(&self, now_ms: i64, previous: Option<&str>) -> String {
        let mut id = new_session_id(now_ms);
        while Some(id.as_str()) == previous {
            id = new_session_id(now_ms);
        }
        self.write_session(SESSION_ID_KEY, &id);
        self.write_session(SESSION_ACTIVITY_KEY, &now_ms.to_string());
        self.diagnostics.debug(format!("started session {id}"));
        id
    }

    fn read_session(&self, key: &str) -> Option<String> {
        match self.session_storage.get(key) {
            Ok(value) => value,
            Err(err) => {
                self.diagnostics
                    .debug(format!("session storage read of '{key}' failed: {err}"));
                None
            }
        }
    }

    fn write_session(&self, key: &str, value: &str) {
        if let Err(err) = self.session_storage.set(key, value) {
            self.diagnostics
                .debug(format!("session storage write of '{key}' failed: {err}"));
        }
    }

    /// Resolves the user id: the manual override first, then conventional auth storage shapes.
    pub fn get_user_id(&self) -> Option<i64> {
        if let Some(id) = self.read_local(USER_ID_KEY).as_deref().and_then(parse_numeric) {
            return Some(id);
        }

        let stores = [&self.local_storage, &self.session_storage];
        for key in USER_OBJECT_KEYS {
            for store in stores {
                let found = store
                    .get(key)
                    .ok()
                    .flatten()
                    .and_then(|raw| user_id_from_object(&raw));
                if found.is_some() {
                    return found;
                }
            }
        }

        for key in USER_ID_KEYS {
            for store in stores {
                let found = store
                    .get(key)
                    .ok()
                    .flatten()
                    .and_then(|raw| parse_numeric(&raw));
                if found.is_some() {
                    return found;
                }
            }
        }

        None
    }

    /// Stores (or with `None`, clears) the manual user id override.
    pub fn set_user_id(&self, user_id: Option<i64>) {
        let result = match user_id {
            Some(id) => self.local_storage.set(USER_ID_KEY, &id.to_string()),
            None => self.local_storage.remove(USER_ID_KEY),
        };
        if let Err(err) = result {
            self.diagnostics
                .warn(format!("failed to persist user id override: {err}"));
        }
    }

    fn read_local(&self, key: &str) -> Option<String> {
        self.local_storage.get(key).ok().flatten()
    }
}

fn is_expired(last_activity_ms: i64, now_ms: i64) -> bool {
    now_ms.saturating_sub(last_activity_ms) > SESSION_TIMEOUT.as_millis() as i64
}

fn new_session_id(now_ms: i64) -> String {
    format!("session_{}_{}", now_ms, random_base36(SESSION_SUFFIX_LEN))
}

/// Parses a stored user object, tolerating one level of double encoding (a JSON string that
/// itself contains the object).
fn user_id_from_object(raw: &str) -> Option<i64> {
    let mut value: Value = serde_json::from_str(raw).ok()?;
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner).ok()?;
    }
    let object = value.as_object()?;
    ["id", "user_id", "userId"]
        .iter()
        .find_map(|field| object.get(*field).and_then(numeric_value))
}

fn parse_numeric(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(id) = trimmed.parse::<i64>() {
        return Some(id);
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .as_ref()
        .and_then(numeric_value)
}

fn numeric_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}
