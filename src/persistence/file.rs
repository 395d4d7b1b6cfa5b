use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use percent_encoding::{percent_encode, NON_ALPHANUMERIC};

use crate::persistence::error::{io_error, quota_exceeded, StorageError, StorageResult};
use crate::persistence::KeyValueStorage;
use crate::platform::environment::ENV_STORAGE_DIR;

const ENOSPC: i32 = 28;

/// Stores each key in its own file below `base_dir`.
#[derive(Clone, Debug)]
pub struct FileStorage {
    base_dir: Arc<PathBuf>,
}

impl FileStorage {
    pub fn new(base_dir: PathBuf) -> StorageResult<Self> {
        fs::create_dir_all(&base_dir).map_err(|err| {
            io_error(format!(
                "Failed to create observability storage directory '{}': {}",
                base_dir.display(),
                err
            ))
        })?;
        Ok(Self {
            base_dir: Arc::new(base_dir),
        })
    }

    /// Directory for one storage scope below `OBSERVABILITY_STORAGE_DIR`, or below
    /// `observability-client` in the system temp dir when the variable is unset.
    pub fn for_scope(scope: &str) -> StorageResult<Self> {
        let root = std::env::var(ENV_STORAGE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("observability-client"));
        Self::new(root.join(encode_segment(scope)))
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.value", encode_segment(key)))
    }
}

fn encode_segment(raw: &str) -> String {
    percent_encode(raw.as_bytes(), NON_ALPHANUMERIC).to_string()
}

fn map_write_error(path: &std::path::Path, err: io::Error) -> StorageError {
    let message = format!("Failed to write '{}': {}", path.display(), err);
    if err.raw_os_error() == Some(ENOSPC) {
        quota_exceeded(message)
    } else {
        io_error(message)
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.file_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(format!(
                "Failed to read '{}': {}",
                path.display(),
                err
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.file_for(key);
        let staging = path.with_extension("tmp");
        fs::write(&staging, value.as_bytes()).map_err(|err| map_write_error(&staging, err))?;
        fs::rename(&staging, &path).map_err(|err| map_write_error(&path, err))
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.file_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(format!(
                "Failed to delete '{}': {}",
                path.display(),
                err
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir() -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let mut path = std::env::temp_dir();
        path.push(format!(
            "observability-file-storage-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        path
    }

    #[test]
    fn file_storage_round_trip() {
        let dir = temp_dir();
        let storage = FileStorage::new(dir.clone()).unwrap();

        storage.set("queue/key", "[1,2,3]").unwrap();
        assert_eq!(storage.get("queue/key").unwrap().as_deref(), Some("[1,2,3]"));

        let reopened = FileStorage::new(dir.clone()).unwrap();
        assert_eq!(reopened.get("queue/key").unwrap().as_deref(), Some("[1,2,3]"));

        reopened.remove("queue/key").unwrap();
        assert!(reopened.get("queue/key").unwrap().is_none());
        reopened.remove("queue/key").unwrap();
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn scopes_map_to_distinct_directories() {
        let billing = FileStorage::for_scope("billing@http://localhost:8006").unwrap();
        let search = FileStorage::for_scope("search@http://localhost:8006").unwrap();
        assert_ne!(billing.base_dir(), search.base_dir());
        assert!(billing
            .base_dir()
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| !name.contains('/')));

        billing.set("k", "billing").unwrap();
        assert_eq!(search.get("k").unwrap(), None);
        billing.remove("k").unwrap();
    }
}
