use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// The backend refused the write because it is full.
    QuotaExceeded,
    Unavailable,
    Io,
    Serialization,
}

impl StorageErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorCode::QuotaExceeded => "storage/quota-exceeded",
            StorageErrorCode::Unavailable => "storage/unavailable",
            StorageErrorCode::Io => "storage/io",
            StorageErrorCode::Serialization => "storage/serialization",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageError {
    pub code: StorageErrorCode,
    message: String,
}

impl StorageError {
    pub fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.code == StorageErrorCode::QuotaExceeded
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for StorageError {}

pub type StorageResult<T> = Result<T, StorageError>;

pub fn quota_exceeded(message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorCode::QuotaExceeded, message)
}

pub fn unavailable(message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorCode::Unavailable, message)
}

pub fn io_error(message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorCode::Io, message)
}

pub fn serialization_error(message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorCode::Serialization, message)
}
