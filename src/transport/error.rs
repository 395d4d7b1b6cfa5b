use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportErrorCode {
    /// No response could be obtained (DNS, refused connection, reset).
    Connectivity,
    Timeout,
    /// The platform refused to expose the response (CORS). Retrying cannot succeed.
    Blocked,
    Internal,
}

impl TransportErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorCode::Connectivity => "transport/connectivity",
            TransportErrorCode::Timeout => "transport/timeout",
            TransportErrorCode::Blocked => "transport/blocked",
            TransportErrorCode::Internal => "transport/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransportError {
    pub code: TransportErrorCode,
    message: String,
}

impl TransportError {
    pub fn new(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult<T> = Result<T, TransportError>;

pub fn connectivity_error(message: impl Into<String>) -> TransportError {
    TransportError::new(TransportErrorCode::Connectivity, message)
}

pub fn timeout_error(message: impl Into<String>) -> TransportError {
    TransportError::new(TransportErrorCode::Timeout, message)
}

pub fn blocked_error(message: impl Into<String>) -> TransportError {
    TransportError::new(TransportErrorCode::Blocked, message)
}

pub fn internal_error(message: impl Into<String>) -> TransportError {
    TransportError::new(TransportErrorCode::Internal, message)
}
