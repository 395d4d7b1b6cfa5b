//! Named loggers with pluggable handlers.
//!
//! Every component that reports diagnostics owns a [`Logger`]. The default handler prints a
//! timestamped line to stdout/stderr; hosts (and tests) can replace it per logger to route records
//! elsewhere.

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

type SharedLogHandler = Arc<dyn Fn(&LogRecord) + Send + Sync + 'static>;

#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    name: String,
    log_level: AtomicU8,
    log_handler: RwLock<SharedLogHandler>,
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_level(name, LogLevel::Info)
    }

    pub fn with_level(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                name: name.into(),
                log_level: AtomicU8::new(level as u8),
                log_handler: RwLock::new(default_log_handler_arc()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.log_level.load(Ordering::SeqCst))
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.inner.log_level.store(level as u8, Ordering::SeqCst);
    }

    /// Replaces the handler that receives records at or above the logger's level.
    pub fn set_log_handler<F>(&self, handler: F)
    where
        F: Fn(&LogRecord) + Send + Sync + 'static,
    {
        *self
            .inner
            .log_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(handler);
    }

    pub fn reset_log_handler(&self) {
        *self
            .inner
            .log_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = default_log_handler_arc();
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Silent && level >= self.log_level()
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Debug, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Error, message.into());
    }

    fn dispatch(&self, level: LogLevel, message: String) {
        if !self.is_enabled(level) {
            return;
        }
        let handler = self
            .inner
            .log_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let record = LogRecord {
            level,
            logger: self.inner.name.clone(),
            message,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        handler(&record);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("level", &self.log_level())
            .finish()
    }
}

/// A single diagnostic emitted by a [`Logger`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub logger: String,
    pub message: String,
    pub timestamp: String,
}

fn default_log_handler_arc() -> SharedLogHandler {
    Arc::new(default_log_handler)
}

fn default_log_handler(record: &LogRecord) {
    let header = format!("[{}]  {}:", record.timestamp, record.logger);
    match record.level {
        LogLevel::Warn | LogLevel::Error => eprintln!("{header} {}", record.message),
        _ => println!("{header} {}", record.message),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Silent = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "verbose" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(LogError::InvalidLogLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LogError {
    InvalidLogLevel(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidLogLevel(level) => {
                write!(f, "Invalid value \"{level}\" assigned to `logLevel`")
            }
        }
    }
}

impl std::error::Error for LogError {}
