use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigErrorCode {
    InvalidOptions,
}

impl ConfigErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigErrorCode::InvalidOptions => "config/invalid-options",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConfigError {
    pub code: ConfigErrorCode,
    message: String,
}

impl ConfigError {
    pub fn new(code: ConfigErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub fn invalid_options(message: impl Into<String>) -> ConfigError {
    ConfigError::new(ConfigErrorCode::InvalidOptions, message)
}
