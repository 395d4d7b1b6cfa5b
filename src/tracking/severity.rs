use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// 5xx is an error, 404 is informational, other 4xx are warnings. Without a status the
    /// failure happened at the network layer and counts as an error.
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            None => Severity::Error,
            Some(status) if status >= 500 => Severity::Error,
            Some(404) => Severity::Info,
            Some(400..=499) => Severity::Warning,
            Some(_) => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
