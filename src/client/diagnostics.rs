use crate::logger::{LogLevel, Logger};

pub const DIAGNOSTICS_LOGGER: &str = "@observability/client";

/// The single sink for internal failures. Emits only in dev mode.
#[derive(Clone, Debug)]
pub struct Diagnostics {
    logger: Logger,
}

impl Diagnostics {
    pub fn new(dev_mode: bool) -> Self {
        let level = if dev_mode {
            LogLevel::Debug
        } else {
            LogLevel::Silent
        };
        Self {
            logger: Logger::with_level(DIAGNOSTICS_LOGGER, level),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn enabled(&self) -> bool {
        self.logger.is_enabled(LogLevel::Debug)
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.logger.debug(message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.logger.warn(message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.logger.error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn silent_outside_dev_mode() {
        let quiet = Diagnostics::new(false);
        let verbose = Diagnostics::new(true);
        let records = Arc::new(Mutex::new(Vec::new()));
        for diagnostics in [&quiet, &verbose] {
            let sink = Arc::clone(&records);
            diagnostics
                .logger()
                .set_log_handler(move |record| sink.lock().unwrap().push(record.message.clone()));
        }

        quiet.error("hidden");
        verbose.debug("shown");

        assert!(!quiet.enabled());
        assert_eq!(records.lock().unwrap().as_slice(), ["shown".to_string()]);
    }
}
