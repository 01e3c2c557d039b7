use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

/// Environment variable holding the maximum log level.
pub const LOG_LEVEL_ENV: &str = "PHYSMEM_LOG";

pub struct StderrLogger {
    max_level: LevelFilter,
}

impl StderrLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Logger at the level named by [`LOG_LEVEL_ENV`], `info` if unset.
    ///
    /// An unparsable level is reported on stderr and replaced by `info`.
    #[must_use]
    pub fn from_env() -> Self {
        let level = match std::env::var(LOG_LEVEL_ENV) {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                eprintln!("ignoring {LOG_LEVEL_ENV}={value:?}, using info");
                LevelFilter::Info
            }),
            Err(_) => LevelFilter::Info,
        };
        Self::new(level)
    }

    /// Call this once at startup.
    ///
    /// # Errors
    /// If a logger has already been installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n"
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
