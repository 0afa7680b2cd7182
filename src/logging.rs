use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Evaluates a `Result`, logging the error at warn level and yielding `None`
/// in its place.
#[macro_export]
macro_rules! with_warn {
    ($expr: expr) => (with_warn!("{}", $expr));
    ($fmt: tt, $expr: expr) => (match $expr {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!($fmt, e);
            None
        }
    });
}

/// Like `with_warn!`, but for expected failures, which are logged at debug
/// level.
#[macro_export]
macro_rules! catching {
    ($expr: expr) => (catching!("{}", $expr));
    ($fmt: tt, $expr: expr) => (match $expr {
        Ok(v) => Some(v),
        Err(e) => {
            log::debug!($fmt, e);
            None
        }
    });
}

#[macro_export]
macro_rules! catching_at {
    ($log_fn: ident, $expr: expr) => (catching_at!($log_fn, "{}", $expr));
    ($log_fn: ident, $fmt: tt, $expr: expr) => (match $expr {
        Ok(v) => Some(v),
        Err(e) => {
            log::$log_fn!($fmt, e);
            None
        }
    });
}

pub struct SimpleLogger;

static LOGGER: SimpleLogger = SimpleLogger;

/// Installs the logger, printing records up to `level` to stderr.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] [{}] {}", record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
