//! A stderr logger for the `log` facade.

use log::{LevelFilter, Log, Metadata, Record};

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match crate::machine::current_thread() {
            Some(th) => eprintln!("[{}] [{}:{}] {}", record.level(), th.tid, th.name, record.args()),
            None => eprintln!("[{}] [-] {}", record.level(), record.args()),
        }
    }

    fn flush(&self) {}
}

fn level_from_env() -> LevelFilter {
    std::env::var("SYNCH_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(LevelFilter::Warn)
}

/// Installs the logger once per process.
pub(crate) fn init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(level_from_env());
        }
    });
}
