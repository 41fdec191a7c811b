//! Stderr logger for sessions that do not install their own.
//!
//! Lines look like `12.345 INFO  engine: message`, with seconds since the
//! logger was installed. Records from this workspace's crates pass at the
//! configured level; other crates are capped at `Warn` so codec chatter does
//! not drown the per-frame messages.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_PREFIX: &str = "calib_ar";

struct SessionLogger {
    own: LevelFilter,
    foreign: LevelFilter,
    started: Instant,
}

impl SessionLogger {
    fn new(level: LevelFilter) -> Self {
        Self {
            own: level,
            foreign: level.min(LevelFilter::Warn),
            started: Instant::now(),
        }
    }

    fn limit_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(OWN_PREFIX) {
            self.own
        } else {
            self.foreign
        }
    }
}

/// `calib_ar::engine` -> `engine`; foreign targets are kept whole.
fn short_target(target: &str) -> &str {
    match target.split_once("::") {
        Some((krate, rest)) if krate.starts_with(OWN_PREFIX) => rest,
        _ => target,
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.limit_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{:.3} {:<5} {}: {}\n",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            short_target(record.target()),
            record.args()
        );
        // one write per record keeps lines whole across threads
        let _ = std::io::stderr().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

/// Install the logger at `level` for this workspace's crates.
///
/// The first call wins; later calls return `Ok` without changing anything.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| SessionLogger::new(level));
    log::set_logger(logger)?;
    log::set_max_level(logger.own.max(logger.foreign));
    Ok(())
}

/// Parse a level name (`"off"`, `"error"`, ..., `"trace"`), defaulting to
/// `Info` for `None` or unknown names.
pub fn parse_level(name: Option<&str>) -> LevelFilter {
    name.and_then(|s| LevelFilter::from_str(s.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the logger from an optional config string.
pub fn init_from_config(level: Option<&str>) -> Result<(), log::SetLoggerError> {
    init_with_level(parse_level(level))
}

#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}
