use std::str::FromStr;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Overrides `--log-level` with per-target directives, e.g.
/// `recmux_frame=trace,warn`.
pub const LOG_ENV: &str = "RECMUX_LOG";

/// Targets that follow `--log-level`; everything else is capped at `warn`.
const RECMUX_TARGETS: [&str; 4] = ["recmux", "recmux_transport", "recmux_frame", "recmux_process"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Per-target filter: the recmux crates at `level`, dependencies at most `warn`.
pub fn targets_for(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_targets(RECMUX_TARGETS.map(|target| (target, level)))
}

/// Log to stderr; stdout is reserved for messages.
///
/// A valid [`LOG_ENV`] replaces the filter derived from `level`.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let targets = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directives| Targets::from_str(&directives).ok())
        .unwrap_or_else(|| targets_for(level));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(targets);

    match format {
        LogFormat::Text => {
            let _ = registry.with(layer).try_init();
        }
        LogFormat::Json => {
            let _ = registry.with(layer.json()).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn recmux_crates_follow_requested_level() {
        let targets = targets_for(LogLevel::Trace);
        assert!(targets.would_enable("recmux_frame::in_queue", &Level::TRACE));
        assert!(targets.would_enable("recmux_process", &Level::DEBUG));
    }

    #[test]
    fn dependencies_are_capped_at_warn() {
        let targets = targets_for(LogLevel::Debug);
        assert!(!targets.would_enable("ctrlc", &Level::DEBUG));
        assert!(targets.would_enable("ctrlc", &Level::WARN));
    }

    #[test]
    fn quiet_level_applies_everywhere() {
        let targets = targets_for(LogLevel::Error);
        assert!(!targets.would_enable("recmux_process", &Level::WARN));
        assert!(!targets.would_enable("other", &Level::WARN));
        assert!(targets.would_enable("other", &Level::ERROR));
    }
}
