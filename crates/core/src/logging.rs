use tracing::Level;

use crate::config::{LogFormat, LoggingConfig};

/// Where formatted log lines are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    /// Used by the interactive client so the transcript on stdout stays clean.
    Stderr,
}

/// Installs the global `tracing` subscriber. Later calls are ignored.
pub fn init(config: &LoggingConfig, target: LogTarget) {
    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(log_level);

    let result = match (config.format, target) {
        (LogFormat::Compact, LogTarget::Stdout) => builder.compact().try_init(),
        (LogFormat::Compact, LogTarget::Stderr) => {
            builder.compact().with_writer(std::io::stderr).try_init()
        }
        (LogFormat::Pretty, LogTarget::Stdout) => builder.pretty().try_init(),
        (LogFormat::Pretty, LogTarget::Stderr) => {
            builder.pretty().with_writer(std::io::stderr).try_init()
        }
        (LogFormat::Json, LogTarget::Stdout) => builder.json().try_init(),
        (LogFormat::Json, LogTarget::Stderr) => {
            builder.json().with_writer(std::io::stderr).try_init()
        }
    };

    if let Err(error) = result {
        tracing::debug!(error = %error, "tracing subscriber already installed");
    }
}
