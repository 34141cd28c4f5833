//! Logging setup for rulekeeper.
//!
//! Everything goes to stderr so that `--json` output on stdout stays
//! machine-readable. One-shot CLI commands log bare messages; the server
//! logs timestamps and targets.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Suppress all output except errors.
    Quiet,
    /// Normal output level (info and above).
    #[default]
    Normal,
    /// Verbose output (debug and above).
    Verbose,
    /// Very verbose output (trace level).
    Trace,
}

impl Verbosity {
    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// The filter directive used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_directive(&self) -> String {
        let level = self.to_level_filter();
        // Dependency noise (hyper, reqwest) only shows up at trace.
        if *self == Self::Trace {
            format!("rulekeeper={level},{level}")
        } else {
            format!("rulekeeper={level},warn")
        }
    }
}

/// How log lines are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    /// Level and message only, for short-lived commands.
    #[default]
    Cli,
    /// Timestamp, level, target and span fields, for `serve`.
    Server,
}

/// Initialize logging with the CLI style.
///
/// `RUST_LOG` takes precedence over `verbosity` when set.
///
/// # Examples
///
/// ```no_run
/// use rulekeeper::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    init_logging_with_style(verbosity, LogStyle::Cli);
}

/// Initialize logging with an explicit [`LogStyle`].
///
/// Calling this more than once is harmless; only the first call installs
/// a subscriber.
pub fn init_logging_with_style(verbosity: Verbosity, style: LogStyle) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_directive()));

    let cli_layer = (style == LogStyle::Cli).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
    });
    let server_layer = (style == LogStyle::Server).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(cli_layer)
        .with(server_layer)
        .try_init();
}

/// Initialize logging for tests.
///
/// Only warnings and errors are shown so test output stays readable.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_to_level() {
        assert_eq!(Verbosity::Quiet.to_level_filter(), Level::ERROR);
        assert_eq!(Verbosity::Normal.to_level_filter(), Level::INFO);
        assert_eq!(Verbosity::Verbose.to_level_filter(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.to_level_filter(), Level::TRACE);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
        assert_eq!(LogStyle::default(), LogStyle::Cli);
    }

    #[test]
    fn test_default_directive_scopes_crate() {
        assert_eq!(Verbosity::Normal.default_directive(), "rulekeeper=INFO,warn");
        assert_eq!(
            Verbosity::Verbose.default_directive(),
            "rulekeeper=DEBUG,warn"
        );
        assert_eq!(
            Verbosity::Trace.default_directive(),
            "rulekeeper=TRACE,TRACE"
        );
    }

    #[test]
    fn test_default_directive_parses() {
        for v in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::Trace,
        ] {
            assert!(EnvFilter::try_new(v.default_directive()).is_ok());
        }
    }

    #[test]
    fn test_repeated_init_does_not_panic() {
        init_logging(Verbosity::Quiet);
        init_logging_with_style(Verbosity::Normal, LogStyle::Server);
        init_logging_with_style(Verbosity::Trace, LogStyle::Cli);
        init_test_logging();
    }
}
