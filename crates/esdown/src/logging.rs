//! Logging configuration for esdown.
//!
//! Sets up the tracing-based logging used by the build and watch pipelines.
//! Watch mode lives or dies by readable change logs, so the defaults keep
//! timestamps and targets on and everything else off.

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
    /// Convert verbosity to a tracing level.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// The default filter directives for this verbosity, covering both the
    /// tool crate and the watch layer.
    #[must_use]
    pub fn directives(self) -> String {
        let level = self.level();
        format!("esdown={level},esdown_watch={level}")
    }
}

/// Initialize the logging system.
///
/// Called once at startup. The level comes from the `verbosity` parameter
/// unless the `RUST_LOG` environment variable is set, which takes precedence.
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directives()));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    // Ignore the error if a subscriber is already installed.
    let _ = subscriber.try_init();
}

/// Initialize logging for tests.
///
/// Only warnings and errors, routed through the test writer so output stays
/// attached to the test that produced it.
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
    fn test_verbosity_level() {
        assert_eq!(Verbosity::Quiet.level(), Level::ERROR);
        assert_eq!(Verbosity::Normal.level(), Level::INFO);
        assert_eq!(Verbosity::Verbose.level(), Level::DEBUG);
        assert_eq!(Verbosity::Trace.level(), Level::TRACE);
    }

    #[test]
    fn test_verbosity_default() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_directives_cover_both_crates() {
        let directives = Verbosity::Verbose.directives();
        assert!(directives.contains("esdown=DEBUG"));
        assert!(directives.contains("esdown_watch=DEBUG"));
    }

    #[test]
    fn test_init_logging_does_not_panic() {
        // The subscriber may already be set from a previous test; the
        // function ignores that.
        init_logging(Verbosity::Normal);
        init_logging(Verbosity::Quiet);
    }

    #[test]
    fn test_init_test_logging_does_not_panic() {
        init_test_logging();
    }
}
