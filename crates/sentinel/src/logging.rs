//! Logging configuration for sentinel.
//!
//! Diagnostics go to stderr so that `simulate` and the listing commands can
//! keep stdout for their own output. Request traces from the dashboard only
//! show up at `-v` and above; the page polls every two seconds and would
//! drown everything else at the normal level.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Info and above.
    #[default]
    Normal,
    /// Debug and above, plus HTTP request traces.
    Verbose,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Level used for the `sentinel` target.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Level used for the `tower_http` request traces.
    #[must_use]
    pub fn http_level(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Filter directives applied when `RUST_LOG` is unset.
#[must_use]
pub fn default_filter(verbosity: Verbosity) -> String {
    format!(
        "sentinel={},tower_http={}",
        verbosity.to_level_filter(),
        verbosity.http_level()
    )
}

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `verbosity`. Later calls are no-ops.
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(false)
            .with_line_number(false),
    );

    let _ = subscriber.try_init();
}

/// Warnings and errors only, routed through the test harness's capture.
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
    fn test_verbosity_default() {
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn test_default_filter_hides_requests_at_normal_level() {
        assert_eq!(
            default_filter(Verbosity::Normal),
            "sentinel=INFO,tower_http=WARN"
        );
        assert_eq!(
            default_filter(Verbosity::Quiet),
            "sentinel=ERROR,tower_http=ERROR"
        );
    }

    #[test]
    fn test_default_filter_shows_requests_when_verbose() {
        assert_eq!(
            default_filter(Verbosity::Verbose),
            "sentinel=DEBUG,tower_http=DEBUG"
        );
        assert_eq!(
            default_filter(Verbosity::Trace),
            "sentinel=TRACE,tower_http=TRACE"
        );
    }

    #[test]
    fn test_default_filters_parse() {
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::Trace,
        ] {
            assert!(EnvFilter::try_new(default_filter(verbosity)).is_ok());
        }
    }

    #[test]
    fn test_init_logging_repeated_calls() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Trace);
    }
}
