//! Tracing subscriber setup for the binary

use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Parse the `general.log_format` setting; unknown values fall back to text
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Default filter for a `-v` count: 0 = warn, 1 = info, 2+ = debug
pub fn filter_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "stencil=warn",
        1 => "stencil=info",
        _ => "stencil=debug",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the verbosity flag.
///
/// Logs go to stderr. Calling this twice is a no-op.
pub fn init(verbosity: u8, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbosity)));

    let result = match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
