//! Logging and observability
//!
//! Structured logging via `tracing`, with text or JSON output selected at runtime.
//! All logging output is directed to stderr so stdout stays reserved for command
//! output (plans, argument vectors, scripts).

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable selecting the log format (`json` or `text`)
pub const LOG_FORMAT_ENV: &str = "DCPLAN_LOG_FORMAT";

/// Environment variable holding the log filter directive
pub const LOG_FILTER_ENV: &str = "DCPLAN_LOG";

/// Initialize the logging system with an optional format specification
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// ## Arguments
///
/// * `format` - `None` or `"text"` for human-readable output, `"json"` for one JSON
///   object per event. When `None`, `DCPLAN_LOG_FORMAT` is consulted.
///
/// ## Environment Variables
///
/// * `DCPLAN_LOG_FORMAT` - log output format when no explicit format is given
/// * `DCPLAN_LOG` - filter directive (e.g. `dcplan_core=debug`)
/// * `RUST_LOG` - fallback filter directive
///
/// ## Example
///
/// ```rust
/// use dcplan_core::logging;
///
/// logging::init(None).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var(LOG_FORMAT_ENV).ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(fmt::format::FmtSpan::CLOSE)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Create an EnvFilter from `DCPLAN_LOG`, then `RUST_LOG`, then `info`
fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var(LOG_FILTER_ENV) {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid {} specification '{}', using default 'info'",
                LOG_FILTER_ENV,
                spec
            );
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
