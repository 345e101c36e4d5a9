use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Output shape of the log lines, chosen with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown LOG_FORMAT '{}'", other)),
        }
    }
}

/// Directives used when `RUST_LOG` is unset: the bridge itself plus request
/// spans from the HTTP trace layer.
pub fn default_directives(service: &str) -> String {
    format!("{}=info,tower_http=info", service)
}

/// Installs the global subscriber for the bridge.
///
/// `RUST_LOG` overrides [`default_directives`]; `LOG_FORMAT=json` switches to
/// one JSON object per line for log collectors.
pub fn init_logger(service: &str) -> Result<(), String> {
    let format = match std::env::var("LOG_FORMAT") {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::default(),
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(service)));

    let fmt_layer = match format {
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize logger: {}", e))
}
