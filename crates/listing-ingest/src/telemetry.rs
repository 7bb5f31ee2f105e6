use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Per-statement logging from the database driver is noisy at `info`.
const QUIET_DEPENDENCIES: &[&str] = &["sqlx=warn", "opensearch=warn", "hyper=warn"];

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(
                    f,
                    "invalid log level/filter '{}': unable to build EnvFilter",
                    value
                )
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level plus quieter dependency targets.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directive = configured_directive(&config.log_level);
    EnvFilter::try_new(&directive).map_err(|source| TelemetryError::EnvFilter {
        value: config.log_level.clone(),
        source,
    })
}

fn configured_directive(log_level: &str) -> String {
    let mut directives = vec![log_level.trim().to_string()];
    for quiet in QUIET_DEPENDENCIES {
        let target = quiet.split('=').next().unwrap_or_default();
        if !log_level.contains(target) {
            directives.push((*quiet).to_string());
        }
    }
    directives.join(",")
}

/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_targets_are_quieted_unless_configured() {
        assert_eq!(
            configured_directive("debug"),
            "debug,sqlx=warn,opensearch=warn,hyper=warn"
        );
        assert_eq!(
            configured_directive("info,sqlx=debug"),
            "info,sqlx=debug,opensearch=warn,hyper=warn"
        );
    }

    #[test]
    fn invalid_levels_are_reported() {
        let err = EnvFilter::try_new(configured_directive("listing_ingest=verbose")).map(|_| ());
        assert!(err.is_err());
    }
}
