use crate::workflows::listings::{
    DuplicatePolicy, IngestionSettings, ListingField, RetryPolicy, SinkTargets, SourceOptions,
    UnknownColumnPolicy,
};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub warehouse: WarehouseConfig,
    pub search: SearchConfig,
    pub ingest: IngestConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let warehouse = WarehouseConfig {
            database_url: optional_var("WAREHOUSE_DATABASE_URL"),
            table: env::var("WAREHOUSE_TABLE")
                .unwrap_or_else(|_| "real_estate.transactions".to_string()),
        };

        let search = SearchConfig {
            url: optional_var("SEARCH_URL"),
            username: optional_var("SEARCH_USERNAME"),
            password: optional_var("SEARCH_PASSWORD"),
            index: env::var("SEARCH_INDEX").unwrap_or_else(|_| "real_estate_index_map".to_string()),
            excluded_fields: parse_excluded_fields(
                &env::var("SEARCH_EXCLUDED_FIELDS").unwrap_or_default(),
            )?,
        };

        let ingest = IngestConfig {
            max_concurrency: positive_var("INGEST_MAX_CONCURRENCY", 8)?,
            max_attempts: positive_var("INGEST_MAX_ATTEMPTS", 3)?,
            retry_base_ms: parsed_var("INGEST_RETRY_BASE_MS", 200)?,
            retry_max_ms: parsed_var("INGEST_RETRY_MAX_MS", 5_000)?,
            duplicate_policy: match optional_var("INGEST_DUPLICATE_POLICY").as_deref() {
                None | Some("last-row-wins") => DuplicatePolicy::LastRowWins,
                Some("reject") => DuplicatePolicy::Reject,
                Some(_) => return Err(ConfigError::invalid("INGEST_DUPLICATE_POLICY")),
            },
            unknown_columns: match optional_var("INGEST_UNKNOWN_COLUMNS").as_deref() {
                None | Some("ignore") => UnknownColumnPolicy::Ignore,
                Some("reject") => UnknownColumnPolicy::Reject,
                Some(_) => return Err(ConfigError::invalid("INGEST_UNKNOWN_COLUMNS")),
            },
            delimiter: match optional_var("INGEST_DELIMITER") {
                None => b',',
                Some(value) if value == "\\t" => b'\t',
                Some(value) if value.len() == 1 && value.is_ascii() => value.as_bytes()[0],
                Some(_) => return Err(ConfigError::invalid("INGEST_DELIMITER")),
            },
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            warehouse,
            search,
            ingest,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Warehouse connection. Without a URL the service writes to an in-memory table.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub database_url: Option<String>,
    pub table: String,
}

/// Search cluster connection. Without a URL the service writes to an in-memory index.
#[derive(Clone)]
pub struct SearchConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index: String,
    pub excluded_fields: Vec<ListingField>,
}

impl SearchConfig {
    pub fn credentials(&self) -> Option<(String, String)> {
        let username = self.username.clone()?;
        Some((username, self.password.clone().unwrap_or_default()))
    }
}

impl fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("index", &self.index)
            .field("excluded_fields", &self.excluded_fields)
            .finish()
    }
}

/// Pipeline tuning and policy knobs.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub duplicate_policy: DuplicatePolicy,
    pub unknown_columns: UnknownColumnPolicy,
    pub delimiter: u8,
}

impl AppConfig {
    pub fn ingestion_settings(&self) -> IngestionSettings {
        IngestionSettings {
            source: SourceOptions {
                delimiter: self.ingest.delimiter,
                unknown_columns: self.ingest.unknown_columns,
            },
            duplicates: self.ingest.duplicate_policy,
            max_concurrency: self.ingest.max_concurrency,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.ingest.max_attempts,
            base_delay: Duration::from_millis(self.ingest.retry_base_ms),
            max_delay: Duration::from_millis(self.ingest.retry_max_ms),
        }
    }

    pub fn sink_targets(&self) -> SinkTargets {
        SinkTargets {
            table: self.warehouse.table.clone(),
            index: self.search.index.clone(),
            search_excluded: self.search.excluded_fields.clone(),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::invalid(name)),
    }
}

fn positive_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + From<u8>,
{
    let value = parsed_var(name, default)?;
    if value < T::from(1) {
        return Err(ConfigError::invalid(name));
    }
    Ok(value)
}

fn parse_excluded_fields(raw: &str) -> Result<Vec<ListingField>, ConfigError> {
    let mut fields = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let field = ListingField::from_name(name)
            .ok_or_else(|| ConfigError::UnknownSearchField(name.to_string()))?;
        if field == ListingField::Id {
            return Err(ConfigError::IdentityExcluded);
        }
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    Ok(fields)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { variable: &'static str },
    UnknownSearchField(String),
    IdentityExcluded,
}

impl ConfigError {
    fn invalid(variable: &'static str) -> Self {
        Self::InvalidValue { variable }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { variable } => {
                write!(f, "{} has an unsupported value", variable)
            }
            ConfigError::UnknownSearchField(name) => write!(
                f,
                "SEARCH_EXCLUDED_FIELDS names '{}', which is not a listing column",
                name
            ),
            ConfigError::IdentityExcluded => {
                write!(f, "SEARCH_EXCLUDED_FIELDS must not exclude the id column")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
