use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Radius used by explicit job searches when the caller supplies none.
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 20_000.0;
/// Radius used by passive feeds (my jobs, location rematch).
pub const DEFAULT_FEED_RADIUS_M: f64 = 10_000.0;
pub const DEFAULT_REMATCH_COOLDOWN_SECS: u64 = 30;

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
    pub dispatch: DispatchConfig,
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
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let search_radius_m = radius_from_env("DISPATCH_SEARCH_RADIUS_M", DEFAULT_SEARCH_RADIUS_M)?;
        let feed_radius_m = radius_from_env("DISPATCH_FEED_RADIUS_M", DEFAULT_FEED_RADIUS_M)?;
        let cooldown_secs = match env::var("DISPATCH_REMATCH_COOLDOWN_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => secs,
                Err(_) => return Err(ConfigError::InvalidCooldown { value: raw }),
            },
            Err(_) => DEFAULT_REMATCH_COOLDOWN_SECS,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            dispatch: DispatchConfig {
                search_radius_m,
                feed_radius_m,
                rematch_cooldown: Duration::from_secs(cooldown_secs),
            },
        })
    }
}

fn radius_from_env(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        _ => Err(ConfigError::InvalidRadius { key, value: raw }),
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
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    /// Includes event targets, useful when filtering per component.
    Full,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" | "verbose" => Self::Full,
            _ => Self::Compact,
        }
    }
}

/// Matching knobs. The two radii are deliberately independent.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub search_radius_m: f64,
    pub feed_radius_m: f64,
    pub rematch_cooldown: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
            feed_radius_m: DEFAULT_FEED_RADIUS_M,
            rematch_cooldown: Duration::from_secs(DEFAULT_REMATCH_COOLDOWN_SECS),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidRadius { key: &'static str, value: String },
    InvalidCooldown { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidRadius { key, value } => {
                write!(f, "{key} must be a positive number of meters, got '{value}'")
            }
            ConfigError::InvalidCooldown { value } => write!(
                f,
                "DISPATCH_REMATCH_COOLDOWN_SECS must be a whole number of seconds, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidRadius { .. }
            | ConfigError::InvalidCooldown { .. } => None,
        }
    }
}

/// Serializes tests that read or write process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}
