use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

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

        let dispatch = DispatchConfig {
            offer_timeout_secs: positive_u64("DISPATCH_OFFER_TIMEOUT_SECS", 45)?,
            max_offer_attempts: positive_u32("DISPATCH_MAX_OFFER_ATTEMPTS", 5)?,
            audit_cache_ttl_secs: positive_u64("DISPATCH_AUDIT_CACHE_TTL_SECS", 30)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            dispatch,
        })
    }
}

fn positive_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidDispatchSetting { name })?,
        Err(_) => default,
    };

    if value == 0 {
        return Err(ConfigError::InvalidDispatchSetting { name });
    }
    Ok(value)
}

fn positive_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let value = positive_u64(name, u64::from(default))?;
    u32::try_from(value).map_err(|_| ConfigError::InvalidDispatchSetting { name })
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

/// Knobs for the offer cycle and coverage audits.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub offer_timeout_secs: u64,
    pub max_offer_attempts: u32,
    pub audit_cache_ttl_secs: u64,
}

impl DispatchConfig {
    pub fn offer_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.offer_timeout_secs as i64)
    }

    pub fn audit_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.audit_cache_ttl_secs as i64)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_timeout_secs: 45,
            max_offer_attempts: 5,
            audit_cache_ttl_secs: 30,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDispatchSetting { name: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDispatchSetting { name } => {
                write!(f, "{name} must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidDispatchSetting { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
