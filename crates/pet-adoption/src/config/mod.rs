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
    pub workflow: WorkflowConfig,
    pub admin: Option<AdminBootstrap>,
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
        let include_targets = env::var("APP_LOG_TARGETS")
            .map(|raw| parse_flag(&raw))
            .unwrap_or(false);

        let workflow = WorkflowConfig::from_env()?;

        let admin = match (env::var("APP_ADMIN_EMAIL"), env::var("APP_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminBootstrap { email, password }),
            (Err(_), Err(_)) => None,
            _ => return Err(ConfigError::IncompleteAdminBootstrap),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                include_targets,
            },
            workflow,
            admin,
        })
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub include_targets: bool,
}

/// What happens to a pet when its pending application is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectionPolicy {
    /// The pet stays PENDING until an admin acts on it.
    #[default]
    KeepPending,
    /// The pet returns to AVAILABLE once no other application is pending for it.
    ReleasePet,
}

impl RejectionPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keep_pending" | "keep-pending" => Some(Self::KeepPending),
            "release_pet" | "release-pet" | "release" => Some(Self::ReleasePet),
            _ => None,
        }
    }
}

/// Tuning for the adoption workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub max_transaction_attempts: u32,
    pub rejection_policy: RejectionPolicy,
    pub subscription_buffer: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_transaction_attempts: 5,
            rejection_policy: RejectionPolicy::KeepPending,
            subscription_buffer: 16,
        }
    }
}

impl WorkflowConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_transaction_attempts = match env::var("APP_TXN_MAX_ATTEMPTS") {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(value) if value > 0 => value,
                _ => return Err(ConfigError::InvalidTransactionAttempts),
            },
            Err(_) => defaults.max_transaction_attempts,
        };

        let rejection_policy = match env::var("APP_REJECTION_POLICY") {
            Ok(raw) => RejectionPolicy::parse(&raw)
                .ok_or(ConfigError::InvalidRejectionPolicy { value: raw })?,
            Err(_) => defaults.rejection_policy,
        };

        let subscription_buffer = match env::var("APP_SUBSCRIPTION_BUFFER") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => value,
                _ => return Err(ConfigError::InvalidSubscriptionBuffer),
            },
            Err(_) => defaults.subscription_buffer,
        };

        Ok(Self {
            max_transaction_attempts,
            rejection_policy,
            subscription_buffer,
        })
    }
}

/// Credentials for the administrator account created at startup.
#[derive(Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTransactionAttempts,
    InvalidRejectionPolicy { value: String },
    InvalidSubscriptionBuffer,
    IncompleteAdminBootstrap,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTransactionAttempts => {
                write!(f, "APP_TXN_MAX_ATTEMPTS must be a positive integer")
            }
            ConfigError::InvalidRejectionPolicy { value } => write!(
                f,
                "APP_REJECTION_POLICY '{}' must be keep_pending or release_pet",
                value
            ),
            ConfigError::InvalidSubscriptionBuffer => {
                write!(f, "APP_SUBSCRIPTION_BUFFER must be a positive integer")
            }
            ConfigError::IncompleteAdminBootstrap => write!(
                f,
                "APP_ADMIN_EMAIL and APP_ADMIN_PASSWORD must be set together"
            ),
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
