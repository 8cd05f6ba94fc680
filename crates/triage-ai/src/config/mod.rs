use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

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
    pub database: DatabaseConfig,
    pub triage: TriageConfig,
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

        let database = DatabaseConfig {
            path: env::var("TRIAGE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("triage.db")),
        };

        let triage = TriageConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database,
            triage,
        })
    }

    /// Install the process-wide tracing subscriber and announce the triage
    /// runtime shape.
    ///
    /// `RUST_LOG` wins over the configured level so operators can raise
    /// verbosity without touching the service configuration.
    pub fn init_telemetry(&self) -> Result<(), TelemetryError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => {
                let directive = self.telemetry.log_level.clone();
                EnvFilter::try_new(&directive)
                    .map_err(|source| TelemetryError::Filter { directive, source })?
            }
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .with_ansi(false)
            .try_init()
            .map_err(TelemetryError::Install)?;

        tracing::info!(
            environment = ?self.environment,
            backend_mode = ?self.triage.backend_mode,
            assignment_strategy = ?self.triage.assignment_strategy,
            drain_workers = self.triage.drain_worker_count,
            max_attempts = self.triage.max_processing_attempts,
            database = %self.database.path.display(),
            "telemetry initialized"
        );
        Ok(())
    }
}

#[derive(Debug)]
pub enum TelemetryError {
    Filter { directive: String, source: ParseError },
    Install(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Filter { directive, .. } => {
                write!(f, "log filter '{}' is invalid", directive)
            }
            TelemetryError::Install(err) => {
                write!(f, "failed to install tracing subscriber: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::Filter { source, .. } => Some(source),
            TelemetryError::Install(err) => Some(&**err),
        }
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

/// SQLite storage location.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Selects which classifier backends the predictor host may use.
///
/// `Force` pins every modality to its rule-based backend. `Auto` attempts the
/// learned backend when the host environment looks capable, falling back
/// permanently on the first failure. `Off` disables the fallback entirely so
/// that a dead learned backend surfaces as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    Force,
    Auto,
    Off,
}

impl FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "force" | "rule_based" | "rule-based" | "true" => Ok(Self::Force),
            "auto" => Ok(Self::Auto),
            "off" | "learned" | "false" => Ok(Self::Off),
            other => Err(ConfigError::InvalidBackendMode {
                value: other.to_string(),
            }),
        }
    }
}

/// How the consultant pool picks an assignee within a department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    RoundRobin,
    SkillMatch,
    LeastLoaded,
}

impl FromStr for AssignmentStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "round_robin" | "round-robin" => Ok(Self::RoundRobin),
            "skill_match" | "skill-match" => Ok(Self::SkillMatch),
            "least_loaded" | "least-loaded" => Ok(Self::LeastLoaded),
            other => Err(ConfigError::InvalidAssignmentStrategy {
                value: other.to_string(),
            }),
        }
    }
}

/// Response-time targets per urgency level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaConfig {
    pub critical: chrono::Duration,
    pub high: chrono::Duration,
    pub medium: chrono::Duration,
    pub low: chrono::Duration,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            critical: chrono::Duration::hours(1),
            high: chrono::Duration::hours(4),
            medium: chrono::Duration::hours(24),
            low: chrono::Duration::hours(72),
        }
    }
}

const DEFAULT_MEMORY_THRESHOLD_BYTES: u64 = 16 * 1024 * 1024 * 1024;
const DEFAULT_BATCH_LIMIT_LEARNED: usize = 50;
const DEFAULT_DRAIN_WORKERS: usize = 4;
const DEFAULT_PER_INQUIRY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DRAIN_SOFT_DEADLINE_SECS: u64 = 3300;
const DEFAULT_MAX_PROCESSING_ATTEMPTS: u32 = 5;

/// Immutable knobs consumed by the triage core at construction.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub backend_mode: BackendMode,
    pub learned_memory_threshold_bytes: u64,
    /// Fetch ceiling for a drain running on rule-based backends. `None`
    /// drains the whole backlog.
    pub batch_limit_rule_based: Option<usize>,
    /// Fetch ceiling for a drain running learned inference.
    pub batch_limit_learned: usize,
    pub drain_worker_count: usize,
    pub per_inquiry_timeout: Duration,
    pub drain_soft_deadline: Duration,
    pub max_processing_attempts: u32,
    pub routing_rules_path: Option<PathBuf>,
    pub sla: SlaConfig,
    pub assignment_strategy: AssignmentStrategy,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            backend_mode: BackendMode::Auto,
            learned_memory_threshold_bytes: DEFAULT_MEMORY_THRESHOLD_BYTES,
            batch_limit_rule_based: None,
            batch_limit_learned: DEFAULT_BATCH_LIMIT_LEARNED,
            drain_worker_count: DEFAULT_DRAIN_WORKERS,
            per_inquiry_timeout: Duration::from_secs(DEFAULT_PER_INQUIRY_TIMEOUT_SECS),
            drain_soft_deadline: Duration::from_secs(DEFAULT_DRAIN_SOFT_DEADLINE_SECS),
            max_processing_attempts: DEFAULT_MAX_PROCESSING_ATTEMPTS,
            routing_rules_path: None,
            sla: SlaConfig::default(),
            assignment_strategy: AssignmentStrategy::RoundRobin,
        }
    }
}

impl TriageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("TRIAGE_USE_RULE_BASED") {
            config.backend_mode = value.parse()?;
        }
        if let Ok(value) = env::var("TRIAGE_MEMORY_THRESHOLD_BYTES") {
            config.learned_memory_threshold_bytes =
                parse_env("TRIAGE_MEMORY_THRESHOLD_BYTES", &value)?;
        }
        if let Ok(value) = env::var("TRIAGE_BATCH_LIMIT_RULE_BASED") {
            config.batch_limit_rule_based =
                Some(parse_env("TRIAGE_BATCH_LIMIT_RULE_BASED", &value)?);
        }
        if let Ok(value) = env::var("TRIAGE_BATCH_LIMIT_LEARNED") {
            config.batch_limit_learned = parse_env("TRIAGE_BATCH_LIMIT_LEARNED", &value)?;
        }
        if let Ok(value) = env::var("TRIAGE_DRAIN_WORKERS") {
            config.drain_worker_count = parse_env("TRIAGE_DRAIN_WORKERS", &value)?;
        }
        if let Ok(value) = env::var("TRIAGE_PER_INQUIRY_TIMEOUT_SECS") {
            config.per_inquiry_timeout =
                Duration::from_secs(parse_env("TRIAGE_PER_INQUIRY_TIMEOUT_SECS", &value)?);
        }
        if let Ok(value) = env::var("TRIAGE_DRAIN_SOFT_DEADLINE_SECS") {
            config.drain_soft_deadline =
                Duration::from_secs(parse_env("TRIAGE_DRAIN_SOFT_DEADLINE_SECS", &value)?);
        }
        if let Ok(value) = env::var("TRIAGE_MAX_PROCESSING_ATTEMPTS") {
            config.max_processing_attempts =
                parse_env("TRIAGE_MAX_PROCESSING_ATTEMPTS", &value)?;
        }
        if let Ok(value) = env::var("TRIAGE_ROUTING_RULES") {
            config.routing_rules_path = Some(PathBuf::from(value));
        }
        if let Ok(value) = env::var("TRIAGE_ASSIGNMENT_STRATEGY") {
            config.assignment_strategy = value.parse()?;
        }

        for (key, slot) in [
            ("TRIAGE_SLA_CRITICAL_SECS", &mut config.sla.critical),
            ("TRIAGE_SLA_HIGH_SECS", &mut config.sla.high),
            ("TRIAGE_SLA_MEDIUM_SECS", &mut config.sla.medium),
            ("TRIAGE_SLA_LOW_SECS", &mut config.sla.low),
        ] {
            if let Ok(value) = env::var(key) {
                *slot = chrono::Duration::seconds(parse_env(key, &value)?);
            }
        }

        Ok(config)
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { key })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidBackendMode { value: String },
    InvalidAssignmentStrategy { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{} must be a non-negative integer", key)
            }
            ConfigError::InvalidBackendMode { value } => {
                write!(
                    f,
                    "unrecognized backend mode '{}' (expected force, auto, or off)",
                    value
                )
            }
            ConfigError::InvalidAssignmentStrategy { value } => {
                write!(
                    f,
                    "unrecognized assignment strategy '{}' (expected round_robin, skill_match, or least_loaded)",
                    value
                )
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
