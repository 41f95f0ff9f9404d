//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `ZOE_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `ZOE_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `ZOE_LIMITS__AUTH__MAX_REQUESTS=10` sets the `limits.auth.max_requests` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Override server port
//! ZOE_PORT=8080
//!
//! # Set database connection (preferred method)
//! DATABASE_URL="sqlite:///var/lib/zoe/zoe.db?mode=rwc"
//!
//! # Override nested values
//! ZOE_AUTH__SESSION__EXPIRY=12h
//! ZOE_LIMITS__GLOBAL__ENABLED=false
//! ```

use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::auth::password::Argon2Params;
use crate::errors::Error;

/// CLI args - config file location plus maintenance subcommands
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "ZOE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Create the initial admin account (idempotent) and exit
    SetupAdmin {
        /// Password for the admin account; falls back to `admin.password` from config
        #[arg(long)]
        password: Option<String>,
        /// Reset the password and reactivate the account if it already exists
        #[arg(long)]
        reset: bool,
    },
}

// Hand-written so the admin password never reaches the logs
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::SetupAdmin { password, reset } => f
                .debug_struct("SetupAdmin")
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .field("reset", reset)
                .finish(),
        }
    }
}

/// Main application configuration.
///
/// All fields have defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Deployment environment name reported by the health endpoint
    pub environment: String,
    /// Raw `DATABASE_URL` override, folded into `database.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Database connection settings
    pub database: DatabaseConfig,
    /// Initial admin account seeded on startup
    pub admin: AdminConfig,
    /// Secret key for JWT session signing (required)
    pub secret_key: Option<String>,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Per-IP rate limits
    pub limits: LimitsConfig,
    /// Notification housekeeping
    pub notifications: NotificationsConfig,
}

/// SQLite connection and pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite://zoe.db?mode=rwc`
    pub url: String,
    pub pool: PoolSettings,
}

/// Pool configuration with the SQLx parameters we expose.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a connection (seconds, 0 = never)
    pub max_lifetime_secs: u64,
}

/// Initial admin account.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    /// Admin is only seeded on startup when a password is configured
    pub password: Option<String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: ApiKeyConfig,
    pub session: SessionConfig,
    pub password: PasswordConfig,
    /// Device slots given to newly created users
    pub default_max_devices: i64,
}

/// API key authentication. The key is the user's ID.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiKeyConfig {
    /// Header carrying the API key
    pub header_name: String,
    /// Query parameter carrying the API key (fallback when the header is absent)
    pub query_param: String,
    /// Record a login log entry and bump login counters on every API-key authenticated request
    pub record_requests: bool,
}

/// JWT session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session token lifetime
    #[serde(with = "humantime_serde")]
    pub expiry: Duration,
}

/// Password rules and hashing parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
    /// Argon2 memory cost in KiB (default: 19456 KiB = 19 MB, secure for production)
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (default: 2, secure for production)
    pub argon2_iterations: u32,
    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl PasswordConfig {
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// Per-IP rate limits for protecting the API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Applied to every request
    pub global: RateLimitConfig,
    /// Applied to login attempts; only failed attempts consume quota
    pub auth: RateLimitConfig,
    /// Applied to admin-only user management routes
    pub admin: RateLimitConfig,
}

/// A fixed-window request limit.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub max_requests: u32,
}

/// Notification housekeeping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationsConfig {
    /// Run the background sweeper that deletes expired notifications
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "production".to_string(),
            database_url: None,
            database: DatabaseConfig::default(),
            admin: AdminConfig::default(),
            secret_key: None,
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            limits: LimitsConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://zoe.db?mode=rwc".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            email: "admin@cfizoe.com".to_string(),
            password: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: ApiKeyConfig::default(),
            session: SessionConfig::default(),
            password: PasswordConfig::default(),
            default_max_devices: 3,
        }
    }
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            header_name: "x-api-key".to_string(),
            query_param: "apiKey".to_string(),
            record_requests: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        let argon2 = Argon2Params::default();
        Self {
            min_length: 6,
            max_length: 128,
            argon2_memory_kib: argon2.memory_kib,
            argon2_iterations: argon2.iterations,
            argon2_parallelism: argon2.parallelism,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: Some(3600),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            global: RateLimitConfig {
                enabled: true,
                window: Duration::from_secs(15 * 60),
                max_requests: 100,
            },
            auth: RateLimitConfig {
                enabled: true,
                window: Duration::from_secs(60 * 60),
                max_requests: 5,
            },
            admin: RateLimitConfig {
                enabled: true,
                window: Duration::from_secs(60 * 60),
                max_requests: 1000,
            },
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(15 * 60),
            max_requests: 100,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // if DATABASE_URL is set, it wins over database.url (pool settings are kept)
        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("ZOE_").ignore(&["config"]).split("__"))
            // Common DATABASE_URL pattern
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::internal(
                "Config validation: secret_key is not configured. \
                 Please set ZOE_SECRET_KEY environment variable or add secret_key to config file.",
            ));
        }

        let password = &self.auth.password;
        if password.min_length > password.max_length {
            return Err(Error::internal(format!(
                "Config validation: Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                password.min_length, password.max_length
            )));
        }
        if password.min_length < 1 {
            return Err(Error::internal(
                "Config validation: Invalid password configuration: min_length must be at least 1",
            ));
        }

        // Validate session expiry duration is reasonable
        if self.auth.session.expiry.as_secs() < 300 {
            return Err(Error::internal(
                "Config validation: session expiry duration is too short (minimum 5 minutes)",
            ));
        }
        if self.auth.session.expiry.as_secs() > 86400 * 30 {
            return Err(Error::internal(
                "Config validation: session expiry duration is too long (maximum 30 days)",
            ));
        }

        if self.auth.default_max_devices < 1 {
            return Err(Error::internal("Config validation: default_max_devices must be at least 1"));
        }

        // Validate CORS configuration
        if self.cors.allowed_origins.is_empty() {
            return Err(Error::internal(
                "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.",
            ));
        }
        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::internal(
                "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins.",
            ));
        }

        for (name, limit) in [
            ("global", &self.limits.global),
            ("auth", &self.limits.auth),
            ("admin", &self.limits.admin),
        ] {
            if limit.enabled && (limit.window.is_zero() || limit.max_requests == 0) {
                return Err(Error::internal(format!(
                    "Config validation: limits.{name} must have a non-zero window and max_requests when enabled"
                )));
            }
        }

        if self.notifications.enabled && self.notifications.sweep_interval.is_zero() {
            return Err(Error::internal(
                "Config validation: notifications.sweep_interval must be non-zero when the sweeper is enabled",
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
            command: None,
        }
    }

    #[test]
    fn test_setup_admin_args_debug_hides_password() {
        let args = Args::try_parse_from(["zoe", "setup-admin", "--password", "hunter2-secret", "--reset"]).unwrap();

        let Some(Command::SetupAdmin { password, reset }) = &args.command else {
            panic!("expected setup-admin");
        };
        assert_eq!(password.as_deref(), Some("hunter2-secret"));
        assert!(*reset);

        let rendered = format!("{args:?}");
        assert!(!rendered.contains("hunter2-secret"), "{rendered}");
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_defaults_with_secret() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\n")?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 3000);
            assert_eq!(config.auth.api_key.header_name, "x-api-key");
            assert_eq!(config.auth.api_key.query_param, "apiKey");
            assert_eq!(config.auth.default_max_devices, 3);
            assert_eq!(config.limits.global.max_requests, 100);
            assert_eq!(config.limits.global.window, Duration::from_secs(900));
            assert_eq!(config.limits.auth.max_requests, 5);
            assert_eq!(config.limits.admin.max_requests, 1000);
            assert_eq!(config.auth.password.min_length, 6);

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
environment: staging
admin:
  username: root
"#,
            )?;

            jail.set_env("ZOE_HOST", "127.0.0.1");
            jail.set_env("ZOE_PORT", "8080");
            jail.set_env("ZOE_LIMITS__AUTH__MAX_REQUESTS", "10");

            let config = Config::load(&args("test.yaml"))?;

            // Env vars should override
            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.limits.auth.max_requests, 10);

            // YAML values should be preserved
            assert_eq!(config.environment, "staging");
            assert_eq!(config.admin.username, "root");
            assert_eq!(config.admin.email, "admin@cfizoe.com");

            Ok(())
        });
    }

    #[test]
    fn test_database_url_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
database:
  url: sqlite://from-yaml.db
  pool:
    max_connections: 4
"#,
            )?;
            jail.set_env("DATABASE_URL", "sqlite://from-env.db");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.database.url, "sqlite://from-env.db");
            assert_eq!(config.database.pool.max_connections, 4);
            assert!(config.database_url.is_none());

            Ok(())
        });
    }

    #[test]
    fn test_humantime_durations() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
auth:
  session:
    expiry: 2h
limits:
  global:
    window: 1m
    max_requests: 30
notifications:
  sweep_interval: 30s
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.auth.session.expiry, Duration::from_secs(7200));
            assert_eq!(config.limits.global.window, Duration::from_secs(60));
            assert_eq!(config.limits.global.max_requests, 30);
            assert_eq!(config.notifications.sweep_interval, Duration::from_secs(30));

            Ok(())
        });
    }

    #[test]
    fn test_missing_secret_key_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 4000\n")?;

            let result = Config::load(&args("test.yaml"));
            assert!(result.is_err());
            assert!(result.unwrap_err().to_string().contains("secret_key"));

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nmongodb_uri: mongodb://localhost\n")?;

            assert!(Config::load(&args("test.yaml")).is_err());

            Ok(())
        });
    }

    #[test]
    fn test_cors_origins() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
cors:
  allowed_origins:
    - "*"
    - https://app.example.com
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.cors.allowed_origins.len(), 2);
            assert!(matches!(config.cors.allowed_origins[0], CorsOrigin::Wildcard));
            match &config.cors.allowed_origins[1] {
                CorsOrigin::Url(url) => assert_eq!(url.as_str(), "https://app.example.com/"),
                other => panic!("expected URL origin, got {other:?}"),
            }

            Ok(())
        });
    }

    #[test]
    fn test_validation_rules() {
        let mut config = Config {
            secret_key: Some("hello".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.cors.allow_credentials = true;
        assert!(config.validate().is_err());
        config.cors.allow_credentials = false;

        config.auth.password.min_length = 200;
        assert!(config.validate().is_err());
        config.auth.password.min_length = 6;

        config.auth.session.expiry = Duration::from_secs(60);
        assert!(config.validate().is_err());
        config.auth.session.expiry = Duration::from_secs(3600);

        config.limits.auth.max_requests = 0;
        assert!(config.validate().is_err());
        config.limits.auth.enabled = false;
        assert!(config.validate().is_ok());

        config.auth.default_max_devices = 0;
        assert!(config.validate().is_err());
    }
}
