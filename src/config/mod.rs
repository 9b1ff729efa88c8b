//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{ffi::OsString, net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quire";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const MIN_SECRET_KEY_BYTES: usize = 32;
const DEFAULT_ACCESS_TOKEN_MINUTES: u64 = 30;
const DEFAULT_REFRESH_TOKEN_DAYS: u64 = 30;
const DEFAULT_RESET_TOKEN_MINUTES: u64 = 60;
const DEFAULT_ARGON2_MEMORY_KIB: u32 = 19_456;
const DEFAULT_ARGON2_ITERATIONS: u32 = 2;
const DEFAULT_ARGON2_PARALLELISM: u32 = 1;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_AUTH: u64 = 5;
const DEFAULT_RATE_LIMIT_STRICT: u64 = 10;
const DEFAULT_RATE_LIMIT_API: u64 = 60;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "noreply@localhost";
const DEFAULT_FROM_NAME: &str = "Quire";
const DEFAULT_PASSWORD_RESET_URL: &str = "http://localhost:3000/reset-password";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub cache: CacheSettings,
    pub email: EmailSettings,
    pub cors: CorsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// `None` keeps tokens, counters and cached reads in process memory.
    pub url: Option<String>,
}

#[derive(Clone)]
pub struct AuthSettings {
    secret_key: Option<String>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub reset_token_ttl: Duration,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl AuthSettings {
    /// The signing secret; serving without one is a configuration error.
    pub fn secret_key(&self) -> Result<&str, LoadError> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| LoadError::invalid("auth.secret_key", "a signing secret is required"))
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("reset_token_ttl", &self.reset_token_ttl)
            .field("argon2_memory_kib", &self.argon2_memory_kib)
            .field("argon2_iterations", &self.argon2_iterations)
            .field("argon2_parallelism", &self.argon2_parallelism)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window: Duration,
    pub auth_requests: NonZeroU32,
    pub strict_requests: NonZeroU32,
    pub api_requests: NonZeroU32,
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpTls {
    #[serde(alias = "starttls")]
    StartTls,
    Tls,
    None,
}

#[derive(Clone)]
pub struct EmailSettings {
    /// `None` logs outgoing mail instead of sending it.
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: SmtpTls,
    pub from_address: String,
    pub from_name: String,
    pub password_reset_url: String,
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .field("password_reset_url", &self.password_reset_url)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("QUIRE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cors.allowed_origins")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    auth: RawAuthSettings,
    rate_limit: RawRateLimitSettings,
    cache: RawCacheSettings,
    email: RawEmailSettings,
    cors: RawCorsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(secret) = overrides.secret_key.as_ref() {
            self.auth.secret_key = Some(secret.clone());
        }
        if let Some(enabled) = overrides.rate_limit_enabled {
            self.rate_limit.enabled = Some(enabled);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            redis,
            auth,
            rate_limit,
            cache,
            email,
            cors,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            redis: RedisSettings {
                url: non_blank(redis.url),
            },
            auth: build_auth_settings(auth)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
            cache: build_cache_settings(cache)?,
            email: build_email_settings(email)?,
            cors: build_cors_settings(cors)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections: non_zero_u32(max.into(), "database.max_connections")?,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let secret_key = non_blank(auth.secret_key);
    if let Some(secret) = secret_key.as_deref()
        && secret.len() < MIN_SECRET_KEY_BYTES
    {
        return Err(LoadError::invalid(
            "auth.secret_key",
            format!("must be at least {MIN_SECRET_KEY_BYTES} bytes"),
        ));
    }

    let access_minutes = auth
        .access_token_minutes
        .unwrap_or(DEFAULT_ACCESS_TOKEN_MINUTES);
    let refresh_days = auth.refresh_token_days.unwrap_or(DEFAULT_REFRESH_TOKEN_DAYS);
    let reset_minutes = auth
        .reset_token_minutes
        .unwrap_or(DEFAULT_RESET_TOKEN_MINUTES);

    Ok(AuthSettings {
        secret_key,
        access_token_ttl: minutes(access_minutes, "auth.access_token_minutes")?,
        refresh_token_ttl: minutes(
            refresh_days.saturating_mul(24 * 60),
            "auth.refresh_token_days",
        )?,
        reset_token_ttl: minutes(reset_minutes, "auth.reset_token_minutes")?,
        argon2_memory_kib: auth.argon2_memory_kib.unwrap_or(DEFAULT_ARGON2_MEMORY_KIB),
        argon2_iterations: non_zero_u32(
            auth.argon2_iterations
                .unwrap_or(DEFAULT_ARGON2_ITERATIONS)
                .into(),
            "auth.argon2_iterations",
        )?
        .get(),
        argon2_parallelism: non_zero_u32(
            auth.argon2_parallelism
                .unwrap_or(DEFAULT_ARGON2_PARALLELISM)
                .into(),
            "auth.argon2_parallelism",
        )?
        .get(),
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_secs = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);
    if window_secs == 0 {
        return Err(LoadError::invalid(
            "rate_limit.window_seconds",
            "must be greater than zero",
        ));
    }

    Ok(RateLimitSettings {
        enabled: rate_limit.enabled.unwrap_or(true),
        window: Duration::from_secs(window_secs),
        auth_requests: non_zero_u32(
            rate_limit.auth_requests.unwrap_or(DEFAULT_RATE_LIMIT_AUTH),
            "rate_limit.auth_requests",
        )?,
        strict_requests: non_zero_u32(
            rate_limit.strict_requests.unwrap_or(DEFAULT_RATE_LIMIT_STRICT),
            "rate_limit.strict_requests",
        )?,
        api_requests: non_zero_u32(
            rate_limit.api_requests.unwrap_or(DEFAULT_RATE_LIMIT_API),
            "rate_limit.api_requests",
        )?,
        trust_forwarded_for: rate_limit.trust_forwarded_for.unwrap_or(false),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_secs = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero",
        ));
    }
    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        ttl: Duration::from_secs(ttl_secs),
    })
}

fn build_email_settings(email: RawEmailSettings) -> Result<EmailSettings, LoadError> {
    let smtp_port = email.smtp_port.unwrap_or(DEFAULT_SMTP_PORT);
    if smtp_port == 0 {
        return Err(LoadError::invalid(
            "email.smtp_port",
            "port must be greater than zero",
        ));
    }

    let password_reset_url = non_blank(email.password_reset_url)
        .unwrap_or_else(|| DEFAULT_PASSWORD_RESET_URL.to_string());
    url::Url::parse(&password_reset_url).map_err(|err| {
        LoadError::invalid("email.password_reset_url", format!("invalid URL: {err}"))
    })?;

    Ok(EmailSettings {
        smtp_host: non_blank(email.smtp_host),
        smtp_port,
        username: non_blank(email.username),
        password: email.password,
        tls: email.tls.unwrap_or(SmtpTls::StartTls),
        from_address: non_blank(email.from_address)
            .unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
        from_name: non_blank(email.from_name).unwrap_or_else(|| DEFAULT_FROM_NAME.to_string()),
        password_reset_url,
    })
}

fn build_cors_settings(cors: RawCorsSettings) -> Result<CorsSettings, LoadError> {
    let mut allowed_origins = Vec::new();
    for origin in cors.allowed_origins {
        let origin = origin.trim();
        if origin.is_empty() {
            continue;
        }
        let parsed = url::Url::parse(origin).map_err(|err| {
            LoadError::invalid(
                "cors.allowed_origins",
                format!("invalid origin `{origin}`: {err}"),
            )
        })?;
        allowed_origins.push(parsed.origin().ascii_serialization());
    }
    Ok(CorsSettings { allowed_origins })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    secret_key: Option<String>,
    access_token_minutes: Option<u64>,
    refresh_token_days: Option<u64>,
    reset_token_minutes: Option<u64>,
    argon2_memory_kib: Option<u32>,
    argon2_iterations: Option<u32>,
    argon2_parallelism: Option<u32>,
}

impl std::fmt::Debug for RawAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawAuthSettings")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    enabled: Option<bool>,
    window_seconds: Option<u64>,
    auth_requests: Option<u64>,
    strict_requests: Option<u64>,
    api_requests: Option<u64>,
    trust_forwarded_for: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    ttl_seconds: Option<u64>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawEmailSettings {
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    tls: Option<SmtpTls>,
    from_address: Option<String>,
    from_name: Option<String>,
    password_reset_url: Option<String>,
}

impl std::fmt::Debug for RawEmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawEmailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCorsSettings {
    allowed_origins: Vec<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn minutes(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value.saturating_mul(60)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let mut args = CliArgs::parse();
    if args.command.is_none() {
        // A bare invocation serves; reparse so serve flags pick up their env fallbacks.
        args = CliArgs::parse_from(std::env::args_os().chain([OsString::from("serve")]));
    }
    let settings = load(&args)?;
    Ok((args, settings))
}
