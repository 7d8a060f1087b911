/*
 * Responsibility
 * - Load settings from the environment (.env supported)
 * - Validate them up front: a bad value fails startup, never a request
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::services::auth::KeyMaterial;
use crate::services::cache::RegionConfig;
use crate::services::rate_limit::BucketConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub enum CacheBackendConfig {
    Memory,
    Valkey { url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub request_timeout: Duration,

    pub access_key: KeyMaterial,
    pub auth_issuer: Option<String>,
    pub auth_audience: Option<String>,
    pub access_token_leeway_seconds: u64,

    pub global_rate_limit: BucketConfig,
    pub auth_rate_limit: BucketConfig,
    pub rate_limit_sweep_interval: Duration,
    // Only enable behind a reverse proxy that overwrites X-Forwarded-For.
    pub trust_forwarded_for: bool,

    pub ownership_timeout: Duration,

    pub cache_backend: CacheBackendConfig,
    pub projects_cache: RegionConfig,
    pub tasks_cache: RegionConfig,
}

// Unset -> default; set but unparsable -> startup error.
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid(key))
        }
        _ => Ok(default),
    }
}

fn optional(key: &'static str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn bucket(
    capacity_key: &'static str,
    capacity_default: u32,
    refill_key: &'static str,
    refill_default: f64,
    idle_timeout: Duration,
) -> Result<BucketConfig, ConfigError> {
    let capacity = parse_or(capacity_key, capacity_default)?;
    let refill = parse_or(refill_key, refill_default)?;

    if capacity < 1 {
        return Err(ConfigError::Invalid(capacity_key));
    }
    // capacity is fine, so the rate is what failed
    BucketConfig::new(capacity, refill)
        .map(|b| b.with_idle_timeout(idle_timeout))
        .map_err(|_| ConfigError::Invalid(refill_key))
}

fn region(
    entries_key: &'static str,
    entries_default: usize,
    ttl_key: &'static str,
    ttl_default: u64,
) -> Result<RegionConfig, ConfigError> {
    let max_entries = parse_or(entries_key, entries_default)?;
    let ttl_seconds = parse_or(ttl_key, ttl_default)?;

    if max_entries < 1 {
        return Err(ConfigError::Invalid(entries_key));
    }
    RegionConfig::new(max_entries, Duration::from_secs(ttl_seconds))
        .map_err(|_| ConfigError::Invalid(ttl_key))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = parse_or("PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();
        let request_timeout = Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECONDS", 30)?);

        let access_key = match (
            optional("ACCESS_JWT_PUBLIC_KEY_PEM"),
            optional("ACCESS_JWT_HMAC_SECRET"),
        ) {
            (Some(pem), None) => KeyMaterial::Ed25519PublicPem(pem.replace("\\n", "\n")),
            (None, Some(secret)) => KeyMaterial::HmacSecret(secret.into_bytes()),
            (Some(_), Some(_)) => return Err(ConfigError::Invalid("ACCESS_JWT_HMAC_SECRET")),
            (None, None) => return Err(ConfigError::Missing("ACCESS_JWT_PUBLIC_KEY_PEM")),
        };

        let access_token_leeway_seconds = parse_or("ACCESS_TOKEN_LEEWAY_SECONDS", 60)?;

        let idle_timeout = Duration::from_secs(parse_or("RATE_LIMIT_IDLE_SECONDS", 600)?);
        let global_rate_limit = bucket(
            "RATE_LIMIT_CAPACITY",
            100,
            "RATE_LIMIT_REFILL_PER_SECOND",
            10.0,
            idle_timeout,
        )?;
        // 10 requests per minute per client on auth endpoints
        let auth_rate_limit = bucket(
            "AUTH_RATE_LIMIT_CAPACITY",
            10,
            "AUTH_RATE_LIMIT_REFILL_PER_SECOND",
            10.0 / 60.0,
            idle_timeout,
        )?;
        let sweep_seconds: u64 = parse_or("RATE_LIMIT_SWEEP_SECONDS", 60)?;
        if sweep_seconds == 0 {
            return Err(ConfigError::Invalid("RATE_LIMIT_SWEEP_SECONDS"));
        }

        let trust_forwarded_for = parse_or("TRUST_FORWARDED_FOR", false)?;
        let ownership_timeout = Duration::from_millis(parse_or("OWNERSHIP_TIMEOUT_MS", 500)?);

        let cache_backend = match parse_or("CACHE_BACKEND", "memory".to_string())?
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => CacheBackendConfig::Memory,
            "valkey" | "redis" => CacheBackendConfig::Valkey {
                url: optional("VALKEY_URL").ok_or(ConfigError::Missing("VALKEY_URL"))?,
            },
            _ => return Err(ConfigError::Invalid("CACHE_BACKEND")),
        };

        let projects_cache = region(
            "CACHE_PROJECTS_MAX_ENTRIES",
            100,
            "CACHE_PROJECTS_TTL_SECONDS",
            600,
        )?;
        let tasks_cache = region("CACHE_TASKS_MAX_ENTRIES", 500, "CACHE_TASKS_TTL_SECONDS", 300)?;

        Ok(Self {
            addr,
            app_env,
            request_timeout,
            access_key,
            auth_issuer: optional("AUTH_ISSUER"),
            auth_audience: optional("AUTH_AUDIENCE"),
            access_token_leeway_seconds,
            global_rate_limit,
            auth_rate_limit,
            rate_limit_sweep_interval: Duration::from_secs(sweep_seconds),
            trust_forwarded_for,
            ownership_timeout,
            cache_backend,
            projects_cache,
            tasks_cache,
        })
    }
}
