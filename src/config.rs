//! # Environment-Driven Configuration
//!
//! A plain struct populated from `std::env`, with sane defaults for local
//! development, rather than pulling in a config-file framework the rest of
//! the stack doesn't otherwise need.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::Family;

/// KV key holding an operator-rotated certificate fingerprint override.
/// Present only after the admin CLI's `cert-rotate` command has run at
/// least once; absent, the certificate-info endpoint falls back to
/// [`AppConfig::certificate_fingerprint`].
pub const CERTIFICATE_FINGERPRINT_KEY: &str = "config:certificate_fingerprint";

/// Top-level service configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// KV backend selection and connection info.
    pub kv: KvConfig,
    /// ERP upstream connection info.
    pub erp: ErpConfig,
    /// Weekly full-refresh slot, or `None` to disable the scheduler.
    pub refresh_schedule: Option<WeeklySlot>,
    /// Per-family batch size for full refresh (default 10).
    pub refresh_batch_size: usize,
    /// Per-family cache TTL overrides; absent families default to persistent.
    pub cache_ttl: HashMap<Family, Duration>,
    /// JWT signing configuration.
    pub jwt: JwtConfig,
    /// Enable the analytics aggregation background task.
    pub analytics_enabled: bool,
    /// CORS allowed origins (`*` permitted for development).
    pub cors_allowed_origins: Vec<String>,
    /// Rate-limit quota: requests per window per client.
    pub rate_limit_requests: u32,
    /// Rate-limit window.
    pub rate_limit_window: Duration,
    /// Log format: "json" in production, "pretty" in development.
    pub log_format: LogFormat,
    /// Log level filter, e.g. "info", "debug".
    pub log_level: String,
    /// TLS certificate fingerprint surfaced by the certificate-info endpoint.
    pub certificate_fingerprint: Option<String>,
    /// Fixed timeout applied to every outbound ERP call.
    pub erp_timeout: Duration,
}

/// KV backend selection.
#[derive(Debug, Clone)]
pub enum KvConfig {
    /// In-process embedded store (tests, single-node deployments).
    Embedded,
    /// Redis connection string.
    Redis(String),
}

#[derive(Debug, Clone)]
pub struct ErpConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, Copy)]
pub struct WeeklySlot {
    /// 0 = Sunday .. 6 = Saturday, matching `chrono::Weekday::num_days_from_sunday`.
    pub day_of_week: u32,
    pub hour: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for AppConfig {
    /// Development-friendly defaults, matching [`AppConfig::from_env`]'s
    /// fallbacks when no environment variables are set. Used directly by
    /// tests that don't care about configuration.
    fn default() -> Self {
        Self {
            kv: KvConfig::Embedded,
            erp: ErpConfig {
                base_url: "https://erp.example.internal".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
            },
            refresh_schedule: Some(WeeklySlot { day_of_week: 0, hour: 3 }),
            refresh_batch_size: 10,
            cache_ttl: HashMap::new(),
            jwt: JwtConfig {
                secret: "development-secret".to_string(),
                issuer: "edge-sync".to_string(),
                access_token_lifetime: Duration::from_secs(900),
                refresh_token_lifetime: Duration::from_secs(1_209_600),
            },
            analytics_enabled: true,
            cors_allowed_origins: vec!["*".to_string()],
            rate_limit_requests: 120,
            rate_limit_window: Duration::from_secs(60),
            log_format: LogFormat::Pretty,
            log_level: "info".to_string(),
            certificate_fingerprint: None,
            erp_timeout: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment, falling back to
    /// development-friendly defaults for anything unset.
    pub fn from_env() -> Self {
        let kv = match std::env::var("REDIS_URL") {
            Ok(url) if !url.is_empty() => KvConfig::Redis(url),
            _ => KvConfig::Embedded,
        };

        let refresh_schedule = match std::env::var("REFRESH_SCHEDULER_ENABLED").as_deref() {
            Ok("false") | Ok("0") => None,
            _ => Some(WeeklySlot {
                day_of_week: env_u32("REFRESH_DAY_OF_WEEK", 0),
                hour: env_u32("REFRESH_HOUR", 3),
            }),
        };

        let mut cache_ttl = HashMap::new();
        // product|price|stock|hero|home are persistent (no TTL) by default,
        // matching upstream behavior; operators may override per family.
        if let Ok(secs) = std::env::var("CACHE_TTL_MESSAGE_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                cache_ttl.insert(Family::Message, Duration::from_secs(secs));
            }
        }

        Self {
            kv,
            erp: ErpConfig {
                base_url: std::env::var("ERP_BASE_URL")
                    .unwrap_or_else(|_| "https://erp.example.internal".to_string()),
                api_key: std::env::var("ERP_API_KEY").unwrap_or_default(),
                api_secret: std::env::var("ERP_API_SECRET").unwrap_or_default(),
            },
            refresh_schedule,
            refresh_batch_size: env_usize("REFRESH_BATCH_SIZE", 10),
            cache_ttl,
            jwt: JwtConfig {
                secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| "development-secret".to_string()),
                issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "edge-sync".to_string()),
                access_token_lifetime: Duration::from_secs(env_u64("JWT_ACCESS_TTL_SECS", 900)),
                refresh_token_lifetime: Duration::from_secs(env_u64("JWT_REFRESH_TTL_SECS", 1_209_600)),
            },
            analytics_enabled: std::env::var("ANALYTICS_ENABLED").as_deref() != Ok("false"),
            cors_allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            rate_limit_requests: env_u32("RATE_LIMIT_REQUESTS", 120),
            rate_limit_window: Duration::from_secs(env_u64("RATE_LIMIT_WINDOW_SECS", 60)),
            log_format: match std::env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            certificate_fingerprint: std::env::var("CERT_FINGERPRINT").ok(),
            erp_timeout: Duration::from_secs(env_u64("ERP_TIMEOUT_SECS", 10)),
        }
    }

    /// TTL configured for a family, or `None` for persistent.
    pub fn ttl_for(&self, family: Family) -> Option<Duration> {
        self.cache_ttl.get(&family).copied()
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
