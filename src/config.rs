// src/config.rs

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;

/// Extra time allowed past the nominal duration before a submission is refused.
pub const DEFAULT_SUBMIT_GRACE_SECONDS: i64 = 120;

/// Lifetime of the entry ticket handed out after a successful access-token check.
pub const DEFAULT_ENTRY_TICKET_TTL_SECONDS: u64 = 300;

/// How long a status poll result may be served from memory.
pub const DEFAULT_STATUS_CACHE_TTL_SECONDS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub submit_grace_seconds: i64,
    pub entry_ticket_ttl_seconds: u64,
    pub status_cache_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            submit_grace_seconds: env_or("SUBMIT_GRACE_SECONDS", DEFAULT_SUBMIT_GRACE_SECONDS),
            entry_ticket_ttl_seconds: env_or(
                "ENTRY_TICKET_TTL_SECONDS",
                DEFAULT_ENTRY_TICKET_TTL_SECONDS,
            ),
            status_cache_ttl_seconds: env_or(
                "STATUS_CACHE_TTL_SECONDS",
                DEFAULT_STATUS_CACHE_TTL_SECONDS,
            ),
        }
    }

    /// Configuration with defaults for everything except the connection and secret.
    pub fn with_defaults(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            rust_log: "info".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            submit_grace_seconds: DEFAULT_SUBMIT_GRACE_SECONDS,
            entry_ticket_ttl_seconds: DEFAULT_ENTRY_TICKET_TTL_SECONDS,
            status_cache_ttl_seconds: DEFAULT_STATUS_CACHE_TTL_SECONDS,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparsable {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
