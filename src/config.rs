// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Where posts, comments, users and jobs live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local tables. Nothing survives a restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Settings for the background job runner.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub enabled: bool,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
    /// First retry delay; doubles per attempt.
    pub retry_base: Duration,
    pub lease: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_millis(1000),
            batch_size: 10,
            max_attempts: 3,
            retry_base: Duration::from_secs(2),
            lease: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
    /// Extra words for the profanity lexicon, one per line.
    pub profanity_wordlist: Option<PathBuf>,
    pub jobs: JobSettings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let storage = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "STORAGE_BACKEND",
                value,
            })?,
            Err(_) => StorageBackend::Postgres,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let defaults = JobSettings::default();
        let jobs = JobSettings {
            enabled: parse_var("JOB_WORKER_ENABLED", defaults.enabled)?,
            poll_interval: Duration::from_millis(parse_var(
                "JOB_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            batch_size: parse_var("JOB_BATCH_SIZE", defaults.batch_size)?,
            max_attempts: parse_var("JOB_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_base: Duration::from_secs(parse_var(
                "JOB_RETRY_BASE_SECS",
                defaults.retry_base.as_secs(),
            )?),
            lease: Duration::from_secs(parse_var("JOB_LEASE_SECS", defaults.lease.as_secs())?),
        };

        Ok(Self {
            storage,
            database_url,
            bind_addr: parse_var("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            jwt_secret,
            jwt_expiration: parse_var("JWT_EXPIRATION", 86_400)?,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
            profanity_wordlist: env::var("PROFANITY_WORDLIST").ok().map(PathBuf::from),
            jobs,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_accepts_aliases() {
        assert_eq!("PG".parse(), Ok(StorageBackend::Postgres));
        assert_eq!("memory".parse(), Ok(StorageBackend::Memory));
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn job_defaults() {
        let jobs = JobSettings::default();
        assert!(jobs.enabled);
        assert_eq!(jobs.max_attempts, 3);
        assert_eq!(jobs.batch_size, 10);
    }
}
