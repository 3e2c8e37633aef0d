use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::scheduler::{RetryPolicy, SchedulerConfig};

/// Top-level configuration for a scan run.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub telemetry: TelemetryConfig,
}

impl ScanConfig {
    /// Reads settings from the environment (and `.env` when present).
    /// Missing credentials are only reported by [`ScanConfig::validate`], so
    /// command-line overrides can fill them in first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let server = ServerConfig {
            url: env::var("IQ_SERVER_URL").unwrap_or_default(),
            username: env::var("IQ_USERNAME").unwrap_or_default(),
            password: env::var("IQ_PASSWORD").unwrap_or_default(),
            submit_timeout: Duration::from_secs(parse_var("SCAN_SUBMIT_TIMEOUT_SECS", 60)?),
            poll_timeout: Duration::from_secs(parse_var("SCAN_POLL_TIMEOUT_SECS", 30)?),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_var("SCAN_MAX_RETRIES", defaults.max_retries)?,
            initial_backoff: Duration::from_millis(parse_var(
                "SCAN_RETRY_BACKOFF_MS",
                u64::try_from(defaults.initial_backoff.as_millis()).unwrap_or(u64::MAX),
            )?),
            ..defaults
        };

        let scheduler = SchedulerConfig {
            max_concurrency: parse_var("SCAN_MAX_CONCURRENCY", 5)?,
            poll_interval: Duration::from_secs(parse_var("SCAN_POLL_INTERVAL_SECS", 10)?),
            max_polls: parse_var("SCAN_MAX_POLLS", 360)?,
            retry,
            ..SchedulerConfig::default()
        };

        let log_level = env::var("SCAN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            server,
            scheduler,
            telemetry: TelemetryConfig { log_level },
        })
    }

    /// Rejects settings that would make the run fail before any submission.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::Missing("IQ_SERVER_URL"));
        }
        if self.server.username.is_empty() {
            return Err(ConfigError::Missing("IQ_USERNAME"));
        }
        if self.server.password.is_empty() {
            return Err(ConfigError::Missing("IQ_PASSWORD"));
        }

        let url = reqwest::Url::parse(self.server.url.trim()).map_err(|err| {
            ConfigError::InvalidUrl {
                value: self.server.url.clone(),
                reason: err.to_string(),
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                value: self.server.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if self.scheduler.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "SCAN_MAX_CONCURRENCY",
                value: "0".to_string(),
            });
        }
        if self.scheduler.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "SCAN_POLL_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        if self.scheduler.max_polls == 0 {
            return Err(ConfigError::Invalid {
                key: "SCAN_MAX_POLLS",
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Connection settings for IQ Server.
#[derive(Clone)]
pub struct ServerConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub submit_timeout: Duration,
    pub poll_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            submit_timeout: Duration::from_secs(60),
            poll_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("submit_timeout", &self.submit_timeout)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
    InvalidUrl { value: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => {
                write!(f, "{key} is required (set it in the environment or pass the flag)")
            }
            ConfigError::Invalid { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::InvalidUrl { value, reason } => {
                write!(f, "IQ_SERVER_URL '{value}' is not a usable URL: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const VARS: &[&str] = &[
        "IQ_SERVER_URL",
        "IQ_USERNAME",
        "IQ_PASSWORD",
        "SCAN_MAX_CONCURRENCY",
        "SCAN_POLL_INTERVAL_SECS",
        "SCAN_MAX_POLLS",
        "SCAN_MAX_RETRIES",
        "SCAN_RETRY_BACKOFF_MS",
        "SCAN_SUBMIT_TIMEOUT_SECS",
        "SCAN_POLL_TIMEOUT_SECS",
        "SCAN_LOG_LEVEL",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn complete_config() -> ScanConfig {
        let mut config = ScanConfig::load().expect("config loads");
        config.server.url = "http://localhost:8070".to_string();
        config.server.username = "admin".to_string();
        config.server.password = "admin123".to_string();
        config
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = ScanConfig::load().expect("config loads with defaults");

        assert_eq!(config.scheduler.max_concurrency, 5);
        assert_eq!(config.scheduler.poll_interval, Duration::from_secs(10));
        assert_eq!(config.scheduler.max_polls, 360);
        assert_eq!(config.scheduler.retry.max_retries, 3);
        assert!(!config.scheduler.fail_on_warning);
        assert_eq!(config.server.submit_timeout, Duration::from_secs(60));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn reads_overrides_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("IQ_SERVER_URL", "https://iq.example.com");
        env::set_var("SCAN_MAX_CONCURRENCY", "2");
        env::set_var("SCAN_RETRY_BACKOFF_MS", "250");
        env::set_var("SCAN_MAX_POLLS", "12");

        let config = ScanConfig::load().expect("config loads");
        reset_env();

        assert_eq!(config.server.url, "https://iq.example.com");
        assert_eq!(config.scheduler.max_concurrency, 2);
        assert_eq!(
            config.scheduler.retry.initial_backoff,
            Duration::from_millis(250)
        );
        assert_eq!(config.scheduler.max_polls, 12);
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCAN_MAX_CONCURRENCY", "many");

        let err = ScanConfig::load().expect_err("non-numeric concurrency");
        reset_env();

        assert_eq!(
            err.to_string(),
            "SCAN_MAX_CONCURRENCY has an invalid value 'many'"
        );
    }

    #[test]
    fn validate_requires_credentials_and_url() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();

        let mut config = complete_config();
        assert!(config.validate().is_ok());

        config.server.password.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("IQ_PASSWORD"))
        ));

        let mut config = complete_config();
        config.server.url = "iq-server:8070".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();

        let mut config = complete_config();
        config.scheduler.max_concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "SCAN_MAX_CONCURRENCY",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_zero_poll_bound() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();

        let mut config = complete_config();
        config.scheduler.max_polls = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "SCAN_MAX_POLLS",
                ..
            })
        ));
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = ServerConfig {
            password: "hunter2".to_string(),
            ..ServerConfig::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
