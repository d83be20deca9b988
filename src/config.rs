//! Process-wide configuration.
//!
//! Built once at startup from environment variables and shared through
//! [`crate::api::AppState`]. Handlers never read the environment themselves.
//!
//! Recognised variables:
//! - `HOST` / `PORT` - bind address (default `0.0.0.0:8001`)
//! - `OPENAI_API_KEY` - provider key; analysis tasks fail while it is unset
//! - `OPENAI_MODEL` - chat model (default `gpt-4o-mini`)
//! - `OPENAI_API_URL` - chat completions endpoint
//! - `CORS_ORIGINS` - comma-separated list of allowed origins
//! - `TASK_TIMEOUT_SECS` - deadline for a single analysis task
//! - `MAX_CONCURRENT_TASKS` - provider calls allowed to run at once
//! - `MAX_QUEUED_TASKS` - in-flight tasks allowed before new ones are rejected
//! - `TASK_TTL_SECS` - how long finished tasks stay queryable

use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:8000"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("{name} must be at most {max}")]
    TooLarge { name: &'static str, max: u64 },
}

/// Settings for the AI provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// `None` when no key is configured; tasks then fail instead of calling out.
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Limits applied to background analysis tasks.
#[derive(Debug, Clone)]
pub struct TaskLimits {
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub max_queued: usize,
    pub ttl: Duration,
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_concurrent: 4,
            max_queued: 256,
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub provider: ProviderConfig,
    pub cors_origins: Vec<String>,
    pub tasks: TaskLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            provider: ProviderConfig {
                api_key: None,
                model: DEFAULT_MODEL.to_string(),
                api_url: DEFAULT_OPENAI_API_URL.to_string(),
            },
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            tasks: TaskLimits::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let port = match get("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber { name: "PORT", value })?,
            None => defaults.port,
        };

        let cors_origins = match get("CORS_ORIGINS") {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => defaults.cors_origins,
        };

        let tasks = TaskLimits {
            timeout: Duration::from_secs(positive(
                "TASK_TIMEOUT_SECS",
                get("TASK_TIMEOUT_SECS"),
                defaults.tasks.timeout.as_secs(),
            )?),
            max_concurrent: at_most(
                "MAX_CONCURRENT_TASKS",
                positive(
                    "MAX_CONCURRENT_TASKS",
                    get("MAX_CONCURRENT_TASKS"),
                    defaults.tasks.max_concurrent as u64,
                )?,
                Semaphore::MAX_PERMITS as u64,
            )? as usize,
            max_queued: positive(
                "MAX_QUEUED_TASKS",
                get("MAX_QUEUED_TASKS"),
                defaults.tasks.max_queued as u64,
            )? as usize,
            ttl: Duration::from_secs(positive(
                "TASK_TTL_SECS",
                get("TASK_TTL_SECS"),
                defaults.tasks.ttl.as_secs(),
            )?),
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port,
            provider: ProviderConfig {
                api_key: get("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL").unwrap_or(defaults.provider.model),
                api_url: get("OPENAI_API_URL").unwrap_or(defaults.provider.api_url),
            },
            cors_origins,
            tasks,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn positive(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed = value
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidNumber { name, value })?;
    if parsed == 0 {
        return Err(ConfigError::Zero { name });
    }
    Ok(parsed)
}

/// `MAX_CONCURRENT_TASKS` sizes a semaphore and cannot exceed its capacity.
fn at_most(name: &'static str, value: u64, max: u64) -> Result<u64, ConfigError> {
    if value > max {
        return Err(ConfigError::TooLarge { name, max });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8001");
        assert!(!config.provider.is_configured());
        assert_eq!(config.provider.model, DEFAULT_MODEL);
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "http://localhost:8000"]
        );
        assert_eq!(config.tasks.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "9000"),
            ("OPENAI_API_KEY", "sk-test"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("MAX_CONCURRENT_TASKS", "8"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.tasks.max_concurrent, 8);
    }

    #[test]
    fn test_blank_key_is_unset() {
        let config = load(&[("OPENAI_API_KEY", "   ")]).unwrap();
        assert!(!config.provider.is_configured());
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            load(&[("PORT", "eighty")]).unwrap_err(),
            ConfigError::InvalidNumber {
                name: "PORT",
                value: "eighty".to_string()
            }
        );
        assert_eq!(
            load(&[("MAX_QUEUED_TASKS", "0")]).unwrap_err(),
            ConfigError::Zero {
                name: "MAX_QUEUED_TASKS"
            }
        );
    }

    #[test]
    fn test_concurrency_limit_above_semaphore_capacity() {
        let too_many = (Semaphore::MAX_PERMITS as u64 + 1).to_string();
        assert_eq!(
            load(&[("MAX_CONCURRENT_TASKS", too_many.as_str())]).unwrap_err(),
            ConfigError::TooLarge {
                name: "MAX_CONCURRENT_TASKS",
                max: Semaphore::MAX_PERMITS as u64
            }
        );
        let at_cap = Semaphore::MAX_PERMITS.to_string();
        assert_eq!(
            load(&[("MAX_CONCURRENT_TASKS", at_cap.as_str())])
                .unwrap()
                .tasks
                .max_concurrent,
            Semaphore::MAX_PERMITS
        );
    }
}
