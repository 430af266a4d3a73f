//! Daemon configuration
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. `config/jobctl.{toml,yaml,json}` (or the file named by `JOBCTL_CONFIG`)
//! 3. `JOBCTL_*` environment variables, `__` between section and key
//!    (`JOBCTL_SERVER__PORT=9000`, `JOBCTL_STORAGE__BACKEND=memory`)

use jobctl_api_http::HttpServerConfig;
use jobctl_core::application::ControllerConfig;
use jobctl_core::application::RetryPolicy;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "config/jobctl";
const CONFIG_PATH_ENV: &str = "JOBCTL_CONFIG";
const ENV_PREFIX: &str = "JOBCTL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub control: ControlSection,
    pub signal: SignalSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    /// Records vanish with the process
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    /// `~` is expanded
    pub database_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_path: "~/.jobctl/jobs.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    pub lock_timeout_ms: u64,
    pub max_lock_timeout_ms: u64,
    pub max_swap_attempts: u32,
    pub retry_base_delay_ms: i64,
}

impl Default for ControlSection {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            lock_timeout_ms: defaults.lock_timeout.as_millis() as u64,
            max_lock_timeout_ms: defaults.max_lock_timeout.as_millis() as u64,
            max_swap_attempts: defaults.max_swap_attempts,
            retry_base_delay_ms: defaults.retry_base_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalSection {
    pub queue_capacity: usize,
    /// Executor endpoint; signals are only logged when unset
    pub webhook_url: Option<String>,
    pub webhook_timeout_ms: u64,
    pub delivery_attempts: u32,
    pub delivery_base_delay_ms: i64,
}

impl Default for SignalSection {
    fn default() -> Self {
        Self {
            queue_capacity: jobctl_infra_signal::DEFAULT_QUEUE_CAPACITY,
            webhook_url: None,
            webhook_timeout_ms: 5_000,
            delivery_attempts: jobctl_infra_signal::DEFAULT_DELIVERY_ATTEMPTS,
            delivery_base_delay_ms: jobctl_infra_signal::DEFAULT_DELIVERY_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub format: LogFormat,
    /// Used when `RUST_LOG` is unset
    pub filter: String,
    /// Also write daily-rolled log files here
    pub directory: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "jobctl=info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid {section} configuration: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}

fn invalid(section: &'static str, message: impl Into<String>) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        section,
        message: message.into(),
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

impl DaemonConfig {
    /// Load from the config file and environment, then validate
    pub fn load() -> Result<Self, ConfigLoadError> {
        let file = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => config::File::with_name(&shellexpand::tilde(&path)).required(true),
            Err(_) => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = config::Config::builder()
            .add_source(file)
            .add_source(environment());
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigLoadError> {
        let config: DaemonConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.host.trim().is_empty() {
            return Err(invalid("server", "host cannot be empty"));
        }
        if self.server.request_timeout_ms <= self.control.max_lock_timeout_ms {
            return Err(invalid(
                "server",
                format!(
                    "request_timeout_ms ({}) must exceed control.max_lock_timeout_ms ({})",
                    self.server.request_timeout_ms, self.control.max_lock_timeout_ms
                ),
            ));
        }

        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.database_path.trim().is_empty()
        {
            return Err(invalid("storage", "database_path cannot be empty"));
        }

        if self.control.lock_timeout_ms == 0 {
            return Err(invalid("control", "lock_timeout_ms must be positive"));
        }
        if self.control.lock_timeout_ms > self.control.max_lock_timeout_ms {
            return Err(invalid(
                "control",
                "lock_timeout_ms cannot exceed max_lock_timeout_ms",
            ));
        }
        if self.control.max_swap_attempts == 0 {
            return Err(invalid("control", "max_swap_attempts must be at least 1"));
        }
        if self.control.retry_base_delay_ms < 0 {
            return Err(invalid("control", "retry_base_delay_ms cannot be negative"));
        }

        if self.signal.queue_capacity == 0 {
            return Err(invalid("signal", "queue_capacity must be at least 1"));
        }
        if self.signal.delivery_attempts == 0 {
            return Err(invalid("signal", "delivery_attempts must be at least 1"));
        }
        if self.signal.delivery_base_delay_ms < 0 {
            return Err(invalid("signal", "delivery_base_delay_ms cannot be negative"));
        }
        if let Some(url) = &self.signal.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    "signal",
                    format!("webhook_url must be an http(s) URL, got {:?}", url),
                ));
            }
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            lock_timeout: Duration::from_millis(self.control.lock_timeout_ms),
            max_lock_timeout: Duration::from_millis(self.control.max_lock_timeout_ms),
            max_swap_attempts: self.control.max_swap_attempts,
            retry_base_delay_ms: self.control.retry_base_delay_ms,
        }
    }

    pub fn http_config(&self) -> HttpServerConfig {
        HttpServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            request_timeout: Duration::from_millis(self.server.request_timeout_ms),
        }
    }

    pub fn delivery_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.signal.delivery_base_delay_ms,
            self.signal.delivery_attempts,
        )
    }

    /// Expanded database path
    pub fn database_path(&self) -> String {
        shellexpand::tilde(&self.storage.database_path).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<DaemonConfig, ConfigLoadError> {
        DaemonConfig::from_builder(
            config::Config::builder().add_source(config::File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = from_toml("").unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.filter, "jobctl=info");
        assert!(config.signal.webhook_url.is_none());
        assert_eq!(
            config.controller_config().lock_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_file_sections() {
        let config = from_toml(
            r#"
            [server]
            port = 9100

            [storage]
            backend = "memory"

            [control]
            lock_timeout_ms = 250
            max_swap_attempts = 5

            [signal]
            webhook_url = "http://127.0.0.1:7000/signals"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.http_config().port, 9100);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(
            config.controller_config().lock_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.controller_config().max_swap_attempts, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.signal.webhook_url.as_deref(),
            Some("http://127.0.0.1:7000/signals")
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut vars = config::Map::new();
        vars.insert("JOBCTL_SERVER__PORT".to_string(), "9200".to_string());
        vars.insert("JOBCTL_STORAGE__BACKEND".to_string(), "memory".to_string());

        let config = DaemonConfig::from_builder(
            config::Config::builder()
                .add_source(config::File::from_str(
                    "[server]\nport = 9100\n",
                    FileFormat::Toml,
                ))
                .add_source(environment().source(Some(vars))),
        )
        .unwrap();

        assert_eq!(config.server.port, 9200);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_rejects_lock_timeout_above_cap() {
        let err = from_toml("[control]\nlock_timeout_ms = 60000\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::Invalid {
                section: "control",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_request_timeout_below_lock_cap() {
        let err = from_toml("[server]\nrequest_timeout_ms = 1000\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::Invalid {
                section: "server",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_non_http_webhook() {
        let err = from_toml("[signal]\nwebhook_url = \"ftp://executor\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigLoadError::Invalid {
                section: "signal",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_backend_fails_to_load() {
        let err = from_toml("[storage]\nbackend = \"postgres\"\n").unwrap_err();
        assert!(matches!(err, ConfigLoadError::Source(_)));
    }
}
