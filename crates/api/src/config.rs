use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use batchgen_archive::ArchiveConfig;
use batchgen_core::backoff::BackoffConfig;
use batchgen_engine::api::EngineConfig;
use batchgen_pipeline::poller::PollConfig;
use batchgen_pipeline::registry::RetentionPolicy;
use batchgen_pipeline::submission::SubmissionConfig;

/// Path the engine posts job status webhooks to.
pub const WEBHOOK_PATH: &str = "/api/v1/webhooks/engine";

/// A configuration variable could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{var}={value:?} is invalid: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// How long running pollers get to finish at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Externally reachable base URL, used to build the webhook callback.
    pub public_base_url: String,
    pub engine: EngineConfig,
    pub archive: ArchiveConfig,
    pub poll: PollConfig,
    /// Spacing between engine submissions (default: 1500 ms).
    pub submit_delay: Duration,
    pub retention: RetentionPolicy,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                  |
    /// |---------------------------|--------------------------|
    /// | `HOST`                    | `0.0.0.0`                |
    /// | `PORT`                    | `3000`                   |
    /// | `CORS_ORIGINS`            | `http://localhost:3000`  |
    /// | `REQUEST_TIMEOUT_SECS`    | `60`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                     |
    /// | `PUBLIC_BASE_URL`         | `http://localhost:3000`  |
    /// | `ENGINE_API_URL`          | `http://localhost:8080`  |
    /// | `ENGINE_API_KEY`          | unset                    |
    /// | `ARCHIVE_API_URL`         | `http://localhost:8090`  |
    /// | `ARCHIVE_API_KEY`         | unset                    |
    /// | `POLL_INITIAL_DELAY_SECS` | `5`                      |
    /// | `POLL_MAX_DELAY_SECS`     | `30`                     |
    /// | `POLL_MULTIPLIER`         | `1.5`                    |
    /// | `POLL_MAX_ATTEMPTS`       | `60`                     |
    /// | `SUBMIT_DELAY_MS`         | `1500`                   |
    /// | `RETENTION_GRACE_SECS`    | `3600`                   |
    /// | `RETENTION_SWEEP_SECS`    | `300`                    |
    ///
    /// Poll delays, the poll budget and the sweep interval must be non-zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ServerConfig::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |var: &str, default: &str| lookup(var).unwrap_or_else(|| default.to_string());

        let cors_origins: Vec<String> = text("CORS_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for origin in &cors_origins {
            origin.parse::<HeaderValue>().map_err(|e| ConfigError {
                var: "CORS_ORIGINS",
                value: origin.clone(),
                reason: e.to_string(),
            })?;
        }

        let mut engine = EngineConfig::new(text("ENGINE_API_URL", "http://localhost:8080"));
        engine.api_key = lookup("ENGINE_API_KEY").filter(|k| !k.is_empty());

        let mut archive = ArchiveConfig::new(text("ARCHIVE_API_URL", "http://localhost:8090"));
        archive.api_key = lookup("ARCHIVE_API_KEY").filter(|k| !k.is_empty());

        let multiplier: f64 = parse(&lookup, "POLL_MULTIPLIER", "1.5")?;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(invalid("POLL_MULTIPLIER", multiplier, "must be at least 1.0"));
        }
        let initial_secs: u64 = parse(&lookup, "POLL_INITIAL_DELAY_SECS", "5")?;
        if initial_secs == 0 {
            return Err(invalid("POLL_INITIAL_DELAY_SECS", initial_secs, "must be at least 1"));
        }
        let max_secs: u64 = parse(&lookup, "POLL_MAX_DELAY_SECS", "30")?;
        if max_secs < initial_secs {
            return Err(invalid(
                "POLL_MAX_DELAY_SECS",
                max_secs,
                "must not be below POLL_INITIAL_DELAY_SECS",
            ));
        }
        let max_attempts: u32 = parse(&lookup, "POLL_MAX_ATTEMPTS", "60")?;
        if max_attempts == 0 {
            return Err(invalid("POLL_MAX_ATTEMPTS", max_attempts, "must be at least 1"));
        }
        let poll = PollConfig {
            backoff: BackoffConfig {
                initial_delay: Duration::from_secs(initial_secs),
                max_delay: Duration::from_secs(max_secs),
                multiplier,
            },
            max_attempts,
        };

        let sweep_secs: u64 = parse(&lookup, "RETENTION_SWEEP_SECS", "300")?;
        if sweep_secs == 0 {
            return Err(invalid("RETENTION_SWEEP_SECS", sweep_secs, "must be at least 1"));
        }

        Ok(Self {
            host: text("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", "3000")?,
            cors_origins,
            request_timeout_secs: parse(&lookup, "REQUEST_TIMEOUT_SECS", "60")?,
            shutdown_timeout_secs: parse(&lookup, "SHUTDOWN_TIMEOUT_SECS", "30")?,
            public_base_url: text("PUBLIC_BASE_URL", "http://localhost:3000"),
            engine,
            archive,
            poll,
            submit_delay: Duration::from_millis(parse(&lookup, "SUBMIT_DELAY_MS", "1500")?),
            retention: RetentionPolicy {
                grace: Duration::from_secs(parse(&lookup, "RETENTION_GRACE_SECS", "3600")?),
                sweep_interval: Duration::from_secs(sweep_secs),
            },
        })
    }

    /// Full webhook address handed to the engine with every job.
    pub fn callback_url(&self) -> String {
        format!("{}{WEBHOOK_PATH}", self.public_base_url.trim_end_matches('/'))
    }

    pub fn submission(&self) -> SubmissionConfig {
        let mut config = SubmissionConfig::new(self.callback_url());
        config.submit_delay = self.submit_delay;
        config
    }
}

fn invalid(var: &'static str, value: impl Display, reason: &str) -> ConfigError {
    ConfigError {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T, F>(lookup: &F, var: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(var).unwrap_or_else(|| default.to_string());
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        value: value.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.engine.api_url, "http://localhost:8080");
        assert!(config.engine.api_key.is_none());
        assert_eq!(config.archive.api_url, "http://localhost:8090");
        assert_eq!(config.poll, PollConfig::default());
        assert_eq!(config.submit_delay, Duration::from_millis(1500));
        assert_eq!(config.retention, RetentionPolicy::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("PORT", "8081"),
            ("POLL_MAX_ATTEMPTS", "10"),
            ("POLL_MULTIPLIER", "2"),
            ("ENGINE_API_KEY", "secret"),
            ("SUBMIT_DELAY_MS", "0"),
            ("CORS_ORIGINS", "http://a.test, http://b.test"),
        ])
        .unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.poll.max_attempts, 10);
        assert_eq!(config.poll.backoff.multiplier, 2.0);
        assert_eq!(config.engine.api_key.as_deref(), Some("secret"));
        assert_eq!(config.submit_delay, Duration::ZERO);
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn invalid_value_names_the_variable() {
        let err = load(&[("POLL_MAX_ATTEMPTS", "lots")]).unwrap_err();
        assert_eq!(err.var, "POLL_MAX_ATTEMPTS");
        assert_eq!(err.value, "lots");

        let err = load(&[("POLL_MULTIPLIER", "0.5")]).unwrap_err();
        assert_eq!(err.var, "POLL_MULTIPLIER");
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let err = load(&[("RETENTION_SWEEP_SECS", "0")]).unwrap_err();
        assert_eq!(err.var, "RETENTION_SWEEP_SECS");

        let err = load(&[("POLL_INITIAL_DELAY_SECS", "0")]).unwrap_err();
        assert_eq!(err.var, "POLL_INITIAL_DELAY_SECS");

        let err = load(&[("POLL_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert_eq!(err.var, "POLL_MAX_ATTEMPTS");
    }

    #[test]
    fn max_delay_below_initial_is_rejected() {
        let err = load(&[("POLL_INITIAL_DELAY_SECS", "10"), ("POLL_MAX_DELAY_SECS", "5")])
            .unwrap_err();
        assert_eq!(err.var, "POLL_MAX_DELAY_SECS");
        assert_eq!(err.value, "5");

        let config = load(&[("POLL_INITIAL_DELAY_SECS", "10"), ("POLL_MAX_DELAY_SECS", "10")])
            .unwrap();
        assert_eq!(config.poll.backoff.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn callback_url_joins_base_and_path() {
        let config = load(&[("PUBLIC_BASE_URL", "https://gen.example.com/")]).unwrap();
        assert_eq!(
            config.callback_url(),
            "https://gen.example.com/api/v1/webhooks/engine"
        );
        assert_eq!(config.submission().callback_url, config.callback_url());
    }
}
