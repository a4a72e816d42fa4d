//! Monitor configuration.
//!
//! Everything is read from the environment (optionally seeded from `.env`).
//! Unset variables fall back to defaults; set-but-invalid values are
//! configuration errors so a typo never silently becomes a default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use lastframe_media::ExtractorConfig;
use lastframe_models::{ContainerLocator, SourceScope};

use crate::error::{WorkerError, WorkerResult};
use crate::retry::{FailurePolicy, RetryConfig};

/// Where the dedup ledger lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerBackend {
    File { data_dir: PathBuf },
    Redis { url: String },
    Memory,
}

/// Where captured frames are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputBackend {
    Fs { dir: PathBuf },
    /// R2 credentials come from the `R2_*` variables
    R2 { prefix: String },
}

/// Settings of the ingestion and processing loops.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pause after handling one item
    pub cooldown: Duration,
    /// Pause when no item is ready
    pub poll_interval: Duration,
    pub extractor: ExtractorConfig,
    pub failure_policy: FailurePolicy,
    pub retry: RetryConfig,
    /// `None` for an unbounded queue
    pub queue_capacity: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(1000),
            extractor: ExtractorConfig::default(),
            failure_policy: FailurePolicy::default(),
            retry: RetryConfig::default(),
            queue_capacity: Some(1024),
        }
    }
}

/// Full configuration of the monitor binary.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub container: ContainerLocator,
    pub scope: SourceScope,
    pub pipeline: PipelineConfig,
    pub ledger: LedgerBackend,
    pub output: OutputBackend,
    /// Prometheus listener, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl MonitorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> WorkerResult<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let defaults = PipelineConfig::default();
        let extractor = ExtractorConfig {
            ready_timeout: Duration::from_secs(parse_or(&var, "LASTFRAME_READY_TIMEOUT_SECS", 30)?),
            seek_timeout: Duration::from_secs(parse_or(&var, "LASTFRAME_SEEK_TIMEOUT_SECS", 10)?),
            ..ExtractorConfig::default()
        };
        let retry = RetryConfig {
            max_attempts: parse_or(&var, "LASTFRAME_MAX_ATTEMPTS", 3u32)?.max(1),
            base_delay: Duration::from_millis(parse_or(&var, "LASTFRAME_RETRY_BASE_DELAY_MS", 5000)?),
            ..defaults.retry
        };
        let queue_capacity = match parse_or(&var, "LASTFRAME_QUEUE_CAPACITY", 1024usize)? {
            0 => None,
            n => Some(n),
        };

        let pipeline = PipelineConfig {
            cooldown: Duration::from_millis(parse_or(&var, "LASTFRAME_COOLDOWN_MS", 3000)?),
            poll_interval: Duration::from_millis(parse_or(&var, "LASTFRAME_POLL_INTERVAL_MS", 1000)?),
            extractor,
            failure_policy: parse_or(&var, "LASTFRAME_FAILURE_POLICY", FailurePolicy::Retry)?,
            retry,
            queue_capacity,
        };

        let ledger = match var("LASTFRAME_LEDGER_BACKEND").as_deref().unwrap_or("file") {
            "file" => LedgerBackend::File {
                data_dir: var("LASTFRAME_DATA_DIR")
                    .unwrap_or_else(|| "./lastframe-data".to_string())
                    .into(),
            },
            "redis" => LedgerBackend::Redis {
                url: var("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            },
            "memory" => LedgerBackend::Memory,
            other => {
                return Err(WorkerError::config_error(format!(
                    "LASTFRAME_LEDGER_BACKEND: unknown backend '{}'",
                    other
                )))
            }
        };

        let output = match var("LASTFRAME_OUTPUT_BACKEND").as_deref().unwrap_or("fs") {
            "fs" => OutputBackend::Fs {
                dir: var("LASTFRAME_OUTPUT_DIR")
                    .unwrap_or_else(|| "./frames".to_string())
                    .into(),
            },
            "r2" => OutputBackend::R2 {
                prefix: var("LASTFRAME_OUTPUT_PREFIX").unwrap_or_else(|| "frames".to_string()),
            },
            other => {
                return Err(WorkerError::config_error(format!(
                    "LASTFRAME_OUTPUT_BACKEND: unknown backend '{}'",
                    other
                )))
            }
        };

        let metrics_addr = var("METRICS_ADDR")
            .map(|s| {
                s.parse::<SocketAddr>()
                    .map_err(|e| WorkerError::config_error(format!("METRICS_ADDR: {}", e)))
            })
            .transpose()?;

        Ok(Self {
            container: var("LASTFRAME_CONTAINER_XPATH")
                .map(ContainerLocator::xpath)
                .unwrap_or_default(),
            scope: var("LASTFRAME_SOURCE_SCOPE")
                .map(SourceScope::new)
                .unwrap_or_default(),
            pipeline,
            ledger,
            output,
            metrics_addr,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> WorkerResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WorkerError::config_error(format!("{}: invalid value '{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> WorkerResult<MonitorConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.container, ContainerLocator::default());
        assert_eq!(config.scope.as_str(), "default");
        assert_eq!(config.pipeline.cooldown, Duration::from_secs(3));
        assert_eq!(config.pipeline.poll_interval, Duration::from_secs(1));
        assert_eq!(config.pipeline.extractor.ready_timeout, Duration::from_secs(30));
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Retry);
        assert_eq!(config.pipeline.queue_capacity, Some(1024));
        assert_eq!(
            config.ledger,
            LedgerBackend::File {
                data_dir: "./lastframe-data".into()
            }
        );
        assert_eq!(
            config.output,
            OutputBackend::Fs {
                dir: "./frames".into()
            }
        );
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LASTFRAME_COOLDOWN_MS", "250"),
            ("LASTFRAME_FAILURE_POLICY", "mark_processed"),
            ("LASTFRAME_QUEUE_CAPACITY", "0"),
            ("LASTFRAME_LEDGER_BACKEND", "redis"),
            ("REDIS_URL", "redis://cache:6379"),
            ("LASTFRAME_OUTPUT_BACKEND", "r2"),
            ("METRICS_ADDR", "0.0.0.0:9100"),
            ("LASTFRAME_SOURCE_SCOPE", "chat-42"),
        ])
        .unwrap();

        assert_eq!(config.pipeline.cooldown, Duration::from_millis(250));
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::MarkProcessed);
        assert_eq!(config.pipeline.queue_capacity, None);
        assert_eq!(
            config.ledger,
            LedgerBackend::Redis {
                url: "redis://cache:6379".into()
            }
        );
        assert_eq!(
            config.output,
            OutputBackend::R2 {
                prefix: "frames".into()
            }
        );
        assert_eq!(config.metrics_addr.unwrap().port(), 9100);
        assert_eq!(config.scope.as_str(), "chat-42");
    }

    #[test]
    fn test_invalid_values_are_errors() {
        for vars in [
            [("LASTFRAME_COOLDOWN_MS", "soon")],
            [("LASTFRAME_FAILURE_POLICY", "maybe")],
            [("LASTFRAME_LEDGER_BACKEND", "sqlite")],
            [("METRICS_ADDR", "not-an-addr")],
        ] {
            let err = config_from(&vars).unwrap_err();
            assert!(err.is_fatal(), "{}", err);
        }
    }
}
