pub mod args;

use crate::filters::FilterSet;
use crate::types::{AwsCredentials, ClientConfigLocation};

/// Main configuration for the cloudrm-rs deletion pipeline.
///
/// Holds everything a [`DeletionPipeline`](crate::DeletionPipeline) needs:
/// the loaded filter set, AWS client settings, worker pool size and the
/// safety flags (dry-run, force).
///
/// # Quick Start
///
/// Use [`Config::for_filter_set`] for library usage with sensible defaults:
///
/// ```
/// use chrono::Utc;
/// use cloudrm_rs::{Config, FilterSet};
///
/// let filter_set = FilterSet::from_yaml_str("aws_vpc:\n  - tagged: false\n", Utc::now()).unwrap();
/// let config = Config::for_filter_set(filter_set);
/// assert_eq!(config.worker_size, 10);
/// assert!(config.force);
/// ```
///
/// # Default
///
/// [`Config::default()`] holds an empty filter set, which selects nothing.
#[derive(Debug, Clone)]
pub struct Config {
    pub filter_set: FilterSet,
    pub client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    pub worker_size: u16,
    pub warn_as_error: bool,
    pub dry_run: bool,
    pub force: bool,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` for the given filter set.
    ///
    /// `force` is set so that programmatic runs never block on a prompt.
    pub fn for_filter_set(filter_set: FilterSet) -> Self {
        Config {
            filter_set,
            force: true,
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            filter_set: FilterSet::default(),
            client_config: None,
            tracing_config: None,
            worker_size: 10,
            warn_as_error: false,
            dry_run: false,
            force: false,
            auto_complete_shell: None,
        }
    }
}

/// AWS client configuration shared by the EC2 and S3 clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: AwsCredentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
}

/// Retry configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

/// Timeout configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
