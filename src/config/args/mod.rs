use crate::config::{CLITimeoutConfig, ClientConfig, Config, RetryConfig, TracingConfig};
use crate::filters::FilterSet;
use crate::registry;
use crate::types::{AccessKeys, AwsCredentials, ClientConfigLocation};
use chrono::{DateTime, Utc};
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;
use std::path::PathBuf;

pub mod value_parser;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_WORKER_SIZE: u16 = 10;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_WARN_AS_ERROR: bool = false;
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_FORCE: bool = false;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_WORKER_SIZE_ZERO: &str = "Worker size must be at least 1.";
const ERROR_MESSAGE_FILTER_FILE_REQUIRED: &str = "A filter file is required.";

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// cloudrm - Filter-driven bulk deletion of AWS resources.
///
/// Reads a YAML filter file naming resource types and selection rules,
/// lists the live resources of each type, and deletes the matches in
/// dependency order (instances before subnets, subnets before VPCs).
///
/// Example:
///   cloudrm filter.yml --dry-run
///   cloudrm filter.yml --force --region eu-west-1
///   cloudrm filter.yml --profile sandbox -vv
#[derive(Parser, Clone, Debug)]
#[command(name = "cloudrm", version, about, long_about = None)]
pub struct CLIArgs {
    /// Path to the YAML filter file.
    #[arg(
        env,
        value_name = "FILTER_FILE",
        value_parser = value_parser::file_exist::is_file_exist,
        required_unless_present = "auto_complete_shell",
    )]
    pub filter_file: Option<PathBuf>,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Preview mode. Lists and filters resources but does not delete anything.
    #[arg(short = 'd', long, env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    pub dry_run: bool,

    // -----------------------------------------------------------------------
    // Safety options
    // -----------------------------------------------------------------------
    /// Skip the confirmation prompt before deleting.
    #[arg(short = 'f', long, env, default_value_t = DEFAULT_FORCE, help_heading = "Safety")]
    pub force: bool,

    // -----------------------------------------------------------------------
    // Performance options
    // -----------------------------------------------------------------------
    /// Number of concurrent deletion workers per resource type. Default: 10.
    #[arg(long, env, default_value_t = DEFAULT_WORKER_SIZE, help_heading = "Performance")]
    pub worker_size: u16,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 10.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// AWS config file path.
    #[arg(long, env, help_heading = "AWS")]
    pub aws_config_file: Option<PathBuf>,

    /// AWS shared credentials file path.
    #[arg(long, env, help_heading = "AWS")]
    pub aws_shared_credentials_file: Option<PathBuf>,

    /// AWS profile. If not set, uses the default credential chain.
    #[arg(
        long,
        env,
        value_parser = NonEmptyStringValueParser::new(),
        conflicts_with = "access_key",
        help_heading = "AWS"
    )]
    pub profile: Option<String>,

    /// AWS access key ID.
    #[arg(
        long,
        env,
        value_parser = NonEmptyStringValueParser::new(),
        requires = "secret_key",
        help_heading = "AWS"
    )]
    pub access_key: Option<String>,

    /// AWS secret access key.
    #[arg(
        long,
        env,
        value_parser = NonEmptyStringValueParser::new(),
        requires = "access_key",
        help_heading = "AWS"
    )]
    pub secret_key: Option<String>,

    /// AWS session token.
    #[arg(
        long,
        env,
        value_parser = NonEmptyStringValueParser::new(),
        requires = "access_key",
        help_heading = "AWS"
    )]
    pub session_token: Option<String>,

    /// AWS region.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub region: Option<String>,

    /// Custom endpoint URL (e.g. LocalStack).
    #[arg(long, env, value_parser = value_parser::url::check_scheme, help_heading = "AWS")]
    pub endpoint_url: Option<String>,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Fail the run with exit code 3 when any resource could not be deleted.
    /// Without it such a run logs a warning and exits 0.
    #[arg(long, env, default_value_t = DEFAULT_WARN_AS_ERROR, help_heading = "Advanced")]
    pub warn_as_error: bool,

    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use cloudrm_rs::config::args::parse_from_args;
///
/// let args = vec!["cloudrm", "Cargo.toml", "--dry-run"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(cli_args.dry_run);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
///
/// Convenience function that combines `parse_from_args` and `Config::try_from`.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.worker_size == 0 {
            return Err(ERROR_MESSAGE_WORKER_SIZE_ZERO.to_string());
        }
        Ok(())
    }

    /// Load and validate the filter file. Relative time bounds resolve against `now`.
    fn load_filter_set(&self, now: DateTime<Utc>) -> Result<FilterSet, String> {
        let Some(filter_file) = &self.filter_file else {
            if self.auto_complete_shell.is_some() {
                return Ok(FilterSet::default());
            }
            return Err(ERROR_MESSAGE_FILTER_FILE_REQUIRED.to_string());
        };

        let filter_set = FilterSet::from_file(filter_file, now).map_err(|e| format!("{e:#}"))?;
        filter_set
            .validate(registry::is_supported)
            .map_err(|e| format!("{e:#}"))?;
        Ok(filter_set)
    }

    fn build_client_config(&self) -> ClientConfig {
        let credential = if let Some(ref profile) = self.profile {
            AwsCredentials::Profile(profile.clone())
        } else if let Some(ref access_key) = self.access_key {
            AwsCredentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: self.secret_key.clone().unwrap_or_default(),
                    session_token: self.session_token.clone(),
                },
            }
        } else {
            AwsCredentials::FromEnvironment
        };

        ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential,
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
        }
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        let filter_set = args.load_filter_set(Utc::now())?;
        let client_config = args.build_client_config();
        let tracing_config = args.build_tracing_config();

        Ok(Config {
            filter_set,
            client_config: Some(client_config),
            tracing_config,
            worker_size: args.worker_size,
            warn_as_error: args.warn_as_error,
            dry_run: args.dry_run,
            force: args.force,
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}
