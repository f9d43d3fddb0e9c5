use anyhow::{Result, anyhow};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, trace, warn};

use cloudrm_rs::config::Config;
use cloudrm_rs::{
    CLIArgs, CloudrmError, DeletionPipeline, create_pipeline_cancellation_token, create_provider,
    exit_code_from_error, is_cancelled_error,
};

mod ctrl_c_handler;
mod tracing_init;

/// cloudrm - bulk cloud-resource deletion tool.
///
/// This binary is a thin wrapper over the cloudrm-rs library.
/// All core functionality is implemented in the library crate.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "cloudrm",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    run(config).await
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

async fn run(config: Config) -> Result<()> {
    let Some(client_config) = config.client_config.clone() else {
        return Err(anyhow!(CloudrmError::InvalidConfig(
            "no client configuration".to_string()
        )));
    };

    {
        let cancellation_token = create_pipeline_cancellation_token();

        ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

        let start_time = tokio::time::Instant::now();
        debug!("deletion pipeline start.");

        let provider = create_provider(&client_config).await;
        let mut pipeline = DeletionPipeline::new(config, provider, cancellation_token);
        pipeline.run().await;

        let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());

        if let Some(errors) = pipeline.get_errors_and_consume() {
            let mut exit_code = 1;
            for (index, err) in errors.iter().enumerate() {
                if is_cancelled_error(err) {
                    debug!("deletion cancelled by user.");
                    return Ok(());
                }
                if index == 0 {
                    exit_code = exit_code_from_error(err);
                }
                error!("{:#}", err);
            }
            error!(duration_sec = duration_sec, "cloudrm failed.");
            std::process::exit(exit_code);
        }

        if pipeline.has_warning() {
            let stats = pipeline.get_deletion_stats();
            warn!(
                failed = stats.stats_failed_resources,
                "cloudrm completed, but some resources were not deleted. use --warn-as-error to fail the run."
            );
        }

        debug!(duration_sec = duration_sec, "cloudrm has been completed.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudrm_rs::config::args::parse_from_args;
    use rusty_fork::rusty_fork_test;
    use std::io::Write;

    fn filter_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"aws_vpc: []\n").unwrap();
        file
    }

    rusty_fork_test! {
        #[test]
        fn with_tracing() {
            let file = filter_file();
            let args = vec![
                "cloudrm".to_string(),
                "-v".to_string(),
                file.path().to_string_lossy().to_string(),
            ];

            let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
            assert!(start_tracing_if_necessary(&config));
        }

        #[test]
        fn without_tracing() {
            let file = filter_file();
            let args = vec![
                "cloudrm".to_string(),
                "-qq".to_string(),
                file.path().to_string_lossy().to_string(),
            ];

            let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();
            assert!(!start_tracing_if_necessary(&config));
        }
    }
}
