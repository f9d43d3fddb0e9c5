// Log output for cloudrm. Events go to stderr; stdout carries only the
// preview blocks and the deletion summary, so `cloudrm filter.yml -d > plan`
// captures the plan alone. The level comes from -v/-q, `RUST_LOG` overrides
// it, and --aws-sdk-tracing adds the SDK's request and signing targets.

use std::env;
use std::io::IsTerminal;

use tracing_subscriber::fmt::format::FmtSpan;

use cloudrm_rs::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

pub fn init_tracing(config: &TracingConfig) {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .with_ansi(!config.disable_color_tracing && std::io::stderr().is_terminal())
        .with_span_events(fmt_span);

    let (event_filter, show_target) =
        build_event_filter(config, env::var(EVENT_FILTER_ENV_VAR).ok());

    let subscriber_builder = subscriber_builder
        .with_env_filter(event_filter)
        .with_target(show_target);
    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }
}

/// Returns the filter directive and whether event targets are shown. Targets
/// only help once events from other crates can appear.
fn build_event_filter(config: &TracingConfig, env_filter: Option<String>) -> (String, bool) {
    let tracing_level = config.tracing_level;
    if config.aws_sdk_tracing {
        return (
            format!(
                "cloudrm_rs={tracing_level},cloudrm={tracing_level},aws_smithy_runtime={tracing_level},aws_config={tracing_level},aws_sigv4={tracing_level}"
            ),
            true,
        );
    }
    match env_filter {
        Some(env_filter) => (env_filter, true),
        None => (
            format!("cloudrm_rs={tracing_level},cloudrm={tracing_level}"),
            false,
        ),
    }
}
