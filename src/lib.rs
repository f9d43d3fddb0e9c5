/*!
# Overview
cloudrm-rs is a bulk cloud-resource deletion tool.
Given a declarative filter file describing which resources of which types to
remove, it enumerates live resources, matches them against the filter and
destroys the matches in dependency-safe order.

## Features
- **Declarative Filters**: ID regex, tag values, tagged/untagged, creation-time windows
- **Negation**: `NOT(...)` around a pattern inverts it, `NOT(key)` excludes a tag value
- **Relative Times**: `30d`, `2w`, `6M`, `1y`, `12h` or RFC 3339 timestamps
- **Dependency Order**: dependents first (instances, then subnets, then VPCs)
- **Bounded Concurrency**: a fixed worker pool per resource type, drained before the next type
- **Safety First**: dry-run preview, confirmation prompt, force flag
- **Library-First**: the `cloudrm` CLI is a thin wrapper over this crate

## Filter file

```yaml
aws_instance:
  - tags:
      NOT(env): ^prod
    created:
      before: 7d
aws_vpc:
  - tagged: false
aws_s3_bucket: []   # every bucket
```

Example usage
=============

```toml
[dependencies]
cloudrm-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use cloudrm_rs::config::Config;
use cloudrm_rs::config::args::parse_from_args;
use cloudrm_rs::{DeletionPipeline, create_pipeline_cancellation_token, create_provider};

#[tokio::main]
async fn main() {
    let args = vec!["cloudrm", "filter.yml", "--dry-run"];

    let parsed_args = parse_from_args(args).unwrap();
    let config = Config::try_from(parsed_args).unwrap();
    let provider = create_provider(config.client_config.as_ref().unwrap()).await;
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = DeletionPipeline::new(config, provider, cancellation_token);
    pipeline.run().await;

    if pipeline.has_error() {
        eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }
}
```
*/

pub mod config;
pub mod deleter;
pub mod filters;
pub mod lister;
pub mod pipeline;
pub mod preview;
pub mod provider;
pub mod registry;
pub mod safety;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use config::args::CLIArgs;
pub use filters::{FilterSet, PatternRule, TypeFilter};
pub use pipeline::DeletionPipeline;
pub use preview::{PreviewSink, StdoutPreviewSink};
pub use provider::{Provider, ProviderTrait, create_provider};
pub use safety::{PromptHandler, SafetyChecker};
pub use types::error::{CloudrmError, exit_code_from_error, is_cancelled_error};
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{DeletionStats, RawResource, Resource};
