//! Deletion scheduler.
//!
//! Walks the requested resource types strictly in dependency order. For each
//! type it enumerates, matches, prints a preview block and then (unless this
//! is a dry run) fans the matches out to a fixed-size pool of
//! [`ResourceDestroyer`] workers. The pool is drained completely before the
//! next type starts, so a dependent type is always gone before the type it
//! depends on is attempted.
//!
//! ```text
//! Confirmation Gate → for each type: ResourceLister → FilterSet → preview → ResourceDestroyer workers (MPMC)
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::deleter::ResourceDestroyer;
use crate::lister::ResourceLister;
use crate::preview::{self, PreviewSink, StdoutPreviewSink};
use crate::provider::Provider;
use crate::safety::{PromptHandler, SafetyChecker, StdioPromptHandler};
use crate::types::error::CloudrmError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{DeletionStats, DeletionStatsReport, Resource};

/// The deletion pipeline orchestrator.
///
/// ## Usage
///
/// ```no_run
/// # async fn example() {
/// # use cloudrm_rs::{Config, DeletionPipeline, create_pipeline_cancellation_token, create_provider};
/// # let config: Config = todo!();
/// let provider = create_provider(config.client_config.as_ref().unwrap()).await;
/// let cancellation_token = create_pipeline_cancellation_token();
/// let mut pipeline = DeletionPipeline::new(config, provider, cancellation_token);
/// pipeline.run().await;
/// if pipeline.has_error() {
///     eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
/// }
/// # }
/// ```
pub struct DeletionPipeline {
    config: Config,
    provider: Provider,
    cancellation_token: PipelineCancellationToken,
    prompt_handler: Option<Box<dyn PromptHandler>>,
    preview_sink: Box<dyn PreviewSink>,
    has_error: Arc<AtomicBool>,
    has_panic: Arc<AtomicBool>,
    has_warning: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<anyhow::Error>>>,
    ready: bool,
    deletion_stats_report: Arc<DeletionStatsReport>,
}

impl DeletionPipeline {
    /// Create a pipeline that prompts on stdin and previews to stdout.
    pub fn new(
        config: Config,
        provider: Provider,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            config,
            provider,
            cancellation_token,
            prompt_handler: None,
            preview_sink: Box::new(StdoutPreviewSink),
            has_error: Arc::new(AtomicBool::new(false)),
            has_panic: Arc::new(AtomicBool::new(false)),
            has_warning: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            ready: true,
            deletion_stats_report: Arc::new(DeletionStatsReport::new()),
        }
    }

    pub fn with_prompt_handler(mut self, prompt_handler: Box<dyn PromptHandler>) -> Self {
        self.prompt_handler = Some(prompt_handler);
        self
    }

    pub fn with_preview_sink(mut self, preview_sink: Box<dyn PreviewSink>) -> Self {
        self.preview_sink = preview_sink;
        self
    }

    /// Run the deletion pipeline.
    ///
    /// 1. Validate the filter set against the provider (no API call yet)
    /// 2. Confirmation Gate
    /// 3. Per type, in dependency order: enumerate, match, preview, destroy
    /// 4. Print the summary
    ///
    /// Errors are collected rather than returned, see [`Self::get_errors_and_consume`].
    pub async fn run(&mut self) {
        assert!(self.ready, "DeletionPipeline::run() called more than once");
        self.ready = false;

        if let Err(e) = self.check_prerequisites() {
            self.record_error(e);
            return;
        }

        if let Err(e) = self.execute_pipeline().await {
            self.record_error(e);
            return;
        }

        let summary = preview::render_summary(&self.get_deletion_stats(), self.config.dry_run);
        if let Err(e) = self.preview_sink.write(&summary) {
            self.record_error(anyhow!(CloudrmError::Io(e.to_string())));
        }

        if self.config.warn_as_error && self.has_warning() {
            let stats = self.get_deletion_stats();
            self.record_error(anyhow!(CloudrmError::PartialFailure {
                deleted: stats.stats_deleted_resources,
                failed: stats.stats_failed_resources,
            }));
        }
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn has_panic(&self) -> bool {
        self.has_panic.load(Ordering::SeqCst)
    }

    /// Set when a resource could not be destroyed or a record was skipped.
    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    /// Consume and return all accumulated errors.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_errors_and_consume(&self) -> Option<Vec<anyhow::Error>> {
        if !self.has_error() {
            return None;
        }
        let mut error_list = self.errors.lock().unwrap();
        Some(error_list.drain(..).collect())
    }

    pub fn get_deletion_stats(&self) -> DeletionStats {
        self.deletion_stats_report.snapshot()
    }

    // -----------------------------------------------------------------------
    // Internal methods
    // -----------------------------------------------------------------------

    /// Nothing here talks to the provider's API.
    fn check_prerequisites(&mut self) -> Result<()> {
        let provider = &self.provider;
        self.config
            .filter_set
            .validate(|resource_type| provider.is_supported(resource_type))?;

        if self.config.filter_set.is_empty() {
            return Ok(());
        }

        let prompt_handler = self
            .prompt_handler
            .take()
            .unwrap_or_else(|| Box::new(StdioPromptHandler));
        let checker = SafetyChecker::with_prompt_handler(&self.config, prompt_handler);
        checker.check_before_deletion(&self.config.filter_set.ordered_types())
    }

    async fn execute_pipeline(&self) -> Result<()> {
        for resource_type in self.config.filter_set.ordered_types() {
            if self.cancellation_token.is_cancelled() {
                info!("pipeline cancelled, remaining resource types are skipped.");
                break;
            }
            self.process_type(resource_type).await?;
        }
        Ok(())
    }

    async fn process_type(&self, resource_type: &str) -> Result<()> {
        let lister = ResourceLister::new(
            dyn_clone::clone_box(&*self.provider),
            self.has_warning.clone(),
        );
        let resources = lister.list(resource_type).await?;

        let matched: Vec<Resource> = resources
            .into_iter()
            .filter(|resource| self.config.filter_set.is_match(resource))
            .collect();
        if matched.is_empty() {
            debug!(resource_type = resource_type, "no matching resources.");
            return Ok(());
        }

        self.deletion_stats_report.add_matched(matched.len() as u64);
        self.preview_sink
            .write(&preview::render_preview(resource_type, &matched))
            .map_err(|e| anyhow!(CloudrmError::Io(e.to_string())))?;

        if self.config.dry_run {
            return Ok(());
        }

        self.destroy_resources(resource_type, matched).await;
        Ok(())
    }

    /// Fan `resources` out to the worker pool and wait until it has drained.
    async fn destroy_resources(&self, resource_type: &str, resources: Vec<Resource>) {
        let worker_size = usize::from(self.config.worker_size.max(1)).min(resources.len());
        let (sender, receiver) = async_channel::bounded::<Resource>(worker_size);

        let mut join_handles = Vec::with_capacity(worker_size);
        for worker_index in 0..worker_size {
            let destroyer = ResourceDestroyer::new(
                worker_index as u16,
                dyn_clone::clone_box(&*self.provider),
                receiver.clone(),
                self.cancellation_token.clone(),
                self.has_warning.clone(),
                self.deletion_stats_report.clone(),
            );

            let has_error = self.has_error.clone();
            let has_panic = self.has_panic.clone();
            let error_list = self.errors.clone();

            join_handles.push(tokio::spawn(async move {
                let join_result = tokio::spawn(async move { destroyer.destroy().await }).await;

                match join_result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        has_error.store(true, Ordering::SeqCst);
                        error!(worker_index, "destroy worker failed: {}", e);
                        error_list.lock().unwrap().push_back(e);
                    }
                    Err(e) => {
                        has_error.store(true, Ordering::SeqCst);
                        has_panic.store(true, Ordering::SeqCst);
                        error!(worker_index, "destroy worker task panicked: {}", e);
                        error_list
                            .lock()
                            .unwrap()
                            .push_back(anyhow!("destroy worker panicked: {}", e));
                    }
                }
            }));
        }
        // Workers hold the only receivers, so a send fails once they have all exited.
        drop(receiver);

        let mut unsent = 0;
        let mut resources = resources.into_iter();
        while let Some(resource) = resources.next() {
            tokio::select! {
                send_result = sender.send(resource) => {
                    if send_result.is_err() {
                        unsent = 1 + resources.len();
                        break;
                    }
                },
                _ = self.cancellation_token.cancelled() => {
                    break;
                }
            }
        }
        sender.close();

        for join_handle in join_handles {
            let _ = join_handle.await;
        }

        // Workers that died (panic) leave their share behind. Cancelled runs
        // skip the rest on purpose.
        if !self.cancellation_token.is_cancelled() {
            let undelivered = unsent + sender.len();
            if undelivered > 0 {
                warn!(
                    resource_type = resource_type,
                    undelivered = undelivered,
                    "destroy workers exited early, remaining resources were not attempted."
                );
                self.has_warning.store(true, Ordering::SeqCst);
                self.deletion_stats_report.add_failed(undelivered as u64);
            }
        }
        debug!(resource_type = resource_type, "destroy workers have drained.");
    }

    /// Record an error and set the error flag.
    fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        self.errors.lock().unwrap().push_back(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterSet;
    use crate::test_utils::{
        CapturingPreviewSink, FixedPromptHandler, MockProvider, init_dummy_tracing_subscriber,
    };
    use crate::types::RawResource;
    use crate::types::error::is_cancelled_error;
    use crate::types::token::create_pipeline_cancellation_token;
    use chrono::Utc;
    use serde_json::json;

    fn make_config(filter_yaml: &str, dry_run: bool, force: bool) -> Config {
        Config {
            filter_set: FilterSet::from_yaml_str(filter_yaml, Utc::now()).unwrap(),
            dry_run,
            force,
            worker_size: 4,
            ..Config::default()
        }
    }

    fn network_provider() -> MockProvider {
        MockProvider::new()
            .with_record(
                "aws_vpc",
                RawResource::new()
                    .with_field("VpcId", "vpc-1")
                    .with_field("Tags", json!([{"Key": "env", "Value": "dev"}])),
            )
            .with_record(
                "aws_subnet",
                RawResource::new()
                    .with_field("SubnetId", "subnet-1")
                    .with_field("Tags", json!([{"Key": "env", "Value": "dev"}])),
            )
            .with_record(
                "aws_subnet",
                RawResource::new()
                    .with_field("SubnetId", "subnet-2")
                    .with_field("Tags", json!([{"Key": "env", "Value": "prod"}])),
            )
    }

    fn make_pipeline(
        config: Config,
        provider: &MockProvider,
    ) -> (DeletionPipeline, CapturingPreviewSink, FixedPromptHandler) {
        let sink = CapturingPreviewSink::default();
        let prompt = FixedPromptHandler::new("no");
        let pipeline = DeletionPipeline::new(
            config,
            Box::new(provider.clone()),
            create_pipeline_cancellation_token(),
        )
        .with_preview_sink(Box::new(sink.clone()))
        .with_prompt_handler(Box::new(prompt.clone()));
        (pipeline, sink, prompt)
    }

    const DEV_NETWORK: &str = "aws_vpc:\n  - tags:\n      env: ^dev$\naws_subnet:\n  - tags:\n      env: ^dev$\n";

    #[tokio::test]
    async fn subnets_are_destroyed_before_vpcs() {
        init_dummy_tracing_subscriber();

        let provider = network_provider();
        let (mut pipeline, _, prompt) = make_pipeline(make_config(DEV_NETWORK, false, true), &provider);
        pipeline.run().await;

        assert!(!pipeline.has_error());
        assert_eq!(prompt.prompt_count(), 0);
        assert_eq!(provider.listed_types(), vec!["aws_subnet", "aws_vpc"]);
        assert_eq!(
            provider.destroyed(),
            vec![
                ("aws_subnet".to_string(), "subnet-1".to_string()),
                ("aws_vpc".to_string(), "vpc-1".to_string()),
            ]
        );

        let stats = pipeline.get_deletion_stats();
        assert_eq!(stats.stats_matched_resources, 2);
        assert_eq!(stats.stats_deleted_resources, 2);
    }

    #[tokio::test]
    async fn dry_run_previews_without_destroying() {
        init_dummy_tracing_subscriber();

        let provider = network_provider();
        let (mut pipeline, sink, prompt) =
            make_pipeline(make_config(DEV_NETWORK, true, false), &provider);
        pipeline.run().await;

        assert!(!pipeline.has_error());
        assert!(provider.destroyed().is_empty());
        assert_eq!(prompt.prompt_count(), 0);

        let output = sink.text();
        let subnet_block = output.find("aws_subnet (1)").unwrap();
        let vpc_block = output.find("aws_vpc (1)").unwrap();
        assert!(subnet_block < vpc_block);
        assert!(output.contains("  subnet-1\n    tags: env=dev\n"));
        assert!(!output.contains("subnet-2"));
        assert!(output.ends_with("2 resources would be deleted\n"));
    }

    #[tokio::test]
    async fn declined_confirmation_does_nothing() {
        init_dummy_tracing_subscriber();

        let provider = network_provider();
        let (mut pipeline, sink, prompt) =
            make_pipeline(make_config(DEV_NETWORK, false, false), &provider);
        pipeline.run().await;

        assert_eq!(prompt.prompt_count(), 1);
        assert!(provider.listed_types().is_empty());
        assert!(provider.destroyed().is_empty());
        assert!(sink.text().is_empty());

        let errors = pipeline.get_errors_and_consume().unwrap();
        assert!(is_cancelled_error(&errors[0]));
    }

    #[tokio::test]
    async fn confirmed_run_deletes() {
        init_dummy_tracing_subscriber();

        let provider = network_provider();
        let prompt = FixedPromptHandler::new("yes");
        let mut pipeline = DeletionPipeline::new(
            make_config(DEV_NETWORK, false, false),
            Box::new(provider.clone()),
            create_pipeline_cancellation_token(),
        )
        .with_preview_sink(Box::new(CapturingPreviewSink::default()))
        .with_prompt_handler(Box::new(prompt.clone()));
        pipeline.run().await;

        assert_eq!(prompt.prompt_count(), 1);
        assert_eq!(provider.destroyed().len(), 2);
    }

    #[tokio::test]
    async fn destroy_failure_is_isolated() {
        init_dummy_tracing_subscriber();

        let provider = network_provider()
            .with_record("aws_subnet", RawResource::new().with_field("SubnetId", "subnet-3"))
            .failing_destroy("subnet-1");
        let (mut pipeline, sink, _) = make_pipeline(
            make_config("aws_subnet: []\naws_vpc: []\n", false, true),
            &provider,
        );
        pipeline.run().await;

        assert!(!pipeline.has_error());
        assert!(pipeline.has_warning());

        let destroyed = provider.destroyed();
        assert_eq!(destroyed.len(), 4);
        assert!(destroyed.contains(&("aws_vpc".to_string(), "vpc-1".to_string())));

        let stats = pipeline.get_deletion_stats();
        assert_eq!(stats.stats_deleted_resources, 3);
        assert_eq!(stats.stats_failed_resources, 1);
        assert!(sink.text().ends_with("3 resources deleted (1 failed)\n"));
    }

    #[tokio::test]
    async fn warn_as_error_reports_partial_failure() {
        init_dummy_tracing_subscriber();

        let provider = network_provider().failing_destroy("vpc-1");
        let mut config = make_config("aws_vpc: []\n", false, true);
        config.warn_as_error = true;
        let (mut pipeline, _, _) = make_pipeline(config, &provider);
        pipeline.run().await;

        let errors = pipeline.get_errors_and_consume().unwrap();
        assert_eq!(
            errors[0].downcast_ref::<CloudrmError>(),
            Some(&CloudrmError::PartialFailure {
                deleted: 0,
                failed: 1
            })
        );
    }

    #[tokio::test]
    async fn enumeration_failure_aborts_remaining_types() {
        init_dummy_tracing_subscriber();

        let provider = network_provider().failing_list("aws_subnet");
        let (mut pipeline, _, _) = make_pipeline(
            make_config("aws_subnet: []\naws_vpc: []\n", false, true),
            &provider,
        );
        pipeline.run().await;

        assert!(pipeline.has_error());
        assert_eq!(provider.listed_types(), vec!["aws_subnet"]);
        assert!(provider.destroyed().is_empty());

        let errors = pipeline.get_errors_and_consume().unwrap();
        assert!(matches!(
            errors[0].downcast_ref::<CloudrmError>(),
            Some(CloudrmError::Enumeration { resource_type, .. }) if resource_type == "aws_subnet"
        ));
    }

    #[tokio::test]
    async fn empty_filter_set_enumerates_nothing() {
        init_dummy_tracing_subscriber();

        let provider = network_provider();
        let (mut pipeline, sink, prompt) = make_pipeline(make_config("", false, false), &provider);
        pipeline.run().await;

        assert!(!pipeline.has_error());
        assert_eq!(prompt.prompt_count(), 0);
        assert!(provider.listed_types().is_empty());
        assert_eq!(sink.text(), "0 resources deleted (0 failed)\n");
    }

    #[tokio::test]
    async fn unsupported_type_fails_before_enumeration() {
        init_dummy_tracing_subscriber();

        let provider = network_provider();
        let mut filter_set = FilterSet::new();
        filter_set.insert("aws_vpc", vec![]);
        filter_set.insert("aws_lambda_function", vec![]);
        let mut config = Config::for_filter_set(filter_set);
        config.dry_run = true;

        let (mut pipeline, _, _) = make_pipeline(config, &provider);
        pipeline.run().await;

        assert!(provider.listed_types().is_empty());
        let errors = pipeline.get_errors_and_consume().unwrap();
        assert_eq!(
            errors[0].downcast_ref::<CloudrmError>(),
            Some(&CloudrmError::UnsupportedResourceType(
                "aws_lambda_function".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn type_without_matches_prints_no_block() {
        init_dummy_tracing_subscriber();

        let provider = network_provider();
        let (mut pipeline, sink, _) = make_pipeline(
            make_config("aws_instance: []\naws_vpc:\n  - id: ^vpc-9\n", true, false),
            &provider,
        );
        pipeline.run().await;

        assert_eq!(provider.listed_types(), vec!["aws_instance", "aws_vpc"]);
        assert_eq!(sink.text(), "0 resources would be deleted\n");
    }

    #[tokio::test]
    async fn cancelled_pipeline_skips_all_types() {
        init_dummy_tracing_subscriber();

        let provider = network_provider();
        let cancellation_token = create_pipeline_cancellation_token();
        let mut pipeline = DeletionPipeline::new(
            make_config(DEV_NETWORK, false, true),
            Box::new(provider.clone()),
            cancellation_token.clone(),
        )
        .with_preview_sink(Box::new(CapturingPreviewSink::default()));

        cancellation_token.cancel();
        pipeline.run().await;

        assert!(provider.listed_types().is_empty());
        assert!(provider.destroyed().is_empty());
    }

    #[tokio::test]
    async fn many_resources_with_small_pool() {
        init_dummy_tracing_subscriber();

        let mut provider = MockProvider::new();
        for i in 0..50 {
            provider = provider.with_record(
                "aws_ebs_volume",
                RawResource::new().with_field("VolumeId", format!("vol-{i}")),
            );
        }
        let mut config = make_config("aws_ebs_volume: []\n", false, true);
        config.worker_size = 3;

        let (mut pipeline, _, _) = make_pipeline(config, &provider);
        pipeline.run().await;

        assert_eq!(provider.destroyed().len(), 50);
        assert_eq!(pipeline.get_deletion_stats().stats_deleted_resources, 50);
    }

    #[tokio::test]
    #[should_panic(expected = "called more than once")]
    async fn pipeline_panics_on_double_run() {
        init_dummy_tracing_subscriber();

        let provider = MockProvider::new();
        let (mut pipeline, _, _) = make_pipeline(make_config("", true, false), &provider);
        pipeline.run().await;
        pipeline.run().await;
    }

    fn subnets_and_vpc() -> MockProvider {
        MockProvider::new()
            .with_record(
                "aws_subnet",
                RawResource::new().with_field("SubnetId", "subnet-boom"),
            )
            .with_record(
                "aws_subnet",
                RawResource::new().with_field("SubnetId", "subnet-ok"),
            )
            .with_record("aws_vpc", RawResource::new().with_field("VpcId", "vpc-1"))
            .panicking_destroy("subnet-boom")
    }

    #[tokio::test]
    async fn worker_panic_is_captured_and_later_types_still_run() {
        init_dummy_tracing_subscriber();

        let provider = subnets_and_vpc();
        let mut config = make_config("aws_subnet: []\naws_vpc: []\n", false, true);
        config.worker_size = 1;
        let (mut pipeline, sink, _) = make_pipeline(config, &provider);
        pipeline.run().await;

        assert!(pipeline.has_panic());
        assert!(pipeline.has_error());
        assert!(pipeline.has_warning());

        // The only worker is gone, so subnet-ok is never attempted but is
        // reported as failed instead of vanishing.
        assert_eq!(
            provider.destroyed(),
            vec![("aws_vpc".to_string(), "vpc-1".to_string())]
        );
        let stats = pipeline.get_deletion_stats();
        assert_eq!(stats.stats_deleted_resources, 1);
        assert_eq!(stats.stats_failed_resources, 1);
        assert!(sink.text().ends_with("1 resources deleted (1 failed)\n"));

        let errors = pipeline.get_errors_and_consume().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("panicked"));
    }

    #[tokio::test]
    async fn remaining_workers_drain_the_queue_after_a_panic() {
        init_dummy_tracing_subscriber();

        let provider = subnets_and_vpc();
        let mut config = make_config("aws_subnet: []\naws_vpc: []\n", false, true);
        config.worker_size = 2;
        let (mut pipeline, _, _) = make_pipeline(config, &provider);
        pipeline.run().await;

        assert!(pipeline.has_panic());
        assert!(!pipeline.has_warning());
        assert_eq!(
            provider.destroyed(),
            vec![
                ("aws_subnet".to_string(), "subnet-ok".to_string()),
                ("aws_vpc".to_string(), "vpc-1".to_string()),
            ]
        );
        assert_eq!(pipeline.get_deletion_stats().stats_failed_resources, 0);
    }

    #[test]
    fn record_error_sets_flag_and_stores_error() {
        let provider = MockProvider::new();
        let (pipeline, _, _) = make_pipeline(Config::default(), &provider);

        assert!(pipeline.get_errors_and_consume().is_none());
        pipeline.record_error(anyhow!("test error"));
        assert!(pipeline.has_error());

        let errors = pipeline.get_errors_and_consume().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "test error");
        assert!(!pipeline.has_panic());
    }
}
