//! Shared integration-test infrastructure for cloudrm-rs.
//!
//! Provides an in-memory provider that records every enumeration and
//! destroy call, plus helpers to build a config from a filter file and run
//! a pipeline against that provider.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use cloudrm_rs::config::args::build_config_from_args;
use cloudrm_rs::{
    Config, DeletionPipeline, DeletionStats, PreviewSink, PromptHandler, ProviderTrait,
    RawResource, create_pipeline_cancellation_token, registry,
};
use serde_json::json;
use tempfile::NamedTempFile;

/// Result of running a deletion pipeline.
#[derive(Debug)]
pub struct PipelineResult {
    pub stats: DeletionStats,
    pub has_error: bool,
    pub has_panic: bool,
    pub has_warning: bool,
    pub errors: Vec<anyhow::Error>,
    /// Everything written to the preview sink.
    pub output: String,
    pub prompts: usize,
}

#[derive(Default)]
struct ProviderState {
    list_calls: Mutex<Vec<String>>,
    destroy_calls: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Provider backed by fixed records, shaped like the AWS API output.
#[derive(Clone, Default)]
pub struct MockProvider {
    records: BTreeMap<String, Vec<RawResource>>,
    failing_ids: HashSet<String>,
    failing_list_types: HashSet<String>,
    destroy_delay: Option<Duration>,
    state: Arc<ProviderState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, resource_type: &str, raw: RawResource) -> Self {
        self.records
            .entry(resource_type.to_string())
            .or_default()
            .push(raw);
        self
    }

    /// EC2-style record: `<id_field>` plus a `Tags` list.
    pub fn with_tagged(
        self,
        resource_type: &str,
        id_field: &str,
        id: &str,
        tags: &[(&str, &str)],
    ) -> Self {
        let tags = tags
            .iter()
            .map(|(key, value)| json!({"Key": key, "Value": value}))
            .collect::<Vec<_>>();
        self.with_record(
            resource_type,
            RawResource::new()
                .with_field(id_field, id)
                .with_field("Tags", tags),
        )
    }

    pub fn failing_destroy(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    pub fn failing_list(mut self, resource_type: &str) -> Self {
        self.failing_list_types.insert(resource_type.to_string());
        self
    }

    pub fn with_destroy_delay(mut self, delay: Duration) -> Self {
        self.destroy_delay = Some(delay);
        self
    }

    pub fn listed_types(&self) -> Vec<String> {
        self.state.list_calls.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<(String, String)> {
        self.state.destroy_calls.lock().unwrap().clone()
    }

    pub fn destroyed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.destroyed().into_iter().map(|(_, id)| id).collect();
        ids.sort();
        ids
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderTrait for MockProvider {
    fn is_supported(&self, resource_type: &str) -> bool {
        registry::is_supported(resource_type)
    }

    async fn list_resources(&self, resource_type: &str) -> Result<Vec<RawResource>> {
        self.state
            .list_calls
            .lock()
            .unwrap()
            .push(resource_type.to_string());
        if self.failing_list_types.contains(resource_type) {
            return Err(anyhow!("UnauthorizedOperation: not allowed"));
        }
        Ok(self.records.get(resource_type).cloned().unwrap_or_default())
    }

    async fn destroy(
        &self,
        resource_type: &str,
        id: &str,
        _attributes: &BTreeMap<String, String>,
    ) -> Result<()> {
        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = self.destroy_delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .destroy_calls
            .lock()
            .unwrap()
            .push((resource_type.to_string(), id.to_string()));

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.failing_ids.contains(id) {
            return Err(anyhow!("DependencyViolation: {id} has a dependent object"));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CapturingPreviewSink {
    output: Arc<Mutex<String>>,
}

impl PreviewSink for CapturingPreviewSink {
    fn write(&self, text: &str) -> Result<()> {
        self.output.lock().unwrap().push_str(text);
        Ok(())
    }
}

/// Interactive prompt handler answering with a fixed line.
#[derive(Clone)]
struct FixedPromptHandler {
    response: String,
    prompts: Arc<AtomicUsize>,
}

impl PromptHandler for FixedPromptHandler {
    fn read_confirmation(&self, _resource_types: &[&str]) -> Result<String> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

pub struct TestHelper;

impl TestHelper {
    pub fn filter_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    /// Build a config the way the CLI does, from a filter file and flags.
    pub fn build_config(filter_file: &NamedTempFile, args: &[&str]) -> Config {
        let mut cli_args = vec![
            "cloudrm".to_string(),
            filter_file.path().to_string_lossy().to_string(),
        ];
        cli_args.extend(args.iter().map(|s| s.to_string()));
        build_config_from_args(cli_args).unwrap()
    }

    pub async fn run_pipeline(
        config: Config,
        provider: &MockProvider,
        prompt_response: &str,
    ) -> PipelineResult {
        let sink = CapturingPreviewSink::default();
        let prompt = FixedPromptHandler {
            response: prompt_response.to_string(),
            prompts: Arc::new(AtomicUsize::new(0)),
        };

        let mut pipeline = DeletionPipeline::new(
            config,
            Box::new(provider.clone()),
            create_pipeline_cancellation_token(),
        )
        .with_preview_sink(Box::new(sink.clone()))
        .with_prompt_handler(Box::new(prompt.clone()));
        pipeline.run().await;

        let output = sink.output.lock().unwrap().clone();
        PipelineResult {
            stats: pipeline.get_deletion_stats(),
            has_error: pipeline.has_error(),
            has_panic: pipeline.has_panic(),
            has_warning: pipeline.has_warning(),
            errors: pipeline.get_errors_and_consume().unwrap_or_default(),
            output,
            prompts: prompt.prompts.load(Ordering::SeqCst),
        }
    }
}
