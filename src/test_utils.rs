//! Shared test utilities for the cloudrm library crate.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::preview::PreviewSink;
use crate::provider::ProviderTrait;
use crate::registry;
use crate::safety::PromptHandler;
use crate::types::RawResource;

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// In-memory provider that records every call.
///
/// Records are keyed by type and shaped like the AWS API output, so they go
/// through the real registry normalizers.
#[derive(Clone, Default)]
pub(crate) struct MockProvider {
    records: BTreeMap<String, Vec<RawResource>>,
    failing_ids: HashSet<String>,
    failing_list_types: HashSet<String>,
    panicking_ids: HashSet<String>,
    pub(crate) list_calls: Arc<Mutex<Vec<String>>>,
    pub(crate) destroy_calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_record(mut self, resource_type: &str, raw: RawResource) -> Self {
        self.records
            .entry(resource_type.to_string())
            .or_default()
            .push(raw);
        self
    }

    pub(crate) fn failing_destroy(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    pub(crate) fn panicking_destroy(mut self, id: &str) -> Self {
        self.panicking_ids.insert(id.to_string());
        self
    }

    pub(crate) fn failing_list(mut self, resource_type: &str) -> Self {
        self.failing_list_types.insert(resource_type.to_string());
        self
    }

    pub(crate) fn listed_types(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    pub(crate) fn destroyed(&self) -> Vec<(String, String)> {
        self.destroy_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderTrait for MockProvider {
    fn is_supported(&self, resource_type: &str) -> bool {
        registry::is_supported(resource_type)
    }

    async fn list_resources(&self, resource_type: &str) -> Result<Vec<RawResource>> {
        self.list_calls
            .lock()
            .unwrap()
            .push(resource_type.to_string());
        if self.failing_list_types.contains(resource_type) {
            return Err(anyhow!("AccessDenied: not authorized"));
        }
        Ok(self.records.get(resource_type).cloned().unwrap_or_default())
    }

    async fn destroy(
        &self,
        resource_type: &str,
        id: &str,
        _attributes: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self.panicking_ids.contains(id) {
            panic!("destroy of {id} panicked");
        }
        self.destroy_calls
            .lock()
            .unwrap()
            .push((resource_type.to_string(), id.to_string()));
        if self.failing_ids.contains(id) {
            return Err(anyhow!("DependencyViolation: {id} has dependencies"));
        }
        Ok(())
    }
}

/// Preview sink that keeps everything written to it.
#[derive(Clone, Default)]
pub(crate) struct CapturingPreviewSink {
    pub(crate) output: Arc<Mutex<String>>,
}

impl CapturingPreviewSink {
    pub(crate) fn text(&self) -> String {
        self.output.lock().unwrap().clone()
    }
}

impl PreviewSink for CapturingPreviewSink {
    fn write(&self, text: &str) -> Result<()> {
        self.output.lock().unwrap().push_str(text);
        Ok(())
    }
}

/// Interactive prompt handler with a fixed answer that counts prompts.
#[derive(Clone)]
pub(crate) struct FixedPromptHandler {
    pub(crate) response: String,
    pub(crate) prompts: Arc<Mutex<usize>>,
}

impl FixedPromptHandler {
    pub(crate) fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            prompts: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn prompt_count(&self) -> usize {
        *self.prompts.lock().unwrap()
    }
}

impl PromptHandler for FixedPromptHandler {
    fn read_confirmation(&self, _resource_types: &[&str]) -> Result<String> {
        *self.prompts.lock().unwrap() += 1;
        Ok(self.response.clone())
    }

    fn is_interactive(&self) -> bool {
        true
    }
}
