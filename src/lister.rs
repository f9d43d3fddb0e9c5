use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use crate::provider::Provider;
use crate::registry;
use crate::types::Resource;
use crate::types::error::CloudrmError;

/// Enumerates the live resources of one type and normalizes them.
///
/// ## Pipeline role
///
/// ```text
/// ResourceLister → FilterSet::is_match → preview → ResourceDestroyer workers
/// ```
///
/// An enumeration failure is returned to the scheduler, which aborts the
/// run. A single record that cannot be normalized is skipped with a warning
/// instead: not destroying something is always safe.
pub struct ResourceLister {
    provider: Provider,
    has_warning: Arc<AtomicBool>,
}

impl ResourceLister {
    pub fn new(provider: Provider, has_warning: Arc<AtomicBool>) -> Self {
        Self {
            provider,
            has_warning,
        }
    }

    pub async fn list(&self, resource_type: &str) -> Result<Vec<Resource>> {
        debug!(resource_type = resource_type, "list resources has started.");

        let raw_resources = self
            .provider
            .list_resources(resource_type)
            .await
            .map_err(|e| into_enumeration_error(resource_type, e))?;

        let mut resources = Vec::with_capacity(raw_resources.len());
        for raw in &raw_resources {
            match registry::normalize(resource_type, raw) {
                Ok(resource) => resources.push(resource),
                Err(e) => {
                    self.has_warning.store(true, Ordering::SeqCst);
                    warn!(
                        resource_type = resource_type,
                        error = format!("{e:#}"),
                        "skipping a record that could not be normalized."
                    );
                }
            }
        }

        debug!(
            resource_type = resource_type,
            count = resources.len(),
            "list resources has been completed."
        );
        Ok(resources)
    }
}

/// Errors that already carry a classification are kept as they are.
fn into_enumeration_error(resource_type: &str, e: anyhow::Error) -> anyhow::Error {
    if e.downcast_ref::<CloudrmError>().is_some() {
        return e;
    }
    anyhow!(CloudrmError::Enumeration {
        resource_type: resource_type.to_string(),
        message: format!("{e:#}"),
    })
}
