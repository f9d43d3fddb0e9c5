//! Worker that destroys resources of a single type.
//!
//! The scheduler spawns `worker_size` destroyers that share one bounded
//! MPMC queue. Each destroyer handles one resource at a time, so the pool
//! size is the upper bound on concurrent destroy calls. A failed destroy is
//! logged and counted, and the worker moves on to the next resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_channel::Receiver;
use tracing::{debug, info, warn};

use crate::provider::Provider;
use crate::types::token::PipelineCancellationToken;
use crate::types::{DeletionStatsReport, Resource};

pub struct ResourceDestroyer {
    worker_index: u16,
    provider: Provider,
    receiver: Receiver<Resource>,
    cancellation_token: PipelineCancellationToken,
    has_warning: Arc<AtomicBool>,
    deletion_stats_report: Arc<DeletionStatsReport>,
}

impl ResourceDestroyer {
    pub fn new(
        worker_index: u16,
        provider: Provider,
        receiver: Receiver<Resource>,
        cancellation_token: PipelineCancellationToken,
        has_warning: Arc<AtomicBool>,
        deletion_stats_report: Arc<DeletionStatsReport>,
    ) -> Self {
        Self {
            worker_index,
            provider,
            receiver,
            cancellation_token,
            has_warning,
            deletion_stats_report,
        }
    }

    /// Drain the queue until it is closed and empty, or the run is cancelled.
    pub async fn destroy(&self) -> Result<()> {
        debug!(worker_index = self.worker_index, "destroy worker started.");

        loop {
            tokio::select! {
                recv_result = self.receiver.recv() => {
                    match recv_result {
                        Ok(resource) => {
                            if self.cancellation_token.is_cancelled() {
                                info!(worker_index = self.worker_index, "destroy worker has been cancelled.");
                                return Ok(());
                            }
                            self.destroy_resource(&resource).await;
                        }
                        Err(_) => {
                            // Closed and drained.
                            debug!(worker_index = self.worker_index, "destroy worker has been completed.");
                            return Ok(());
                        }
                    }
                },
                _ = self.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "destroy worker has been cancelled.");
                    return Ok(());
                }
            }
        }
    }

    async fn destroy_resource(&self, resource: &Resource) {
        let result = self
            .provider
            .destroy(&resource.resource_type, &resource.id, &resource.attributes)
            .await;

        match result {
            Ok(()) => {
                self.deletion_stats_report.increment_deleted();
                info!(
                    worker_index = self.worker_index,
                    resource_type = %resource.resource_type,
                    id = %resource.id,
                    "deleted."
                );
            }
            Err(e) => {
                self.deletion_stats_report.increment_failed();
                self.has_warning.store(true, Ordering::SeqCst);
                warn!(
                    worker_index = self.worker_index,
                    resource_type = %resource.resource_type,
                    id = %resource.id,
                    error = format!("{e:#}"),
                    "failed to delete resource."
                );
            }
        }
    }
}
