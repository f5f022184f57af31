// src/reconcile.rs
// Render-job reconciliation: agents only submit jobs, this poll cycle
// observes their completion and promotes scene assets. One bad handle or
// provider never aborts a cycle.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::model::AssetStatus;
use crate::store::{RenderJobHandle, RenderJobOutcome, StoreError, WorkflowStore};
use crate::tools::{RenderJobPoller, RenderProgress};

/// Per-cycle accounting for host logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub polled: u32,
    pub completed: u32,
    pub failed: u32,
    pub pending: u32,
}

enum JobResolution {
    Completed,
    Failed,
    Pending,
}

pub struct Reconciler {
    store: Arc<dyn WorkflowStore>,
    pollers: HashMap<String, Arc<dyn RenderJobPoller>>,
    batch_size: u32,
}

impl Reconciler {
    pub fn new(store: Arc<dyn WorkflowStore>, batch_size: u32) -> Self {
        Self {
            store,
            pollers: HashMap::new(),
            batch_size,
        }
    }

    /// Register the polling half of a provider client, keyed by its own
    /// provider tag.
    pub fn register_poller(&mut self, poller: Arc<dyn RenderJobPoller>) {
        self.pollers.insert(poller.provider().to_string(), poller);
    }

    pub fn has_pollers(&self) -> bool {
        !self.pollers.is_empty()
    }

    /// One reconcile pass: poll up to `batch_size` open handles and settle
    /// the finished ones. Handles for unknown providers are skipped, and
    /// per-handle failures are logged and skipped so the rest of the batch
    /// still runs.
    pub async fn run_once(&self) -> Result<ReconcileReport, StoreError> {
        let handles = self.store.open_render_jobs(self.batch_size).await?;
        let mut report = ReconcileReport::default();

        if handles.is_empty() {
            debug!("No open render jobs");
            return Ok(report);
        }

        info!("🔍 Reconciling {} open render job(s)", handles.len());

        for handle in handles {
            let Some(poller) = self.pollers.get(&handle.provider) else {
                warn!(
                    "No poller registered for provider {} (job {})",
                    handle.provider, handle.job_id
                );
                continue;
            };

            report.polled += 1;
            match self.reconcile_job(poller.as_ref(), &handle).await {
                Ok(JobResolution::Completed) => report.completed += 1,
                Ok(JobResolution::Failed) => report.failed += 1,
                Ok(JobResolution::Pending) => report.pending += 1,
                Err(e) => {
                    warn!(
                        "Failed to reconcile job {} ({}): {}",
                        handle.job_id, handle.provider, e
                    );
                    // Continue with the rest of the batch.
                }
            }
        }

        info!(
            "✅ Reconcile cycle: {} polled, {} completed, {} failed, {} pending",
            report.polled, report.completed, report.failed, report.pending
        );
        Ok(report)
    }

    async fn reconcile_job(
        &self,
        poller: &dyn RenderJobPoller,
        handle: &RenderJobHandle,
    ) -> Result<JobResolution, String> {
        let status = poller
            .poll_status(&handle.job_id)
            .await
            .map_err(|e| format!("poll failed: {}", e))?;

        match status.state {
            RenderProgress::Queued | RenderProgress::Processing => {
                debug!(
                    "Render job {} for scene {} still {}",
                    handle.job_id,
                    handle.scene_id,
                    status.state.as_str()
                );
                Ok(JobResolution::Pending)
            }
            RenderProgress::Completed => {
                let scene = self
                    .store
                    .scene(handle.scene_id)
                    .await
                    .map_err(|e| format!("scene lookup failed: {}", e))?;
                // A clip that still needs fitting is only generated; it
                // becomes ready at assembly time.
                let next = if scene.visual.fitting_required() {
                    AssetStatus::Generated
                } else {
                    AssetStatus::Ready
                };
                self.store
                    .update_asset(handle.scene_id, next, status.download_url.as_deref())
                    .await
                    .map_err(|e| format!("asset update failed: {}", e))?;
                self.store
                    .resolve_render_job(handle.scene_id, RenderJobOutcome::Succeeded)
                    .await
                    .map_err(|e| format!("handle resolve failed: {}", e))?;

                info!(
                    "✅ Render job {} completed, scene {} asset now {}",
                    handle.job_id,
                    handle.scene_id,
                    next.as_str()
                );
                Ok(JobResolution::Completed)
            }
            RenderProgress::Failed => {
                // The asset stays pending_generation for manual repair or a
                // requeue; only the handle is settled.
                self.store
                    .resolve_render_job(handle.scene_id, RenderJobOutcome::Failed)
                    .await
                    .map_err(|e| format!("handle resolve failed: {}", e))?;

                warn!(
                    "❌ Render job {} failed for scene {}: {}",
                    handle.job_id,
                    handle.scene_id,
                    status.error.as_deref().unwrap_or("no error reported")
                );
                Ok(JobResolution::Failed)
            }
        }
    }
}
