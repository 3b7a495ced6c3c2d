//! Moderation pipeline.
//!
//! [`Pipeline`] owns the registry of active runs. Each scheduled item gets
//! its own tokio task (see [`worker`]) holding a cancellation token derived
//! from the pipeline's shutdown token, so deleting an item stops its run and
//! shutting down stops them all.

pub mod analysis;
pub mod classifier;
pub mod probe;
mod worker;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vidsentry_core::events::{EventBus, MediaEvent};
use vidsentry_core::{FailureReason, MediaItemId, MediaStatus, Result};
use vidsentry_db::pool::DbPool;
use vidsentry_db::queries::media_items;

pub use analysis::{AnalysisReport, AnalysisStage, ProgressReporter, TimedAnalysis};
pub use classifier::{Classifier, MockClassifier};

/// Handle to an in-flight run.
struct ActiveRun {
    run_id: u64,
    token: CancellationToken,
}

/// Releases a run's registry slot when its task ends, even by panic.
struct RunSlot<'a> {
    pipeline: &'a Pipeline,
    id: MediaItemId,
    run_id: u64,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.pipeline
            .active
            .remove_if(&self.id, |_, run| run.run_id == self.run_id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Outcome of [`Pipeline::recover`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Items left `processing` by a previous process, now `failed`.
    pub interrupted: usize,
    /// Items left `queued`, scheduled again.
    pub rescheduled: usize,
}

/// Schedules and tracks pipeline runs.
pub struct Pipeline {
    db: DbPool,
    event_bus: Arc<EventBus>,
    classifier: Arc<dyn Classifier>,
    analysis: Arc<dyn AnalysisStage>,
    active: DashMap<MediaItemId, ActiveRun>,
    next_run_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(
        db: DbPool,
        event_bus: Arc<EventBus>,
        classifier: Arc<dyn Classifier>,
        analysis: Arc<dyn AnalysisStage>,
    ) -> Arc<Self> {
        tracing::debug!(
            classifier = classifier.name(),
            analysis = analysis.name(),
            "Pipeline created"
        );
        Arc::new(Self {
            db,
            event_bus,
            classifier,
            analysis,
            active: DashMap::new(),
            next_run_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Start a run for `id` in the background.
    ///
    /// Returns `false` without doing anything if a run for `id` is already
    /// active or the pipeline is shutting down.
    pub fn schedule(self: &Arc<Self>, id: MediaItemId) -> bool {
        if self.shutdown.is_cancelled() {
            tracing::debug!(item_id = %id, "Pipeline shutting down; run not scheduled");
            return false;
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();

        match self.active.entry(id) {
            Entry::Occupied(_) => {
                tracing::debug!(item_id = %id, "Run already active; schedule ignored");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(ActiveRun {
                    run_id,
                    token: token.clone(),
                });
            }
        }

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let _slot = RunSlot {
                pipeline: &pipeline,
                id,
                run_id,
            };
            let run = AssertUnwindSafe(pipeline.execute(id, token))
                .catch_unwind()
                .await;
            if let Err(payload) = run {
                let message = panic_message(payload.as_ref());
                tracing::error!(item_id = %id, panic = %message, "Pipeline run panicked");
                pipeline.fail(id, FailureReason::Error, Some("pipeline run panicked"));
            }
        });

        true
    }

    /// Cancel the active run for `id`, if any.
    pub fn cancel(&self, id: MediaItemId) -> bool {
        match self.active.get(&id) {
            Some(run) => {
                run.token.cancel();
                tracing::info!(item_id = %id, "Pipeline run cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, id: MediaItemId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Stop all runs without recording a terminal state, waiting up to
    /// `grace` for their tasks to exit.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + grace;
        while !self.active.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    remaining = self.active.len(),
                    "Pipeline runs still active after shutdown grace period"
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tracing::info!("Pipeline stopped");
    }

    /// Repair state left by a previous process: fail interrupted runs and
    /// schedule items that never started.
    pub fn recover(self: &Arc<Self>) -> Result<RecoveryReport> {
        let conn = vidsentry_db::pool::get_conn(&self.db)?;
        let interrupted = media_items::fail_orphaned_processing(&conn)?;
        let queued = media_items::list_by_status(&conn, MediaStatus::Queued)?;
        drop(conn);

        for id in &interrupted {
            tracing::warn!(item_id = %id, "Run interrupted by restart; marked failed");
            self.event_bus
                .publish(MediaEvent::failed(*id, FailureReason::Interrupted));
        }

        let mut rescheduled = 0;
        for item in &queued {
            if self.schedule(item.id) {
                rescheduled += 1;
            }
        }

        let report = RecoveryReport {
            interrupted: interrupted.len(),
            rescheduled,
        };
        if report != RecoveryReport::default() {
            tracing::info!(
                interrupted = report.interrupted,
                rescheduled = report.rescheduled,
                "Recovered pipeline state from previous session"
            );
        }
        Ok(report)
    }
}
