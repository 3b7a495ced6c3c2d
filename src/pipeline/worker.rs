//! Per-item state machine: `queued -> processing -> safe | flagged | failed`.
//!
//! Every state change is written to the store before its event is
//! published. A run never propagates errors; each fault ends the item as
//! `failed` with reason `error`.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vidsentry_core::events::MediaEvent;
use vidsentry_core::{FailureReason, MediaItemId, MediaStatus, Result};
use vidsentry_db::pool::get_conn;
use vidsentry_db::queries::media_items;

use super::{Pipeline, ProgressReporter};

/// How a run ended, short of a fault.
#[derive(Debug)]
enum RunOutcome {
    Completed(MediaStatus),
    /// Record gone or no longer `queued` before the run started.
    Skipped,
    /// A verdict was reached but the record had already reached a terminal state.
    Superseded,
    Cancelled,
}

impl Pipeline {
    pub(super) async fn execute(&self, id: MediaItemId, token: CancellationToken) {
        match self.drive(id, &token).await {
            Ok(RunOutcome::Completed(status)) => {
                tracing::info!(item_id = %id, status = %status, "Pipeline run completed");
            }
            Ok(RunOutcome::Skipped) => {
                tracing::debug!(item_id = %id, "Item not queued at run start; skipped");
            }
            Ok(RunOutcome::Superseded) => {
                tracing::debug!(item_id = %id, "Item left processing before verdict was stored");
            }
            Ok(RunOutcome::Cancelled) if self.shutdown.is_cancelled() => {
                tracing::info!(item_id = %id, "Pipeline run stopped by shutdown; left for recovery");
            }
            Ok(RunOutcome::Cancelled) => self.fail(id, FailureReason::Cancelled, None),
            Err(e) => {
                tracing::error!(item_id = %id, error = %e, "Pipeline run failed");
                self.fail(id, FailureReason::Error, Some(&e.to_string()));
            }
        }
    }

    async fn drive(&self, id: MediaItemId, token: &CancellationToken) -> Result<RunOutcome> {
        if token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let started = {
            let conn = get_conn(&self.db)?;
            media_items::start_processing(&conn, id)?
        };
        let Some(item) = started else {
            return Ok(RunOutcome::Skipped);
        };
        self.event_bus.publish(MediaEvent::processing(id));
        tracing::info!(item_id = %id, file = %item.file_name, "Pipeline run started");

        let reporter = self.progress_reporter(id);
        let report = self.analysis.analyze(&item, &reporter, token).await?;
        if token.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        reporter.finish()?;

        let verdict = tokio::select! {
            _ = token.cancelled() => return Ok(RunOutcome::Cancelled),
            verdict = self.classifier.classify(&item) => verdict?,
        };

        let status = verdict.status();
        let stored = {
            let conn = get_conn(&self.db)?;
            media_items::complete_media_item(&conn, id, &verdict, report.duration_seconds)?
        };
        if !stored {
            // A delete removes the record before it cancels the run.
            let deleted = {
                let conn = get_conn(&self.db)?;
                media_items::get_media_item(&conn, id)?.is_none()
            };
            return Ok(if token.is_cancelled() || deleted {
                RunOutcome::Cancelled
            } else {
                RunOutcome::Superseded
            });
        }

        self.event_bus.publish(MediaEvent::completed(id, status));
        tracing::debug!(
            item_id = %id,
            confidence = verdict.confidence,
            duration_seconds = ?report.duration_seconds,
            "Verdict stored"
        );
        Ok(RunOutcome::Completed(status))
    }

    /// Reporter that persists each accepted value, then publishes it.
    fn progress_reporter(&self, id: MediaItemId) -> ProgressReporter {
        let db = self.db.clone();
        let event_bus = Arc::clone(&self.event_bus);
        ProgressReporter::new(move |progress| {
            let conn = get_conn(&db)?;
            if media_items::update_progress(&conn, id, progress)? {
                event_bus.publish(MediaEvent::progress(id, progress));
            }
            Ok(())
        })
    }

    /// Record a failure and publish it.
    ///
    /// A deleted record still gets its `failed` event so observers learn the
    /// run ended; an item that already reached a terminal state gets nothing.
    pub(super) fn fail(&self, id: MediaItemId, reason: FailureReason, error: Option<&str>) {
        let published = get_conn(&self.db).and_then(|conn| {
            if media_items::fail_media_item(&conn, id, reason, error)? {
                return Ok(true);
            }
            Ok(media_items::get_media_item(&conn, id)?.is_none())
        });

        match published {
            Ok(true) => {
                self.event_bus.publish(MediaEvent::failed(id, reason));
                tracing::info!(item_id = %id, reason = %reason, "Item marked failed");
            }
            Ok(false) => {
                tracing::debug!(item_id = %id, reason = %reason, "Item already terminal; failure ignored");
            }
            Err(e) => {
                tracing::error!(item_id = %id, error = %e, "Failed to record pipeline failure");
            }
        }
    }
}
