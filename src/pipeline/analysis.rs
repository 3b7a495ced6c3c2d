//! Analysis stage: the part of a run that reports progress before the
//! classifier is consulted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vidsentry_core::config::PipelineConfig;
use vidsentry_core::Result;
use vidsentry_db::models::MediaItem;

use super::probe::DurationProbe;

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Forwards progress to a sink, accepting only strictly increasing values.
///
/// Values are capped at 100. Starts at 0, so the first accepted value is 1
/// or higher.
pub struct ProgressReporter {
    last: AtomicU8,
    sink: Box<dyn Fn(u8) -> Result<()> + Send + Sync>,
}

impl ProgressReporter {
    pub fn new(sink: impl Fn(u8) -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            last: AtomicU8::new(0),
            sink: Box::new(sink),
        }
    }

    /// Reporter that only tracks the high-water mark.
    pub fn noop() -> Self {
        Self::new(|_| Ok(()))
    }

    /// Report a new value. Returns `false` if it was not above the last one.
    pub fn report(&self, progress: u8) -> Result<bool> {
        let progress = progress.min(100);
        let previous = self.last.fetch_max(progress, Ordering::SeqCst);
        if progress <= previous {
            return Ok(false);
        }
        (self.sink)(progress)?;
        Ok(true)
    }

    /// Highest value accepted so far.
    pub fn current(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }

    /// Report 100 unless it was already reached.
    pub fn finish(&self) -> Result<bool> {
        self.report(100)
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("last", &self.current())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AnalysisStage
// ---------------------------------------------------------------------------

/// What an analysis learned about the item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    pub duration_seconds: Option<f64>,
}

/// Work performed on an item while it is `processing`.
///
/// Implementations report progress through `progress` and should stop at
/// the next tick once `cancel` fires.
#[async_trait]
pub trait AnalysisStage: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        item: &MediaItem,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport>;
}

/// Advances progress by a fixed step on a timer, probing the duration with
/// ffprobe when available.
#[derive(Debug, Clone)]
pub struct TimedAnalysis {
    interval: Duration,
    step: u8,
    probe: Option<DurationProbe>,
}

impl TimedAnalysis {
    pub fn new(interval: Duration, step: u8) -> Self {
        Self {
            interval,
            step: step.clamp(1, 100),
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: Option<DurationProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let probe = if config.probe_duration {
            let probe = DurationProbe::from_path();
            if probe.is_none() {
                tracing::info!("ffprobe not found; media durations will not be recorded");
            }
            probe
        } else {
            None
        };
        Self::new(config.tick_interval(), config.progress_step).with_probe(probe)
    }
}

#[async_trait]
impl AnalysisStage for TimedAnalysis {
    fn name(&self) -> &str {
        "timed"
    }

    async fn analyze(
        &self,
        item: &MediaItem,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport> {
        let mut report = AnalysisReport::default();
        if let Some(probe) = &self.probe {
            report.duration_seconds = probe
                .duration_seconds(std::path::Path::new(&item.file_path))
                .await;
        }

        let mut value = progress.current();
        while value < 100 {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(report),
                _ = tokio::time::sleep(self.interval) => {}
            }
            value = value.saturating_add(self.step).min(100);
            progress.report(value)?;
        }

        Ok(report)
    }
}
