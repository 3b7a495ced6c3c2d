//! Content classifier interface and the shipped mock implementation.

use async_trait::async_trait;
use rand::Rng;
use vidsentry_core::{Result, Verdict};
use vidsentry_db::models::MediaItem;

/// Confidence reported by [`MockClassifier`] for either verdict.
const MOCK_CONFIDENCE: f64 = 0.9;

/// Decides whether an analysed item is safe to deliver.
///
/// Invoked exactly once per pipeline run, after analysis reached 100%.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    async fn classify(&self, item: &MediaItem) -> Result<Verdict>;
}

/// Flags a configurable share of items at random.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    flag_probability: f64,
}

impl MockClassifier {
    pub fn new(flag_probability: f64) -> Self {
        let flag_probability = if flag_probability.is_nan() {
            0.0
        } else {
            flag_probability.clamp(0.0, 1.0)
        };
        Self { flag_probability }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new(0.3)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(&self, item: &MediaItem) -> Result<Verdict> {
        let flagged = rand::thread_rng().gen_bool(self.flag_probability);
        let verdict = if flagged {
            Verdict::flagged(MOCK_CONFIDENCE)
        } else {
            Verdict::safe(MOCK_CONFIDENCE)
        };
        tracing::debug!(item_id = %item.id, verdict = ?verdict.kind, "Mock classification");
        Ok(verdict)
    }
}
