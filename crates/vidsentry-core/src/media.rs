//! Media-domain enums: item status machine, failure reasons, verdicts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// MediaStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a media item.
///
/// ```text
/// queued ──► processing ──► safe | flagged | failed
///    └──────────────────────────────────────► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Queued,
    Processing,
    Safe,
    Flagged,
    Failed,
}

impl MediaStatus {
    pub const ALL: [MediaStatus; 5] = [
        MediaStatus::Queued,
        MediaStatus::Processing,
        MediaStatus::Safe,
        MediaStatus::Flagged,
        MediaStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Queued => "queued",
            MediaStatus::Processing => "processing",
            MediaStatus::Safe => "safe",
            MediaStatus::Flagged => "flagged",
            MediaStatus::Failed => "failed",
        }
    }

    /// `true` once no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MediaStatus::Safe | MediaStatus::Flagged | MediaStatus::Failed
        )
    }

    /// Whether `self -> next` is an edge of the status DAG.
    pub fn can_transition_to(&self, next: MediaStatus) -> bool {
        use MediaStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Failed)
                | (Processing, Safe)
                | (Processing, Flagged)
                | (Processing, Failed)
        )
    }

    /// Statuses from which `target` may be entered.
    pub fn predecessors(target: MediaStatus) -> Vec<MediaStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(target))
            .collect()
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MediaStatus::Queued),
            "processing" => Ok(MediaStatus::Processing),
            "safe" => Ok(MediaStatus::Safe),
            "flagged" => Ok(MediaStatus::Flagged),
            "failed" => Ok(MediaStatus::Failed),
            other => Err(format!("unknown media status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// FailureReason
// ---------------------------------------------------------------------------

/// Why an item ended in [`MediaStatus::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    /// Storage, analysis or classifier fault.
    Error,
    /// The run was cancelled because the item was deleted.
    Cancelled,
    /// The process stopped while the run was in flight.
    Interrupted,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Error => "error",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(FailureReason::Error),
            "cancelled" => Ok(FailureReason::Cancelled),
            "interrupted" => Ok(FailureReason::Interrupted),
            other => Err(format!("unknown failure reason: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Outcome class produced by a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    Safe,
    Flagged,
}

/// A classifier decision together with its confidence (0.0 - 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    pub confidence: f64,
}

impl Verdict {
    pub fn safe(confidence: f64) -> Self {
        Self {
            kind: VerdictKind::Safe,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn flagged(confidence: f64) -> Self {
        Self {
            kind: VerdictKind::Flagged,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Terminal status this verdict maps to.
    pub fn status(&self) -> MediaStatus {
        match self.kind {
            VerdictKind::Safe => MediaStatus::Safe,
            VerdictKind::Flagged => MediaStatus::Flagged,
        }
    }
}
