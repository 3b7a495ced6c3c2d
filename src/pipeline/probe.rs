//! Media duration probing via the `ffprobe` CLI.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Upper bound on a single probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads container duration with `ffprobe`.
#[derive(Debug, Clone)]
pub struct DurationProbe {
    ffprobe_path: PathBuf,
}

impl DurationProbe {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Locate ffprobe on `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("ffprobe").ok().map(Self::new)
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe_path
    }

    /// Duration in seconds, or `None` if ffprobe fails or reports none.
    pub async fn duration_seconds(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(PROBE_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                tracing::debug!(path = %path.display(), status = %output.status, "ffprobe failed");
                return None;
            }
            Ok(Err(e)) => {
                tracing::debug!(path = %path.display(), "Failed to run ffprobe: {e}");
                return None;
            }
            Err(_) => {
                tracing::warn!(path = %path.display(), "ffprobe timed out");
                return None;
            }
        };

        parse_duration(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

fn parse_duration(stdout: &[u8]) -> Option<f64> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout).ok()?;
    parsed
        .format?
        .duration?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}
