//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML and carries one
//! sub-config per concern. Every section defaults sensibly so an empty file
//! is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::events::DEFAULT_SUBSCRIBER_BUFFER;
use crate::Error;

/// Locations searched, in order, when no explicit config path is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./vidsentry.toml",
    "~/.config/vidsentry/config.toml",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub pipeline: PipelineConfig,
    pub events: EventsConfig,
    pub delivery: DeliveryConfig,
    pub auth: AuthConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load from `custom_path` if given, otherwise from the first existing
    /// entry of [`DEFAULT_CONFIG_PATHS`], otherwise defaults.
    ///
    /// An explicit path that cannot be read or parsed is an error; the
    /// default locations are only used when present.
    pub fn load_or_default(custom_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = custom_path {
            return Self::load(path);
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(candidate);
            let path = Path::new(expanded.as_ref());
            if path.exists() {
                tracing::info!("Loading config from {}", path.display());
                return Self::load(path);
            }
        }

        tracing::info!("No config file found; using defaults");
        Ok(Self::default())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.upload.max_size_bytes == 0 {
            warnings.push("upload.max_size_bytes is 0; every upload will be rejected".into());
        }
        if self.upload.allowed_types.is_empty() {
            warnings.push("upload.allowed_types is empty; every upload will be rejected".into());
        }
        for (i, entry) in self.upload.allowed_types.iter().enumerate() {
            if !entry.contains('/') {
                warnings.push(format!(
                    "upload.allowed_types[{i}] '{entry}' is not a media type (expected type/subtype)"
                ));
            }
        }

        if self.pipeline.tick_interval_ms == 0 {
            warnings.push("pipeline.tick_interval_ms is 0; analysis will not pace itself".into());
        }
        if self.pipeline.progress_step == 0 || self.pipeline.progress_step > 100 {
            warnings.push(format!(
                "pipeline.progress_step {} is outside 1-100; it will be clamped",
                self.pipeline.progress_step
            ));
        }
        if !(0.0..=1.0).contains(&self.pipeline.flag_probability) {
            warnings.push(format!(
                "pipeline.flag_probability {} is outside 0.0-1.0; it will be clamped",
                self.pipeline.flag_probability
            ));
        }

        if self.events.subscriber_buffer == 0 {
            warnings.push("events.subscriber_buffer is 0; a buffer of 1 will be used".into());
        }
        if self.events.heartbeat_secs == 0 {
            warnings.push("events.heartbeat_secs is 0; heartbeats are disabled".into());
        }

        if self.delivery.serve_flagged {
            warnings.push("delivery.serve_flagged is enabled; flagged items will be streamed".into());
        }

        let header = self.auth.owner_header.as_str();
        if header.is_empty()
            || !header
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            warnings.push(format!(
                "auth.owner_header '{header}' is not a valid header name; falling back to '{}'",
                AuthConfig::DEFAULT_OWNER_HEADER
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/vidsentry.db"),
        }
    }
}

/// Upload admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory receiving uploaded content.
    pub storage_dir: PathBuf,
    /// Largest accepted upload, in bytes.
    pub max_size_bytes: u64,
    /// Exact media types (`video/mp4`) or wildcards (`video/*`).
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./data/uploads"),
            max_size_bytes: 100 * 1024 * 1024,
            allowed_types: vec!["video/*".into()],
        }
    }
}

/// Analysis pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tick_interval_ms: u64,
    /// Percentage added per analysis tick.
    pub progress_step: u8,
    /// Share of items the mock classifier flags.
    pub flag_probability: f64,
    /// Probe media duration with `ffprobe` when it is installed.
    pub probe_duration: bool,
}

impl PipelineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            progress_step: 20,
            flag_probability: 0.3,
            probe_duration: true,
        }
    }
}

/// Notification feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub subscriber_buffer: usize,
    pub heartbeat_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            heartbeat_secs: 15,
        }
    }
}

/// Content delivery policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Stream items the classifier flagged.
    pub serve_flagged: bool,
}

/// Identity settings. Authentication itself happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Request header carrying the caller's identity.
    pub owner_header: String,
}

impl AuthConfig {
    pub const DEFAULT_OWNER_HEADER: &'static str = "x-owner-id";
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            owner_header: Self::DEFAULT_OWNER_HEADER.into(),
        }
    }
}
