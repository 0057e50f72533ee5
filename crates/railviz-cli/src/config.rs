//! Client configuration – reads/writes `~/.railviz/config.toml`.
//!
//! Every field has a default, so a partial (or absent) file is fine:
//!
//! ```toml
//! stream_url = "ws://localhost:8000"
//! consistency = "strict"
//! required_categories = ["point", "detections"]
//!
//! [hazard]
//! near = 3.0
//! far = 10.0
//! indicator_height = 1.0
//! arrow_length = { mode = "clamped", min = 0.5, max = 1.0 }
//! ```

use railviz_middleware::{ConsistencyMode, SessionConfig, session::DEFAULT_STREAM_URL};
use railviz_perception::{HazardConfig, HazardScorer};
use railviz_types::{StreamCategory, StreamError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Snapshot consistency requested for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    #[default]
    Weak,
    Strict,
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Consistency::Weak => write!(f, "weak"),
            Consistency::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weak" => Ok(Consistency::Weak),
            "strict" => Ok(Consistency::Strict),
            other => Err(format!("unknown consistency mode '{other}'")),
        }
    }
}

/// Persisted client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the sensor stream.
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    #[serde(default)]
    pub consistency: Consistency,

    /// Categories a frame must carry before it is shown in strict mode.
    #[serde(default = "default_required_categories")]
    pub required_categories: Vec<StreamCategory>,

    #[serde(default)]
    pub hazard: HazardConfig,
}

fn default_stream_url() -> String {
    DEFAULT_STREAM_URL.to_string()
}
fn default_required_categories() -> Vec<StreamCategory> {
    StreamCategory::PAYLOADS.to_vec()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_url: default_stream_url(),
            consistency: Consistency::default(),
            required_categories: default_required_categories(),
            hazard: HazardConfig::default(),
        }
    }
}

impl Config {
    /// Session parameters derived from this config.
    ///
    /// `frame` is never a required category: it is the marker that closes a
    /// batch, not a payload.
    pub fn session_config(&self) -> SessionConfig {
        let consistency = match self.consistency {
            Consistency::Weak => ConsistencyMode::Weak,
            Consistency::Strict => ConsistencyMode::Strict {
                required: self
                    .required_categories
                    .iter()
                    .copied()
                    .filter(|c| *c != StreamCategory::Frame)
                    .collect(),
            },
        };
        SessionConfig::new(self.stream_url.clone()).with_consistency(consistency)
    }

    /// A scorer for the configured thresholds.
    pub fn scorer(&self) -> Result<HazardScorer, StreamError> {
        HazardScorer::new(self.hazard)
    }
}

/// Return the path to `~/.railviz/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".railviz").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `RAILVIZ_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `RAILVIZ_STREAM_URL` | `stream_url` |
/// | `RAILVIZ_NEAR` | `hazard.near` |
/// | `RAILVIZ_FAR` | `hazard.far` |
/// | `RAILVIZ_CONSISTENCY` | `consistency` |
///
/// Values that do not parse are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("RAILVIZ_STREAM_URL") {
        cfg.stream_url = v;
    }
    if let Some(v) = lookup("RAILVIZ_NEAR") {
        match parse_distance(&v) {
            Some(near) => cfg.hazard.near = near,
            None => warn!(value = %v, "ignoring invalid RAILVIZ_NEAR"),
        }
    }
    if let Some(v) = lookup("RAILVIZ_FAR") {
        match parse_distance(&v) {
            Some(far) => cfg.hazard.far = far,
            None => warn!(value = %v, "ignoring invalid RAILVIZ_FAR"),
        }
    }
    if let Some(v) = lookup("RAILVIZ_CONSISTENCY") {
        match v.parse::<Consistency>() {
            Ok(mode) => cfg.consistency = mode,
            Err(e) => warn!(error = %e, "ignoring invalid RAILVIZ_CONSISTENCY"),
        }
    }
}

fn parse_distance(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Save the config to disk, creating `~/.railviz/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
