use super::impls::{deserialize_level_filter, deserialize_optional_path};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// How the supervised process's output is captured.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CaptureMode {
    /// Pseudo-terminal, so the program sees a terminal and line-buffers
    #[serde(rename = "pty")]
    Pty,
    /// Plain pipe shared by stdout and stderr
    #[serde(rename = "pipe")]
    Pipe,
}

/// Which launch environment tuning to apply on top of the baseline.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TuningProfile {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "performance")]
    Performance,
}

#[derive(Deserialize, Default, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(deserialize_with = "deserialize_level_filter", default)]
    pub log_level: Option<log::LevelFilter>,
    #[serde(deserialize_with = "deserialize_optional_path", default)]
    pub base: Option<PathBuf>,
    pub runtime: Option<String>,
    pub elevation_helper: Option<String>,
    pub capture: Option<CaptureMode>,
    pub tuning: Option<TuningProfile>,
    pub boosters: Option<bool>,
    pub mount_fallback: Option<bool>,
    pub grace_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub batch_interval_ms: Option<u64>,
    pub batch_bytes: Option<usize>,
    #[serde(deserialize_with = "deserialize_optional_path", default)]
    pub runtime_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: log::LevelFilter,
    /// Default base prefix for actions that take `--base`
    pub base: Option<PathBuf>,
    pub runtime: String,
    /// Empty means privileged steps run directly
    pub elevation_helper: String,
    pub capture: CaptureMode,
    pub tuning: TuningProfile,
    pub boosters: bool,
    pub mount_fallback: bool,
    pub grace_timeout: Duration,
    pub poll_interval: Duration,
    pub batch_interval: Duration,
    pub batch_bytes: usize,
    pub runtime_dir: PathBuf,
    /// Where each key's value came from
    pub sources: HashMap<String, String>,
}
