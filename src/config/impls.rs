use super::structs::{CaptureMode, TuningProfile};

use serde::Deserialize;
use std::{
    fmt::{self, Display},
    path::PathBuf,
    str::FromStr,
};

use crate::util::expand_tilde_path;

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pty" => Ok(CaptureMode::Pty),
            "pipe" => Ok(CaptureMode::Pipe),
            _ => Err(format!("Invalid capture mode: {}", s)),
        }
    }
}

impl Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Pty => write!(f, "pty"),
            CaptureMode::Pipe => write!(f, "pipe"),
        }
    }
}

impl FromStr for TuningProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TuningProfile::None),
            "performance" => Ok(TuningProfile::Performance),
            _ => Err(format!("Invalid tuning profile: {}", s)),
        }
    }
}

impl Display for TuningProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuningProfile::None => write!(f, "none"),
            TuningProfile::Performance => write!(f, "performance"),
        }
    }
}

pub(crate) fn deserialize_level_filter<'de, D>(
    deserializer: D,
) -> Result<Option<log::LevelFilter>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map_or(Ok(None), |s| {
        log::LevelFilter::from_str(&s)
            .map(Some)
            .map_err(serde::de::Error::custom)
    })
}

/// Paths in config files may start with `~/`.
pub(crate) fn deserialize_optional_path<'de, D>(
    deserializer: D,
) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map_or(Ok(None), |s| {
        expand_tilde_path(&PathBuf::from(s))
            .map(Some)
            .map_err(serde::de::Error::custom)
    })
}
