use crate::config::Config;
use crate::outln;
use crate::util::set_json_output;
use anyhow::Result;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;

pub const CONFIG_KEYS: &[&str] = &[
    "log_level",
    "base",
    "runtime",
    "elevation_helper",
    "capture",
    "tuning",
    "boosters",
    "mount_fallback",
    "grace_timeout_ms",
    "poll_interval_ms",
    "batch_interval_ms",
    "batch_bytes",
    "runtime_dir",
];

pub fn config_value(config: &Config, key: &str) -> Option<String> {
    let value = match key {
        "log_level" => config.log_level.as_str().to_lowercase(),
        "base" => config
            .base
            .as_ref()
            .map(|base| base.display().to_string())
            .unwrap_or_default(),
        "runtime" => config.runtime.clone(),
        "elevation_helper" => config.elevation_helper.clone(),
        "capture" => config.capture.to_string(),
        "tuning" => config.tuning.to_string(),
        "boosters" => config.boosters.to_string(),
        "mount_fallback" => config.mount_fallback.to_string(),
        "grace_timeout_ms" => config.grace_timeout.as_millis().to_string(),
        "poll_interval_ms" => config.poll_interval.as_millis().to_string(),
        "batch_interval_ms" => config.batch_interval.as_millis().to_string(),
        "batch_bytes" => config.batch_bytes.to_string(),
        "runtime_dir" => config.runtime_dir.display().to_string(),
        _ => return None,
    };
    Some(value)
}

pub fn config(config: &Config, keys: Option<Vec<String>>) -> Result<()> {
    let keys = keys
        .unwrap_or_else(|| CONFIG_KEYS.iter().map(|k| k.to_string()).collect());
    let multi_line = keys.len() > 1;

    for key in keys {
        let key = key.replace('-', "_");
        let Some(value) = config_value(config, &key) else {
            return Err(anyhow::anyhow!("Unknown key: {}", key));
        };
        print_config_line(&key, &value, multi_line, &config.sources);
    }

    Ok(())
}

fn print_config_line(
    key: &str,
    value: &str,
    multi_line: bool,
    sources: &HashMap<String, String>,
) {
    if let Some(source) = sources.get(key) {
        debug!("{}={} set from {}", key, value, source);
    }
    set_json_output(key, Value::String(value.to_string()));

    if multi_line {
        outln!("{}={}", key, value);
    } else {
        outln!("{}", value);
    }
}
