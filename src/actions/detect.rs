use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::path::Path;

use crate::mount::{FilesystemKind, MountStrategy};
use crate::outln;
use crate::privileged::SystemRunner;
use crate::util::{expand_tilde_path, set_json_output};

/// Reports the filesystem under `path` and the mount strategy it gets.
pub fn detect(path: &Path) -> Result<()> {
    let path = expand_tilde_path(path)?;
    if !path.exists() {
        return Err(anyhow!("{} does not exist", path.display()));
    }

    let kind = FilesystemKind::detect(&SystemRunner, &path);
    let strategy = MountStrategy::select(&kind).ok();

    set_json_output("filesystem", Value::String(kind.to_string()));
    set_json_output("strategy", json!(strategy.map(|s| s.name())));

    outln!("Filesystem: {}", kind);
    match strategy {
        Some(strategy) => outln!("Strategy:   {}", strategy),
        None => outln!("Strategy:   unsupported"),
    }
    Ok(())
}
