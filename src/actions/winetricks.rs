use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::json;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use super::common::base_for;
use crate::config::Config;
use crate::outln;
use crate::util::{normalize_path, set_json_output};

/**
 * Starts winetricks against the base prefix and leaves it running. It gets
 * its own process group so it outlives Ctrl-C in this terminal.
 */
pub fn winetricks(config: &Config, base: Option<&Path>, args: &[String]) -> Result<()> {
    let base = normalize_path(&base_for(config, base)?)?;
    let program = which::which("winetricks").context("winetricks is not installed")?;
    debug!("Using {}", program.display());

    let child = Command::new(&program)
        .args(args)
        .env("WINEPREFIX", &base)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .with_context(|| format!("Failed to start {}", program.display()))?;

    info!("Started winetricks for {}", base.display());
    set_json_output("pid", json!(child.id()));
    outln!("{}", child.id());
    Ok(())
}
