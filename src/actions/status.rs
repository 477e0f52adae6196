use anyhow::{Context, Result};
use log::trace;
use std::path::Path;

use super::common::{environment_manager, working_dir_for};
use crate::config::Config;
use crate::environment::MountState;
use crate::outln;
use crate::util::{expand_tilde_path, normalize_path, set_json_output};

pub fn status(config: &Config, exe: &Path, work_dir: Option<&Path>) -> Result<()> {
    let exe = normalize_path(&expand_tilde_path(exe)?)?;
    let working_dir = working_dir_for(&exe, work_dir)?;
    trace!("Status of {}", working_dir.display());

    let status = environment_manager(config).inspect(&working_dir)?;
    set_json_output(
        "environment",
        serde_json::to_value(&status).context("Error serializing status")?,
    );

    outln!("Overlay:      {}", status.working_dir.display());
    if !status.exists {
        outln!("State:        absent");
        return Ok(());
    }
    match status.mount_state {
        MountState::Mounted => outln!(
            "State:        mounted ({})",
            status.mount_type.as_deref().unwrap_or("unknown type")
        ),
        MountState::Unmounted => outln!("State:        not mounted"),
    }
    if let Some(base) = &status.base {
        outln!("Base:         {}", base.display());
    }
    outln!("Prefix:       {}", status.merged_dir.display());
    outln!("Changed:      {} entries", status.upper_entries);
    match status.session_pgid {
        Some(pgid) => outln!("Session:      running (process group {})", pgid),
        None => outln!("Session:      none"),
    }
    if let Some(at) = &status.bootstrapped_at {
        outln!("Bootstrapped: {}", at);
    }
    Ok(())
}
