use anyhow::{Context, Result, anyhow};
use serde_json::json;
use std::path::Path;

use super::common::{base_for, environment_manager, executable_path, follow, working_dir_for};
use crate::config::Config;
use crate::environment::OverlayEnvironment;
use crate::outln;
use crate::util::set_json_output;
use crate::worker::{LifecycleOp, LifecycleOutcome, spawn_lifecycle};

pub fn create(
    config: &Config,
    base: Option<&Path>,
    exe: &Path,
    work_dir: Option<&Path>,
) -> Result<()> {
    let env = create_environment(config, base, exe, work_dir, false)?;
    outln!("{}", env.merged_dir.display());
    Ok(())
}

/// Creates the overlay for `exe` on a worker thread and reports it. A
/// `disposable` overlay doesn't outlive a failed bootstrap.
pub(super) fn create_environment(
    config: &Config,
    base: Option<&Path>,
    exe: &Path,
    work_dir: Option<&Path>,
    disposable: bool,
) -> Result<OverlayEnvironment> {
    let base = base_for(config, base)?;
    let exe = executable_path(exe)?;
    let working_dir = working_dir_for(&exe, work_dir)?;

    let worker = spawn_lifecycle(
        environment_manager(config),
        LifecycleOp::Create {
            base,
            working_dir,
            disposable,
        },
    )
    .context("Failed to start worker")?;

    match follow(worker)?? {
        LifecycleOutcome::Created(env) => {
            set_json_output(
                "environment",
                json!({
                    "base": env.base,
                    "working_dir": env.working_dir,
                    "merged_dir": env.merged_dir,
                    "filesystem": env.filesystem,
                    "strategy": env.strategy.map(|s| s.name()),
                }),
            );
            Ok(env)
        }
        LifecycleOutcome::Deleted => Err(anyhow!("create worker reported a delete")),
    }
}
