use anyhow::Result;
use log::{error, info};
use std::path::Path;

use super::common::{environment_manager, executable_path};
use super::create::create_environment;
use super::delete::delete_environment;
use super::run::{check_report, run_target};
use crate::config::Config;

/**
 * Create, run, delete. The overlay is torn down however the run ends, and
 * an overlay that never finished bootstrapping is torn down by the create
 * step itself. When both the run and the teardown fail, the run's error is
 * returned and the teardown's is logged.
 */
pub fn session(
    config: &Config,
    base: Option<&Path>,
    loader: &[String],
    exe: &Path,
    work_dir: Option<&Path>,
) -> Result<()> {
    let exe = executable_path(exe)?;
    let env = create_environment(config, base, &exe, work_dir, true)?;

    let outcome = run_target(
        config,
        env.merged(),
        &exe,
        loader,
        Some(&env.working_dir),
    )
    .and_then(|report| check_report(&report));

    info!("Removing overlay {}", env.working_dir.display());
    let removed = delete_environment(environment_manager(config), env);
    match (outcome, removed) {
        (Err(run_error), Err(delete_error)) => {
            error!("Failed to remove overlay: {:#}", delete_error);
            Err(run_error)
        }
        (outcome, removed) => outcome.and(removed),
    }
}
