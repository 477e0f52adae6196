use anyhow::{Context, Result, anyhow};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::common::{environment_manager, follow, working_dir_for};
use crate::config::Config;
use crate::environment::{EnvironmentManager, OverlayEnvironment};
use crate::util::{expand_tilde_path, normalize_path, set_json_output};
use crate::worker::{LifecycleOp, spawn_lifecycle};

pub fn delete(
    config: &Config,
    base: Option<&Path>,
    exe: &Path,
    work_dir: Option<&Path>,
) -> Result<()> {
    let exe = normalize_path(&expand_tilde_path(exe)?)?;
    let working_dir = working_dir_for(&exe, work_dir)?;
    let manager = environment_manager(config);
    let base = resolve_base(&manager, config, base, &working_dir)?;
    delete_environment(manager, OverlayEnvironment::at(&base, &working_dir))
}

/**
 * The base only matters for the safety checks before removal. Without one
 * from the command line or config it is read back from the mount; an
 * overlay that is neither mounted nor present needs none.
 */
fn resolve_base(
    manager: &EnvironmentManager,
    config: &Config,
    base: Option<&Path>,
    working_dir: &Path,
) -> Result<PathBuf> {
    if let Some(base) = base.map(Path::to_path_buf).or_else(|| config.base.clone()) {
        return normalize_path(&expand_tilde_path(&base)?);
    }
    let layout = OverlayEnvironment::at(Path::new("/"), working_dir);
    if let Some(base) = manager.mounted_base(&layout.merged_dir)? {
        debug!("Base {} read from the mount table", base.display());
        return Ok(base);
    }
    if !working_dir.exists() {
        return Ok(PathBuf::from("/"));
    }
    Err(anyhow!(
        "Cannot tell which base prefix {} was created from, use --base",
        working_dir.display()
    ))
}

pub(super) fn delete_environment(
    manager: Arc<EnvironmentManager>,
    env: OverlayEnvironment,
) -> Result<()> {
    let working_dir = env.working_dir.clone();
    let worker = spawn_lifecycle(manager, LifecycleOp::Delete(env))
        .context("Failed to start worker")?;
    follow(worker)??;
    set_json_output(
        "deleted",
        serde_json::Value::String(working_dir.display().to_string()),
    );
    Ok(())
}
