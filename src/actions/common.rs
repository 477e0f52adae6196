use anyhow::{Result, anyhow};
use log::info;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::environment::{EnvironmentManager, EnvironmentSettings};
use crate::mount::SystemMountTable;
use crate::outln;
use crate::privileged::{PrivilegedExecutor, SystemRunner};
use crate::util::{expand_tilde_path, normalize_path, push_json_output};
use crate::worker::{Event, Worker};

/// Overlay working directory used when `--work-dir` isn't given.
pub const DEFAULT_WORK_DIR: &str = ".wine_temp_noverlay";

pub fn ambient_env() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

pub fn environment_manager(config: &Config) -> Arc<EnvironmentManager> {
    let helper = Some(config.elevation_helper.clone()).filter(|h| !h.is_empty());
    Arc::new(EnvironmentManager::new(
        PrivilegedExecutor::new(helper, Arc::new(SystemRunner)),
        Arc::new(SystemMountTable),
        EnvironmentSettings {
            runtime: config.runtime.clone(),
            runtime_dir: config.runtime_dir.clone(),
            mount_fallback: config.mount_fallback,
            ambient: ambient_env(),
        },
    ))
}

pub fn executable_path(exe: &Path) -> Result<PathBuf> {
    let exe = normalize_path(&expand_tilde_path(exe)?)?;
    if !exe.is_file() {
        return Err(anyhow!("{} is not a file", exe.display()));
    }
    Ok(exe)
}

/// `--work-dir`, or `.wine_temp_noverlay` next to the executable.
pub fn working_dir_for(exe: &Path, work_dir: Option<&Path>) -> Result<PathBuf> {
    match work_dir {
        Some(dir) => normalize_path(&expand_tilde_path(dir)?),
        None => {
            let parent = exe
                .parent()
                .ok_or_else(|| anyhow!("{} has no parent directory", exe.display()))?;
            Ok(parent.join(DEFAULT_WORK_DIR))
        }
    }
}

pub fn base_for(config: &Config, base: Option<&Path>) -> Result<PathBuf> {
    match base.map(Path::to_path_buf).or_else(|| config.base.clone()) {
        Some(base) => expand_tilde_path(&base),
        None => Err(anyhow!(
            "No base prefix given, use --base or set `base` in a config file"
        )),
    }
}

/**
 * Follows a worker's events until it is done. Log events go to the log,
 * output lines to stdout (or the `output` array in JSON mode).
 */
pub fn follow<T>(worker: Worker<T>) -> Result<T> {
    for event in worker.events().iter() {
        match event {
            Event::Log(message) => info!("{}", message),
            Event::Output(lines) => {
                for line in lines {
                    outln!("{}", line);
                    push_json_output("output", serde_json::Value::String(line));
                }
            }
            Event::Done(_) => break,
        }
    }
    worker
        .join()
        .ok_or_else(|| anyhow!("worker thread panicked"))
}
