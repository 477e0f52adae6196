use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{EnvError, EnvironmentManager, MountState, OverlayEnvironment};
use crate::util::get_running_session_pgid;

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub working_dir: PathBuf,
    pub merged_dir: PathBuf,
    pub exists: bool,
    pub mount_state: MountState,
    /// Filesystem type reported by the mount table, e.g. `fuse.fuse-overlayfs`
    pub mount_type: Option<String>,
    /// Lower layer according to the mount options
    pub base: Option<PathBuf>,
    /// Files and directories written into the upper layer
    pub upper_entries: usize,
    pub session_pgid: Option<i32>,
    pub bootstrapped_at: Option<String>,
}

impl EnvironmentManager {
    /// Base prefix of the overlay mounted at `merged`, read back from its
    /// `lowerdir` option.
    pub fn mounted_base(&self, merged: &Path) -> Result<Option<PathBuf>, EnvError> {
        Ok(self
            .mount_table()?
            .find(merged)
            .and_then(|entry| entry.option("lowerdir").map(PathBuf::from)))
    }

    pub fn inspect(&self, working_dir: &Path) -> Result<EnvironmentStatus, EnvError> {
        let layout = OverlayEnvironment::at(Path::new("/"), working_dir);
        let table = self.mount_table()?;
        let entry = table.find(&layout.merged_dir);

        let upper_entries = if layout.upper_dir.is_dir() {
            WalkDir::new(&layout.upper_dir)
                .min_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .count()
        } else {
            0
        };

        let bootstrapped_at = std::fs::metadata(layout.ready_sentinel())
            .and_then(|m| m.modified())
            .ok()
            .map(|time| DateTime::<Local>::from(time).to_rfc3339());

        Ok(EnvironmentStatus {
            exists: layout.working_dir.exists(),
            mount_state: if entry.is_some() {
                MountState::Mounted
            } else {
                MountState::Unmounted
            },
            mount_type: entry.map(|e| e.fs_type.clone()),
            base: entry.and_then(|e| e.option("lowerdir").map(PathBuf::from)),
            upper_entries,
            session_pgid: get_running_session_pgid(
                &self.settings.runtime_dir,
                working_dir,
            )
            .map(|pgid| pgid.as_raw()),
            bootstrapped_at,
            merged_dir: layout.merged_dir,
            working_dir: layout.working_dir,
        })
    }
}
