use serde::Serialize;
use std::path::{Path, PathBuf};

use super::EnvError;
use crate::mount::{FilesystemKind, MountStrategy};
use crate::util::{
    check_disjoint, check_path_for_mount_option_compatibility, normalize_path,
};

pub const UPPER_DIR: &str = "upper";
pub const WORK_DIR: &str = "work";
pub const MERGED_DIR: &str = "merged";

/// Written into the merged view once the prefix has been bootstrapped.
pub const READY_SENTINEL: &str = ".prefixbox-ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    Unmounted,
    Mounted,
}

/// A writable overlay of a base prefix. Only `merged_dir` is handed to
/// consumers; the rest is bookkeeping for the overlay itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayEnvironment {
    pub base: PathBuf,
    pub working_dir: PathBuf,
    pub upper_dir: PathBuf,
    pub work_dir: PathBuf,
    pub merged_dir: PathBuf,
    pub filesystem: FilesystemKind,
    pub strategy: Option<MountStrategy>,
    pub mount_state: MountState,
}

impl OverlayEnvironment {
    /// The layout under `working_dir`, with nothing checked or touched.
    pub fn at(base: &Path, working_dir: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
            upper_dir: working_dir.join(UPPER_DIR),
            work_dir: working_dir.join(WORK_DIR),
            merged_dir: working_dir.join(MERGED_DIR),
            filesystem: FilesystemKind::Unknown,
            strategy: None,
            mount_state: MountState::Unmounted,
        }
    }

    /**
     * Normalizes both paths and validates the pair before anything is created
     * or mounted. The working directory gets removed recursively on delete,
     * so it must be disjoint from the base, and every path ends up inside an
     * overlay option string.
     */
    pub fn resolve(base: &Path, working_dir: &Path) -> Result<Self, EnvError> {
        let base = normalize_path(base)
            .map_err(|e| EnvError::InvalidPath(e.to_string()))?;
        let working_dir = normalize_path(working_dir)
            .map_err(|e| EnvError::InvalidPath(e.to_string()))?;

        check_disjoint(&base, &working_dir)
            .map_err(|e| EnvError::InvalidPath(e.to_string()))?;

        let env = Self::at(&base, &working_dir);
        for path in [&env.base, &env.upper_dir, &env.work_dir, &env.merged_dir] {
            check_path_for_mount_option_compatibility(path)
                .map_err(|e| EnvError::InvalidPath(e.to_string()))?;
        }
        Ok(env)
    }

    pub fn merged(&self) -> &Path {
        &self.merged_dir
    }

    pub fn ready_sentinel(&self) -> PathBuf {
        self.merged_dir.join(READY_SENTINEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let env = OverlayEnvironment::at(
            Path::new("/prefixes/base"),
            Path::new("/games/app/.wine_temp_noverlay"),
        );
        assert_eq!(
            env.merged(),
            Path::new("/games/app/.wine_temp_noverlay/merged")
        );
        assert_eq!(
            env.upper_dir,
            PathBuf::from("/games/app/.wine_temp_noverlay/upper")
        );
        assert_eq!(
            env.ready_sentinel(),
            PathBuf::from("/games/app/.wine_temp_noverlay/merged/.prefixbox-ready")
        );
        assert_eq!(env.mount_state, MountState::Unmounted);
    }

    #[test]
    fn test_resolve_rejects_overlapping_paths() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let base = tmp.path().join("base");
        std::fs::create_dir(&base)?;

        assert!(matches!(
            OverlayEnvironment::resolve(&base, &base.join("ovl")),
            Err(EnvError::InvalidPath(_))
        ));
        assert!(matches!(
            OverlayEnvironment::resolve(&base, tmp.path()),
            Err(EnvError::InvalidPath(_))
        ));
        assert!(OverlayEnvironment::resolve(&base, &tmp.path().join("ovl")).is_ok());
        Ok(())
    }

    #[test]
    fn test_resolve_rejects_option_separators() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let base = tmp.path().join("base");
        std::fs::create_dir(&base)?;

        assert!(matches!(
            OverlayEnvironment::resolve(&base, &tmp.path().join("a,b")),
            Err(EnvError::InvalidPath(_))
        ));
        assert!(matches!(
            OverlayEnvironment::resolve(&base, &tmp.path().join("a:b")),
            Err(EnvError::InvalidPath(_))
        ));
        Ok(())
    }
}
