use log::{debug, info};
use std::path::{Path, PathBuf};

use super::bootstrap::{CONFIG_KEY, CONFIG_VERSION};
use super::{EnvError, EnvironmentManager, READY_SENTINEL};
use crate::util::{ensure_dir, normalize_path};

/// Windows version a fresh base reports to applications.
const WINDOWS_VERSION: &str = "win10";
const WINDOWS_VERSION_KEY: &str = r"HKCU\Software\Wine";

impl EnvironmentManager {
    /**
     * Initializes a new base prefix at `path`: a full 64-bit `wineboot -i`
     * followed by the registry defaults every overlay would otherwise set
     * up on its own. The ready sentinel is written into the base, so overlays
     * of it skip their bootstrap.
     */
    pub fn init_base(&self, path: &Path) -> Result<PathBuf, EnvError> {
        let path =
            normalize_path(path).map_err(|e| EnvError::InvalidPath(e.to_string()))?;
        let sentinel = path.join(READY_SENTINEL);
        if sentinel.exists() {
            debug!("{} is already initialized", path.display());
            return Ok(path);
        }

        ensure_dir(&path).map_err(|e| EnvError::DirectoryPreparationFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        info!("Initializing base prefix in {}", path.display());
        let overrides = [("WINEARCH", "win64"), ("WINEDEBUG", "-all")];

        self.run_runtime(
            "wineboot",
            self.runtime_invocation(&path, &["wineboot", "-i"], &overrides),
        )
        .map_err(EnvError::BootstrapFailed)?;

        for (key, value, data) in [
            (WINDOWS_VERSION_KEY, "Version", WINDOWS_VERSION),
            (CONFIG_KEY, "Version", CONFIG_VERSION),
        ] {
            self.run_runtime(
                "reg add",
                self.runtime_invocation(
                    &path,
                    &["reg", "add", key, "/v", value, "/d", data, "/f"],
                    &overrides,
                ),
            )
            .map_err(EnvError::BootstrapFailed)?;
        }

        std::fs::write(&sentinel, "").map_err(|e| {
            EnvError::BootstrapFailed(format!(
                "Failed to write {}: {}",
                sentinel.display(),
                e
            ))
        })?;
        Ok(path)
    }
}
