use log::{debug, info, trace, warn};

use super::{
    EnvError, EnvironmentManager, MERGED_DIR, OperationGuard, OverlayEnvironment,
    UPPER_DIR, WORK_DIR,
};
use crate::util::{
    check_disjoint, environment_lock_path, get_running_session_pgid, home_dir,
    normalize_path,
};

impl EnvironmentManager {
    /**
     * Unmounts and removes an overlay environment. Deleting an environment
     * whose working directory is already gone succeeds without doing
     * anything.
     */
    pub fn delete(&self, env: &OverlayEnvironment) -> Result<(), EnvError> {
        let guard =
            OperationGuard::acquire(&self.settings.runtime_dir, &env.working_dir)?;

        if let Some(pgid) =
            get_running_session_pgid(&self.settings.runtime_dir, &env.working_dir)
        {
            return Err(EnvError::SessionActive(pgid.as_raw()));
        }

        if !env.working_dir.exists() {
            debug!(
                "{} does not exist, nothing to delete",
                env.working_dir.display()
            );
            return Ok(());
        }

        check_removal_target(env)?;

        let teardown = self.teardown(&env.merged_dir, Some(&env.working_dir))?;
        for attempt in teardown.attempts.iter().filter(|a| !a.succeeded()) {
            warn!("{}: {}", attempt.strategy, attempt.outcome);
        }
        if teardown.still_mounted {
            return Err(EnvError::UnmountFailed {
                path: env.merged_dir.clone(),
                attempts: teardown.attempts,
            });
        }

        if let Some(Err(reason)) = teardown.removal {
            return Err(EnvError::RemovalFailed {
                path: env.working_dir.clone(),
                reason,
            });
        }
        if env.working_dir.exists() {
            return Err(EnvError::RemovalFailed {
                path: env.working_dir.clone(),
                reason: "directory still exists after removal".to_string(),
            });
        }

        let lock_file =
            environment_lock_path(&self.settings.runtime_dir, &env.working_dir);
        trace!("Cleaning up lock file {}", lock_file.display());
        std::fs::remove_file(&lock_file).ok();
        drop(guard);

        info!("Deleted {}", env.working_dir.display());
        Ok(())
    }
}

/**
 * Last line of defense before a recursive, elevated removal: the target has
 * to be exactly the overlay working directory we'd have created, with
 * nothing but our own layout in it.
 */
pub fn check_removal_target(env: &OverlayEnvironment) -> Result<(), EnvError> {
    let unsafe_target = |reason: String| EnvError::UnsafeRemovalTarget {
        path: env.working_dir.clone(),
        reason,
    };

    if !env.working_dir.is_absolute() || env.working_dir.parent().is_none() {
        return Err(unsafe_target("not an absolute, non-root path".to_string()));
    }

    let normalized =
        normalize_path(&env.working_dir).map_err(|e| unsafe_target(e.to_string()))?;
    if normalized != env.working_dir {
        return Err(unsafe_target(format!(
            "resolves to {}",
            normalized.display()
        )));
    }

    check_disjoint(&env.base, &env.working_dir)
        .map_err(|e| unsafe_target(e.to_string()))?;

    if let Ok(home) = home_dir() {
        if home.starts_with(&env.working_dir) {
            return Err(unsafe_target("contains the home directory".to_string()));
        }
    }

    let entries = std::fs::read_dir(&env.working_dir)
        .map_err(|e| unsafe_target(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| unsafe_target(e.to_string()))?;
        let name = entry.file_name();
        if ![UPPER_DIR, WORK_DIR, MERGED_DIR]
            .iter()
            .any(|known| name == *known)
        {
            return Err(unsafe_target(format!(
                "contains unexpected entry '{}'",
                name.to_string_lossy()
            )));
        }
    }

    Ok(())
}
