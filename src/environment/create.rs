use log::{debug, error, info, warn};
use std::path::Path;

use super::{EnvError, EnvironmentManager, MountState, OperationGuard, OverlayEnvironment};
use crate::mount::{Attempt, FilesystemKind, MountStrategy, Outcome};
use crate::util::ensure_dir;

impl EnvironmentManager {
    /**
     * Creates an overlay environment over `base` in `working_dir`, mounts it
     * and makes sure the merged prefix is bootstrapped.
     *
     * A bootstrap failure leaves the overlay mounted so it can be inspected;
     * see [`create_disposable`] for callers that won't keep it.
     *
     * [`create_disposable`]: EnvironmentManager::create_disposable
     */
    pub fn create(
        &self,
        base: &Path,
        working_dir: &Path,
    ) -> Result<OverlayEnvironment, EnvError> {
        let mut env = OverlayEnvironment::resolve(base, working_dir)?;
        let _guard =
            OperationGuard::acquire(&self.settings.runtime_dir, &env.working_dir)?;

        if !env.base.is_dir() {
            return Err(EnvError::InvalidPath(format!(
                "Base prefix {} is not a directory",
                env.base.display()
            )));
        }

        if self.mount_table()?.is_mounted(&env.merged_dir) {
            return Err(EnvError::AlreadyMounted(env.merged_dir.clone()));
        }

        for dir in [&env.upper_dir, &env.work_dir, &env.merged_dir] {
            ensure_dir(dir).map_err(|e| EnvError::DirectoryPreparationFailed {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
        }

        env.filesystem =
            FilesystemKind::detect(self.executor.runner().as_ref(), &env.working_dir);
        let plan = MountStrategy::plan(&env.filesystem, self.settings.mount_fallback)?;

        let strategy = self.mount(&env, &plan)?;
        env.strategy = Some(strategy);
        env.mount_state = MountState::Mounted;
        info!(
            "Mounted {} over {} using {}",
            env.merged_dir.display(),
            env.base.display(),
            strategy
        );

        self.bootstrap(&env)?;
        Ok(env)
    }

    /// Like [`create`](Self::create), but an environment that mounted and
    /// then failed to bootstrap is deleted again before the error is returned.
    pub fn create_disposable(
        &self,
        base: &Path,
        working_dir: &Path,
    ) -> Result<OverlayEnvironment, EnvError> {
        match self.create(base, working_dir) {
            Err(EnvError::BootstrapFailed(reason)) => {
                let env = OverlayEnvironment::resolve(base, working_dir)?;
                info!("Removing {} after failed bootstrap", env.working_dir.display());
                if let Err(e) = self.delete(&env) {
                    error!("Failed to remove {}: {}", env.working_dir.display(), e);
                }
                Err(EnvError::BootstrapFailed(reason))
            }
            result => result,
        }
    }

    /// Tries each strategy in order until one leaves `merged` in the mount
    /// table.
    fn mount(
        &self,
        env: &OverlayEnvironment,
        plan: &[MountStrategy],
    ) -> Result<MountStrategy, EnvError> {
        let mut attempts: Vec<Attempt<MountStrategy>> = Vec::new();

        for &strategy in plan {
            let step = strategy.mount_step(
                &env.base,
                &env.upper_dir,
                &env.work_dir,
                &env.merged_dir,
            );
            let outcome = match self.executor.run(&step) {
                Ok(output) if output.success() => match self.mount_table() {
                    Ok(table) if table.is_mounted(&env.merged_dir) => Outcome::Succeeded,
                    Ok(_) => Outcome::Failed(
                        "mount reported success but the overlay is not in the mount table"
                            .to_string(),
                    ),
                    Err(e) => Outcome::Failed(format!(
                        "could not confirm the mount: {}",
                        e
                    )),
                },
                Ok(output) => Outcome::Failed(output.describe_failure()),
                Err(e) => Outcome::Failed(e.to_string()),
            };

            if outcome == Outcome::Succeeded {
                return Ok(strategy);
            }
            warn!("Mounting with {} {}", strategy, outcome);

            // A failed mount can still leave something behind. An unreadable
            // table counts as mounted so the unmount chain gets a say.
            let leftover = self
                .mount_table()
                .map_or(true, |table| table.is_mounted(&env.merged_dir));
            if leftover {
                debug!("Cleaning up partial mount at {}", env.merged_dir.display());
                if let Err(e) = self.unmount(&env.merged_dir) {
                    warn!("Cleanup after failed mount: {}", e);
                }
            }
            attempts.push(Attempt { strategy, outcome });
        }

        Err(EnvError::MountFailed(
            attempts
                .iter()
                .map(|a| match &a.outcome {
                    Outcome::Failed(reason) => format!("{}: {}", a.strategy, reason),
                    Outcome::Succeeded => a.strategy.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
        ))
    }
}
