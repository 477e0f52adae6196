use log::{debug, trace, warn};
use std::path::Path;

use super::{EnvError, EnvironmentManager};
use crate::mount::{Attempt, Outcome, UnmountStrategy};
use crate::privileged::{Invocation, Step};
use crate::util::shell_quote_path;

/// What a teardown did: every unmount strategy tried and, if removal was
/// requested, how it went.
pub(super) struct Teardown {
    pub attempts: Vec<Attempt<UnmountStrategy>>,
    pub still_mounted: bool,
    pub removal: Option<Result<(), String>>,
}

pub(super) fn removal_invocation(target: &Path) -> Invocation {
    Invocation::new("rm")
        .args(["-rf", "--one-file-system", "--"])
        .arg(target)
}

impl EnvironmentManager {
    /// Takes the overlay at `merged` down, trying each unmount strategy in
    /// turn.
    pub fn unmount(
        &self,
        merged: &Path,
    ) -> Result<Vec<Attempt<UnmountStrategy>>, EnvError> {
        let teardown = self.teardown(merged, None)?;
        if teardown.still_mounted {
            return Err(EnvError::UnmountFailed {
                path: merged.to_path_buf(),
                attempts: teardown.attempts,
            });
        }
        Ok(teardown.attempts)
    }

    /**
     * Runs the unmount chain and optionally removes `remove` afterwards.
     *
     * `fusermount -u` needs no elevation and goes first on its own. Whatever
     * is left (the privileged unmounts and the removal) is batched into one
     * elevated script so the user sees at most one authentication prompt.
     * Each unmount in the script only runs while `merged` is still a mount
     * point. The removal only runs once `merged` is no longer a mount point,
     * and `--one-file-system` keeps it out of any other mount below `target`.
     */
    pub(super) fn teardown(
        &self,
        merged: &Path,
        remove: Option<&Path>,
    ) -> Result<Teardown, EnvError> {
        let mut attempts = Vec::new();
        let mut mounted = self.mount_table()?.is_mounted(merged);

        if mounted {
            let fuse = UnmountStrategy::Fuse;
            let result = self.executor.run(&fuse.step(merged));
            mounted = self.mount_table()?.is_mounted(merged);
            let outcome = match result {
                _ if !mounted => Outcome::Succeeded,
                Ok(output) if !output.success() => {
                    Outcome::Failed(output.describe_failure())
                }
                Ok(_) => Outcome::Failed("still mounted".to_string()),
                Err(e) => Outcome::Failed(e.to_string()),
            };
            debug!("{} on {}: {}", fuse, merged.display(), outcome);
            attempts.push(Attempt {
                strategy: fuse,
                outcome,
            });
        } else {
            trace!("{} is not mounted", merged.display());
        }

        let mut script: Vec<String> = Vec::new();
        if mounted {
            script.extend(
                UnmountStrategy::CHAIN
                    .into_iter()
                    .filter(|s| *s != UnmountStrategy::Fuse)
                    .map(|s| s.script_line(merged)),
            );
        }

        let removal = match (remove, script.is_empty()) {
            (None, true) => None,
            (None, false) => {
                match self
                    .executor
                    .run_elevated_script("unmount", &script.join("\n"))
                {
                    Ok(output) => attempts
                        .extend(UnmountStrategy::parse_script_report(&output.stdout)),
                    Err(e) => warn!("Could not run the unmount script: {}", e),
                }
                None
            }
            (Some(target), true) => Some(
                match self.executor.run(&Step::elevated(
                    "remove",
                    removal_invocation(target),
                )) {
                    Ok(output) if output.success() => Ok(()),
                    Ok(output) => Err(output.describe_failure()),
                    Err(e) => Err(e.to_string()),
                },
            ),
            (Some(target), false) => {
                script.push(format!(
                    "if ! mountpoint -q {}; then rm -rf --one-file-system -- {}; fi",
                    shell_quote_path(merged),
                    shell_quote_path(target)
                ));
                Some(
                    match self
                        .executor
                        .run_elevated_script("unmount and remove", &script.join("\n"))
                    {
                        Ok(output) => {
                            attempts.extend(UnmountStrategy::parse_script_report(
                                &output.stdout,
                            ));
                            if output.success() {
                                Ok(())
                            } else {
                                Err(output.describe_failure())
                            }
                        }
                        Err(e) => Err(e.to_string()),
                    },
                )
            }
        };

        let still_mounted = self.mount_table()?.is_mounted(merged);
        for attempt in attempts.iter().filter(|a| !a.succeeded()) {
            debug!("{} on {}: {}", attempt.strategy, merged.display(), attempt.outcome);
        }

        Ok(Teardown {
            attempts,
            still_mounted,
            removal,
        })
    }
}
