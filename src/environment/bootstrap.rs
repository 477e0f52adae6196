use log::{debug, info};
use std::path::Path;

use super::{EnvError, EnvironmentManager, OverlayEnvironment};
use crate::privileged::{CommandOutput, Invocation, Step};
use crate::util::ensure_dir;

pub(super) const CONFIG_KEY: &str = r"HKCU\Software\Wine\Wine\Config";
pub(super) const CONFIG_VERSION: &str = "10.0";

impl EnvironmentManager {
    /// The runtime invoked against `prefix` with the ambient environment plus
    /// the given overrides.
    pub(super) fn runtime_invocation(
        &self,
        prefix: &Path,
        args: &[&str],
        overrides: &[(&str, &str)],
    ) -> Invocation {
        let mut env = self.settings.ambient.clone();
        env.insert("WINEPREFIX".to_string(), prefix.display().to_string());
        for (key, value) in overrides {
            env.insert(key.to_string(), value.to_string());
        }
        Invocation::new(self.settings.runtime.as_str())
            .args(args.iter().copied())
            .env(env)
    }

    pub(super) fn run_runtime(
        &self,
        name: &str,
        invocation: Invocation,
    ) -> Result<CommandOutput, String> {
        match self.executor.run(&Step::user(name, invocation)) {
            Ok(output) if output.success() => Ok(output),
            Ok(output) => Err(format!("{} failed: {}", name, output.describe_failure())),
            Err(e) => Err(format!("{} could not be started: {}", name, e)),
        }
    }

    /**
     * Brings the merged prefix up to date with the runtime, once. The ready
     * sentinel lives inside the merged view, so a base that already carries
     * one skips this entirely.
     */
    pub fn bootstrap(&self, env: &OverlayEnvironment) -> Result<(), EnvError> {
        let sentinel = env.ready_sentinel();
        if sentinel.exists() {
            debug!("{} is already bootstrapped", env.merged_dir.display());
            return Ok(());
        }

        info!("Bootstrapping prefix in {}", env.merged_dir.display());
        ensure_dir(&env.merged_dir.join("drive_c").join("windows"))
            .map_err(|e| EnvError::BootstrapFailed(e.to_string()))?;

        let overrides = [("WINEDEBUG", "-all"), ("WINEUPDATE", "0")];
        let cwd = env.working_dir.parent().unwrap_or(&env.working_dir);

        self.run_runtime(
            "wineboot",
            self.runtime_invocation(&env.merged_dir, &["wineboot", "-u"], &overrides)
                .cwd(cwd),
        )
        .map_err(EnvError::BootstrapFailed)?;

        let has_version = self
            .run_runtime(
                "reg query",
                self.runtime_invocation(
                    &env.merged_dir,
                    &["reg", "query", CONFIG_KEY, "/v", "Version"],
                    &overrides,
                ),
            )
            .map(|output| output.stdout.contains("Version"))
            .unwrap_or(false);

        if has_version {
            debug!("Runtime version already set in {}", env.merged_dir.display());
        } else {
            self.run_runtime(
                "reg add",
                self.runtime_invocation(
                    &env.merged_dir,
                    &["reg", "add", CONFIG_KEY, "/v", "Version", "/d", CONFIG_VERSION, "/f"],
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
        Ok(())
    }
}
