mod base_init;
mod bootstrap;
mod create;
mod delete;
mod environment_struct;
mod errors;
mod guard;
mod inspect;
mod unmount;

#[cfg(test)]
pub(crate) mod test_support;

pub use environment_struct::*;
pub use errors::*;
pub use guard::*;
pub use inspect::*;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::mount::{MountTable, MountTableSource};
use crate::privileged::PrivilegedExecutor;

/// Knobs of the environment manager that come from configuration.
#[derive(Debug, Clone)]
pub struct EnvironmentSettings {
    /// Compatibility runtime, `wine` unless configured otherwise
    pub runtime: String,
    /// Lock and pid files live here
    pub runtime_dir: PathBuf,
    /// Try the other mount technique when the selected one fails
    pub mount_fallback: bool,
    /// Environment that runtime helpers (wineboot, reg) inherit
    pub ambient: BTreeMap<String, String>,
}

/// Creates and destroys overlay environments on top of base prefixes.
pub struct EnvironmentManager {
    executor: PrivilegedExecutor,
    mounts: Arc<dyn MountTableSource>,
    settings: EnvironmentSettings,
}

impl EnvironmentManager {
    pub fn new(
        executor: PrivilegedExecutor,
        mounts: Arc<dyn MountTableSource>,
        settings: EnvironmentSettings,
    ) -> Self {
        Self {
            executor,
            mounts,
            settings,
        }
    }

    fn mount_table(&self) -> Result<MountTable, EnvError> {
        self.mounts
            .load()
            .map_err(|e| EnvError::RuntimeState(e.to_string()))
    }
}
