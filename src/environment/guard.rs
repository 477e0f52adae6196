use log::trace;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::EnvError;
use crate::util::{Lock, ensure_dir};

static BUSY: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

/**
 * Exclusive right to create or delete one overlay environment.
 *
 * Two layers: a set of working directories with an operation in flight in
 * this process, and a `flock` lock file in the runtime directory that covers
 * other processes. Both are released on drop.
 */
pub struct OperationGuard {
    working_dir: PathBuf,
    _lock: Lock,
}

impl OperationGuard {
    pub fn acquire(
        runtime_dir: &Path,
        working_dir: &Path,
    ) -> Result<OperationGuard, EnvError> {
        if !BUSY
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(working_dir.to_path_buf())
        {
            trace!("{} is busy in this process", working_dir.display());
            return Err(EnvError::Busy(working_dir.to_path_buf()));
        }

        let release = || {
            BUSY.lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(working_dir);
        };

        if let Err(e) = ensure_dir(runtime_dir) {
            release();
            return Err(EnvError::RuntimeState(e.to_string()));
        }

        match Lock::try_environment(runtime_dir, working_dir) {
            Ok(Some(lock)) => Ok(OperationGuard {
                working_dir: working_dir.to_path_buf(),
                _lock: lock,
            }),
            Ok(None) => {
                release();
                Err(EnvError::Busy(working_dir.to_path_buf()))
            }
            Err(e) => {
                release();
                Err(EnvError::RuntimeState(e.to_string()))
            }
        }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        BUSY.lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.working_dir);
    }
}
