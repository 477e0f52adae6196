use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::trace;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use anyhow::{Result, anyhow};

use super::environment_lock_path;

pub struct Lock {
    path: PathBuf,
    #[allow(dead_code)]
    lock: Flock<File>,
}

impl Lock {
    /**
     * Try to take the exclusive operation lock of an overlay environment.
     * Returns `Ok(None)` if some other process holds it; we never wait, a
     * lifecycle operation that finds its environment busy fails closed.
     */
    pub fn try_environment(
        runtime_dir: &Path,
        working_dir: &Path,
    ) -> Result<Option<Lock>> {
        let lock_file = environment_lock_path(runtime_dir, working_dir);
        trace!(
            "Acquiring lock {} for {}",
            lock_file.display(),
            working_dir.display()
        );
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_file)
            .map_err(|e| {
                anyhow!(
                    "Failed to open lock file {}: {}",
                    lock_file.display(),
                    e
                )
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                trace!("Acquired lock {}", lock_file.display());
                Ok(Some(Lock {
                    path: lock_file,
                    lock,
                }))
            }
            Err((_, Errno::EWOULDBLOCK)) => {
                trace!("Lock {} is held elsewhere", lock_file.display());
                Ok(None)
            }
            Err((_, e)) => Err(anyhow!(
                "Failed to acquire lock {}: {}",
                lock_file.display(),
                e
            )),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        trace!("Unlocking lock {}", self.path.display());
    }
}
