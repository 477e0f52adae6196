use nix::sys::signal::killpg;
use nix::unistd::Pid;
use std::path::Path;

use anyhow::{Context, Result};
use log::trace;

use super::session_pid_path;

/**
 * Get the process group of a session currently running against an overlay
 * environment.
 *
 * Returns None if no session is running. Stale pid files are cleaned up.
 */
pub fn get_running_session_pgid(
    runtime_dir: &Path,
    working_dir: &Path,
) -> Option<Pid> {
    let pid_file = session_pid_path(runtime_dir, working_dir);
    if !pid_file.exists() {
        return None;
    }

    match std::fs::read_to_string(&pid_file)
        .ok()
        .and_then(|pid_str| pid_str.trim().parse::<i32>().ok())
        .filter(|&raw| raw > 0)
        .map(Pid::from_raw)
        .filter(|&pgid| killpg(pgid, None).is_ok())
        .filter(|&pgid| {
            // A lone zombie leader still answers to signal 0
            match std::fs::read_to_string(format!("/proc/{}/stat", pgid)) {
                Ok(stat) => stat
                    .rsplit(')')
                    .next()
                    .and_then(|rest| rest.split_whitespace().next())
                    .map(|state| state != "Z" && state != "X")
                    .unwrap_or(true),
                Err(_) => true,
            }
        }) {
        Some(pgid) => {
            trace!(
                "Session with process group {} is running against {}",
                pgid,
                working_dir.display()
            );
            Some(pgid)
        }
        None => {
            trace!("Stale session pid file {}, cleaning up", pid_file.display());
            std::fs::remove_file(&pid_file).ok();
            None
        }
    }
}

pub fn write_session_pgid(
    runtime_dir: &Path,
    working_dir: &Path,
    pgid: Pid,
) -> Result<()> {
    let pid_file = session_pid_path(runtime_dir, working_dir);
    std::fs::write(&pid_file, pgid.to_string()).context(format!(
        "failed to write session pid file {}",
        pid_file.display()
    ))
}

pub fn remove_session_pgid(runtime_dir: &Path, working_dir: &Path) {
    let pid_file = session_pid_path(runtime_dir, working_dir);
    if pid_file.exists() {
        trace!("Cleaning up session pid file {}", pid_file.display());
        std::fs::remove_file(&pid_file).ok();
    }
}
