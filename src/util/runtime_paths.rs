use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/**
 * Lock and pid files for an overlay environment live in the runtime directory,
 * not inside the overlay working directory, so they outlive its removal. They
 * are keyed by a name-based UUID of the (normalized) working directory path.
 */
pub fn environment_key(working_dir: &Path) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, working_dir.as_os_str().as_bytes())
        .to_string()
}

pub fn environment_lock_path(runtime_dir: &Path, working_dir: &Path) -> PathBuf {
    runtime_dir.join(format!("{}.lock", environment_key(working_dir)))
}

pub fn session_pid_path(runtime_dir: &Path, working_dir: &Path) -> PathBuf {
    runtime_dir.join(format!("{}.pid", environment_key(working_dir)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_key_is_stable() {
        let a = environment_key(Path::new("/games/app/.wine_temp_noverlay"));
        let b = environment_key(Path::new("/games/app/.wine_temp_noverlay"));
        let c = environment_key(Path::new("/games/other/.wine_temp_noverlay"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_runtime_paths_share_key() {
        let runtime = Path::new("/run/user/1000/prefixbox");
        let working = Path::new("/games/app/.wine_temp_noverlay");
        let lock = environment_lock_path(runtime, working);
        let pid = session_pid_path(runtime, working);
        assert_eq!(lock.file_stem(), pid.file_stem());
        assert_eq!(lock.parent(), Some(runtime));
    }
}
