use anyhow::{Result, anyhow};
use nix::sys::stat::SFlag;
use std::path::Path;

/* Makes the directory (and any missing parents) if it doesn't exist. Fails if the
 * path exists but is not a directory. Calling it on an existing directory is a no-op.
 */
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() {
        let metadata = nix::sys::stat::lstat(path)?;
        if metadata.st_mode & SFlag::S_IFMT.bits() != SFlag::S_IFDIR.bits() {
            return Err(anyhow!(
                "{} already exists but is not a directory",
                path.display()
            ));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        anyhow!("Failed to create directory {}: {}", path.display(), e)
    })
}
