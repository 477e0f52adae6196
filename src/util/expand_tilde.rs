use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

/// Home directory of the invoking user, taken from `$HOME`.
pub fn home_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow!("HOME is not set"))?;
    let home = PathBuf::from(home);
    if !home.is_absolute() {
        return Err(anyhow!(
            "Home directory is not absolute: {}",
            home.display()
        ));
    }
    Ok(home)
}

/// Expands a path that starts with ~ to use the user's home directory
pub fn expand_tilde_path(path: &Path) -> Result<PathBuf> {
    let Some(path_str) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if path_str == "~" {
        return home_dir();
    }
    if let Some(rest) = path_str.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(path.to_path_buf())
}
