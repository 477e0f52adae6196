use anyhow::{Result, anyhow};
use std::path::{Component, Path, PathBuf};

/**
 * Checks that a path can be spliced into an overlay mount option string
 * (`lowerdir=...,upperdir=...,workdir=...`).
 *
 * Commas separate options and colons separate lower layers, so neither may
 * appear. We don't attempt escaping since fuse-overlayfs and the kernel
 * disagree on how it works.
 */
pub fn check_path_for_mount_option_compatibility(path: &Path) -> Result<()> {
    if path.components().count() == 0 {
        return Err(anyhow!("Path {} is empty", path.display()));
    }

    let Some(path_str) = path.to_str() else {
        return Err(anyhow!(
            "Path {} contains invalid UTF-8",
            path.display()
        ));
    };

    if let Some(c) = path_str
        .chars()
        .find(|c| matches!(c, ',' | ':' | '\\' | '\n' | '\0'))
    {
        return Err(anyhow!(
            "Path {} contains character '{}' which cannot be used in overlay mount options",
            path.display(),
            c.escape_default()
        ));
    }

    Ok(())
}

/**
 * Makes a path absolute and resolves symlinks as far as the path exists. The
 * overlay working directory usually doesn't exist yet when we first see it,
 * so the missing tail is appended lexically.
 */
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .map_err(|e| anyhow!("Failed to resolve {}: {}", path.display(), e))?;

    let mut existing = absolute.clone();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut result = canonical;
            for component in tail.iter().rev() {
                result.push(component);
            }
            return Ok(lexically_clean(&result));
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return Ok(lexically_clean(&absolute)),
        }
    }
}

fn lexically_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/**
 * The overlay working directory is removed recursively on delete, so it must
 * never be the base, an ancestor of the base, or live inside the base.
 */
pub fn check_disjoint(base: &Path, working_dir: &Path) -> Result<()> {
    if working_dir.parent().is_none() {
        return Err(anyhow!(
            "Refusing to use {} as an overlay working directory",
            working_dir.display()
        ));
    }
    if base == working_dir {
        return Err(anyhow!(
            "Overlay working directory {} is the base environment",
            working_dir.display()
        ));
    }
    if base.starts_with(working_dir) {
        return Err(anyhow!(
            "Overlay working directory {} contains the base environment {}",
            working_dir.display(),
            base.display()
        ));
    }
    if working_dir.starts_with(base) {
        return Err(anyhow!(
            "Overlay working directory {} is inside the base environment {}",
            working_dir.display(),
            base.display()
        ));
    }
    Ok(())
}
