use anyhow::{Result, anyhow};
use std::ffi::{CStr, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub options: String,
}

impl MountEntry {
    /// Value of a `key=value` mount option, e.g. `lowerdir`.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.split(',').find_map(|opt| {
            opt.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// Snapshot of the mount table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn load() -> Result<Self> {
        let system_mounts = unsafe {
            libc::setmntent(c"/proc/self/mounts".as_ptr(), c"r".as_ptr())
        };
        if system_mounts.is_null() {
            return Err(anyhow!("Failed to open /proc/self/mounts"));
        }

        let mut entries = Vec::new();
        loop {
            let mnt = unsafe { libc::getmntent(system_mounts) };
            if mnt.is_null() {
                break;
            }

            // getmntent has already decoded the \040 style escapes
            let mount_point = PathBuf::from(OsStr::from_bytes(
                unsafe { CStr::from_ptr((*mnt).mnt_dir) }.to_bytes(),
            ));
            let source = String::from(unsafe {
                CStr::from_ptr((*mnt).mnt_fsname).to_string_lossy()
            });
            let fs_type = String::from(unsafe {
                CStr::from_ptr((*mnt).mnt_type).to_string_lossy()
            });
            let options = String::from(unsafe {
                CStr::from_ptr((*mnt).mnt_opts).to_string_lossy()
            });

            entries.push(MountEntry {
                source,
                mount_point,
                fs_type,
                options,
            });
        }

        unsafe { libc::endmntent(system_mounts) };

        Ok(Self { entries })
    }

    #[cfg(test)]
    pub fn from_entries(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    /**
     * Finds the most recent mount exactly at `path`. Mount points are compared
     * component by component, never by substring, so `/a/b` does not match
     * a mount at `/a/bc`.
     */
    pub fn find(&self, path: &Path) -> Option<&MountEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.mount_point.as_path() == path)
    }

    pub fn is_mounted(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }
}

/// Where the mount table comes from. Swapped out in tests.
pub trait MountTableSource: Send + Sync {
    fn load(&self) -> Result<MountTable>;
}

pub struct SystemMountTable;

impl MountTableSource for SystemMountTable {
    fn load(&self) -> Result<MountTable> {
        MountTable::load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mount_point: &str, fs_type: &str, options: &str) -> MountEntry {
        MountEntry {
            source: fs_type.to_string(),
            mount_point: PathBuf::from(mount_point),
            fs_type: fs_type.to_string(),
            options: options.to_string(),
        }
    }

    #[test]
    fn test_exact_mount_point_match() {
        let table = MountTable::from_entries(vec![
            entry("/", "ext4", "rw"),
            entry("/a/bc", "overlay", "rw"),
        ]);
        assert!(table.is_mounted(Path::new("/a/bc")));
        assert!(!table.is_mounted(Path::new("/a/b")));
        assert!(!table.is_mounted(Path::new("/a")));
    }

    #[test]
    fn test_prefix_is_not_a_match() {
        let table = MountTable::from_entries(vec![entry("/a/b", "overlay", "rw")]);
        assert!(table.is_mounted(Path::new("/a/b")));
        assert!(!table.is_mounted(Path::new("/a/bc")));
        assert!(!table.is_mounted(Path::new("/a/b/c")));
    }

    #[test]
    fn test_mount_option_lookup() {
        let overlay = entry(
            "/games/app/.wine_temp_noverlay/merged",
            "overlay",
            "rw,relatime,lowerdir=/prefixes/base,upperdir=/u,workdir=/w",
        );
        assert_eq!(overlay.option("lowerdir"), Some("/prefixes/base"));
        assert_eq!(overlay.option("workdir"), Some("/w"));
        assert_eq!(overlay.option("relatime"), None);
        assert_eq!(overlay.option("index"), None);
    }

    #[test]
    fn test_load_system_mount_table() -> Result<()> {
        let table = SystemMountTable.load()?;
        assert!(table.is_mounted(Path::new("/")));
        Ok(())
    }
}
