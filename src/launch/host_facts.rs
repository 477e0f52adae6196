use log::trace;
use nix::sys::resource::{Resource, getrlimit};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
}

impl GpuVendor {
    /// PCI vendor ids as found in `/sys/class/drm/card*/device/vendor`.
    pub fn from_pci_id(id: &str) -> Option<GpuVendor> {
        match id.trim().to_lowercase().as_str() {
            "0x10de" => Some(GpuVendor::Nvidia),
            "0x1002" => Some(GpuVendor::Amd),
            "0x8086" => Some(GpuVendor::Intel),
            _ => None,
        }
    }
}

/// What we know about the host when building a launch environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostFacts {
    pub memory_gib: f64,
    pub cpu_cores: usize,
    pub gpu_vendors: BTreeSet<GpuVendor>,
    /// Hard limit on open files, `None` if it couldn't be read
    pub nofile_hard_limit: Option<u64>,
}

impl Default for HostFacts {
    fn default() -> Self {
        Self {
            memory_gib: 8.0,
            cpu_cores: 4,
            gpu_vendors: BTreeSet::new(),
            nofile_hard_limit: None,
        }
    }
}

impl HostFacts {
    pub fn gather() -> HostFacts {
        let defaults = HostFacts::default();

        let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
        let memory_gib = if pages > 0 && page_size > 0 {
            (pages as f64 * page_size as f64) / (1024.0 * 1024.0 * 1024.0)
        } else {
            defaults.memory_gib
        };

        let cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(defaults.cpu_cores);

        let nofile_hard_limit = getrlimit(Resource::RLIMIT_NOFILE)
            .ok()
            .map(|(_, hard)| hard);

        let facts = HostFacts {
            memory_gib,
            cpu_cores,
            gpu_vendors: scan_gpu_vendors(Path::new("/sys/class/drm")),
            nofile_hard_limit,
        };
        trace!(
            "Host: {:.1} GiB, {} cores, nofile hard limit {}",
            facts.memory_gib,
            facts.cpu_cores,
            facts
                .nofile_hard_limit
                .map_or("unknown".to_string(), |limit| limit.to_string())
        );
        facts
    }
}

pub fn scan_gpu_vendors(drm: &Path) -> BTreeSet<GpuVendor> {
    let Ok(entries) = std::fs::read_dir(drm) else {
        return BTreeSet::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("card"))
        .filter_map(|entry| {
            std::fs::read_to_string(entry.path().join("device").join("vendor")).ok()
        })
        .filter_map(|id| GpuVendor::from_pci_id(&id))
        .collect()
}
