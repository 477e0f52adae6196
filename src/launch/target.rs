use anyhow::{Result, anyhow};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::HostFacts;

/// What to run: the executable, where to run it, and what goes in front of
/// it on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    executable_path: PathBuf,
    working_directory: PathBuf,
    loader_chain: Vec<OsString>,
}

impl ExecutionTarget {
    pub fn new(
        executable_path: &Path,
        working_directory: &Path,
        loader_chain: Vec<OsString>,
    ) -> Self {
        Self {
            executable_path: executable_path.to_path_buf(),
            working_directory: working_directory.to_path_buf(),
            loader_chain,
        }
    }

    /// Targets an executable from its own directory, which is where the
    /// runtime expects relative data files to resolve.
    pub fn in_own_directory(
        executable_path: &Path,
        loader_chain: Vec<OsString>,
    ) -> Result<Self> {
        let executable_path = std::path::absolute(executable_path)?;
        let working_directory = executable_path
            .parent()
            .ok_or_else(|| {
                anyhow!("{} has no parent directory", executable_path.display())
            })?
            .to_path_buf();
        Ok(Self::new(&executable_path, &working_directory, loader_chain))
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn argv(&self) -> Vec<OsString> {
        self.loader_chain
            .iter()
            .cloned()
            .chain(std::iter::once(self.executable_path.clone().into_os_string()))
            .collect()
    }

    /// Directory that receives the missing-dependency report.
    pub fn report_dir(&self) -> &Path {
        self.executable_path
            .parent()
            .unwrap_or(&self.working_directory)
    }
}

/// CPU affinity mask that keeps core 0 free for the rest of the desktop.
pub fn taskset_mask(cpu_cores: usize) -> Option<String> {
    if cpu_cores <= 2 {
        return None;
    }
    if cpu_cores > 8 {
        return Some("0xfe".to_string());
    }
    Some(format!("{:#x}", (1u32 << cpu_cores) - 2))
}

/**
 * Scheduling prefixes for the launch command: best-effort I/O priority via
 * `ionice` and, on hosts with more than two cores, an affinity mask via
 * `taskset`. Each is used only if `available` finds the tool.
 */
pub fn boosters(facts: &HostFacts, available: impl Fn(&str) -> bool) -> Vec<String> {
    let mut boosters = Vec::new();
    if available("ionice") {
        boosters.extend(["ionice", "-c", "2", "-n", "0"].map(String::from));
    }
    if let Some(mask) = taskset_mask(facts.cpu_cores) {
        if available("taskset") {
            boosters.extend(["taskset".to_string(), mask]);
        }
    }
    boosters
}

pub fn tool_available(name: &str) -> bool {
    which::which(name).is_ok()
}

/// `[boosters..., runtime, loader...]`; the executable is appended by the
/// target.
pub fn loader_chain(boosters: &[String], runtime: &str, loader: &[String]) -> Vec<OsString> {
    boosters
        .iter()
        .map(OsString::from)
        .chain(std::iter::once(OsString::from(runtime)))
        .chain(loader.iter().map(OsString::from))
        .collect()
}
