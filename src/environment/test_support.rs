//! A fake host for lifecycle tests: it answers `df`, pretends to mount and
//! unmount by editing an in-memory mount table, and really deletes
//! directories on `rm`.
#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{EnvironmentManager, EnvironmentSettings};
use crate::mount::{MountEntry, MountTable, MountTableSource};
use crate::privileged::{CommandOutput, CommandRunner, Invocation, PrivilegedExecutor};

pub const HELPER: &str = "pkexec";
pub const RUNTIME: &str = "wine";

#[derive(Default)]
struct HostState {
    filesystem: String,
    mounts: Vec<MountEntry>,
    calls: Vec<Vec<String>>,
    failing: BTreeSet<String>,
    registry_version: bool,
    unreadable_after_mount: usize,
    unreadable_loads: usize,
}

pub struct ScriptedHost {
    state: Mutex<HostState>,
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failed(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// The text between the first pair of single quotes after `marker`.
fn quoted_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let rest = &line[line.find(marker)? + marker.len()..];
    let rest = rest.strip_prefix('\'')?;
    Some(&rest[..rest.find('\'')?])
}

impl ScriptedHost {
    pub fn new(filesystem: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HostState {
                filesystem: filesystem.to_string(),
                ..Default::default()
            }),
        })
    }

    /// Makes every invocation of `program` exit non-zero.
    pub fn fail(&self, program: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(program.to_string());
    }

    /// The next `loads` mount table reads after a successful mount fail.
    pub fn unreadable_mount_table_after_mount(&self, loads: usize) {
        self.state.lock().unwrap().unreadable_after_mount = loads;
    }

    pub fn add_mount(&self, mount_point: &Path) {
        self.state.lock().unwrap().mounts.push(MountEntry {
            source: "overlay".to_string(),
            mount_point: mount_point.to_path_buf(),
            fs_type: "overlay".to_string(),
            options: "rw".to_string(),
        });
    }

    pub fn is_mounted(&self, mount_point: &Path) -> bool {
        self.state
            .lock()
            .unwrap()
            .mounts
            .iter()
            .any(|m| m.mount_point == mount_point)
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls whose (unwrapped) program is `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|argv| {
                let argv: &[String] = if argv[0] == HELPER { &argv[1..] } else { argv };
                argv.first().map(String::as_str) == Some(program)
            })
            .collect()
    }

    fn unmount(state: &mut HostState, mount_point: &str) -> bool {
        let before = state.mounts.len();
        state
            .mounts
            .retain(|m| m.mount_point != Path::new(mount_point));
        before != state.mounts.len()
    }

    /// Mirrors `rm -rf --one-file-system`: everything beside a mount under
    /// `target` is deleted, the mount itself is skipped and the call fails.
    fn remove_tree(state: &HostState, target: &str) -> CommandOutput {
        let target = Path::new(target);
        if state.mounts.iter().any(|m| m.mount_point.starts_with(target)) {
            Self::remove_around_mounts(state, target);
            return failed(1, "rm: skipping mount point on a different device");
        }
        match std::fs::remove_dir_all(target) {
            Ok(()) => ok(""),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ok(""),
            Err(e) => failed(1, &e.to_string()),
        }
    }

    fn remove_around_mounts(state: &HostState, dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if state.mounts.iter().any(|m| m.mount_point == path) {
                continue;
            }
            if state.mounts.iter().any(|m| m.mount_point.starts_with(&path)) {
                Self::remove_around_mounts(state, &path);
            } else if path.is_dir() {
                let _ = std::fs::remove_dir_all(&path);
            } else {
                let _ = std::fs::remove_file(&path);
            }
        }
    }

    fn run_script(state: &mut HostState, script: &str) -> CommandOutput {
        let mut stdout = String::new();
        for line in script.lines() {
            let line = line.trim();
            if line.starts_with("if mountpoint -q") {
                let Some(merged) = quoted_after(line, "mountpoint -q ") else {
                    continue;
                };
                if !state.mounts.iter().any(|m| m.mount_point == Path::new(merged)) {
                    continue;
                }
                let tag = if line.contains("umount -l") { "lazy" } else { "forced" };
                if state.failing.contains("umount") {
                    stdout.push_str(&format!("prefixbox-unmount:{}:failed\n", tag));
                } else {
                    Self::unmount(state, merged);
                    stdout.push_str(&format!("prefixbox-unmount:{}:ok\n", tag));
                }
            } else if let Some(rest) = line.strip_prefix("if ! mountpoint -q ") {
                let Some(merged) = quoted_after(line, "mountpoint -q ") else {
                    continue;
                };
                if state.mounts.iter().any(|m| m.mount_point == Path::new(merged)) {
                    continue;
                }
                let Some(target) = quoted_after(rest, "-- ") else {
                    continue;
                };
                if state.failing.contains("rm") {
                    return failed(1, "rm: cannot remove: Permission denied");
                }
                let output = Self::remove_tree(state, target);
                if !output.success() {
                    return CommandOutput { stdout, ..output };
                }
            }
        }
        ok(&stdout)
    }

    pub fn manager(self: &Arc<Self>, runtime_dir: &Path) -> EnvironmentManager {
        EnvironmentManager::new(
            PrivilegedExecutor::new(Some(HELPER.to_string()), self.clone()),
            self.clone(),
            EnvironmentSettings {
                runtime: RUNTIME.to_string(),
                runtime_dir: runtime_dir.to_path_buf(),
                mount_fallback: false,
                ambient: BTreeMap::from([(
                    "PATH".to_string(),
                    "/usr/bin:/bin".to_string(),
                )]),
            },
        )
    }
}

impl CommandRunner for ScriptedHost {
    fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let full = invocation.argv();
        state.calls.push(full.clone());

        let argv: Vec<String> = if full[0] == HELPER {
            full[1..].to_vec()
        } else {
            full
        };
        let program = argv[0].as_str();
        if state.failing.contains(program) {
            return Ok(failed(32, &format!("{}: simulated failure", program)));
        }

        let output = match program {
            "df" => ok(&format!(
                "Filesystem Type 1K-blocks Used Available Use% Mounted on\n\
                 /dev/sim {} 1000 10 990 1% /\n",
                state.filesystem
            )),
            "mount" | "fuse-overlayfs" => {
                let options = argv[argv.len() - 2].clone();
                state.mounts.push(MountEntry {
                    source: program.to_string(),
                    mount_point: PathBuf::from(&argv[argv.len() - 1]),
                    fs_type: "overlay".to_string(),
                    options,
                });
                state.unreadable_loads = state.unreadable_after_mount;
                ok("")
            }
            "fusermount" | "umount" => {
                if Self::unmount(&mut state, &argv[argv.len() - 1]) {
                    ok("")
                } else {
                    failed(1, "not mounted")
                }
            }
            "rm" => Self::remove_tree(&state, &argv[argv.len() - 1]),
            "sh" => Self::run_script(&mut state, &argv[2]),
            RUNTIME => match argv.get(1).map(String::as_str) {
                Some("reg") if argv.get(2).map(String::as_str) == Some("query") => {
                    if state.registry_version {
                        ok("HKEY_CURRENT_USER\\Software\\Wine\\Wine\\Config\n    Version    REG_SZ    10.0\n")
                    } else {
                        failed(1, "reg: Unable to find the specified registry value")
                    }
                }
                Some("reg") => {
                    state.registry_version = true;
                    ok("")
                }
                _ => ok(""),
            },
            _ => ok(""),
        };
        Ok(output)
    }
}

impl MountTableSource for ScriptedHost {
    fn load(&self) -> anyhow::Result<MountTable> {
        let mut state = self.state.lock().unwrap();
        if state.unreadable_loads > 0 {
            state.unreadable_loads -= 1;
            anyhow::bail!("/proc/self/mountinfo: Resource temporarily unavailable");
        }
        Ok(MountTable::from_entries(state.mounts.clone()))
    }
}

/// Deterministic digest of a directory tree's paths and contents.
pub fn tree_digest(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| {
            let contents = if entry.file_type().is_file() {
                std::fs::read(entry.path()).unwrap_or_default()
            } else {
                Vec::new()
            };
            (
                entry.path().strip_prefix(root).unwrap().to_path_buf(),
                contents,
            )
        })
        .collect()
}
