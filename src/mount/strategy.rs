use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use super::FilesystemKind;
use crate::privileged::{Invocation, Privilege, Step};
use crate::util::shell_quote_path;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported filesystem: {0}")]
pub struct UnsupportedFilesystem(pub FilesystemKind);

/// How an overlay gets mounted on a given backing filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountStrategy {
    /// Kernel overlayfs via an elevated `mount -t overlay`
    NativeOverlay,
    /// `fuse-overlayfs`, no elevation needed
    UserspaceOverlay,
}

impl MountStrategy {
    /// No fallback happens here; an unknown filesystem is an error.
    pub fn select(
        kind: &FilesystemKind,
    ) -> Result<MountStrategy, UnsupportedFilesystem> {
        match kind {
            FilesystemKind::Ext4 | FilesystemKind::Btrfs | FilesystemKind::Xfs => {
                Ok(MountStrategy::NativeOverlay)
            }
            FilesystemKind::Fuseblk => Ok(MountStrategy::UserspaceOverlay),
            other => Err(UnsupportedFilesystem(other.clone())),
        }
    }

    /**
     * Ordered list of strategies to try for `kind`. With `fallback` the other
     * technique is appended after the selected one.
     */
    pub fn plan(
        kind: &FilesystemKind,
        fallback: bool,
    ) -> Result<Vec<MountStrategy>, UnsupportedFilesystem> {
        let primary = Self::select(kind)?;
        let mut plan = vec![primary];
        if fallback {
            plan.push(primary.alternative());
        }
        Ok(plan)
    }

    pub fn alternative(self) -> MountStrategy {
        match self {
            MountStrategy::NativeOverlay => MountStrategy::UserspaceOverlay,
            MountStrategy::UserspaceOverlay => MountStrategy::NativeOverlay,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MountStrategy::NativeOverlay => "native overlay",
            MountStrategy::UserspaceOverlay => "fuse-overlayfs",
        }
    }

    pub fn privilege(self) -> Privilege {
        match self {
            MountStrategy::NativeOverlay => Privilege::Elevated,
            MountStrategy::UserspaceOverlay => Privilege::User,
        }
    }

    pub fn mount_step(
        self,
        lower: &Path,
        upper: &Path,
        work: &Path,
        merged: &Path,
    ) -> Step {
        let options = overlay_options(lower, upper, work);
        let invocation = match self {
            MountStrategy::NativeOverlay => Invocation::new("mount")
                .args(["-t", "overlay", "overlay", "-o"])
                .arg(options)
                .arg(merged),
            MountStrategy::UserspaceOverlay => Invocation::new("fuse-overlayfs")
                .arg("-o")
                .arg(options)
                .arg(merged),
        };
        Step {
            name: self.name().to_string(),
            invocation,
            privilege: self.privilege(),
        }
    }
}

impl std::fmt::Display for MountStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Paths are checked for `,` and `:` before they get here.
pub fn overlay_options(lower: &Path, upper: &Path, work: &Path) -> String {
    format!(
        "lowerdir={},upperdir={},workdir={}",
        lower.display(),
        upper.display(),
        work.display()
    )
}

/// Ways to take an overlay down, in the order they're tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmountStrategy {
    Fuse,
    Lazy,
    Forced,
}

const REPORT_PREFIX: &str = "prefixbox-unmount";

impl UnmountStrategy {
    pub const CHAIN: [UnmountStrategy; 3] = [
        UnmountStrategy::Fuse,
        UnmountStrategy::Lazy,
        UnmountStrategy::Forced,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UnmountStrategy::Fuse => "fusermount -u",
            UnmountStrategy::Lazy => "umount -l",
            UnmountStrategy::Forced => "umount -f",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            UnmountStrategy::Fuse => "fuse",
            UnmountStrategy::Lazy => "lazy",
            UnmountStrategy::Forced => "forced",
        }
    }

    pub fn privilege(self) -> Privilege {
        match self {
            UnmountStrategy::Fuse => Privilege::User,
            UnmountStrategy::Lazy | UnmountStrategy::Forced => {
                Privilege::Elevated
            }
        }
    }

    pub fn step(self, merged: &Path) -> Step {
        let invocation = match self {
            UnmountStrategy::Fuse => {
                Invocation::new("fusermount").arg("-u").arg(merged)
            }
            UnmountStrategy::Lazy => {
                Invocation::new("umount").arg("-l").arg(merged)
            }
            UnmountStrategy::Forced => {
                Invocation::new("umount").arg("-f").arg(merged)
            }
        };
        Step {
            name: self.name().to_string(),
            invocation,
            privilege: self.privilege(),
        }
    }

    /**
     * Shell fragment for a batched script. The step only runs while `merged`
     * is still a mount point and reports its outcome on stdout so the caller
     * can tag each attempt after the fact.
     */
    pub fn script_line(self, merged: &Path) -> String {
        let argv = self.step(merged).invocation.argv();
        let command = std::iter::once(argv[0].clone())
            .chain(argv[1..argv.len() - 1].iter().cloned())
            .chain(std::iter::once(shell_quote_path(merged)))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "if mountpoint -q {merged}; then if {command}; then echo {p}:{tag}:ok; else echo {p}:{tag}:failed; fi; fi",
            merged = shell_quote_path(merged),
            command = command,
            p = REPORT_PREFIX,
            tag = self.tag(),
        )
    }

    /// Reads the attempt reports a batched script printed.
    pub fn parse_script_report(stdout: &str) -> Vec<Attempt<UnmountStrategy>> {
        stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.trim().split(':');
                if parts.next()? != REPORT_PREFIX {
                    return None;
                }
                let tag = parts.next()?;
                let strategy = Self::CHAIN.into_iter().find(|s| s.tag() == tag)?;
                let outcome = match parts.next()? {
                    "ok" => Outcome::Succeeded,
                    _ => Outcome::Failed(format!("{} failed", strategy.name())),
                };
                Some(Attempt { strategy, outcome })
            })
            .collect()
    }
}

impl std::fmt::Display for UnmountStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed(String),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One strategy tried, tagged with how it went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt<S> {
    pub strategy: S,
    pub outcome: Outcome,
}

impl<S> Attempt<S> {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select() {
        assert_eq!(
            MountStrategy::select(&FilesystemKind::Ext4),
            Ok(MountStrategy::NativeOverlay)
        );
        assert_eq!(
            MountStrategy::select(&FilesystemKind::Btrfs),
            Ok(MountStrategy::NativeOverlay)
        );
        assert_eq!(
            MountStrategy::select(&FilesystemKind::Xfs),
            Ok(MountStrategy::NativeOverlay)
        );
        assert_eq!(
            MountStrategy::select(&FilesystemKind::Fuseblk),
            Ok(MountStrategy::UserspaceOverlay)
        );
        assert!(MountStrategy::select(&FilesystemKind::from_name("zfs")).is_err());
        assert!(MountStrategy::select(&FilesystemKind::Unknown).is_err());
    }

    #[test]
    fn test_plan_with_fallback() {
        assert_eq!(
            MountStrategy::plan(&FilesystemKind::Ext4, false),
            Ok(vec![MountStrategy::NativeOverlay])
        );
        assert_eq!(
            MountStrategy::plan(&FilesystemKind::Fuseblk, true),
            Ok(vec![
                MountStrategy::UserspaceOverlay,
                MountStrategy::NativeOverlay
            ])
        );
        // fallback never rescues an unsupported filesystem
        assert!(MountStrategy::plan(&FilesystemKind::Unknown, true).is_err());
    }

    #[test]
    fn test_mount_steps() {
        let lower = Path::new("/prefixes/base");
        let upper = Path::new("/g/.ovl/upper");
        let work = Path::new("/g/.ovl/work");
        let merged = Path::new("/g/.ovl/merged");

        let native =
            MountStrategy::NativeOverlay.mount_step(lower, upper, work, merged);
        assert_eq!(native.privilege, Privilege::Elevated);
        assert_eq!(
            native.invocation.argv(),
            [
                "mount",
                "-t",
                "overlay",
                "overlay",
                "-o",
                "lowerdir=/prefixes/base,upperdir=/g/.ovl/upper,workdir=/g/.ovl/work",
                "/g/.ovl/merged"
            ]
        );

        let fuse =
            MountStrategy::UserspaceOverlay.mount_step(lower, upper, work, merged);
        assert_eq!(fuse.privilege, Privilege::User);
        assert_eq!(
            fuse.invocation.argv(),
            [
                "fuse-overlayfs",
                "-o",
                "lowerdir=/prefixes/base,upperdir=/g/.ovl/upper,workdir=/g/.ovl/work",
                "/g/.ovl/merged"
            ]
        );
    }

    #[test]
    fn test_unmount_chain_order() {
        let merged = Path::new("/g/.ovl/merged");
        let argvs: Vec<Vec<String>> = UnmountStrategy::CHAIN
            .iter()
            .map(|s| s.step(merged).invocation.argv())
            .collect();
        assert_eq!(argvs[0], ["fusermount", "-u", "/g/.ovl/merged"]);
        assert_eq!(argvs[1], ["umount", "-l", "/g/.ovl/merged"]);
        assert_eq!(argvs[2], ["umount", "-f", "/g/.ovl/merged"]);
        assert_eq!(UnmountStrategy::Fuse.privilege(), Privilege::User);
        assert_eq!(UnmountStrategy::Forced.privilege(), Privilege::Elevated);
    }

    #[test]
    fn test_script_line_is_guarded() {
        let line = UnmountStrategy::Lazy.script_line(Path::new("/g/my game/merged"));
        assert_eq!(
            line,
            "if mountpoint -q '/g/my game/merged'; then if umount -l '/g/my game/merged'; \
             then echo prefixbox-unmount:lazy:ok; else echo prefixbox-unmount:lazy:failed; fi; fi"
        );
    }

    #[test]
    fn test_parse_script_report() {
        let stdout = "noise\nprefixbox-unmount:lazy:failed\nprefixbox-unmount:forced:ok\n";
        let attempts = UnmountStrategy::parse_script_report(stdout);
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].strategy, UnmountStrategy::Lazy);
        assert!(!attempts[0].succeeded());
        assert_eq!(attempts[1].strategy, UnmountStrategy::Forced);
        assert!(attempts[1].succeeded());
    }
}
