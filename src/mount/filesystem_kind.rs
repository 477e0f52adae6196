use log::{debug, warn};
use serde::Serialize;
use std::path::Path;

use crate::privileged::{CommandRunner, Invocation};

/// Backing filesystem of an overlay working directory, as reported by `df -T`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum FilesystemKind {
    Ext4,
    Btrfs,
    Xfs,
    Fuseblk,
    Other(String),
    Unknown,
}

impl FilesystemKind {
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "ext4" => Self::Ext4,
            "btrfs" => Self::Btrfs,
            "xfs" => Self::Xfs,
            "fuseblk" => Self::Fuseblk,
            "" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }

    /**
     * Only the second line's second column of `df -T` output is meaningful:
     *
     * ```text
     * Filesystem     Type 1K-blocks ...
     * /dev/sda2      ext4 ...
     * ```
     */
    pub fn from_df_output(stdout: &str) -> Self {
        stdout
            .lines()
            .nth(1)
            .and_then(|line| line.split_whitespace().nth(1))
            .map(Self::from_name)
            .unwrap_or(Self::Unknown)
    }

    /// Detects the filesystem holding `path`. Never fails; anything that goes
    /// wrong yields `Unknown`.
    pub fn detect(runner: &dyn CommandRunner, path: &Path) -> Self {
        let invocation = Invocation::new("df").arg("-T").arg(path);
        match runner.run(&invocation) {
            Ok(output) if output.success() => {
                let kind = Self::from_df_output(&output.stdout);
                debug!("{} is on {}", path.display(), kind);
                kind
            }
            Ok(output) => {
                warn!(
                    "Could not detect filesystem of {}: {}",
                    path.display(),
                    output.describe_failure()
                );
                Self::Unknown
            }
            Err(e) => {
                warn!("Could not run df for {}: {}", path.display(), e);
                Self::Unknown
            }
        }
    }
}

impl std::fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ext4 => write!(f, "ext4"),
            Self::Btrfs => write!(f, "btrfs"),
            Self::Xfs => write!(f, "xfs"),
            Self::Fuseblk => write!(f, "fuseblk"),
            Self::Other(name) => write!(f, "{}", name),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<FilesystemKind> for String {
    fn from(kind: FilesystemKind) -> Self {
        kind.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privileged::CommandOutput;

    struct FixedRunner(std::io::Result<CommandOutput>);

    impl CommandRunner for FixedRunner {
        fn run(&self, _: &Invocation) -> std::io::Result<CommandOutput> {
            match &self.0 {
                Ok(output) => Ok(output.clone()),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    #[test]
    fn test_parse_df_output() {
        let stdout = "Filesystem     Type 1K-blocks     Used Available Use% Mounted on\n\
                      /dev/nvme0n1p2 ext4 490617784 12345678 453210987   3% /\n";
        assert_eq!(FilesystemKind::from_df_output(stdout), FilesystemKind::Ext4);
    }

    #[test]
    fn test_parse_df_output_lowercases() {
        let stdout = "Filesystem Type\n/dev/sdb1 FUSEBLK\n";
        assert_eq!(
            FilesystemKind::from_df_output(stdout),
            FilesystemKind::Fuseblk
        );
    }

    #[test]
    fn test_parse_df_output_garbage() {
        assert_eq!(FilesystemKind::from_df_output(""), FilesystemKind::Unknown);
        assert_eq!(
            FilesystemKind::from_df_output("Filesystem Type\n"),
            FilesystemKind::Unknown
        );
        assert_eq!(
            FilesystemKind::from_df_output("Filesystem Type\n/dev/x\n"),
            FilesystemKind::Unknown
        );
    }

    #[test]
    fn test_other_kinds_keep_their_name() {
        assert_eq!(
            FilesystemKind::from_name("zfs"),
            FilesystemKind::Other("zfs".to_string())
        );
        assert_eq!(FilesystemKind::from_name("ZFS").to_string(), "zfs");
    }

    #[test]
    fn test_detect_failures_are_unknown() {
        let failed = FixedRunner(Ok(CommandOutput {
            code: Some(1),
            stderr: "df: /nope: No such file or directory".to_string(),
            ..Default::default()
        }));
        assert_eq!(
            FilesystemKind::detect(&failed, Path::new("/nope")),
            FilesystemKind::Unknown
        );

        let missing = FixedRunner(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "df not found",
        )));
        assert_eq!(
            FilesystemKind::detect(&missing, Path::new("/")),
            FilesystemKind::Unknown
        );
    }
}
