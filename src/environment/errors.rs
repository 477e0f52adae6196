use std::path::PathBuf;
use thiserror::Error;

use crate::mount::{Attempt, UnmountStrategy, UnsupportedFilesystem};

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("another operation on {} is already in progress", .0.display())]
    Busy(PathBuf),

    #[error("{0}")]
    InvalidPath(String),

    #[error("{} is already mounted", .0.display())]
    AlreadyMounted(PathBuf),

    #[error(transparent)]
    UnsupportedFilesystem(#[from] UnsupportedFilesystem),

    #[error("failed to prepare {}: {reason}", .path.display())]
    DirectoryPreparationFailed { path: PathBuf, reason: String },

    #[error("mount failed: {0}")]
    MountFailed(String),

    #[error("failed to bootstrap prefix: {0}")]
    BootstrapFailed(String),

    #[error("a session (process group {0}) is still running in this environment")]
    SessionActive(i32),

    #[error("refusing to remove {}: {reason}", .path.display())]
    UnsafeRemovalTarget { path: PathBuf, reason: String },

    #[error("failed to unmount {}", .path.display())]
    UnmountFailed {
        path: PathBuf,
        attempts: Vec<Attempt<UnmountStrategy>>,
    },

    #[error("failed to remove {}: {reason}", .path.display())]
    RemovalFailed { path: PathBuf, reason: String },

    #[error("{0}")]
    RuntimeState(String),
}

impl EnvError {
    /// Stable machine-readable name, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvError::Busy(_) => "busy",
            EnvError::InvalidPath(_) => "invalid_path",
            EnvError::AlreadyMounted(_) => "already_mounted",
            EnvError::UnsupportedFilesystem(_) => "unsupported_filesystem",
            EnvError::DirectoryPreparationFailed { .. } => {
                "directory_preparation_failed"
            }
            EnvError::MountFailed(_) => "mount_failed",
            EnvError::BootstrapFailed(_) => "bootstrap_failed",
            EnvError::SessionActive(_) => "session_active",
            EnvError::UnsafeRemovalTarget { .. } => "unsafe_removal_target",
            EnvError::UnmountFailed { .. } => "unmount_failed",
            EnvError::RemovalFailed { .. } => "removal_failed",
            EnvError::RuntimeState(_) => "runtime_state",
        }
    }
}
