use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already running")]
    Busy,

    #[error("failed to launch {program}: {reason}")]
    LaunchFailed { program: String, reason: String },

    #[error("failed to read session output: {0}")]
    ReadError(String),

    #[error("failed to kill process group {pgid}: {reason}")]
    ProcessKillFailed { pgid: i32, reason: String },
}

impl SessionError {
    /// Stable machine-readable name, used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Busy => "busy",
            SessionError::LaunchFailed { .. } => "launch_failed",
            SessionError::ReadError(_) => "read_error",
            SessionError::ProcessKillFailed { .. } => "process_kill_failed",
        }
    }
}
