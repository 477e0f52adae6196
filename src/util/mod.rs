mod ensure_dir;
mod expand_tilde;
mod lock;
mod output;
mod path_checks;
mod runtime_paths;
mod session_pid;
mod shell_quote;

pub use ensure_dir::*;
pub use expand_tilde::*;
pub use lock::*;
pub use output::*;
pub use path_checks::*;
pub use runtime_paths::*;
pub use session_pid::*;
pub use shell_quote::*;
