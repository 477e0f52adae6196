use super::{CaptureMode, TuningProfile};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /**********************/
    /* Flags and settings */
    /**********************/
    /// Set the log level to one of trace, debug, info, warn, or error.
    /// `-v` is shorthand for enabling verbose (trace) logging.
    #[arg(short = 'v',
        long,
        global = true,
        default_missing_value = "trace",
        num_args = 0..=1,
        require_equals = true,
        value_parser = parse_log_level
    )]
    pub log_level: Option<log::LevelFilter>,

    /// Formats action output as a JSON blob.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Do not load config files.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_config: bool,

    /// Compatibility runtime to launch programs with. Defaults to `wine`.
    #[arg(long, global = true, value_hint = clap::ValueHint::CommandName)]
    pub runtime: Option<String>,

    /// Helper used to run privileged steps. Defaults to `pkexec`; pass an
    /// empty string to run them directly.
    #[arg(long, global = true)]
    pub elevation_helper: Option<String>,

    /// Overlay working directory. Defaults to `.wine_temp_noverlay` next to
    /// the executable.
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub work_dir: Option<PathBuf>,

    /// How program output is captured.
    #[arg(long, global = true, value_enum)]
    pub capture: Option<CaptureMode>,

    /// Launch environment tuning.
    #[arg(long, global = true, value_enum)]
    pub tuning: Option<TuningProfile>,

    /***************/
    /* Subcommands */
    /***************/
    #[command(subcommand)]
    pub action: Action,
}

#[derive(clap::Subcommand, Clone, Debug)]
#[command(subcommand_help_heading = "Actions")]
pub enum Action {
    /// Get current configuration options
    Config {
        /// The keys to get from the configuration
        #[arg(value_name = "KEYS", num_args = 0..)]
        keys: Option<Vec<String>>,
    },

    /// Create an overlay prefix for an executable on top of a base prefix
    Create {
        /// Base prefix, never written to
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        base: Option<PathBuf>,

        #[arg(value_name = "EXE", value_hint = clap::ValueHint::FilePath)]
        exe: PathBuf,
    },

    /// Unmount and remove the overlay prefix of an executable
    Delete {
        /// Base prefix the overlay was created from. Read from the mount
        /// table when the overlay is still mounted.
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        base: Option<PathBuf>,

        #[arg(value_name = "EXE", value_hint = clap::ValueHint::FilePath)]
        exe: PathBuf,
    },

    /// Run an executable against its overlay prefix
    Run {
        /// Run against this prefix instead of the overlay
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        prefix: Option<PathBuf>,

        /// Extra loader argument placed between the runtime and the
        /// executable, e.g. `--loader mono --loader BepInEx.dll`
        #[arg(long = "loader", value_name = "ARG", allow_hyphen_values = true)]
        loader: Vec<String>,

        #[arg(value_name = "EXE", value_hint = clap::ValueHint::FilePath)]
        exe: PathBuf,
    },

    /// Create an overlay prefix, run the executable in it and delete it
    Session {
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        base: Option<PathBuf>,

        #[arg(long = "loader", value_name = "ARG", allow_hyphen_values = true)]
        loader: Vec<String>,

        #[arg(value_name = "EXE", value_hint = clap::ValueHint::FilePath)]
        exe: PathBuf,
    },

    /// Show the state of an executable's overlay prefix
    Status {
        #[arg(value_name = "EXE", value_hint = clap::ValueHint::FilePath)]
        exe: PathBuf,
    },

    /// Show the filesystem a path lives on and how it would be overlaid
    Detect {
        #[arg(value_name = "PATH", value_hint = clap::ValueHint::AnyPath)]
        path: PathBuf,
    },

    /// Initialize a new 64-bit base prefix
    BaseInit {
        #[arg(value_name = "PATH", value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,
    },

    /// Start winetricks against a base prefix without waiting for it
    Winetricks {
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        base: Option<PathBuf>,

        /// Arguments passed on to winetricks
        #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse::<log::LevelFilter>().map_err(|e| e.to_string())
}
