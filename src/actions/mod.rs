mod base_init;
mod common;
mod config;
mod create;
mod delete;
mod detect;
mod run;
mod session;
mod status;
mod winetricks;

pub use base_init::*;
pub use config::*;
pub use create::*;
pub use delete::*;
pub use detect::*;
pub use run::*;
pub use session::*;
pub use status::*;
pub use winetricks::*;
