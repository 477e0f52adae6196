mod build_env;
mod host_facts;
mod target;

pub use build_env::*;
pub use host_facts::*;
pub use target::*;
