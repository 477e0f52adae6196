mod filesystem_kind;
mod mount_table;
mod strategy;

pub use filesystem_kind::*;
pub use mount_table::*;
pub use strategy::*;
