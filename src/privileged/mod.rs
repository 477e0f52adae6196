mod executor;
mod runner;

pub use executor::*;
pub use runner::*;
