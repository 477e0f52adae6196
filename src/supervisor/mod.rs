mod batch;
mod child;
mod decode;
mod errors;
mod scan;
mod session;

pub use child::{LaunchSpec, PipeChild, PtyChild, ReadStatus, SupervisedChild};
pub use errors::*;
pub use scan::*;
pub use session::*;
