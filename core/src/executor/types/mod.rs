pub mod context;
pub mod result;
pub mod step;

pub use context::*;
pub use result::*;
pub use step::*;
