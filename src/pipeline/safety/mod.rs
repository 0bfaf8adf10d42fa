pub mod emergency;
pub mod sanitize;

pub use emergency::*;
pub use sanitize::*;
