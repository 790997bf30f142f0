mod error;
mod namespace;
mod position;

pub use error::{err, Error, Result};
pub use namespace::Namespace;
pub use position::LogPosition;
