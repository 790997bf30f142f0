mod driver;
mod mongo;
mod reconnect;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use driver::{
    Collection, Database, Driver, DriverError, DriverResult, DocumentCursor, Session, TailableCursor,
};
pub use mongo::{primary_read_preference, MongoDriver};
pub use reconnect::reconnect;
