mod cli;
mod hostport;
mod logging;

pub use cli::{Cli, LogFormat};
pub use hostport::parse_hostport;
pub use logging::init as init_logging;
