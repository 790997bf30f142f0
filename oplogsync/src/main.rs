use std::process::ExitCode;
use std::sync::Arc;

use oplogsync_net::MongoDriver;
use oplogsync_ui::Cli;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    oplogsync_ui::init_logging(&cli);

    let src_driver: Arc<dyn oplogsync_net::Driver> = Arc::new(MongoDriver);
    let dst_driver: Arc<dyn oplogsync_net::Driver> = Arc::new(MongoDriver);

    match oplogsync::run(&cli, src_driver, dst_driver).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: "oplogsync", error = ?e, "fatal");
            ExitCode::FAILURE
        }
    }
}
