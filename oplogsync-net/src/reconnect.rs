// Reconnect-with-retry: dial a session, retrying indefinitely on failure.
// The 3 s connect timeout itself paces the retry loop, so no additional
// backoff is layered on top -- a fast-failing dial (connection refused)
// still only retries a few times a second, and a slow one (server down,
// TCP SYN blackholed) is already throttled by the timeout.

use std::time::Duration;

use tracing::warn;

use crate::driver::{Driver, Session};

pub async fn reconnect(driver: &dyn Driver, hostport: &str, connect_timeout: Duration) -> Box<dyn Session> {
    loop {
        match driver.dial(hostport, connect_timeout).await {
            Ok(session) => return session,
            Err(e) => {
                warn!(target: "oplogsync", hostport, error = %e, "reconnect failed, retrying");
            }
        }
    }
}
