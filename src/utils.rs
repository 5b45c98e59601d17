//utils for graceful shutdown: ctrl-c cancels whatever batch holds the token
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Must be called from within a tokio runtime.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    //spawn once to listen for ctrl-c
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("ctrl-c received, cancelling batch");
                tc.cancel();
            }
            Err(err) => error!(%err, "failed to install ctrl-c handler"),
        }
    });
    token
}
