use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Token cancelled on the first Ctrl+C. Workers observe it between pages so
/// an interrupted crawl leaves a resumable checkpoint.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cloned_token = token.clone();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Received Ctrl+C. Finishing current pages and saving progress...");
                cloned_token.cancel();
            }
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });

    token
}
