//! Process shutdown plumbing.
//!
//! The storage core never installs signal handlers on its own. A host that
//! wants the database closed on termination awaits [`shutdown_signal`] (for
//! example as a server's graceful-shutdown future) and then calls
//! [`Store::close`](crate::store::Store::close). Test harnesses that manage
//! their own lifecycle simply don't.

use log::{info, warn};
use tokio::signal;

/// Resolves when the process receives Ctrl-C, or SIGTERM on Unix.
///
/// If a handler cannot be installed, that signal is ignored and the future
/// keeps waiting on the other one.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
