//! TCP accept loop.

use crate::commands::Dispatcher;
use crate::connection::handle_connection;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Accepts clients until `shutdown` completes, one task per connection.
///
/// Connections already running are left to finish on their own.
pub async fn serve(listener: TcpListener, dispatcher: Dispatcher, shutdown: impl Future) {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Accepting connections");
    }

    tokio::select! {
        _ = accept_loop(&listener, &dispatcher) => {}
        _ = shutdown => {
            info!("Shutdown signal received, no longer accepting connections");
        }
    }
}

async fn accept_loop(listener: &TcpListener, dispatcher: &Dispatcher) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, dispatcher.clone()));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
