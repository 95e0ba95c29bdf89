//! The connection acceptor (section 4.5).
//!
//! Blocks on the admission semaphore, if one is configured, before calling
//! `accept`, so the number of in-flight accepted-but-not-yet-spawned
//! connections also counts against the cap. Failure to accept is logged
//! and does not stop the acceptor.
//!
//! `current_clients` is incremented here, synchronously, right after
//! `accept` succeeds — not inside the spawned worker task. `tokio::spawn`
//! only schedules a task; incrementing from the worker's first line would
//! leave a real window between a successful accept and that task's first
//! poll during which the connection is counted in neither `current_clients`
//! nor `completed_clients`, which could violate `current_clients +
//! completed_clients == total_accepted` if the statistics reporter samples
//! during that window.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use uqface_core::Detector;

use crate::worker::{self, SharedState};

/// Run the accept loop forever. Returns only if the listener itself is
/// unusable (never observed in practice once `bind` has succeeded).
pub async fn run<D>(
    listener: TcpListener,
    shared: Arc<SharedState<D>>,
    admission: Option<Arc<Semaphore>>,
) where
    D: Detector + 'static,
{
    loop {
        let permit = match &admission {
            Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_closed) => {
                    tracing::error!("admission semaphore closed; acceptor stopping");
                    return;
                },
            },
            None => None,
        };

        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "accepted connection");
                shared.stats.client_connected();
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    worker::run(stream, shared, permit).await;
                });
            },
            Err(err) => {
                tracing::warn!(error = %err, "accept failed; continuing");
            },
        }
    }
}
