//! Library surface for the `uqfaceserver` binary, split out so integration
//! tests can drive the server without spawning a subprocess.

pub mod acceptor;
pub mod cli;
pub mod config;
pub mod error;
pub mod prefix_file;
pub mod worker;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use uqface_core::{Detector, Stats};

use config::{RequestedPort, ServerConfig};
use error::ServerError;
use prefix_file::PrefixResponse;
use worker::SharedState;

/// Preflight-checked, bound server ready to run. Building one performs all
/// of startup's fallible work; `run` itself never fails.
pub struct BoundServer<D: Detector> {
    listener: TcpListener,
    shared: Arc<SharedState<D>>,
    stats: Arc<Stats>,
    admission: Option<Arc<Semaphore>>,
}

impl<D> BoundServer<D>
where
    D: Detector + 'static,
{
    /// Run preflight (scratch file writable, prefix file loadable, port
    /// bindable) and construct the shared worker state.
    pub async fn bind(config: &ServerConfig, detector: D) -> Result<Self, ServerError> {
        preflight_scratch_file(&config.scratch_path)?;

        let prefix_response = PrefixResponse::load(&config.prefix_response_path)
            .map_err(ServerError::PrefixResponseUnreadable)?;

        let bind_addr = match config.port {
            RequestedPort::Ephemeral => "127.0.0.1:0".to_owned(),
            RequestedPort::Fixed(port) => format!("127.0.0.1:{port}"),
        };
        let listener =
            TcpListener::bind(&bind_addr).await.map_err(ServerError::PortUnavailable)?;

        let stats = Arc::new(Stats::new());
        let admission = if config.admission_limited() {
            Some(Arc::new(Semaphore::new(config.max_connections as usize)))
        } else {
            None
        };

        let shared = Arc::new(SharedState {
            detector: Arc::new(detector),
            stats: Arc::clone(&stats),
            prefix_response,
            max_image_bytes: config.max_image_bytes,
        });

        Ok(Self { listener, shared, stats, admission })
    }

    /// The actual bound local address (meaningful for ephemeral ports).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared statistics handle, for wiring up a reporter.
    #[must_use]
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Run the accept loop forever.
    pub async fn serve(self) {
        acceptor::run(self.listener, self.shared, self.admission).await;
    }
}

fn preflight_scratch_file(path: &std::path::Path) -> Result<(), ServerError> {
    std::fs::write(path, []).map_err(ServerError::ScratchNotWritable)
}
