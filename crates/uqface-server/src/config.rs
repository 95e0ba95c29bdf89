//! Immutable server configuration, built once from validated CLI input.

/// Bind port requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedPort {
    /// Ask the OS for an ephemeral port.
    Ephemeral,
    /// Bind exactly this port.
    Fixed(u16),
}

/// Configuration the acceptor and every worker task share, via `Arc`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `0` means admission limiting is disabled; otherwise 1..=10000.
    pub max_connections: u32,
    /// `0` on the command line is promoted to `u32::MAX` ("no cap").
    pub max_image_bytes: u32,
    pub port: RequestedPort,
    pub face_cascade_path: std::path::PathBuf,
    pub eye_cascade_path: std::path::PathBuf,
    pub scratch_path: std::path::PathBuf,
    pub prefix_response_path: std::path::PathBuf,
}

impl ServerConfig {
    #[must_use]
    pub fn admission_limited(&self) -> bool {
        self.max_connections != 0
    }
}
