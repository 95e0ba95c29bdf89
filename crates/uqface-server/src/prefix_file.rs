//! The "prefix response file": a pre-canned byte sequence streamed verbatim
//! whenever a request's magic number does not match, for byte-for-byte
//! compatibility with an existing reference implementation.

use std::path::Path;
use std::sync::Arc;

/// Loaded once at startup; shared read-only across every worker task.
#[derive(Debug, Clone)]
pub struct PrefixResponse {
    bytes: Arc<[u8]>,
}

impl PrefixResponse {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self { bytes: Arc::from(bytes) })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
