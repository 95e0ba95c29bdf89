//! Bounded-transfer I/O helpers.
//!
//! These exist as a named seam (mirroring the reference implementation's
//! `read_exact`/`send_exact`/`write_exact`) even though `tokio::io`'s own
//! `AsyncReadExt::read_exact` / `AsyncWriteExt::write_all` already provide
//! the "loop until all bytes transferred or a short read/write fails the
//! whole operation" contract required here. There is no broken-pipe signal
//! to suppress on this platform: Rust never installs a `SIGPIPE`-terminates
//! disposition, so a write to a peer that has closed its read side simply
//! surfaces as `Err(io::Error)` from `write_all`, which [`send_exact`]
//! propagates like any other I/O failure.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read exactly `buf.len()` bytes, or fail the whole operation.
pub async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    reader.read_exact(buf).await.map(|_| ())
}

/// Write exactly `bytes` to `writer`, or fail the whole operation.
///
/// Named `send_exact` to match the socket-send side of the reference
/// implementation's helper pair; behaves identically to [`write_exact`].
pub async fn send_exact<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await
}

/// Write exactly `bytes` to `writer`, or fail the whole operation.
pub async fn write_exact<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await
}
