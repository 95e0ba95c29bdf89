//! Frame types and wire encode/decode.
//!
//! # Wire format
//!
//! ```text
//! magic   : u32 little-endian, always 0x2310_7231
//! op      : u8
//! len1    : u32 little-endian
//! payload1: [u8; len1]
//! -- present only when op == 1 (replace request) --
//! len2    : u32 little-endian
//! payload2: [u8; len2]
//! ```
//!
//! Decoding is strictly sequential: magic, then op, then len1, then
//! payload1, then (conditionally) len2/payload2. There is no lookahead and
//! no alignment padding between fields.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol magic number, little-endian on the wire.
pub const MAGIC: u32 = 0x2310_7231;

const OP_DETECT: u8 = 0;
const OP_REPLACE: u8 = 1;
const OP_IMAGE: u8 = 2;
const OP_ERROR: u8 = 3;

/// A single protocol message, request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Request: detect faces in `image`.
    Detect {
        /// JPEG bytes of the primary image.
        image: Vec<u8>,
    },
    /// Request: detect faces in `image` and replace each with `replacement`.
    Replace {
        /// JPEG bytes of the primary image.
        image: Vec<u8>,
        /// JPEG bytes of the replacement image.
        replacement: Vec<u8>,
    },
    /// Response: a result JPEG.
    ImageResult {
        /// JPEG bytes of the annotated or replaced image.
        jpeg: Vec<u8>,
    },
    /// Response: a UTF-8 error message (no trailing newline).
    Error {
        /// Human-readable error text.
        message: String,
    },
}

impl Frame {
    /// Wire `op` byte for this frame.
    #[must_use]
    pub fn op(&self) -> u8 {
        match self {
            Self::Detect { .. } => OP_DETECT,
            Self::Replace { .. } => OP_REPLACE,
            Self::ImageResult { .. } => OP_IMAGE,
            Self::Error { .. } => OP_ERROR,
        }
    }

    /// Build an error response frame from a literal message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Encode this frame to `writer` per the wire format above.
    pub async fn encode<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&MAGIC.to_le_bytes()).await?;
        writer.write_u8(self.op()).await?;

        match self {
            Self::Detect { image } | Self::ImageResult { jpeg: image } => {
                write_payload(writer, image).await?;
            },
            Self::Replace { image, replacement } => {
                write_payload(writer, image).await?;
                write_payload(writer, replacement).await?;
            },
            Self::Error { message } => {
                write_payload(writer, message.as_bytes()).await?;
            },
        }

        writer.flush().await
    }
}

async fn write_payload<W>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(bytes).await
}

/// Failure while decoding a request frame (server side).
///
/// Each variant corresponds 1:1 to a row of the request state machine's
/// transition table; callers translate these directly into the exact
/// response text the protocol requires.
#[derive(Debug, Error)]
pub enum RequestError {
    /// A read ended (EOF or I/O error) before the expected bytes arrived.
    #[error("short read")]
    ShortRead,
    /// The magic prefix did not match [`MAGIC`].
    #[error("bad magic")]
    BadMagic,
    /// The `op` byte was neither 0 (detect) nor 1 (replace).
    #[error("unknown op: {0}")]
    UnknownOp(u8),
    /// A length field was zero.
    #[error("zero-length payload")]
    ZeroLength,
    /// A length field exceeded the caller-supplied maximum.
    #[error("payload length {0} exceeds maximum")]
    TooLarge(u32),
}

/// The primary-image portion of a request: magic, op, len1, payload1.
///
/// A replace request's second payload (`len2`/`payload2`, the replacement
/// image) is deliberately not part of this type. The request state machine
/// only reads it after the primary image has been decoded and found to
/// contain at least one face — see [`read_replacement_payload`] and
/// `uqface-server::worker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestHead {
    /// Request: detect faces in `image`.
    Detect {
        /// JPEG bytes of the primary image.
        image: Vec<u8>,
    },
    /// Request: detect faces in `image`, then replace each with a second
    /// image the caller must read separately via [`read_replacement_payload`].
    Replace {
        /// JPEG bytes of the primary image.
        image: Vec<u8>,
    },
}

/// Read one request's primary-image portion, enforcing `max_image_bytes`.
/// Stops at the first failure — this function embodies the `AWAIT_FRAME`
/// through `DECODE1` states of the request state machine. For a replace
/// request, the caller must not read the replacement payload until the
/// primary image has been found to contain a face; see
/// [`read_replacement_payload`].
pub async fn read_request<R>(reader: &mut R, max_image_bytes: u32) -> Result<RequestHead, RequestError>
where
    R: AsyncRead + Unpin,
{
    let magic = read_u32(reader).await?;
    if magic != MAGIC {
        return Err(RequestError::BadMagic);
    }

    let op = reader.read_u8().await.map_err(|_| RequestError::ShortRead)?;
    if op != OP_DETECT && op != OP_REPLACE {
        return Err(RequestError::UnknownOp(op));
    }

    let image = read_bounded_payload(reader, max_image_bytes).await?;

    if op == OP_REPLACE {
        Ok(RequestHead::Replace { image })
    } else {
        Ok(RequestHead::Detect { image })
    }
}

/// Read a replace request's second payload (`len2`/`payload2`, the
/// replacement image). Callers must only invoke this once they have
/// committed to the `AWAIT_SIZE2` state — i.e. after the primary image from
/// [`read_request`] decoded successfully and `find_faces` returned at least
/// one face. Reading it any earlier would let a malformed or oversized
/// replacement payload preempt the "no faces detected" response the state
/// machine requires when the primary image has none.
pub async fn read_replacement_payload<R>(
    reader: &mut R,
    max_image_bytes: u32,
) -> Result<Vec<u8>, RequestError>
where
    R: AsyncRead + Unpin,
{
    read_bounded_payload(reader, max_image_bytes).await
}

async fn read_bounded_payload<R>(reader: &mut R, max_bytes: u32) -> Result<Vec<u8>, RequestError>
where
    R: AsyncRead + Unpin,
{
    let len = read_u32(reader).await?;
    if len == 0 {
        return Err(RequestError::ZeroLength);
    }
    if len > max_bytes {
        return Err(RequestError::TooLarge(len));
    }

    let mut buf = vec![0_u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(|_| RequestError::ShortRead)?;
    Ok(buf)
}

async fn read_u32<R>(reader: &mut R) -> Result<u32, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0_u8; 4];
    reader.read_exact(&mut buf).await.map_err(|_| RequestError::ShortRead)?;
    Ok(u32::from_le_bytes(buf))
}

/// Failure while decoding a response frame (client side).
///
/// The client treats every variant identically: a communication error,
/// distinct only from a well-formed `op=3` server error. See
/// `uqface-client::driver`.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// A read ended (EOF or I/O error) before the expected bytes arrived.
    #[error("short read")]
    ShortRead,
    /// The magic prefix did not match [`MAGIC`].
    #[error("bad magic")]
    BadMagic,
    /// The `op` byte was neither 2 (image) nor 3 (error).
    #[error("unknown op: {0}")]
    UnknownOp(u8),
}

/// Read one response frame (image result or error) from `reader`.
pub async fn read_response<R>(reader: &mut R) -> Result<Frame, ResponseError>
where
    R: AsyncRead + Unpin,
{
    let mut magic_buf = [0_u8; 4];
    reader.read_exact(&mut magic_buf).await.map_err(|_| ResponseError::ShortRead)?;
    if u32::from_le_bytes(magic_buf) != MAGIC {
        return Err(ResponseError::BadMagic);
    }

    let op = reader.read_u8().await.map_err(|_| ResponseError::ShortRead)?;

    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(|_| ResponseError::ShortRead)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload).await.map_err(|_| ResponseError::ShortRead)?;

    match op {
        OP_IMAGE => Ok(Frame::ImageResult { jpeg: payload }),
        OP_ERROR => Ok(Frame::Error {
            message: String::from_utf8_lossy(&payload).into_owned(),
        }),
        other => Err(ResponseError::UnknownOp(other)),
    }
}
