//! The per-connection request state machine (section 4.4).
//!
//! One task per accepted connection. On any failure the worker sends the
//! response the transition table calls for, then terminates — there is no
//! partial-response recovery. On success it loops back to await the next
//! request on the same socket.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;

use uqface_core::{ColorMode, DetectError, Detector, Rect, Stats};
use uqface_proto::{read_replacement_payload, read_request, Frame as WireFrame, RequestError, RequestHead};

use crate::prefix_file::PrefixResponse;

/// Resources a worker needs, shared read-only (or internally synchronized)
/// across every connection.
pub struct SharedState<D: Detector> {
    pub detector: Arc<D>,
    pub stats: Arc<Stats>,
    pub prefix_response: PrefixResponse,
    pub max_image_bytes: u32,
}

/// Either no face was found, or the finished response JPEG.
enum Outcome {
    NoFaces,
    Image(Vec<u8>),
}

/// Run the request loop for one accepted connection until the peer closes
/// or a protocol error ends it. `permit`, if present, is released (via
/// `Drop`) when this function returns on any path, including early return.
///
/// The caller (the acceptor) has already counted this connection as
/// connected; this function is responsible only for counting it as
/// completed, unconditionally, on every exit path.
pub async fn run<D>(stream: TcpStream, shared: Arc<SharedState<D>>, _permit: Option<OwnedSemaphorePermit>)
where
    D: Detector + 'static,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        match read_request(&mut reader, shared.max_image_bytes).await {
            Ok(RequestHead::Detect { image }) => {
                if !handle_detect(&shared, &mut write_half, image).await {
                    break;
                }
            },
            Ok(RequestHead::Replace { image }) => {
                if !handle_replace(&shared, &mut reader, &mut write_half, image).await {
                    break;
                }
            },
            Err(RequestError::BadMagic) => {
                let _ = write_half.write_all(shared.prefix_response.bytes()).await;
                let _ = write_half.flush().await;
                shared.stats.malformed_request();
                break;
            },
            Err(other) => {
                send_error(&mut write_half, request_error_text(&other)).await;
                break;
            },
        }
    }

    shared.stats.client_completed();
}

fn request_error_text(err: &RequestError) -> &'static str {
    match err {
        RequestError::ShortRead => "invalid message",
        RequestError::UnknownOp(_) => "invalid operation type",
        RequestError::ZeroLength => "image is 0 bytes",
        RequestError::TooLarge(_) => "image too large",
        RequestError::BadMagic => unreachable!("handled by the caller before this match"),
    }
}

/// Handle a detect request end to end. Returns `false` if the connection
/// should end.
async fn handle_detect<D, W>(shared: &Arc<SharedState<D>>, write_half: &mut W, image: Vec<u8>) -> bool
where
    D: Detector + 'static,
    W: AsyncWrite + Unpin,
{
    let detector = Arc::clone(&shared.detector);
    let outcome = run_blocking(move || {
        let mut frame = detector.decode_jpeg(&image, ColorMode::Color)?;
        let faces = detector.find_faces(&frame)?;
        if faces.is_empty() {
            return Ok(Outcome::NoFaces);
        }
        detector.annotate(&mut frame, &faces)?;
        Ok(Outcome::Image(detector.encode_jpeg(&frame)?))
    })
    .await;

    match finish(write_half, outcome).await {
        Some(true) => {
            shared.stats.face_detect_ok();
            true
        },
        Some(false) => false,
        None => false,
    }
}

/// Handle a replace request end to end. Returns `false` if the connection
/// should end.
///
/// The replacement image's length/payload (`len2`/`payload2`) is read from
/// `reader` only after the primary image has decoded and `find_faces` has
/// returned at least one face — reading it any earlier would let a
/// malformed or oversized replacement payload preempt the "no faces
/// detected" response the request state machine requires when the primary
/// image has none.
async fn handle_replace<D, R, W>(
    shared: &Arc<SharedState<D>>,
    reader: &mut R,
    write_half: &mut W,
    image: Vec<u8>,
) -> bool
where
    D: Detector + 'static,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let detector = Arc::clone(&shared.detector);
    let primary = run_blocking(move || {
        let frame = detector.decode_jpeg(&image, ColorMode::Color)?;
        let faces = detector.find_faces(&frame)?;
        if faces.is_empty() {
            return Ok(None);
        }
        Ok(Some((frame, faces)))
    })
    .await;

    let (frame, faces) = match primary {
        Ok(Some(found)) => found,
        Ok(None) => {
            send_error(write_half, "no faces detected in image").await;
            return false;
        },
        Err(_) => {
            send_error(write_half, "invalid image").await;
            return false;
        },
    };

    let replacement = match read_replacement_payload(reader, shared.max_image_bytes).await {
        Ok(replacement) => replacement,
        Err(err) => {
            send_error(write_half, request_error_text(&err)).await;
            return false;
        },
    };

    let detector = Arc::clone(&shared.detector);
    let outcome = run_blocking(move || {
        let replacement_frame = detector.decode_jpeg(&replacement, ColorMode::Unchanged)?;
        let mut frame = frame;
        detector.composite(&mut frame, &faces, &replacement_frame)?;
        Ok(Outcome::Image(detector.encode_jpeg(&frame)?))
    })
    .await;

    match finish(write_half, outcome).await {
        Some(true) => {
            shared.stats.face_replace_ok();
            true
        },
        Some(false) => false,
        None => false,
    }
}

/// Send the appropriate response for a detector outcome.
///
/// Returns `Some(true)` on a successful image response, `Some(false)` when
/// "no faces" ended the connection, and `None` when a detector error ended
/// it (every detector error maps to "invalid image" — the only CV failure
/// the protocol names).
async fn finish<W>(write_half: &mut W, outcome: Result<Outcome, DetectError>) -> Option<bool>
where
    W: AsyncWrite + Unpin,
{
    match outcome {
        Ok(Outcome::Image(jpeg)) => {
            send_image(write_half, jpeg).await;
            Some(true)
        },
        Ok(Outcome::NoFaces) => {
            send_error(write_half, "no faces detected in image").await;
            Some(false)
        },
        Err(_) => {
            send_error(write_half, "invalid image").await;
            None
        },
    }
}

/// Run `f` on a blocking thread. A panic inside `f` (e.g. an OpenCV FFI
/// abort path) surfaces as a backend error rather than poisoning the
/// worker task.
async fn run_blocking<F, T>(f: F) -> Result<T, DetectError>
where
    F: FnOnce() -> Result<T, DetectError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(_join_err) => Err(DetectError::Backend("detector task panicked".to_owned())),
    }
}

async fn send_error<W>(write_half: &mut W, message: &str)
where
    W: AsyncWrite + Unpin,
{
    let _ = WireFrame::error(message).encode(write_half).await;
}

async fn send_image<W>(write_half: &mut W, jpeg: Vec<u8>)
where
    W: AsyncWrite + Unpin,
{
    let _ = WireFrame::ImageResult { jpeg }.encode(write_half).await;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use uqface_core::{ImageFrame, Rect, Stats};
    use uqface_proto::{read_response, Frame};

    use super::{handle_detect, handle_replace, SharedState};
    use crate::prefix_file::PrefixResponse;

    struct FakeFrame {
        faces_to_find: usize,
    }

    impl ImageFrame for FakeFrame {
        fn width(&self) -> i32 {
            100
        }
        fn height(&self) -> i32 {
            100
        }
    }

    /// A detector whose behavior is driven entirely by the bytes it is
    /// asked to decode: the first byte selects how many faces are "found".
    struct FakeDetector {
        calls: AtomicUsize,
    }

    impl FakeDetector {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    impl uqface_core::Detector for FakeDetector {
        type Frame = FakeFrame;

        fn decode_jpeg(
            &self,
            bytes: &[u8],
            _color: uqface_core::ColorMode,
        ) -> Result<Self::Frame, uqface_core::DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if bytes.first() == Some(&0xFF) {
                return Err(uqface_core::DetectError::InvalidImage);
            }
            let faces_to_find = bytes.first().copied().unwrap_or(0) as usize;
            Ok(FakeFrame { faces_to_find })
        }

        fn find_faces(&self, frame: &Self::Frame) -> Result<Vec<Rect>, uqface_core::DetectError> {
            Ok((0..frame.faces_to_find)
                .map(|i| Rect { x: i as i32 * 10, y: 0, width: 10, height: 10 })
                .collect())
        }

        fn annotate(&self, _frame: &mut Self::Frame, _faces: &[Rect]) -> Result<(), uqface_core::DetectError> {
            Ok(())
        }

        fn composite(
            &self,
            _frame: &mut Self::Frame,
            _faces: &[Rect],
            _replacement: &Self::Frame,
        ) -> Result<(), uqface_core::DetectError> {
            Ok(())
        }

        fn encode_jpeg(&self, _frame: &Self::Frame) -> Result<Vec<u8>, uqface_core::DetectError> {
            Ok(vec![0xFF, 0xD8, 0xFF])
        }
    }

    fn shared_state() -> Arc<SharedState<FakeDetector>> {
        let dir = tempfile::tempdir().expect("tempdir");
        let prefix_path = dir.path().join("prefix.bin");
        std::fs::write(&prefix_path, b"legacy").expect("write prefix");
        Arc::new(SharedState {
            detector: Arc::new(FakeDetector::new()),
            stats: Arc::new(Stats::new()),
            prefix_response: PrefixResponse::load(&prefix_path).expect("load prefix"),
            max_image_bytes: 4096,
        })
    }

    async fn decode_response(buf: &[u8]) -> Frame {
        let mut cursor = std::io::Cursor::new(buf.to_vec());
        read_response(&mut cursor).await.expect("response decodes")
    }

    /// Wire-encode a single length-prefixed payload (`len2`/`payload2`), for
    /// feeding `handle_replace`'s reader directly in tests.
    fn encode_len_prefixed(bytes: &[u8]) -> Vec<u8> {
        let len = u32::try_from(bytes.len()).expect("test payload fits in u32");
        let mut buf = Vec::with_capacity(4 + bytes.len());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(bytes);
        buf
    }

    #[tokio::test]
    async fn detect_request_with_one_face_yields_image_response() {
        let shared = shared_state();
        let mut out = Vec::new();

        let sent = handle_detect(&shared, &mut out, vec![1, 2, 3]).await;

        assert!(sent);
        assert!(matches!(decode_response(&out).await, Frame::ImageResult { .. }));
        assert_eq!(shared.stats.snapshot().face_detect_ok, 1);
    }

    #[tokio::test]
    async fn detect_request_with_no_faces_yields_error_response() {
        let shared = shared_state();
        let mut out = Vec::new();

        let sent = handle_detect(&shared, &mut out, vec![0, 2, 3]).await;

        assert!(!sent);
        assert_eq!(decode_response(&out).await, Frame::error("no faces detected in image"));
        assert_eq!(shared.stats.snapshot().face_detect_ok, 0);
    }

    #[tokio::test]
    async fn detect_request_with_undecodable_image_yields_invalid_image() {
        let shared = shared_state();
        let mut out = Vec::new();

        let sent = handle_detect(&shared, &mut out, vec![0xFF, 2, 3]).await;

        assert!(!sent);
        assert_eq!(decode_response(&out).await, Frame::error("invalid image"));
    }

    #[tokio::test]
    async fn replace_request_with_one_face_yields_image_response() {
        let shared = shared_state();
        let mut out = Vec::new();
        let mut reader = std::io::Cursor::new(encode_len_prefixed(&[9, 9, 9]));

        let sent = handle_replace(&shared, &mut reader, &mut out, vec![2, 0, 0]).await;

        assert!(sent);
        assert!(matches!(decode_response(&out).await, Frame::ImageResult { .. }));
        assert_eq!(shared.stats.snapshot().face_replace_ok, 1);
    }

    #[tokio::test]
    async fn replace_request_with_no_faces_never_reads_the_replacement_payload() {
        let shared = shared_state();
        let mut out = Vec::new();
        // A zero-length payload would be rejected by `read_replacement_payload`
        // on its own, but with no faces in the primary image it must never be
        // read at all — the "no faces detected" response wins regardless of
        // what the replacement payload looks like.
        let mut reader = std::io::Cursor::new(encode_len_prefixed(&[]));

        let sent = handle_replace(&shared, &mut reader, &mut out, vec![0, 0, 0]).await;

        assert!(!sent);
        assert_eq!(decode_response(&out).await, Frame::error("no faces detected in image"));
        assert_eq!(shared.stats.snapshot().face_replace_ok, 0);
    }

    #[tokio::test]
    async fn replace_request_with_undecodable_primary_image_never_reads_the_replacement_payload() {
        let shared = shared_state();
        let mut out = Vec::new();
        let mut reader = std::io::Cursor::new(encode_len_prefixed(&[]));

        let sent = handle_replace(&shared, &mut reader, &mut out, vec![0xFF, 0, 0]).await;

        assert!(!sent);
        assert_eq!(decode_response(&out).await, Frame::error("invalid image"));
        assert_eq!(shared.stats.snapshot().face_replace_ok, 0);
    }
}
