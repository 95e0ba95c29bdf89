//! End-to-end scenarios against a real bound `TcpListener`, using a fake
//! detector so the test suite does not depend on OpenCV or classifier
//! files being present.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpStream;

use uqface_core::{ColorMode, DetectError, Detector, ImageFrame, Rect};
use uqface_proto::{read_response, Frame};
use uqface_server::config::{RequestedPort, ServerConfig};
use uqface_server::BoundServer;

struct FakeFrame {
    faces: usize,
}

impl ImageFrame for FakeFrame {
    fn width(&self) -> i32 {
        64
    }
    fn height(&self) -> i32 {
        64
    }
}

/// The first byte of a submitted image selects how many faces the fake
/// detector reports finding; a first byte of `0xFF` simulates a decode
/// failure.
struct FakeDetector;

impl Detector for FakeDetector {
    type Frame = FakeFrame;

    fn decode_jpeg(&self, bytes: &[u8], _color: ColorMode) -> Result<Self::Frame, DetectError> {
        match bytes.first() {
            Some(&0xFF) => Err(DetectError::InvalidImage),
            Some(&n) => Ok(FakeFrame { faces: n as usize }),
            None => Ok(FakeFrame { faces: 0 }),
        }
    }

    fn find_faces(&self, frame: &Self::Frame) -> Result<Vec<Rect>, DetectError> {
        Ok((0..frame.faces).map(|i| Rect { x: i as i32 * 8, y: 0, width: 8, height: 8 }).collect())
    }

    fn annotate(&self, _frame: &mut Self::Frame, _faces: &[Rect]) -> Result<(), DetectError> {
        Ok(())
    }

    fn composite(
        &self,
        _frame: &mut Self::Frame,
        _faces: &[Rect],
        _replacement: &Self::Frame,
    ) -> Result<(), DetectError> {
        Ok(())
    }

    fn encode_jpeg(&self, _frame: &Self::Frame) -> Result<Vec<u8>, DetectError> {
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }
}

struct TestServer {
    addr: std::net::SocketAddr,
    stats: Arc<uqface_core::Stats>,
}

async fn spawn_server(max_connections: u32, max_image_bytes: u32) -> TestServer {
    let dir = tempfile::tempdir().expect("tempdir");
    let scratch = dir.path().join("scratch.jpg");
    let prefix = dir.path().join("prefix.bin");
    std::fs::write(&prefix, b"PREFIX-RESPONSE-BYTES").expect("write prefix");

    let config = ServerConfig {
        max_connections,
        max_image_bytes,
        port: RequestedPort::Ephemeral,
        face_cascade_path: PathBuf::new(),
        eye_cascade_path: PathBuf::new(),
        scratch_path: scratch,
        prefix_response_path: prefix,
    };

    let server = BoundServer::bind(&config, FakeDetector).await.expect("bind");
    let addr = server.local_addr().expect("local addr");
    let stats = server.stats();

    tokio::spawn(server.serve());

    // Leak the tempdir's path lifetime for the duration of the test process;
    // the directory is cleaned up by the OS at process exit either way.
    std::mem::forget(dir);

    TestServer { addr, stats }
}

#[tokio::test]
async fn detect_happy_path_increments_face_detect_ok() {
    let server = spawn_server(0, u32::MAX).await;
    let mut stream = TcpStream::connect(server.addr).await.expect("connect");

    Frame::Detect { image: vec![1, 2, 3] }.encode(&mut stream).await.expect("send");
    let response = read_response(&mut stream).await.expect("response");

    assert!(matches!(response, Frame::ImageResult { .. }));
    assert_eq!(server.stats.snapshot().face_detect_ok, 1);
}

#[tokio::test]
async fn replace_happy_path_increments_face_replace_ok() {
    let server = spawn_server(0, u32::MAX).await;
    let mut stream = TcpStream::connect(server.addr).await.expect("connect");

    Frame::Replace { image: vec![2, 0], replacement: vec![5, 5] }
        .encode(&mut stream)
        .await
        .expect("send");
    let response = read_response(&mut stream).await.expect("response");

    assert!(matches!(response, Frame::ImageResult { .. }));
    assert_eq!(server.stats.snapshot().face_replace_ok, 1);
}

#[tokio::test]
async fn bad_magic_streams_prefix_response_verbatim() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let server = spawn_server(0, u32::MAX).await;
    let mut stream = TcpStream::connect(server.addr).await.expect("connect");

    stream.write_all(&[0, 0, 0, 0]).await.expect("write bad magic");
    stream.shutdown().await.expect("shutdown write side");

    let mut received = Vec::new();
    stream.read_to_end(&mut received).await.expect("read");

    assert_eq!(received, b"PREFIX-RESPONSE-BYTES");
    assert_eq!(server.stats.snapshot().malformed_requests, 1);
}

#[tokio::test]
async fn no_faces_yields_error_response() {
    let server = spawn_server(0, u32::MAX).await;
    let mut stream = TcpStream::connect(server.addr).await.expect("connect");

    Frame::Detect { image: vec![0, 0] }.encode(&mut stream).await.expect("send");
    let response = read_response(&mut stream).await.expect("response");

    assert_eq!(response, Frame::error("no faces detected in image"));
}

#[tokio::test]
async fn oversize_image_is_rejected_before_payload_completes() {
    let server = spawn_server(0, 1024).await;
    let mut stream = TcpStream::connect(server.addr).await.expect("connect");

    use tokio::io::AsyncWriteExt;
    stream.write_all(&uqface_proto::MAGIC.to_le_bytes()).await.expect("magic");
    stream.write_all(&[0]).await.expect("op");
    stream.write_all(&2000_u32.to_le_bytes()).await.expect("len");

    let response = read_response(&mut stream).await.expect("response");
    assert_eq!(response, Frame::error("image too large"));
}

#[tokio::test]
async fn replace_with_no_faces_in_primary_yields_no_faces_response_even_with_a_bad_replacement() {
    let server = spawn_server(0, u32::MAX).await;
    let mut stream = TcpStream::connect(server.addr).await.expect("connect");

    // image=[0] finds no faces; replacement=[] is zero-length, which would
    // normally be its own protocol error — but it must never be read, since
    // the transition table requires the "no faces detected" response the
    // moment the primary image comes back face-less.
    Frame::Replace { image: vec![0], replacement: vec![] }.encode(&mut stream).await.expect("send");
    let response = read_response(&mut stream).await.expect("response");

    assert_eq!(response, Frame::error("no faces detected in image"));
}

#[tokio::test]
async fn persistent_connection_serves_multiple_requests() {
    let server = spawn_server(0, u32::MAX).await;
    let mut stream = TcpStream::connect(server.addr).await.expect("connect");

    for _ in 0..3 {
        Frame::Detect { image: vec![1] }.encode(&mut stream).await.expect("send");
        let response = read_response(&mut stream).await.expect("response");
        assert!(matches!(response, Frame::ImageResult { .. }));
    }

    assert_eq!(server.stats.snapshot().face_detect_ok, 3);
}

