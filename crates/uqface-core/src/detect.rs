//! The detector facade: everything the rest of the server knows about the
//! computer-vision backend.
//!
//! `Detector` is the seam between protocol-level request handling and the
//! external CV library. Production code runs against [`OpenCvDetector`];
//! tests substitute a fake implementation so the request state machine can
//! be exercised without a classifier file or a working OpenCV install.

use thiserror::Error;

/// An axis-aligned rectangle in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge, in pixels from the image origin.
    pub x: i32,
    /// Top edge, in pixels from the image origin.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Center point of the rectangle.
    #[must_use]
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Whether a decoded image should keep its alpha channel.
///
/// The primary (detect/replace target) image is always decoded in color,
/// discarding alpha; the replacement image is decoded unchanged so
/// `composite` can honor per-pixel transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Force a 3-channel BGR frame (`IMREAD_COLOR`).
    Color,
    /// Preserve the source channel count, including alpha if present
    /// (`IMREAD_UNCHANGED`).
    Unchanged,
}

/// An in-memory decoded image. Opaque outside this crate: callers only ever
/// pass `Frame` values back into other `Detector` methods or `encode_jpeg`.
pub trait ImageFrame: Send {
    /// Width in pixels.
    fn width(&self) -> i32;
    /// Height in pixels.
    fn height(&self) -> i32;
}

/// Failure from any detector operation.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The input bytes were not a decodable image.
    #[error("invalid image")]
    InvalidImage,

    /// The scratch file could not be written or read.
    #[error("scratch file I/O failed: {0}")]
    ScratchIo(#[from] std::io::Error),

    /// The CV backend reported an internal failure (cascade load, encode,
    /// resize, etc.) not otherwise classified above.
    #[error("detector backend error: {0}")]
    Backend(String),
}

/// The detection/annotation/replacement operations the request state
/// machine needs. One process-wide implementation is shared (via `Arc`)
/// across every worker task.
pub trait Detector: Send + Sync {
    /// Concrete decoded-image type returned by [`Self::decode_jpeg`].
    ///
    /// `'static` because a replace request must hold a decoded primary
    /// frame across the `await` that reads the replacement payload from the
    /// socket, then move it onto a `spawn_blocking` task to composite —
    /// both require the frame to outlive any borrow.
    type Frame: ImageFrame + 'static;

    /// Decode JPEG `bytes` into an in-memory frame.
    ///
    /// `color` selects whether the alpha channel (if any) is preserved.
    /// Implementations that round-trip through a scratch file must hold
    /// their file lock across the whole write-then-load sequence.
    fn decode_jpeg(&self, bytes: &[u8], color: ColorMode) -> Result<Self::Frame, DetectError>;

    /// Locate faces in `frame`. Returns an empty vector when none are
    /// found; never an error for "no faces" (that is a higher-level
    /// decision made by the caller).
    fn find_faces(&self, frame: &Self::Frame) -> Result<Vec<Rect>, DetectError>;

    /// Draw a magenta ellipse around each face, and — when exactly two
    /// eyes are found within a face's region — a blue circle at each eye
    /// center. Mutates `frame` in place.
    fn annotate(&self, frame: &mut Self::Frame, faces: &[Rect]) -> Result<(), DetectError>;

    /// Resize `replacement` to each face rectangle and copy its BGR
    /// channels into `frame` at that rectangle's origin, honoring
    /// `replacement`'s alpha channel (if present) as a per-pixel copy
    /// mask. Mutates `frame` in place.
    fn composite(
        &self,
        frame: &mut Self::Frame,
        faces: &[Rect],
        replacement: &Self::Frame,
    ) -> Result<(), DetectError>;

    /// Encode `frame` back to JPEG bytes.
    fn encode_jpeg(&self, frame: &Self::Frame) -> Result<Vec<u8>, DetectError>;
}
