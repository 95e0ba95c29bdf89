//! Production [`Detector`] backed by the `opencv` crate.
//!
//! Mirrors the classic OpenCV Haar-cascade face-detection tutorial: load
//! two cascades once, detect against an equalized greyscale image, and draw
//! results back onto the original color frame. Every call here is a
//! blocking FFI call into OpenCV's C++ implementation — callers must run
//! these from a blocking-friendly context (`tokio::task::spawn_blocking`),
//! never directly on an async task.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use opencv::core::{Mat, Point, Scalar, Size};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

use crate::detect::{ColorMode, DetectError, Detector, ImageFrame, Rect};

/// Detection parameters fixed by the protocol (spec section 4.3).
const SCALE_FACTOR: f64 = 1.1;
const MIN_NEIGHBORS: i32 = 4;
const MIN_SIZE: Size = Size { width: 0, height: 0 };
const MAX_SIZE: Size = Size { width: 1000, height: 1000 };

/// A decoded image frame, boxed around an OpenCV `Mat`.
pub struct OpenCvFrame {
    mat: Mat,
}

impl ImageFrame for OpenCvFrame {
    fn width(&self) -> i32 {
        self.mat.cols()
    }

    fn height(&self) -> i32 {
        self.mat.rows()
    }
}

/// Both Haar cascades, always locked together as one unit — the protocol
/// requires the face and eye classifiers be "treated as non-reentrant;
/// all invocations are serialised by a single mutex", so there is
/// deliberately no way to acquire one cascade without the other.
struct Cascades {
    face: CascadeClassifier,
    eye: CascadeClassifier,
}

/// Production detector: OpenCV cascades plus a scratch-file round trip for
/// JPEG decode/encode.
pub struct OpenCvDetector {
    cascades: Mutex<Cascades>,
    scratch_path: PathBuf,
    scratch_lock: Mutex<()>,
}

impl OpenCvDetector {
    /// Load both cascades from `face_cascade_path`/`eye_cascade_path` and
    /// bind to `scratch_path` for the decode/encode round trip. Both paths
    /// are read once, at construction; failures here are meant to be fatal
    /// to the server process (classifier load failure, spec exit code 14).
    pub fn load(
        face_cascade_path: &Path,
        eye_cascade_path: &Path,
        scratch_path: PathBuf,
    ) -> Result<Self, DetectError> {
        let face = CascadeClassifier::new(&path_to_str(face_cascade_path)?)
            .map_err(|e| DetectError::Backend(e.to_string()))?;
        let eye = CascadeClassifier::new(&path_to_str(eye_cascade_path)?)
            .map_err(|e| DetectError::Backend(e.to_string()))?;

        Ok(Self {
            cascades: Mutex::new(Cascades { face, eye }),
            scratch_path,
            scratch_lock: Mutex::new(()),
        })
    }

    /// Greyscale + histogram-equalize `frame`, for classifier input.
    fn equalized_grey(frame: &Mat) -> Result<Mat, DetectError> {
        let mut grey = Mat::default();
        imgproc::cvt_color(
            frame,
            &mut grey,
            imgproc::COLOR_BGR2GRAY,
            0,
            opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(|e| DetectError::Backend(e.to_string()))?;

        let mut equalized = Mat::default();
        imgproc::equalize_hist(&grey, &mut equalized).map_err(|e| DetectError::Backend(e.to_string()))?;
        Ok(equalized)
    }
}

fn path_to_str(path: &Path) -> Result<String, DetectError> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| DetectError::Backend(format!("non-UTF8 path: {}", path.display())))
}

impl Detector for OpenCvDetector {
    type Frame = OpenCvFrame;

    fn decode_jpeg(&self, bytes: &[u8], color: ColorMode) -> Result<Self::Frame, DetectError> {
        let _guard = self.scratch_lock.lock().unwrap_or_else(|p| p.into_inner());

        std::fs::write(&self.scratch_path, bytes)?;

        let flag = match color {
            ColorMode::Color => imgcodecs::IMREAD_COLOR,
            ColorMode::Unchanged => imgcodecs::IMREAD_UNCHANGED,
        };
        let path = path_to_str(&self.scratch_path)?;
        let mat = imgcodecs::imread(&path, flag).map_err(|e| DetectError::Backend(e.to_string()))?;

        if mat.empty() {
            return Err(DetectError::InvalidImage);
        }

        Ok(OpenCvFrame { mat })
    }

    fn find_faces(&self, frame: &Self::Frame) -> Result<Vec<Rect>, DetectError> {
        let grey = Self::equalized_grey(&frame.mat)?;

        let mut cascades = self.cascades.lock().unwrap_or_else(|p| p.into_inner());
        let mut faces = opencv::core::Vector::<opencv::core::Rect>::new();
        cascades
            .face
            .detect_multi_scale(
                &grey,
                &mut faces,
                SCALE_FACTOR,
                MIN_NEIGHBORS,
                0,
                MIN_SIZE,
                MAX_SIZE,
            )
            .map_err(|e| DetectError::Backend(e.to_string()))?;

        Ok(faces
            .iter()
            .map(|r| Rect { x: r.x, y: r.y, width: r.width, height: r.height })
            .collect())
    }

    fn annotate(&self, frame: &mut Self::Frame, faces: &[Rect]) -> Result<(), DetectError> {
        let grey = Self::equalized_grey(&frame.mat)?;
        let magenta = Scalar::new(255.0, 0.0, 255.0, 0.0);
        let blue = Scalar::new(255.0, 0.0, 0.0, 0.0);

        for face in faces {
            let center = face.center();
            let axes = Size::new(face.width / 2, face.height / 2);
            imgproc::ellipse(
                &mut frame.mat,
                Point::new(center.0, center.1),
                axes,
                0.0,
                0.0,
                360.0,
                magenta,
                4,
                imgproc::LINE_8,
                0,
            )
            .map_err(|e| DetectError::Backend(e.to_string()))?;

            let roi_rect = opencv::core::Rect::new(face.x, face.y, face.width, face.height);
            let roi = Mat::roi(&grey, roi_rect).map_err(|e| DetectError::Backend(e.to_string()))?;

            let mut cascades = self.cascades.lock().unwrap_or_else(|p| p.into_inner());
            let mut eyes = opencv::core::Vector::<opencv::core::Rect>::new();
            cascades
                .eye
                .detect_multi_scale(
                    &roi,
                    &mut eyes,
                    SCALE_FACTOR,
                    MIN_NEIGHBORS,
                    0,
                    MIN_SIZE,
                    MAX_SIZE,
                )
                .map_err(|e| DetectError::Backend(e.to_string()))?;
            drop(cascades);

            if eyes.len() == 2 {
                for eye in eyes.iter() {
                    let eye_center_x = face.x + eye.x + eye.width / 2;
                    let eye_center_y = face.y + eye.y + eye.height / 2;
                    let radius = (eye.width + eye.height) / 4;
                    imgproc::circle(
                        &mut frame.mat,
                        Point::new(eye_center_x, eye_center_y),
                        radius,
                        blue,
                        4,
                        imgproc::LINE_8,
                        0,
                    )
                    .map_err(|e| DetectError::Backend(e.to_string()))?;
                }
            }
        }

        Ok(())
    }

    fn composite(
        &self,
        frame: &mut Self::Frame,
        faces: &[Rect],
        replacement: &Self::Frame,
    ) -> Result<(), DetectError> {
        let has_alpha = replacement.mat.channels() == 4;

        for face in faces {
            let size = Size::new(face.width, face.height);
            let mut resized = Mat::default();
            imgproc::resize(
                &replacement.mat,
                &mut resized,
                size,
                0.0,
                0.0,
                imgproc::INTER_AREA,
            )
            .map_err(|e| DetectError::Backend(e.to_string()))?;

            for row in 0..resized.rows() {
                for col in 0..resized.cols() {
                    let dest_row = face.y + row;
                    let dest_col = face.x + col;
                    if dest_row < 0
                        || dest_col < 0
                        || dest_row >= frame.mat.rows()
                        || dest_col >= frame.mat.cols()
                    {
                        continue;
                    }

                    if has_alpha {
                        let px = resized
                            .at_2d::<opencv::core::Vec4b>(row, col)
                            .map_err(|e| DetectError::Backend(e.to_string()))?;
                        if px[3] == 0 {
                            continue;
                        }
                        let dest = frame
                            .mat
                            .at_2d_mut::<opencv::core::Vec3b>(dest_row, dest_col)
                            .map_err(|e| DetectError::Backend(e.to_string()))?;
                        *dest = opencv::core::Vec3b::from([px[0], px[1], px[2]]);
                    } else {
                        let px = resized
                            .at_2d::<opencv::core::Vec3b>(row, col)
                            .map_err(|e| DetectError::Backend(e.to_string()))?;
                        let dest = frame
                            .mat
                            .at_2d_mut::<opencv::core::Vec3b>(dest_row, dest_col)
                            .map_err(|e| DetectError::Backend(e.to_string()))?;
                        *dest = *px;
                    }
                }
            }
        }

        Ok(())
    }

    fn encode_jpeg(&self, frame: &Self::Frame) -> Result<Vec<u8>, DetectError> {
        let _guard = self.scratch_lock.lock().unwrap_or_else(|p| p.into_inner());

        let path = path_to_str(&self.scratch_path)?;
        let params = opencv::core::Vector::<i32>::new();
        imgcodecs::imwrite(&path, &frame.mat, &params).map_err(|e| DetectError::Backend(e.to_string()))?;

        std::fs::read(&self.scratch_path).map_err(DetectError::from)
    }
}
