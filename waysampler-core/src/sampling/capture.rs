use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, model::Pose};

/// Render target configuration handed to the capture backend when a session
/// starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Equirectangular panorama instead of a single perspective view
    pub panorama: bool,
    pub panorama_width: u32,
    pub panorama_top_crop: u32,
    pub panorama_bottom_crop: u32,
    pub image_width: u32,
    pub image_height: u32,
    /// Horizontal field of view of perspective captures, in degrees
    pub field_of_view: f64,
    pub use_tone_curve: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            panorama: true,
            panorama_width: 3328,
            panorama_top_crop: 512,
            panorama_bottom_crop: 640,
            image_width: 512,
            image_height: 512,
            field_of_view: 65.0,
            use_tone_curve: true,
        }
    }
}

/// Opaque id of one capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceStatus {
    /// Render/readback still in flight; the buffer must not be touched
    Pending,
    Signaled,
    Failed(String),
}

/// Encoded image produced by the backend
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub encoded: Vec<u8>,
}

/// External renderer driven by the sampling pipeline.
///
/// The pipeline never renders by itself. It holds at most one outstanding
/// handle and waits for its fence before reading pixels or issuing the next
/// capture.
pub trait CaptureBackend: Send {
    /// Acquires render targets for the session
    ///
    /// # Errors
    ///
    /// Fails if the render resources cannot be allocated; the session halts.
    fn prepare(&mut self, settings: &CaptureSettings) -> Result<(), Error>;

    /// Places the camera at `pose` and enqueues a capture
    ///
    /// # Errors
    ///
    /// Fails if the capture cannot be issued; the session halts.
    fn begin_capture(&mut self, pose: &Pose) -> Result<CaptureHandle, Error>;

    fn poll_fence(&mut self, handle: CaptureHandle) -> FenceStatus;

    /// Copies the finished capture out of the render target
    ///
    /// # Errors
    ///
    /// Fails if the readback is unavailable.
    fn read_pixels(&mut self, handle: CaptureHandle) -> Result<ImageBuffer, Error>;

    /// Returns the capture slot to the backend
    fn release(&mut self, handle: CaptureHandle);

    /// Frees all render resources at the end of a session
    fn shutdown(&mut self);
}

/// Writes an encoded image, creating the parent directory if needed
///
/// # Errors
///
/// Returns an error if the directory or the file cannot be written.
pub fn write_image(path: &Path, image: &ImageBuffer) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &image.encoded)?;
    Ok(())
}
