use std::collections::HashSet;

use tracing::debug;
use waysampler_core::{
    Error,
    model::Pose,
    sampling::{CaptureBackend, CaptureHandle, CaptureSettings, FenceStatus, ImageBuffer},
};

/// Capture backend for runs without a renderer. Every capture completes
/// immediately and yields an empty image, so a session can be planned and
/// its metadata produced end to end.
#[derive(Debug, Default)]
pub struct DryRunCapture {
    settings: Option<CaptureSettings>,
    next_handle: u64,
    outstanding: HashSet<u64>,
    captured: usize,
}

impl DryRunCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> usize {
        self.captured
    }

    fn output_size(settings: &CaptureSettings) -> (u32, u32) {
        if settings.panorama {
            let height = (settings.panorama_width / 2)
                .saturating_sub(settings.panorama_top_crop + settings.panorama_bottom_crop);
            (settings.panorama_width, height)
        } else {
            (settings.image_width, settings.image_height)
        }
    }
}

impl CaptureBackend for DryRunCapture {
    fn prepare(&mut self, settings: &CaptureSettings) -> Result<(), Error> {
        let (width, height) = Self::output_size(settings);
        if width == 0 || height == 0 {
            return Err(Error::CaptureResource(format!(
                "capture size {width}x{height} is empty"
            )));
        }
        debug!(width, height, "Prepared dry-run capture");
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn begin_capture(&mut self, pose: &Pose) -> Result<CaptureHandle, Error> {
        if self.settings.is_none() {
            return Err(Error::CaptureResource(
                "capture requested before prepare".to_string(),
            ));
        }
        self.next_handle += 1;
        self.outstanding.insert(self.next_handle);
        debug!(handle = self.next_handle, ?pose.location, "Dry-run capture");
        Ok(CaptureHandle(self.next_handle))
    }

    fn poll_fence(&mut self, handle: CaptureHandle) -> FenceStatus {
        if self.outstanding.contains(&handle.0) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Failed(format!("unknown capture handle {}", handle.0))
        }
    }

    fn read_pixels(&mut self, handle: CaptureHandle) -> Result<ImageBuffer, Error> {
        let settings = self.settings.as_ref().ok_or_else(|| {
            Error::CaptureResource("readback requested before prepare".to_string())
        })?;
        if !self.outstanding.contains(&handle.0) {
            return Err(Error::CaptureResource(format!(
                "unknown capture handle {}",
                handle.0
            )));
        }
        let (width, height) = Self::output_size(settings);
        self.captured += 1;
        Ok(ImageBuffer {
            width,
            height,
            encoded: Vec::new(),
        })
    }

    fn release(&mut self, handle: CaptureHandle) {
        self.outstanding.remove(&handle.0);
    }

    fn shutdown(&mut self) {
        self.outstanding.clear();
        self.settings = None;
    }
}
