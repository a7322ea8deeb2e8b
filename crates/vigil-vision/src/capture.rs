//! Screen region capture.
//!
//! xcap-based: grabs the selected monitor and crops the configured region.

use async_trait::async_trait;
use image::RgbaImage;
use tracing::debug;
use vigil_core::error::CoreError;
use vigil_core::models::region::Region;
use vigil_core::ports::frame_source::FrameSource;
use xcap::Monitor;

/// Screen capture backed by xcap
#[derive(Debug, Clone, Default)]
pub struct ScreenCapture {
    /// Monitor index in `Monitor::all()` order; `None` selects the primary
    monitor_index: Option<usize>,
}

impl ScreenCapture {
    /// `None` captures the primary monitor.
    pub fn new(monitor_index: Option<usize>) -> Self {
        Self { monitor_index }
    }

    fn select_monitor(monitor_index: Option<usize>) -> Result<Monitor, CoreError> {
        let monitors = Monitor::all()
            .map_err(|e| CoreError::Capture(format!("failed to list monitors: {e}")))?;

        match monitor_index {
            Some(index) => monitors
                .into_iter()
                .nth(index)
                .ok_or_else(|| CoreError::Config(format!("monitor index {index} not found"))),
            None => {
                let mut fallback = None;
                for monitor in monitors {
                    if monitor.is_primary().unwrap_or(false) {
                        return Ok(monitor);
                    }
                    if fallback.is_none() {
                        fallback = Some(monitor);
                    }
                }
                fallback.ok_or_else(|| CoreError::Capture("no monitor found".to_string()))
            }
        }
    }

    /// Blocking capture of one region.
    fn capture_blocking(monitor_index: Option<usize>, region: Region) -> Result<RgbaImage, CoreError> {
        let monitor = Self::select_monitor(monitor_index)?;
        let full = monitor
            .capture_image()
            .map_err(|e| CoreError::Capture(format!("screen capture failed: {e}")))?;

        crop_region(&full, &region)
    }
}

/// Crops `region` out of a full-monitor image.
pub fn crop_region(full: &RgbaImage, region: &Region) -> Result<RgbaImage, CoreError> {
    if !region.fits_within(full.width(), full.height()) {
        return Err(CoreError::Capture(format!(
            "region {region} outside captured image {}x{}",
            full.width(),
            full.height()
        )));
    }

    let cropped =
        image::imageops::crop_imm(full, region.x, region.y, region.width, region.height).to_image();

    debug!(
        width = cropped.width(),
        height = cropped.height(),
        "region captured"
    );
    Ok(cropped)
}

#[async_trait]
impl FrameSource for ScreenCapture {
    async fn capture(&self, region: &Region) -> Result<RgbaImage, CoreError> {
        let monitor_index = self.monitor_index;
        let region = *region;
        tokio::task::spawn_blocking(move || Self::capture_blocking(monitor_index, region))
            .await
            .map_err(|e| CoreError::Capture(format!("capture task failed: {e}")))?
    }

    async fn screen_bounds(&self) -> Result<(u32, u32), CoreError> {
        let monitor_index = self.monitor_index;
        tokio::task::spawn_blocking(move || {
            let monitor = Self::select_monitor(monitor_index)?;
            let width = monitor
                .width()
                .map_err(|e| CoreError::Capture(format!("failed to read monitor width: {e}")))?;
            let height = monitor
                .height()
                .map_err(|e| CoreError::Capture(format!("failed to read monitor height: {e}")))?;
            Ok((width, height))
        })
        .await
        .map_err(|e| CoreError::Capture(format!("monitor query failed: {e}")))?
    }
}
