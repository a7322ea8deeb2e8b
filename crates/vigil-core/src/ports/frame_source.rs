//! Frame source port.
//!
//! Implementation: `vigil-vision::capture::ScreenCapture` (xcap).

use async_trait::async_trait;
use image::RgbaImage;

use crate::error::CoreError;
use crate::models::region::Region;

/// Yields images of a rectangular screen region.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Captures exactly `region`. Fails with [`CoreError::Capture`] if the
    /// region cannot be read.
    async fn capture(&self, region: &Region) -> Result<RgbaImage, CoreError>;

    /// Size of the captured screen in pixels.
    async fn screen_bounds(&self) -> Result<(u32, u32), CoreError>;

    /// Rejects regions that fall outside the screen.
    async fn validate_region(&self, region: &Region) -> Result<(), CoreError> {
        region.validate()?;
        let (width, height) = self.screen_bounds().await?;
        if !region.fits_within(width, height) {
            return Err(CoreError::validation(
                "region",
                format!("{region} exceeds screen bounds {width}x{height}"),
            ));
        }
        Ok(())
    }
}
