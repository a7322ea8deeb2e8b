//! Screen region.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Rectangular area of the screen that is sampled every tick.
///
/// Coordinates are in monitor pixels relative to the captured monitor's
/// top-left corner. A region is fixed once monitoring starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Builds a validated region.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self, CoreError> {
        let region = Self {
            x,
            y,
            width,
            height,
        };
        region.validate()?;
        Ok(region)
    }

    /// Rejects zero-area regions.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.width == 0 {
            return Err(CoreError::validation("region.width", "must be greater than 0"));
        }
        if self.height == 0 {
            return Err(CoreError::validation(
                "region.height",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Right edge (exclusive), `None` on overflow.
    pub fn right(&self) -> Option<u32> {
        self.x.checked_add(self.width)
    }

    /// Bottom edge (exclusive), `None` on overflow.
    pub fn bottom(&self) -> Option<u32> {
        self.y.checked_add(self.height)
    }

    /// Whether the region lies entirely inside a `screen_width` x `screen_height` screen.
    pub fn fits_within(&self, screen_width: u32, screen_height: u32) -> bool {
        matches!(
            (self.right(), self.bottom()),
            (Some(r), Some(b)) if r <= screen_width && b <= screen_height
        )
    }

    /// Pixel count.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// Parses `"x,y,width,height"`.
impl FromStr for Region {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(CoreError::Config(format!(
                "region must be \"x,y,width,height\", got \"{s}\""
            )));
        }

        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                CoreError::Config(format!("region component \"{part}\" is not a non-negative integer"))
            })?;
        }

        Region::new(values[0], values[1], values[2], values[3])
    }
}
