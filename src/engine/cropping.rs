// src/engine/cropping.rs
//
// Cropping region validation for partial decompression and for transform tiles.

use crate::engine::catalog::Subsampling;
use crate::engine::scaling::ScalingFactor;
use crate::error::{TjError, TjResult};

/// Rectangle in scaled-image coordinates. All zeros means "no cropping"; a zero
/// width or height means "to the image edge".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CroppingRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CroppingRegion {
    pub const UNCROPPED: CroppingRegion = CroppingRegion {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_uncropped(&self) -> bool {
        *self == Self::UNCROPPED
    }

    /// Fill in "to the edge" dimensions and check the result lies inside the image.
    fn expand_within(&self, img_width: u32, img_height: u32) -> TjResult<CroppingRegion> {
        let out_of_bounds = || {
            TjError::invalid_crop_bounds(self.x, self.y, self.width, self.height, img_width, img_height)
        };
        let width = match self.width {
            0 => img_width.checked_sub(self.x).ok_or_else(out_of_bounds)?,
            w => w,
        };
        let height = match self.height {
            0 => img_height.checked_sub(self.y).ok_or_else(out_of_bounds)?,
            h => h,
        };
        let right = self.x as u64 + width as u64;
        let bottom = self.y as u64 + height as u64;
        if width == 0 || height == 0 || right > img_width as u64 || bottom > img_height as u64 {
            return Err(out_of_bounds());
        }
        Ok(CroppingRegion::new(self.x, self.y, width, height))
    }
}

/// Resolve a decode-time cropping region against the scaled image.
///
/// Only the left edge needs alignment: the decoder can skip whole iMCU columns,
/// so `x` must be a multiple of the MCU width scaled by `scaling`. Rows are
/// decoded and discarded, so `y` is free.
/// Returns the full scaled image for an uncropped region.
pub fn resolve_crop(
    region: CroppingRegion,
    scaling: ScalingFactor,
    img_width: u32,
    img_height: u32,
    subsampling: Subsampling,
) -> TjResult<CroppingRegion> {
    let scaled_w = scaling.scale(img_width);
    let scaled_h = scaling.scale(img_height);
    if region.is_uncropped() {
        return Ok(CroppingRegion::new(0, 0, scaled_w, scaled_h));
    }
    if !subsampling.is_known() {
        return Err(TjError::subsampling_unknown(region.x, region.y, region.width, region.height));
    }

    let alignment = scaling.scale(subsampling.mcu_width()?);
    if region.x % alignment != 0 {
        return Err(TjError::invalid_crop_alignment("x", region.x, alignment));
    }
    region.expand_within(scaled_w, scaled_h)
}

/// Resolve a transform tile region against the (transformed) image.
///
/// Lossless transforms copy whole iMCUs, so both `x` and `y` must be aligned
/// to the destination subsampling's MCU block.
pub fn resolve_transform_crop(
    region: CroppingRegion,
    img_width: u32,
    img_height: u32,
    subsampling: Subsampling,
) -> TjResult<CroppingRegion> {
    if region.is_uncropped() {
        return Ok(CroppingRegion::new(0, 0, img_width, img_height));
    }
    let (mcu_w, mcu_h) = subsampling
        .mcu_block()
        .ok_or(TjError::subsampling_unknown(region.x, region.y, region.width, region.height))?;
    if region.x % mcu_w != 0 {
        return Err(TjError::invalid_crop_alignment("x", region.x, mcu_w));
    }
    if region.y % mcu_h != 0 {
        return Err(TjError::invalid_crop_alignment("y", region.y, mcu_h));
    }
    region.expand_within(img_width, img_height)
}
