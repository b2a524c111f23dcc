// src/engine/scaling.rs
//
// Decode-time scaling factors supported by the IDCT, and selection of the best
// factor for a target size.

use crate::error::{TjError, TjResult};
use std::cmp::Ordering;
use std::fmt;

/// Rational scaling factor applied to decoded dimensions.
///
/// Scaled dimensions round up: `ceil(dimension * num / denom)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScalingFactor {
    num: u32,
    denom: u32,
}

impl ScalingFactor {
    pub const UNSCALED: ScalingFactor = ScalingFactor { num: 1, denom: 1 };

    pub fn new(num: u32, denom: u32) -> TjResult<Self> {
        if num == 0 || denom == 0 {
            return Err(TjError::invalid_argument(
                "scaling factor",
                format!("{num}/{denom}"),
                "numerator and denominator must be positive",
            ));
        }
        Ok(Self { num, denom })
    }

    const fn fixed(num: u32, denom: u32) -> Self {
        Self { num, denom }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn denom(&self) -> u32 {
        self.denom
    }

    pub fn is_unscaled(&self) -> bool {
        self.num == self.denom
    }

    /// Scale one dimension, rounding up. Saturates at `u32::MAX`.
    pub fn scale(&self, dimension: u32) -> u32 {
        let scaled = (dimension as u64 * self.num as u64).div_ceil(self.denom as u64);
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }

    /// Compare by value, so 2/4 and 1/2 are `Equal` even though `==` tells them apart.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        (self.num as u64 * other.denom as u64).cmp(&(other.num as u64 * self.denom as u64))
    }

    /// True when the factor is one of [`SCALING_FACTORS`] (compared by value).
    pub fn is_supported(&self) -> bool {
        SCALING_FACTORS
            .iter()
            .any(|sf| sf.cmp_value(self) == Ordering::Equal)
    }
}

impl Default for ScalingFactor {
    fn default() -> Self {
        Self::UNSCALED
    }
}

impl fmt::Display for ScalingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.denom)
    }
}

/// All factors the decoder supports, largest first.
pub const SCALING_FACTORS: [ScalingFactor; 16] = [
    ScalingFactor::fixed(2, 1),
    ScalingFactor::fixed(15, 8),
    ScalingFactor::fixed(7, 4),
    ScalingFactor::fixed(13, 8),
    ScalingFactor::fixed(3, 2),
    ScalingFactor::fixed(11, 8),
    ScalingFactor::fixed(5, 4),
    ScalingFactor::fixed(9, 8),
    ScalingFactor::fixed(1, 1),
    ScalingFactor::fixed(7, 8),
    ScalingFactor::fixed(3, 4),
    ScalingFactor::fixed(5, 8),
    ScalingFactor::fixed(1, 2),
    ScalingFactor::fixed(3, 8),
    ScalingFactor::fixed(1, 4),
    ScalingFactor::fixed(1, 8),
];

pub fn scaling_factors() -> &'static [ScalingFactor] {
    &SCALING_FACTORS
}

/// Largest supported factor whose scaled image fits inside `desired_width` x
/// `desired_height`. A desired dimension of 0 means "the JPEG dimension".
pub fn best_factor_for(
    jpeg_width: u32,
    jpeg_height: u32,
    desired_width: u32,
    desired_height: u32,
) -> TjResult<ScalingFactor> {
    if jpeg_width == 0 || jpeg_height == 0 {
        return Err(TjError::invalid_argument(
            "JPEG dimensions",
            format!("{jpeg_width}x{jpeg_height}"),
            "must be at least 1x1",
        ));
    }
    let bound_w = if desired_width == 0 { jpeg_width } else { desired_width };
    let bound_h = if desired_height == 0 { jpeg_height } else { desired_height };

    SCALING_FACTORS
        .iter()
        .find(|sf| sf.scale(jpeg_width) <= bound_w && sf.scale(jpeg_height) <= bound_h)
        .copied()
        .ok_or_else(|| {
            TjError::no_suitable_scale((jpeg_width, jpeg_height), (desired_width, desired_height))
        })
}
