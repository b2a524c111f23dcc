// src/engine/catalog.rs
//
// Static tables: pixel formats, chrominance subsampling levels, JPEG colorspaces.
// The integer ids match the TurboJPEG constants so parameter values can round-trip.

use crate::error::{TjError, TjResult};
use std::fmt;

/// Channel selector for [`PixelFormat::channel_offset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

/// Packed-pixel layout of a caller-supplied buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgbx,
    Bgrx,
    Xbgr,
    Xrgb,
    Gray,
    Rgba,
    Bgra,
    Abgr,
    Argb,
    Cmyk,
}

// Indexed by `PixelFormat::id()`.
const PIXEL_SIZE: [usize; 12] = [3, 3, 4, 4, 4, 4, 1, 4, 4, 4, 4, 4];
const RED_OFFSET: [i8; 12] = [0, 2, 0, 2, 3, 1, -1, 0, 2, 3, 1, -1];
const GREEN_OFFSET: [i8; 12] = [1, 1, 1, 1, 2, 2, -1, 1, 1, 2, 2, -1];
const BLUE_OFFSET: [i8; 12] = [2, 0, 2, 0, 1, 3, -1, 2, 0, 1, 3, -1];
const ALPHA_OFFSET: [i8; 12] = [-1, -1, -1, -1, -1, -1, -1, 3, 3, 0, 0, -1];

impl PixelFormat {
    pub const ALL: [PixelFormat; 12] = [
        PixelFormat::Rgb,
        PixelFormat::Bgr,
        PixelFormat::Rgbx,
        PixelFormat::Bgrx,
        PixelFormat::Xbgr,
        PixelFormat::Xrgb,
        PixelFormat::Gray,
        PixelFormat::Rgba,
        PixelFormat::Bgra,
        PixelFormat::Abgr,
        PixelFormat::Argb,
        PixelFormat::Cmyk,
    ];

    pub fn from_id(id: i32) -> TjResult<Self> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or_else(|| TjError::invalid_format(id))
    }

    pub const fn id(self) -> i32 {
        self as i32
    }

    /// Number of samples (bytes at 8-bit precision) per pixel.
    pub const fn sample_size(self) -> usize {
        PIXEL_SIZE[self as usize]
    }

    /// Offset of `channel` within a pixel, or `None` when the format does not carry it.
    /// The padding byte of the X formats is not an alpha channel.
    pub const fn channel_offset(self, channel: Channel) -> Option<usize> {
        let table = match channel {
            Channel::Red => &RED_OFFSET,
            Channel::Green => &GREEN_OFFSET,
            Channel::Blue => &BLUE_OFFSET,
            Channel::Alpha => &ALPHA_OFFSET,
        };
        let offset = table[self as usize];
        if offset < 0 {
            None
        } else {
            Some(offset as usize)
        }
    }

    /// Raw table value: -1 for an absent channel.
    pub const fn raw_channel_offset(self, channel: Channel) -> i32 {
        match self.channel_offset(channel) {
            Some(offset) => offset as i32,
            None => -1,
        }
    }

    pub const fn has_alpha(self) -> bool {
        self.channel_offset(Channel::Alpha).is_some()
    }

    pub const fn is_rgb_family(self) -> bool {
        !matches!(self, PixelFormat::Gray | PixelFormat::Cmyk)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb => "RGB",
            PixelFormat::Bgr => "BGR",
            PixelFormat::Rgbx => "RGBX",
            PixelFormat::Bgrx => "BGRX",
            PixelFormat::Xbgr => "XBGR",
            PixelFormat::Xrgb => "XRGB",
            PixelFormat::Gray => "GRAY",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Abgr => "ABGR",
            PixelFormat::Argb => "ARGB",
            PixelFormat::Cmyk => "CMYK",
        };
        f.write_str(name)
    }
}

/// Chrominance subsampling level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Subsampling {
    S444,
    S422,
    S420,
    Gray,
    S440,
    S411,
    S441,
    #[default]
    Unknown,
}

// Indexed by `Subsampling::id()` for the known levels.
const MCU_WIDTH: [u32; 7] = [8, 16, 16, 8, 8, 32, 8];
const MCU_HEIGHT: [u32; 7] = [8, 8, 16, 8, 16, 8, 32];

impl Subsampling {
    /// Known levels in id order.
    pub const KNOWN: [Subsampling; 7] = [
        Subsampling::S444,
        Subsampling::S422,
        Subsampling::S420,
        Subsampling::Gray,
        Subsampling::S440,
        Subsampling::S411,
        Subsampling::S441,
    ];

    pub fn from_id(id: i32) -> TjResult<Self> {
        if id == -1 {
            return Ok(Subsampling::Unknown);
        }
        usize::try_from(id)
            .ok()
            .and_then(|idx| Self::KNOWN.get(idx).copied())
            .ok_or_else(|| TjError::invalid_subsampling(id))
    }

    pub const fn id(self) -> i32 {
        match self {
            Subsampling::Unknown => -1,
            known => known as i32,
        }
    }

    pub const fn is_known(self) -> bool {
        !matches!(self, Subsampling::Unknown)
    }

    /// MCU block size in pixels, or `None` for [`Subsampling::Unknown`].
    pub const fn mcu_block(self) -> Option<(u32, u32)> {
        match self {
            Subsampling::Unknown => None,
            known => Some((MCU_WIDTH[known as usize], MCU_HEIGHT[known as usize])),
        }
    }

    pub fn mcu_width(self) -> TjResult<u32> {
        self.mcu_block()
            .map(|(w, _)| w)
            .ok_or_else(|| TjError::invalid_subsampling(self.id()))
    }

    pub fn mcu_height(self) -> TjResult<u32> {
        self.mcu_block()
            .map(|(_, h)| h)
            .ok_or_else(|| TjError::invalid_subsampling(self.id()))
    }

    /// Horizontal/vertical chroma downsampling factors (MCU size / 8).
    pub fn factors(self) -> TjResult<(u32, u32)> {
        let (w, h) = self
            .mcu_block()
            .ok_or_else(|| TjError::invalid_subsampling(self.id()))?;
        Ok((w / 8, h / 8))
    }

    /// 1 for grayscale, 3 otherwise.
    pub const fn plane_count(self) -> usize {
        match self {
            Subsampling::Gray => 1,
            _ => 3,
        }
    }

    /// Level seen after a transposing transform (rows become columns).
    pub const fn transposed(self) -> Self {
        match self {
            Subsampling::S422 => Subsampling::S440,
            Subsampling::S440 => Subsampling::S422,
            Subsampling::S411 => Subsampling::S441,
            Subsampling::S441 => Subsampling::S411,
            other => other,
        }
    }
}

impl fmt::Display for Subsampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subsampling::S444 => "4:4:4",
            Subsampling::S422 => "4:2:2",
            Subsampling::S420 => "4:2:0",
            Subsampling::Gray => "gray",
            Subsampling::S440 => "4:4:0",
            Subsampling::S411 => "4:1:1",
            Subsampling::S441 => "4:4:1",
            Subsampling::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Colorspace of the coded JPEG data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Colorspace {
    Rgb,
    YCbCr,
    Gray,
    Cmyk,
    Ycck,
}

impl Colorspace {
    pub const ALL: [Colorspace; 5] = [
        Colorspace::Rgb,
        Colorspace::YCbCr,
        Colorspace::Gray,
        Colorspace::Cmyk,
        Colorspace::Ycck,
    ];

    pub fn from_id(id: i32) -> Option<Self> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    pub const fn id(self) -> i32 {
        self as i32
    }

    pub const fn component_count(self) -> usize {
        match self {
            Colorspace::Gray => 1,
            Colorspace::Rgb | Colorspace::YCbCr => 3,
            Colorspace::Cmyk | Colorspace::Ycck => 4,
        }
    }
}
