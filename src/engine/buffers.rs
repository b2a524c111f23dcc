// src/engine/buffers.rs
//
// Borrowed packed-pixel views (8/12/16-bit samples) and the owned planar YUV image.

use crate::engine::catalog::{PixelFormat, Subsampling};
use crate::engine::sizing::{PlaneLayout, YuvLayout};
use crate::error::{TjError, TjResult};

/// Packed samples at one of the three supported precisions.
///
/// 12-bit samples live in `i16` and 16-bit samples in `u16`, like the
/// TurboJPEG `short[]` buffers.
#[derive(Clone, Copy, Debug)]
pub enum PackedSamples<'a> {
    Eight(&'a [u8]),
    Twelve(&'a [i16]),
    Sixteen(&'a [u16]),
}

impl PackedSamples<'_> {
    pub fn precision(&self) -> u8 {
        match self {
            PackedSamples::Eight(_) => 8,
            PackedSamples::Twelve(_) => 12,
            PackedSamples::Sixteen(_) => 16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PackedSamples::Eight(s) => s.len(),
            PackedSamples::Twelve(s) => s.len(),
            PackedSamples::Sixteen(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a [u8]> for PackedSamples<'a> {
    fn from(samples: &'a [u8]) -> Self {
        PackedSamples::Eight(samples)
    }
}

impl<'a> From<&'a [i16]> for PackedSamples<'a> {
    fn from(samples: &'a [i16]) -> Self {
        PackedSamples::Twelve(samples)
    }
}

impl<'a> From<&'a [u16]> for PackedSamples<'a> {
    fn from(samples: &'a [u16]) -> Self {
        PackedSamples::Sixteen(samples)
    }
}

/// Writable counterpart of [`PackedSamples`], used as a decompression target.
#[derive(Debug)]
pub enum PackedSamplesMut<'a> {
    Eight(&'a mut [u8]),
    Twelve(&'a mut [i16]),
    Sixteen(&'a mut [u16]),
}

impl PackedSamplesMut<'_> {
    pub fn precision(&self) -> u8 {
        match self {
            PackedSamplesMut::Eight(_) => 8,
            PackedSamplesMut::Twelve(_) => 12,
            PackedSamplesMut::Sixteen(_) => 16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PackedSamplesMut::Eight(s) => s.len(),
            PackedSamplesMut::Twelve(s) => s.len(),
            PackedSamplesMut::Sixteen(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a mut [u8]> for PackedSamplesMut<'a> {
    fn from(samples: &'a mut [u8]) -> Self {
        PackedSamplesMut::Eight(samples)
    }
}

impl<'a> From<&'a mut [i16]> for PackedSamplesMut<'a> {
    fn from(samples: &'a mut [i16]) -> Self {
        PackedSamplesMut::Twelve(samples)
    }
}

impl<'a> From<&'a mut [u16]> for PackedSamplesMut<'a> {
    fn from(samples: &'a mut [u16]) -> Self {
        PackedSamplesMut::Sixteen(samples)
    }
}

/// Geometry of a packed region: top-left `(x, y)`, extent, pitch in samples
/// (0 = `width * sample_size`) and pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedGeometry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub pitch: usize,
    pub height: u32,
    pub format: PixelFormat,
}

impl PackedGeometry {
    /// Row stride in samples after resolving the "tightly packed" pitch.
    pub fn effective_pitch(&self) -> usize {
        if self.pitch == 0 {
            self.width as usize * self.format.sample_size()
        } else {
            self.pitch
        }
    }

    /// Samples the buffer must hold: `(y + height - 1) * pitch + (x + width) * ps`.
    pub fn required_len(&self) -> TjResult<usize> {
        let ps = self.format.sample_size() as u64;
        let rows = self.y as u64 + self.height as u64 - 1;
        let total = (self.effective_pitch() as u64)
            .checked_mul(rows)
            .and_then(|n| n.checked_add((self.x as u64 + self.width as u64) * ps))
            .ok_or_else(|| {
                TjError::size_overflow("packed buffer", self.width as u64, self.height as u64, u64::MAX)
            })?;
        usize::try_from(total).map_err(|_| {
            TjError::size_overflow("packed buffer", self.width as u64, self.height as u64, usize::MAX as u64)
        })
    }

    /// Sample offset of the first pixel of row `row` (relative to `y`).
    pub fn row_offset(&self, row: u32) -> usize {
        (self.y + row) as usize * self.effective_pitch()
            + self.x as usize * self.format.sample_size()
    }

    /// Check dimensions and pitch; returns the sample count the view needs.
    fn validate(&self) -> TjResult<usize> {
        if self.width == 0 || self.height == 0 {
            return Err(TjError::invalid_argument(
                "packed image dimensions",
                format!("{}x{}", self.width, self.height),
                "must be at least 1x1",
            ));
        }
        let min_pitch = self.width as usize * self.format.sample_size();
        if self.pitch != 0 && self.pitch < min_pitch {
            return Err(TjError::invalid_argument(
                "pitch",
                self.pitch.to_string(),
                format!("must be 0 or at least width * pixel size ({min_pitch})"),
            ));
        }
        self.required_len()
    }
}

fn short_source(what: &'static str, required: usize, available: usize) -> TjError {
    TjError::invalid_argument(
        what,
        format!("{available} samples"),
        format!("at least {required} samples are needed"),
    )
}

/// Read-only packed-pixel source image.
#[derive(Clone, Copy, Debug)]
pub struct PackedImage<'a> {
    samples: PackedSamples<'a>,
    geometry: PackedGeometry,
}

impl<'a> PackedImage<'a> {
    pub fn new(
        samples: impl Into<PackedSamples<'a>>,
        x: u32,
        y: u32,
        width: u32,
        pitch: usize,
        height: u32,
        format: PixelFormat,
    ) -> TjResult<Self> {
        let samples = samples.into();
        let geometry = PackedGeometry {
            x,
            y,
            width,
            pitch,
            height,
            format,
        };
        let required = geometry.validate()?;
        if samples.len() < required {
            return Err(short_source("source buffer", required, samples.len()));
        }
        Ok(Self { samples, geometry })
    }

    /// Tightly packed image starting at the beginning of `samples`.
    pub fn tight(
        samples: impl Into<PackedSamples<'a>>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> TjResult<Self> {
        Self::new(samples, 0, 0, width, 0, height, format)
    }

    pub fn samples(&self) -> PackedSamples<'a> {
        self.samples
    }

    pub fn geometry(&self) -> &PackedGeometry {
        &self.geometry
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn format(&self) -> PixelFormat {
        self.geometry.format
    }

    pub fn precision(&self) -> u8 {
        self.samples.precision()
    }

    /// One row of 8-bit pixels, or `None` for wider samples.
    pub fn row_u8(&self, row: u32) -> Option<&'a [u8]> {
        let PackedSamples::Eight(samples) = self.samples else {
            return None;
        };
        let start = self.geometry.row_offset(row);
        let len = self.geometry.width as usize * self.geometry.format.sample_size();
        samples.get(start..start + len)
    }
}

/// Writable packed-pixel destination.
#[derive(Debug)]
pub struct PackedImageMut<'a> {
    samples: PackedSamplesMut<'a>,
    geometry: PackedGeometry,
}

impl<'a> PackedImageMut<'a> {
    pub fn new(
        samples: impl Into<PackedSamplesMut<'a>>,
        x: u32,
        y: u32,
        width: u32,
        pitch: usize,
        height: u32,
        format: PixelFormat,
    ) -> TjResult<Self> {
        let samples = samples.into();
        let geometry = PackedGeometry {
            x,
            y,
            width,
            pitch,
            height,
            format,
        };
        let required = geometry.validate()?;
        if samples.len() < required {
            return Err(TjError::destination_too_small(required as u64, samples.len() as u64));
        }
        Ok(Self { samples, geometry })
    }

    pub fn geometry(&self) -> &PackedGeometry {
        &self.geometry
    }

    pub fn precision(&self) -> u8 {
        self.samples.precision()
    }

    /// Mutable row of 8-bit pixels, or `None` for wider samples.
    pub fn row_u8_mut(&mut self, row: u32) -> Option<&mut [u8]> {
        let start = self.geometry.row_offset(row);
        let len = self.geometry.width as usize * self.geometry.format.sample_size();
        match &mut self.samples {
            PackedSamplesMut::Eight(samples) => samples.get_mut(start..start + len),
            _ => None,
        }
    }
}

/// Owned planar YUV image: one buffer holding every plane at the offsets of
/// its [`YuvLayout`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YuvImage {
    layout: YuvLayout,
    data: Vec<u8>,
}

impl YuvImage {
    /// Zero-filled image.
    pub fn new(width: u32, align: u32, height: u32, subsampling: Subsampling) -> TjResult<Self> {
        let layout = YuvLayout::new(width, align, height, subsampling)?;
        let data = vec![0; layout.total_size()];
        Ok(Self { layout, data })
    }

    /// Wrap an existing unified buffer; it must cover the whole layout.
    pub fn from_buffer(
        data: Vec<u8>,
        width: u32,
        align: u32,
        height: u32,
        subsampling: Subsampling,
    ) -> TjResult<Self> {
        let layout = YuvLayout::new(width, align, height, subsampling)?;
        if data.len() < layout.total_size() {
            return Err(short_source("YUV buffer", layout.total_size(), data.len()));
        }
        Ok(Self { layout, data })
    }

    pub fn layout(&self) -> &YuvLayout {
        &self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width()
    }

    pub fn height(&self) -> u32 {
        self.layout.height()
    }

    pub fn align(&self) -> u32 {
        self.layout.align()
    }

    pub fn subsampling(&self) -> Subsampling {
        self.layout.subsampling()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn plane_layout(&self, component: usize) -> Option<&PlaneLayout> {
        self.layout.plane(component)
    }

    /// Bytes reserved for plane `component` (`stride * height`).
    pub fn plane(&self, component: usize) -> Option<&[u8]> {
        let p = self.layout.plane(component)?;
        self.data.get(p.offset..p.offset + p.reserved_len())
    }

    pub fn plane_mut(&mut self, component: usize) -> Option<&mut [u8]> {
        let p = *self.layout.plane(component)?;
        self.data.get_mut(p.offset..p.offset + p.reserved_len())
    }

    /// All planes at once, each paired with its geometry.
    pub fn planes_mut(&mut self) -> Vec<(PlaneLayout, &mut [u8])> {
        let mut out = Vec::with_capacity(self.layout.planes().len());
        let mut rest: &mut [u8] = &mut self.data;
        let mut consumed = 0;
        for plane in self.layout.planes() {
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(plane.offset - consumed);
            let (body, tail) = tail.split_at_mut(plane.reserved_len());
            out.push((*plane, body));
            rest = tail;
            consumed = plane.offset + plane.reserved_len();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn packed_required_len_uses_pitch_and_offset() {
        let buf = vec![0u8; 4 * 10 * 10];
        let img = PackedImage::new(&buf[..], 2, 3, 4, 40, 5, PixelFormat::Rgbx).unwrap();
        assert_eq!(img.geometry().required_len().unwrap(), 7 * 40 + 6 * 4);
        assert_eq!(img.row_u8(0).unwrap().len(), 16);
        assert_eq!(img.geometry().row_offset(1), 4 * 40 + 8);
    }

    #[test]
    fn short_buffer_rejected() {
        let buf = vec![0u8; 10];
        let err = PackedImage::tight(&buf[..], 2, 2, PixelFormat::Rgb).unwrap_err();
        assert!(matches!(err, TjError::InvalidArgument { .. }));
        assert_eq!(err.category(), ErrorCategory::UserError);

        let mut out = vec![0u8; 10];
        let err = PackedImageMut::new(&mut out[..], 0, 0, 2, 0, 2, PixelFormat::Rgb).unwrap_err();
        assert_eq!(err, TjError::destination_too_small(12, 10));
    }

    #[test]
    fn pitch_smaller_than_row_rejected() {
        let buf = vec![0u8; 100];
        assert!(matches!(
            PackedImage::new(&buf[..], 0, 0, 4, 8, 2, PixelFormat::Rgb),
            Err(TjError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn wide_samples_report_precision() {
        let buf = vec![0i16; 12];
        let img = PackedImage::tight(&buf[..], 2, 2, PixelFormat::Rgb).unwrap();
        assert_eq!(img.precision(), 12);
        assert!(img.row_u8(0).is_none());
    }

    #[test]
    fn yuv_planes_split_at_layout_offsets() {
        let mut yuv = YuvImage::new(35, 4, 35, Subsampling::S420).unwrap();
        let planes = yuv.planes_mut();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].1.len(), 36 * 36);
        assert_eq!(planes[1].1.len(), 20 * 18);
        assert_eq!(planes[2].0.offset, 36 * 36 + 20 * 18);
        assert_eq!(yuv.plane(2).unwrap().len(), 20 * 18);
    }

    #[test]
    fn yuv_from_short_buffer_rejected() {
        assert!(matches!(
            YuvImage::from_buffer(vec![0; 10], 8, 1, 8, Subsampling::Gray),
            Err(TjError::InvalidArgument { .. })
        ));
    }
}
