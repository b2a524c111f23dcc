// src/engine/sizing.rs
//
// Buffer sizing: worst-case JPEG size, planar YUV plane geometry and layouts.
//
// Every size is computed in u64 and must fit in MAX_BUFFER_SIZE (i32::MAX), the
// largest buffer the native engine interface can address. Crafted dimensions must
// fail with SizeOverflow instead of producing an undersized allocation.

use crate::engine::catalog::Subsampling;
use crate::error::{TjError, TjResult};

/// Largest buffer, plane or dimension this layer will hand to the native engine.
pub const MAX_BUFFER_SIZE: u64 = i32::MAX as u64;

/// Fixed allowance for markers and headers in a worst-case JPEG stream.
const JPEG_HEADER_ALLOWANCE: u64 = 2048;

/// Round `value` up to a multiple of `multiple` (a power of two).
pub(crate) fn pad(value: u64, multiple: u64) -> u64 {
    debug_assert!(multiple.is_power_of_two());
    (value + multiple - 1) & !(multiple - 1)
}

fn require_positive(name: &'static str, value: u32) -> TjResult<()> {
    if value == 0 {
        return Err(TjError::invalid_argument(
            name,
            value.to_string(),
            "must be at least 1",
        ));
    }
    Ok(())
}

fn require_component(component: usize, subsampling: Subsampling) -> TjResult<()> {
    if component >= subsampling.plane_count() {
        return Err(TjError::invalid_argument(
            "component",
            component.to_string(),
            format!("{subsampling} images have {} plane(s)", subsampling.plane_count()),
        ));
    }
    Ok(())
}

/// Bytes of expansion per padded pixel: 2 for luma plus the chroma share.
///
/// A 4:4:4 MCU carries 4 chroma blocks per 64 luma pixels, so the chroma share is
/// `4 * 64 / (mcu_width * mcu_height)`; gray images carry none.
fn expansion_factor(subsampling: Subsampling) -> TjResult<u64> {
    let (mcu_w, mcu_h) = (subsampling.mcu_width()? as u64, subsampling.mcu_height()? as u64);
    let chroma = match subsampling {
        Subsampling::Gray => 0,
        _ => 4 * 64 / (mcu_w * mcu_h),
    };
    Ok(2 + chroma)
}

/// Worst-case size of a JPEG stream for an image of the given dimensions.
///
/// [`Subsampling::Unknown`] is sized as 4:4:4, which bounds every other level.
pub fn jpeg_buffer_size(width: u32, height: u32, subsampling: Subsampling) -> TjResult<usize> {
    require_positive("width", width)?;
    require_positive("height", height)?;
    let subsampling = match subsampling {
        Subsampling::Unknown => Subsampling::S444,
        known => known,
    };
    let mcu_w = subsampling.mcu_width()? as u64;
    let mcu_h = subsampling.mcu_height()? as u64;
    let factor = expansion_factor(subsampling)?;
    let overflow = || TjError::size_overflow("JPEG buffer", width as u64, height as u64, MAX_BUFFER_SIZE);

    let size = pad(width as u64, mcu_w)
        .checked_mul(pad(height as u64, mcu_h))
        .and_then(|px| px.checked_mul(factor))
        .and_then(|bytes| bytes.checked_add(JPEG_HEADER_ALLOWANCE))
        .ok_or_else(overflow)?;
    if size > MAX_BUFFER_SIZE {
        return Err(overflow());
    }
    Ok(size as usize)
}

/// Width of plane `component` (0 = Y, 1 = U, 2 = V).
///
/// The luma width is padded to the horizontal chroma factor; chroma widths are
/// `ceil(width / hsf)`.
pub fn plane_width(component: usize, width: u32, subsampling: Subsampling) -> TjResult<u32> {
    require_positive("width", width)?;
    let (hsf, _) = subsampling.factors()?;
    require_component(component, subsampling)?;
    let padded = pad(width as u64, hsf as u64);
    let plane = if component == 0 { padded } else { padded / hsf as u64 };
    if plane > MAX_BUFFER_SIZE {
        return Err(TjError::size_overflow("YUV plane width", width as u64, 0, MAX_BUFFER_SIZE));
    }
    Ok(plane as u32)
}

/// Height of plane `component`; mirrors [`plane_width`] with the vertical factor.
pub fn plane_height(component: usize, height: u32, subsampling: Subsampling) -> TjResult<u32> {
    require_positive("height", height)?;
    let (_, vsf) = subsampling.factors()?;
    require_component(component, subsampling)?;
    let padded = pad(height as u64, vsf as u64);
    let plane = if component == 0 { padded } else { padded / vsf as u64 };
    if plane > MAX_BUFFER_SIZE {
        return Err(TjError::size_overflow("YUV plane height", 0, height as u64, MAX_BUFFER_SIZE));
    }
    Ok(plane as u32)
}

/// Bytes spanned by one plane with the given row stride (0 = plane width).
///
/// The last row only needs the plane width, not a full stride.
pub fn plane_size(
    component: usize,
    width: u32,
    stride: u32,
    height: u32,
    subsampling: Subsampling,
) -> TjResult<usize> {
    let pw = plane_width(component, width, subsampling)? as u64;
    let ph = plane_height(component, height, subsampling)? as u64;
    let stride = if stride == 0 { pw } else { stride as u64 };
    let size = stride * (ph - 1) + pw;
    if size > MAX_BUFFER_SIZE {
        return Err(TjError::size_overflow(
            "YUV plane",
            width as u64,
            height as u64,
            MAX_BUFFER_SIZE,
        ));
    }
    Ok(size as usize)
}

fn require_alignment(align: u32) -> TjResult<()> {
    if align == 0 || !align.is_power_of_two() {
        return Err(TjError::invalid_argument(
            "row alignment",
            align.to_string(),
            "must be a power of two",
        ));
    }
    Ok(())
}

/// Size of a unified planar YUV buffer whose rows are padded to `align` bytes.
pub fn yuv_buffer_size(width: u32, align: u32, height: u32, subsampling: Subsampling) -> TjResult<usize> {
    YuvLayout::new(width, align, height, subsampling).map(|layout| layout.total_size())
}

/// Geometry of one plane inside a unified YUV buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub offset: usize,
}

impl PlaneLayout {
    /// Bytes reserved for the plane (`stride * height`).
    pub fn reserved_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Plane descriptors for a planar YUV image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YuvLayout {
    width: u32,
    height: u32,
    align: u32,
    subsampling: Subsampling,
    planes: Vec<PlaneLayout>,
    total: usize,
}

impl YuvLayout {
    pub fn new(width: u32, align: u32, height: u32, subsampling: Subsampling) -> TjResult<Self> {
        require_alignment(align)?;
        let overflow =
            || TjError::size_overflow("YUV buffer", width as u64, height as u64, MAX_BUFFER_SIZE);

        let mut planes = Vec::with_capacity(subsampling.plane_count());
        let mut offset: u64 = 0;
        for component in 0..subsampling.plane_count() {
            let pw = plane_width(component, width, subsampling)?;
            let ph = plane_height(component, height, subsampling)?;
            let stride = pad(pw as u64, align as u64);
            if stride > MAX_BUFFER_SIZE {
                return Err(overflow());
            }
            planes.push(PlaneLayout {
                width: pw,
                height: ph,
                stride: stride as u32,
                offset: offset as usize,
            });
            offset = stride
                .checked_mul(ph as u64)
                .and_then(|len| len.checked_add(offset))
                .filter(|&end| end <= MAX_BUFFER_SIZE)
                .ok_or_else(overflow)?;
        }

        Ok(Self {
            width,
            height,
            align,
            subsampling,
            planes,
            total: offset as usize,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn align(&self) -> u32 {
        self.align
    }

    pub fn subsampling(&self) -> Subsampling {
        self.subsampling
    }

    pub fn planes(&self) -> &[PlaneLayout] {
        &self.planes
    }

    pub fn plane(&self, component: usize) -> Option<&PlaneLayout> {
        self.planes.get(component)
    }

    pub fn total_size(&self) -> usize {
        self.total
    }
}
