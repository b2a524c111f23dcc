// src/engine/convert.rs
//
// Pixel conversions for the reference engine: packed-format swizzling, JFIF
// RGB <-> YCbCr and chroma resampling for the planar YUV paths.

use crate::engine::buffers::{PackedImage, PackedImageMut, YuvImage};
use crate::engine::catalog::{Channel, PixelFormat, Subsampling};
use crate::engine::native::{EngineError, EngineResult};

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// JFIF (full range BT.601) forward transform.
pub fn rgb_to_ycc(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
    let cr = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
    (clamp_u8(y), clamp_u8(cb), clamp_u8(cr))
}

pub fn ycc_to_rgb(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let (y, cb, cr) = (y as f32, cb as f32 - 128.0, cr as f32 - 128.0);
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    (clamp_u8(r), clamp_u8(g), clamp_u8(b))
}

pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    rgb_to_ycc(r, g, b).0
}

fn unsupported(operation: &'static str, reason: impl Into<String>) -> EngineError {
    EngineError::Unsupported {
        operation,
        reason: reason.into(),
    }
}

/// Source row index honouring the bottom-up flag.
fn source_row(row: u32, height: u32, bottom_up: bool) -> u32 {
    if bottom_up {
        height - 1 - row
    } else {
        row
    }
}

/// Tightly packed RGB copy of an 8-bit packed image. Gray pixels are replicated
/// into all three channels; CMYK is rejected.
pub fn packed_to_rgb(src: &PackedImage<'_>, bottom_up: bool) -> EngineResult<Vec<u8>> {
    let format = src.format();
    if format == PixelFormat::Cmyk {
        return Err(unsupported("RGB conversion", "CMYK pixels carry no RGB"));
    }
    let (w, h) = (src.width(), src.height());
    let ps = format.sample_size();
    let mut out = Vec::with_capacity(w as usize * h as usize * 3);
    for row in 0..h {
        let line = src
            .row_u8(source_row(row, h, bottom_up))
            .ok_or_else(|| unsupported("RGB conversion", "only 8-bit samples are supported"))?;
        match (
            format.channel_offset(Channel::Red),
            format.channel_offset(Channel::Green),
            format.channel_offset(Channel::Blue),
        ) {
            (Some(r), Some(g), Some(b)) => {
                for px in line.chunks_exact(ps) {
                    out.extend_from_slice(&[px[r], px[g], px[b]]);
                }
            }
            _ => {
                for &v in line {
                    out.extend_from_slice(&[v, v, v]);
                }
            }
        }
    }
    Ok(out)
}

/// Tightly packed single-channel copy; colour pixels are reduced to luma.
pub fn packed_to_gray(src: &PackedImage<'_>, bottom_up: bool) -> EngineResult<Vec<u8>> {
    if src.format() == PixelFormat::Gray {
        let (w, h) = (src.width(), src.height());
        let mut out = Vec::with_capacity(w as usize * h as usize);
        for row in 0..h {
            let line = src
                .row_u8(source_row(row, h, bottom_up))
                .ok_or_else(|| unsupported("gray conversion", "only 8-bit samples are supported"))?;
            out.extend_from_slice(line);
        }
        return Ok(out);
    }
    let rgb = packed_to_rgb(src, bottom_up)?;
    Ok(rgb.chunks_exact(3).map(|p| luma(p[0], p[1], p[2])).collect())
}

/// Tightly packed CMYK copy.
pub fn packed_to_cmyk(src: &PackedImage<'_>, bottom_up: bool) -> EngineResult<Vec<u8>> {
    if src.format() != PixelFormat::Cmyk {
        return Err(unsupported("CMYK conversion", format!("{} pixels carry no CMYK", src.format())));
    }
    let h = src.height();
    let mut out = Vec::with_capacity(src.width() as usize * h as usize * 4);
    for row in 0..h {
        let line = src
            .row_u8(source_row(row, h, bottom_up))
            .ok_or_else(|| unsupported("CMYK conversion", "only 8-bit samples are supported"))?;
        out.extend_from_slice(line);
    }
    Ok(out)
}

/// Write tight RGB pixels into `dst` in its pixel format. Padding and alpha
/// bytes are set to 0xFF.
pub fn write_rgb(rgb: &[u8], dst: &mut PackedImageMut<'_>, bottom_up: bool) -> EngineResult<()> {
    let geometry = *dst.geometry();
    let format = geometry.format;
    if format == PixelFormat::Cmyk {
        return Err(unsupported("decompress", "CMYK output"));
    }
    let (w, h) = (geometry.width as usize, geometry.height);
    if rgb.len() < w * h as usize * 3 {
        return Err(EngineError::Failed(format!(
            "decoded {} bytes, expected {}",
            rgb.len(),
            w * h as usize * 3
        )));
    }
    let ps = format.sample_size();
    let offsets = (
        format.channel_offset(Channel::Red),
        format.channel_offset(Channel::Green),
        format.channel_offset(Channel::Blue),
    );
    for row in 0..h {
        let src = &rgb[row as usize * w * 3..(row as usize + 1) * w * 3];
        let line = dst
            .row_u8_mut(source_row(row, h, bottom_up))
            .ok_or_else(|| unsupported("decompress", "only 8-bit samples are supported"))?;
        match offsets {
            (Some(r), Some(g), Some(b)) => {
                for (out, px) in line.chunks_exact_mut(ps).zip(src.chunks_exact(3)) {
                    out.fill(0xFF);
                    out[r] = px[0];
                    out[g] = px[1];
                    out[b] = px[2];
                }
            }
            _ => {
                for (out, px) in line.iter_mut().zip(src.chunks_exact(3)) {
                    *out = luma(px[0], px[1], px[2]);
                }
            }
        }
    }
    Ok(())
}

/// Fill every plane of `dst` from tight RGB pixels of the same dimensions.
///
/// Plane padding replicates the last column and row; chroma is the box
/// average of each `hsf x vsf` block.
pub fn rgb_to_planes(rgb: &[u8], dst: &mut YuvImage) -> EngineResult<()> {
    let (w, h) = (dst.width() as usize, dst.height() as usize);
    if rgb.len() < w * h * 3 {
        return Err(EngineError::Failed("RGB buffer shorter than the YUV image".into()));
    }
    let subsampling = dst.subsampling();
    let (hsf, vsf) = factors(subsampling)?;
    let mut planes = dst.planes_mut();
    let Some((luma_layout, _)) = planes.first() else {
        return Err(EngineError::Failed("YUV image has no planes".into()));
    };
    let (pw, ph) = (luma_layout.width as usize, luma_layout.height as usize);

    let pixel = |x: usize, y: usize| {
        let i = (y.min(h - 1) * w + x.min(w - 1)) * 3;
        rgb_to_ycc(rgb[i], rgb[i + 1], rgb[i + 2])
    };

    {
        let (layout, plane) = &mut planes[0];
        let stride = layout.stride as usize;
        for y in 0..ph {
            for x in 0..pw {
                plane[y * stride + x] = pixel(x, y).0;
            }
        }
    }
    if subsampling == Subsampling::Gray {
        return Ok(());
    }

    for (component, (layout, plane)) in planes.iter_mut().enumerate().skip(1) {
        let stride = layout.stride as usize;
        for cy in 0..layout.height as usize {
            for cx in 0..layout.width as usize {
                let mut sum = 0u32;
                for dy in 0..vsf {
                    for dx in 0..hsf {
                        let (_, cb, cr) = pixel(cx * hsf + dx, cy * vsf + dy);
                        let chroma = if component == 1 { cb } else { cr };
                        sum += chroma as u32;
                    }
                }
                let n = (hsf * vsf) as u32;
                plane[cy * stride + cx] = ((sum + n / 2) / n) as u8;
            }
        }
    }
    Ok(())
}

/// Tight RGB pixels reconstructed from `src`, chroma upsampled by replication.
pub fn planes_to_rgb(src: &YuvImage) -> EngineResult<Vec<u8>> {
    let (w, h) = (src.width() as usize, src.height() as usize);
    let subsampling = src.subsampling();
    let (hsf, vsf) = factors(subsampling)?;
    let plane = |i: usize| {
        let layout = src.plane_layout(i).copied();
        layout.zip(src.plane(i)).ok_or_else(|| EngineError::Failed(format!("missing plane {i}")))
    };
    let (y_layout, y_plane) = plane(0)?;
    let mut out = Vec::with_capacity(w * h * 3);

    if subsampling == Subsampling::Gray {
        for y in 0..h {
            for &v in &y_plane[y * y_layout.stride as usize..][..w] {
                out.extend_from_slice(&[v, v, v]);
            }
        }
        return Ok(out);
    }

    let (u_layout, u_plane) = plane(1)?;
    let (v_layout, v_plane) = plane(2)?;
    for y in 0..h {
        for x in 0..w {
            let luma = y_plane[y * y_layout.stride as usize + x];
            let cb = u_plane[(y / vsf) * u_layout.stride as usize + x / hsf];
            let cr = v_plane[(y / vsf) * v_layout.stride as usize + x / hsf];
            let (r, g, b) = ycc_to_rgb(luma, cb, cr);
            out.extend_from_slice(&[r, g, b]);
        }
    }
    Ok(out)
}

fn factors(subsampling: Subsampling) -> EngineResult<(usize, usize)> {
    subsampling
        .factors()
        .map(|(h, v)| (h as usize, v as usize))
        .map_err(|e| EngineError::Failed(e.to_string()))
}
