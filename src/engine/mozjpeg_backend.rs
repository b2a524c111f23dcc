// src/engine/mozjpeg_backend.rs
//
// Reference NativeEngine built on mozjpeg (libjpeg-turbo underneath) for 8-bit
// data. Scaling, cropping and transforms run on decoded pixels with the image
// crate; headers come from the marker walker; ICC and density markers are
// patched in with img-parts.

use crate::engine::buffers::{PackedImage, PackedImageMut, YuvImage};
use crate::engine::catalog::{Colorspace, PixelFormat, Subsampling};
use crate::engine::common::run_with_panic_policy;
use crate::engine::convert;
use crate::engine::header;
use crate::engine::native::{
    Density, EngineError, EngineParams, EngineResult, HeaderInfo, NativeEngine, TransformPlan,
};
use crate::engine::params::Restart;
use crate::ops::{TransformOp, TransformOptions};
use image::{imageops::FilterType, DynamicImage, GrayImage, RgbImage};
use img_parts::jpeg::{markers, Jpeg, JpegSegment};
use img_parts::{Bytes, ImageICC};
use mozjpeg::{ColorSpace, Compress, Decompress};
use rayon::prelude::*;

/// Quality used to re-encode transform output when none is configured.
const TRANSFORM_QUALITY: u8 = 95;

/// Input sample layout handed to the compressor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Input {
    Rgb,
    Gray,
    Cmyk,
}

impl Input {
    fn components(self) -> usize {
        match self {
            Input::Rgb => 3,
            Input::Gray => 1,
            Input::Cmyk => 4,
        }
    }

    fn color_space(self) -> ColorSpace {
        match self {
            Input::Rgb => ColorSpace::JCS_RGB,
            Input::Gray => ColorSpace::JCS_GRAYSCALE,
            Input::Cmyk => ColorSpace::JCS_CMYK,
        }
    }
}

fn jpeg_color_space(colorspace: Colorspace) -> ColorSpace {
    match colorspace {
        Colorspace::Rgb => ColorSpace::JCS_RGB,
        Colorspace::YCbCr => ColorSpace::JCS_YCbCr,
        Colorspace::Gray => ColorSpace::JCS_GRAYSCALE,
        Colorspace::Cmyk => ColorSpace::JCS_CMYK,
        Colorspace::Ycck => ColorSpace::JCS_YCCK,
    }
}

/// Encoder settings shared by compression and transform output.
#[derive(Clone, Debug)]
struct EncodeSettings<'a> {
    quality: u8,
    subsampling: Subsampling,
    colorspace: Colorspace,
    progressive: bool,
    optimize: bool,
    density: Density,
    icc_profile: Option<&'a [u8]>,
}

fn unsupported(operation: &'static str, reason: impl Into<String>) -> EngineError {
    EngineError::Unsupported {
        operation,
        reason: reason.into(),
    }
}

/// Reject what this engine cannot encode.
fn check_encodable(operation: &'static str, params: &EngineParams) -> EngineResult<()> {
    if params.precision != 8 {
        return Err(unsupported(operation, format!("{}-bit samples", params.precision)));
    }
    if params.lossless.is_some() {
        return Err(unsupported(operation, "lossless coding"));
    }
    if params.arithmetic {
        return Err(unsupported(operation, "arithmetic coding"));
    }
    if params.restart != Restart::None {
        return Err(unsupported(operation, "restart markers"));
    }
    Ok(())
}

fn encode(
    pixels: &[u8],
    input: Input,
    width: u32,
    height: u32,
    settings: &EncodeSettings<'_>,
) -> EngineResult<Vec<u8>> {
    let row_len = width as usize * input.components();
    if pixels.len() < row_len * height as usize {
        return Err(EngineError::Failed(format!(
            "encoder input holds {} bytes, {}x{} needs {}",
            pixels.len(),
            width,
            height,
            row_len * height as usize
        )));
    }

    let mut comp = Compress::new(input.color_space());
    if !settings.progressive {
        // mozjpeg defaults to a progressive max-compression profile.
        comp.set_fastest_defaults();
    }
    comp.set_size(width as usize, height as usize);
    comp.set_color_space(jpeg_color_space(settings.colorspace));
    comp.set_quality(settings.quality as f32);
    if settings.colorspace != Colorspace::Gray {
        apply_sampling_factors(&mut comp, settings.subsampling)?;
    }
    if settings.progressive {
        comp.set_progressive_mode();
    }
    comp.set_optimize_coding(settings.optimize);

    let estimated = (row_len * height as usize / 4).max(4096);
    let mut writer = comp
        .start_compress(Vec::with_capacity(estimated))
        .map_err(|e| EngineError::Failed(format!("mozjpeg: failed to start compress: {e:?}")))?;
    for row in pixels[..row_len * height as usize].chunks(row_len) {
        writer
            .write_scanlines(row)
            .map_err(|e| EngineError::Failed(format!("mozjpeg: failed to write scanlines: {e:?}")))?;
    }
    let output = writer
        .finish()
        .map_err(|e| EngineError::Failed(format!("mozjpeg: failed to finish: {e:?}")))?;

    patch_markers(output, settings.density, settings.icc_profile)
}

/// Luma and K sample at the subsampling factors, the two chroma components at 1x1.
/// `set_chroma_sampling_pixel_sizes` stops at the third component.
fn apply_sampling_factors(comp: &mut Compress, subsampling: Subsampling) -> EngineResult<()> {
    let (h, v) = subsampling
        .factors()
        .map_err(|e| EngineError::Failed(e.to_string()))?;
    for (index, component) in comp.components_mut().iter_mut().enumerate() {
        let (ch, cv) = if index == 0 || index == 3 { (h, v) } else { (1, 1) };
        component.h_samp_factor = ch as i32;
        component.v_samp_factor = cv as i32;
    }
    Ok(())
}

/// Rewrite the JFIF density and attach an ICC profile.
fn patch_markers(jpeg_data: Vec<u8>, density: Density, icc: Option<&[u8]>) -> EngineResult<Vec<u8>> {
    if density == Density::default() && icc.is_none() {
        return Ok(jpeg_data);
    }
    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data))
        .map_err(|e| EngineError::Failed(format!("failed to parse JPEG for marker update: {e}")))?;

    if density != Density::default() {
        for segment in jpeg.segments_mut().iter_mut() {
            let contents = segment.contents();
            if segment.marker() == markers::APP0 && contents.len() >= 12 && contents.starts_with(b"JFIF\0") {
                let mut body = contents.to_vec();
                body[7] = density.units;
                body[8..10].copy_from_slice(&density.x.to_be_bytes());
                body[10..12].copy_from_slice(&density.y.to_be_bytes());
                *segment = JpegSegment::new_with_contents(markers::APP0, Bytes::from(body));
                break;
            }
        }
    }
    if let Some(profile) = icc {
        jpeg.set_icc_profile(Some(Bytes::from(profile.to_vec())));
    }

    let mut output = Vec::new();
    jpeg.encoder()
        .write_to(&mut output)
        .map_err(|e| EngineError::Failed(format!("failed to write JPEG markers: {e}")))?;
    Ok(output)
}

fn decode_full(jpeg: &[u8], info: &HeaderInfo, params: &EngineParams) -> EngineResult<RgbImage> {
    if info.precision != 8 {
        return Err(unsupported("decompress", format!("{}-bit samples", info.precision)));
    }
    if info.lossless {
        return Err(unsupported("decompress", "lossless JPEG"));
    }
    if matches!(info.colorspace, Colorspace::Cmyk | Colorspace::Ycck) {
        return Err(unsupported("decompress", "CMYK/YCCK source"));
    }
    params.limits.enforce_image(info.width, info.height, 3)?;

    let decompress = Decompress::new_mem(jpeg)
        .map_err(|e| EngineError::Failed(format!("mozjpeg decompress init failed: {e:?}")))?;
    let mut decompress = decompress
        .rgb()
        .map_err(|e| EngineError::Failed(format!("mozjpeg rgb conversion failed: {e:?}")))?;
    let (width, height) = (decompress.width() as u32, decompress.height() as u32);
    let pixels: Vec<[u8; 3]> = decompress
        .read_scanlines()
        .map_err(|e| EngineError::Failed(format!("mozjpeg: failed to read scanlines: {e:?}")))?;
    let flat: Vec<u8> = pixels.into_iter().flatten().collect();
    RgbImage::from_raw(width, height, flat)
        .ok_or_else(|| EngineError::Failed("mozjpeg: decoded fewer rows than the header declares".into()))
}

/// Apply the scaling factor, then the resolved crop.
fn scale_and_crop(rgb: RgbImage, params: &EngineParams) -> RgbImage {
    let mut img = DynamicImage::ImageRgb8(rgb);
    if !params.scaling.is_unscaled() {
        let (w, h) = (params.scaling.scale(img.width()), params.scaling.scale(img.height()));
        img = img.resize_exact(w, h, FilterType::Triangle);
    }
    let crop = params.crop;
    if (crop.x, crop.y, crop.width, crop.height) != (0, 0, img.width(), img.height()) {
        img = img.crop_imm(crop.x, crop.y, crop.width, crop.height);
    }
    img.to_rgb8()
}

fn apply_op(img: DynamicImage, op: TransformOp) -> DynamicImage {
    match op {
        TransformOp::None => img,
        TransformOp::HFlip => img.fliph(),
        TransformOp::VFlip => img.flipv(),
        TransformOp::Transpose => img.rotate90().fliph(),
        TransformOp::Transverse => img.rotate270().fliph(),
        TransformOp::Rot90 => img.rotate90(),
        TransformOp::Rot180 => img.rotate180(),
        TransformOp::Rot270 => img.rotate270(),
    }
}

fn transform_one(
    source: &DynamicImage,
    plan: &TransformPlan,
    params: &EngineParams,
) -> EngineResult<Vec<u8>> {
    if !plan.produces_output() {
        return Ok(Vec::new());
    }
    if plan.options.contains(TransformOptions::ARITHMETIC) {
        return Err(unsupported("transform", "arithmetic coding"));
    }
    let trimmed = source.crop_imm(0, 0, plan.source_width, plan.source_height);
    let transformed = apply_op(trimmed, plan.op);
    let r = plan.region;
    let out = if (r.x, r.y, r.width, r.height) == (0, 0, transformed.width(), transformed.height()) {
        transformed
    } else {
        transformed.crop_imm(r.x, r.y, r.width, r.height)
    };

    let gray = plan.subsampling == Subsampling::Gray;
    let settings = EncodeSettings {
        quality: params.quality.unwrap_or(TRANSFORM_QUALITY),
        subsampling: plan.subsampling,
        colorspace: if gray { Colorspace::Gray } else { Colorspace::YCbCr },
        progressive: plan.options.contains(TransformOptions::PROGRESSIVE),
        optimize: plan.options.contains(TransformOptions::OPTIMIZE),
        density: params.density,
        icc_profile: if plan.options.contains(TransformOptions::COPY_NONE) {
            None
        } else {
            params.icc_profile.as_deref()
        },
    };
    if gray {
        let luma: GrayImage = out.to_luma8();
        encode(luma.as_raw(), Input::Gray, luma.width(), luma.height(), &settings)
    } else {
        let rgb = out.to_rgb8();
        encode(rgb.as_raw(), Input::Rgb, rgb.width(), rgb.height(), &settings)
    }
}

/// Reference engine. Holds no native state between calls beyond the warning log.
#[derive(Debug, Default)]
pub struct MozjpegEngine {
    opened: bool,
    warnings: Vec<String>,
}

impl MozjpegEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Read the header and apply the warning policy to what the walk found.
    fn scan(&mut self, jpeg: &[u8], params: &EngineParams) -> EngineResult<HeaderInfo> {
        let scan = header::read_header(jpeg)?;
        if params.stop_on_warning {
            if let Some(first) = scan.warnings.into_iter().next() {
                return Err(EngineError::Warning(first));
            }
        } else {
            self.warnings.extend(scan.warnings);
        }
        Ok(scan.info)
    }

    fn settings<'p>(params: &'p EngineParams, subsampling: Subsampling) -> EngineResult<EncodeSettings<'p>> {
        let quality = params
            .quality
            .ok_or_else(|| EngineError::Failed("quality is required for lossy compression".into()))?;
        Ok(EncodeSettings {
            quality,
            subsampling,
            colorspace: params.colorspace,
            progressive: params.progressive,
            optimize: params.optimize,
            density: params.density,
            icc_profile: params.icc_profile.as_deref(),
        })
    }
}

impl NativeEngine for MozjpegEngine {
    fn open(&mut self) -> EngineResult<()> {
        self.opened = true;
        tracing::debug!("mozjpeg engine opened");
        Ok(())
    }

    fn release(&mut self) {
        self.opened = false;
        self.warnings.clear();
        tracing::debug!("mozjpeg engine released");
    }

    fn compress_packed(&mut self, src: &PackedImage<'_>, params: &EngineParams) -> EngineResult<Vec<u8>> {
        run_with_panic_policy("compress:mozjpeg", || {
            check_encodable("compress", params)?;
            let input = match (src.format(), params.colorspace) {
                (PixelFormat::Cmyk, _) => Input::Cmyk,
                (PixelFormat::Gray, _) | (_, Colorspace::Gray) => Input::Gray,
                _ => Input::Rgb,
            };
            params
                .limits
                .enforce_image(src.width(), src.height(), input.components() as u64)?;
            let pixels = match input {
                Input::Rgb => convert::packed_to_rgb(src, params.bottom_up)?,
                Input::Gray => convert::packed_to_gray(src, params.bottom_up)?,
                Input::Cmyk => convert::packed_to_cmyk(src, params.bottom_up)?,
            };
            let settings = Self::settings(params, params.subsampling)?;
            encode(&pixels, input, src.width(), src.height(), &settings)
        })
    }

    fn compress_from_yuv(&mut self, src: &YuvImage, params: &EngineParams) -> EngineResult<Vec<u8>> {
        run_with_panic_policy("compress-yuv:mozjpeg", || {
            check_encodable("compress from YUV", params)?;
            params.limits.enforce_image(src.width(), src.height(), 3)?;
            let rgb = convert::planes_to_rgb(src)?;
            let settings = Self::settings(params, src.subsampling())?;
            if src.subsampling() == Subsampling::Gray {
                let gray: Vec<u8> = rgb.chunks_exact(3).map(|p| p[0]).collect();
                let settings = EncodeSettings {
                    colorspace: Colorspace::Gray,
                    ..settings
                };
                return encode(&gray, Input::Gray, src.width(), src.height(), &settings);
            }
            encode(&rgb, Input::Rgb, src.width(), src.height(), &settings)
        })
    }

    fn encode_yuv(
        &mut self,
        src: &PackedImage<'_>,
        dst: &mut YuvImage,
        params: &EngineParams,
    ) -> EngineResult<()> {
        run_with_panic_policy("encode-yuv", || {
            params.limits.enforce_image(src.width(), src.height(), 3)?;
            let rgb = convert::packed_to_rgb(src, params.bottom_up)?;
            convert::rgb_to_planes(&rgb, dst)
        })
    }

    fn decompress_header(&mut self, jpeg: &[u8]) -> EngineResult<HeaderInfo> {
        run_with_panic_policy("header", || {
            let scan = header::read_header(jpeg)?;
            self.warnings.extend(scan.warnings);
            Ok(scan.info)
        })
    }

    fn decompress_packed(
        &mut self,
        jpeg: &[u8],
        dst: &mut PackedImageMut<'_>,
        params: &EngineParams,
    ) -> EngineResult<()> {
        let info = self.scan(jpeg, params)?;
        run_with_panic_policy("decompress:mozjpeg", || {
            if dst.precision() != 8 {
                return Err(unsupported("decompress", format!("{}-bit samples", dst.precision())));
            }
            let rgb = scale_and_crop(decode_full(jpeg, &info, params)?, params);
            convert::write_rgb(rgb.as_raw(), dst, params.bottom_up)
        })
    }

    fn decompress_to_yuv(
        &mut self,
        jpeg: &[u8],
        dst: &mut YuvImage,
        params: &EngineParams,
    ) -> EngineResult<()> {
        let info = self.scan(jpeg, params)?;
        run_with_panic_policy("decompress-yuv:mozjpeg", || {
            let rgb = scale_and_crop(decode_full(jpeg, &info, params)?, params);
            convert::rgb_to_planes(rgb.as_raw(), dst)
        })
    }

    fn decode_yuv(
        &mut self,
        src: &YuvImage,
        dst: &mut PackedImageMut<'_>,
        params: &EngineParams,
    ) -> EngineResult<()> {
        run_with_panic_policy("decode-yuv", || {
            params.limits.enforce_image(src.width(), src.height(), 3)?;
            let rgb = convert::planes_to_rgb(src)?;
            convert::write_rgb(&rgb, dst, params.bottom_up)
        })
    }

    fn transform(
        &mut self,
        jpeg: &[u8],
        plans: &[TransformPlan],
        params: &EngineParams,
    ) -> EngineResult<Vec<Vec<u8>>> {
        let info = self.scan(jpeg, params)?;
        run_with_panic_policy("transform:mozjpeg", || {
            let source = DynamicImage::ImageRgb8(decode_full(jpeg, &info, params)?);
            plans
                .par_iter()
                .map(|plan| transform_one(&source, plan, params))
                .collect()
        })
    }

    fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
