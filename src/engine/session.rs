// src/engine/session.rs
//
// CodecSession: the compress/decompress/transform state machine.
//
// Every geometry and parameter rule is checked here, synchronously, before the
// engine sees a call. The engine only moves pixels and reports warnings.

use crate::engine::buffers::{PackedImage, PackedImageMut, PackedSamplesMut, YuvImage};
use crate::engine::catalog::{Colorspace, PixelFormat, Subsampling};
use crate::engine::config::SessionConfig;
use crate::engine::cropping::{resolve_crop, resolve_transform_crop, CroppingRegion};
use crate::engine::firewall::EngineLimits;
use crate::engine::MAX_DIMENSION;
use crate::engine::mozjpeg_backend::MozjpegEngine;
use crate::engine::native::{
    Density, EngineParams, EngineResult, HeaderInfo, NativeEngine, TransformPlan,
};
use crate::engine::params::{CodecParameters, Param};
use crate::engine::scaling::ScalingFactor;
use crate::engine::sizing::jpeg_buffer_size;
use crate::engine::source::{Binding, SessionState};
use crate::error::{TjError, TjResult};
use crate::ops::{TransformDescriptor, TransformOptions};

/// Payload of one APP2 ICC_PROFILE segment, and the per-segment overhead.
const ICC_CHUNK_PAYLOAD: usize = 65519;
const ICC_CHUNK_OVERHEAD: usize = 18;

fn icc_allowance(profile: Option<&[u8]>) -> usize {
    profile.map_or(0, |p| p.len() + p.len().div_ceil(ICC_CHUNK_PAYLOAD) * ICC_CHUNK_OVERHEAD)
}

/// A compress/decompress/transform session over one native engine.
///
/// Single-threaded: the session has no internal synchronization. The bound
/// source is borrowed for `'src` and never copied.
pub struct CodecSession<'src, E: NativeEngine = MozjpegEngine> {
    engine: E,
    engine_open: bool,
    closed: bool,
    config: SessionConfig,
    params: CodecParameters,
    binding: Binding<'src>,
    scaling: ScalingFactor,
    crop: CroppingRegion,
    icc_profile: Option<Vec<u8>>,
    last_warnings: Vec<String>,
}

impl<'src> CodecSession<'src, MozjpegEngine> {
    /// Session on the mozjpeg reference engine with default configuration.
    pub fn new() -> Self {
        Self::from_parts(MozjpegEngine::new(), SessionConfig::default(), CodecParameters::new())
    }

    pub fn with_config(config: SessionConfig) -> TjResult<Self> {
        Self::with_engine(MozjpegEngine::new(), config)
    }
}

impl Default for CodecSession<'_, MozjpegEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'src, E: NativeEngine> CodecSession<'src, E> {
    pub fn with_engine(engine: E, config: SessionConfig) -> TjResult<Self> {
        let params = config.to_parameters()?;
        Ok(Self::from_parts(engine, config, params))
    }

    fn from_parts(engine: E, config: SessionConfig, params: CodecParameters) -> Self {
        Self {
            engine,
            engine_open: false,
            closed: false,
            config,
            params,
            binding: Binding::Empty,
            scaling: ScalingFactor::UNSCALED,
            crop: CroppingRegion::UNCROPPED,
            icc_profile: None,
            last_warnings: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else {
            self.binding.state()
        }
    }

    /// Warnings from the last operation that completed despite them.
    pub fn warnings(&self) -> &[String] {
        &self.last_warnings
    }

    fn ensure_open(&self) -> TjResult<()> {
        if self.closed {
            return Err(TjError::session_closed());
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Parameters
    // -------------------------------------------------------------------------

    pub fn parameters(&self) -> &CodecParameters {
        &self.params
    }

    pub fn get(&self, param: Param) -> TjResult<i32> {
        self.ensure_open()?;
        Ok(self.params.get(param))
    }

    pub fn set(&mut self, param: Param, value: i32) -> TjResult<()> {
        self.ensure_open()?;
        if param == Param::Precision && self.binding.header().is_some() {
            return Err(TjError::invalid_parameter_value(
                param.name(),
                value as i64,
                "read-only once a JPEG header has been read",
            ));
        }
        self.params.set(param, value)?;
        tracing::debug!(param = param.name(), value, "parameter set");
        Ok(())
    }

    pub fn get_named(&self, name: &str) -> TjResult<i32> {
        self.get(name.parse()?)
    }

    pub fn set_named(&mut self, name: &str, value: i32) -> TjResult<()> {
        self.set(name.parse()?, value)
    }

    pub fn scaling_factor(&self) -> ScalingFactor {
        self.scaling
    }

    pub fn set_scaling_factor(&mut self, factor: ScalingFactor) -> TjResult<()> {
        self.ensure_open()?;
        if !factor.is_supported() {
            return Err(TjError::invalid_argument(
                "scaling factor",
                factor.to_string(),
                "not one of the supported scaling factors",
            ));
        }
        if !factor.is_unscaled() && self.binding.header().is_some_and(|h| h.lossless) {
            return Err(TjError::invalid_argument(
                "scaling factor",
                factor.to_string(),
                "lossless JPEG images cannot be scaled",
            ));
        }
        self.scaling = factor;
        Ok(())
    }

    pub fn cropping_region(&self) -> CroppingRegion {
        self.crop
    }

    /// Set the decode crop. Checked at once when a header is known, otherwise at
    /// decompression time.
    pub fn set_cropping_region(&mut self, region: CroppingRegion) -> TjResult<()> {
        self.ensure_open()?;
        if let Some(header) = self.binding.header() {
            resolve_crop(region, self.scaling, header.width, header.height, header.subsampling)?;
        }
        self.crop = region;
        Ok(())
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    /// Profile embedded by compression and transforms. `None` clears it.
    pub fn set_icc_profile(&mut self, profile: Option<Vec<u8>>) -> TjResult<()> {
        self.ensure_open()?;
        if let Some(p) = &profile {
            if p.is_empty() {
                return Err(TjError::invalid_argument("ICC profile", "0 bytes", "must not be empty"));
            }
        }
        self.icc_profile = profile;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Source binding
    // -------------------------------------------------------------------------

    /// Bind packed pixels for compression or YUV encoding. The buffer's
    /// precision governs the compression; the stored precision parameter is
    /// left as set.
    pub fn bind_packed(&mut self, image: PackedImage<'src>) -> TjResult<()> {
        self.ensure_open()?;
        tracing::debug!(
            from = self.binding.kind(),
            width = image.width(),
            height = image.height(),
            precision = image.precision(),
            format = %image.format(),
            "bound packed-pixel source"
        );
        self.binding = Binding::Packed(image);
        Ok(())
    }

    /// Bind a planar YUV image. Its subsampling becomes the subsampling parameter.
    pub fn bind_planar_yuv(&mut self, image: &'src YuvImage) -> TjResult<()> {
        self.ensure_open()?;
        self.params.force_subsampling(image.subsampling());
        tracing::debug!(
            from = self.binding.kind(),
            width = image.width(),
            height = image.height(),
            subsampling = %image.subsampling(),
            "bound planar YUV source"
        );
        self.binding = Binding::PlanarYuv(image);
        Ok(())
    }

    /// Bind `jpeg` and read its header into the parameter store.
    ///
    /// A corrupt header leaves the JPEG bound without a header. Header warnings
    /// only fail the call when stop-on-warning is set.
    pub fn decompress_header(&mut self, jpeg: &'src [u8]) -> TjResult<HeaderInfo> {
        self.ensure_open()?;
        self.binding = Binding::Jpeg {
            data: jpeg,
            header: None,
        };
        let stop_on_warning = self.params.stop_on_warning();
        let (info, warnings) = self.call_raw("decompress header", |engine| engine.decompress_header(jpeg))?;
        if stop_on_warning {
            if let Some(first) = warnings.first() {
                tracing::debug!(warning = %first, "header warning aborts under stop-on-warning");
                return Err(TjError::header_warning(first.clone()));
            }
        }
        self.record_warnings("decompress header", warnings);
        self.params.record_header(&info);
        tracing::debug!(
            width = info.width,
            height = info.height,
            subsampling = %info.subsampling,
            precision = info.precision,
            "JPEG header read"
        );
        self.binding = Binding::Jpeg {
            data: jpeg,
            header: Some(info.clone()),
        };
        Ok(info)
    }

    // -------------------------------------------------------------------------
    // Compression
    // -------------------------------------------------------------------------

    /// Compress the bound packed-pixel or planar YUV source.
    pub fn compress(&mut self) -> TjResult<Vec<u8>> {
        self.ensure_open()?;
        match &self.binding {
            Binding::Packed(image) => {
                let image = *image;
                self.compress_packed(image)
            }
            Binding::PlanarYuv(image) => {
                let image: &'src YuvImage = *image;
                self.compress_yuv(image)
            }
            Binding::Empty | Binding::Jpeg { .. } => Err(TjError::no_source_bound("compress")),
        }
    }

    /// Compress into `dst`, which must hold the worst-case JPEG size. Returns
    /// the number of bytes written.
    pub fn compress_into(&mut self, dst: &mut [u8]) -> TjResult<usize> {
        self.ensure_open()?;
        let bound = self.compress_bound()?;
        if dst.len() < bound {
            return Err(TjError::destination_too_small(bound as u64, dst.len() as u64));
        }
        let jpeg = self.compress()?;
        let out = dst
            .get_mut(..jpeg.len())
            .ok_or_else(|| TjError::destination_too_small(jpeg.len() as u64, bound as u64))?;
        out.copy_from_slice(&jpeg);
        Ok(jpeg.len())
    }

    /// Worst-case compressed size for the bound source under the current parameters.
    pub fn compress_bound(&self) -> TjResult<usize> {
        self.ensure_open()?;
        let (width, height, subsampling) = match &self.binding {
            Binding::Packed(image) => {
                (image.width(), image.height(), self.packed_subsampling(image.format())?)
            }
            Binding::PlanarYuv(image) => (image.width(), image.height(), image.subsampling()),
            Binding::Empty | Binding::Jpeg { .. } => return Err(TjError::no_source_bound("compress")),
        };
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(TjError::invalid_argument(
                "image dimensions",
                format!("{width}x{height}"),
                format!("JPEG images are limited to {MAX_DIMENSION}x{MAX_DIMENSION}"),
            ));
        }
        Ok(jpeg_buffer_size(width, height, subsampling)? + icc_allowance(self.icc_profile.as_deref()))
    }

    fn packed_subsampling(&self, format: PixelFormat) -> TjResult<Subsampling> {
        let requested = self.params.subsampling();
        if !requested.is_known() {
            return Err(TjError::subsampling_required("compress"));
        }
        Ok(if format == PixelFormat::Gray || requested == Subsampling::Gray {
            Subsampling::Gray
        } else if self.params.is_lossless() {
            Subsampling::S444
        } else {
            requested
        })
    }

    fn derive_colorspace(&self, format: Option<PixelFormat>, subsampling: Subsampling) -> Colorspace {
        if let Some(explicit) = self.params.colorspace() {
            return explicit;
        }
        if subsampling == Subsampling::Gray || format == Some(PixelFormat::Gray) {
            Colorspace::Gray
        } else if format == Some(PixelFormat::Cmyk) {
            Colorspace::Ycck
        } else if self.params.is_lossless() {
            Colorspace::Rgb
        } else {
            Colorspace::YCbCr
        }
    }

    fn require_quality(&self) -> TjResult<()> {
        if !self.params.is_lossless() && self.params.quality().is_none() {
            return Err(TjError::invalid_parameter_value(
                Param::Quality.name(),
                self.params.get(Param::Quality) as i64,
                "must be set for lossy compression",
            ));
        }
        Ok(())
    }

    fn compress_packed(&mut self, image: PackedImage<'src>) -> TjResult<Vec<u8>> {
        let subsampling = self.packed_subsampling(image.format())?;
        if image.precision() == 16 && !self.params.is_lossless() {
            return Err(TjError::invalid_parameter_value(
                Param::Precision.name(),
                16,
                "16-bit precision requires lossless mode",
            ));
        }
        if self.params.is_lossless() {
            let pt = self.params.get(Param::LosslessPt);
            if pt >= image.precision() as i32 {
                return Err(TjError::invalid_parameter_value(
                    Param::LosslessPt.name(),
                    pt as i64,
                    format!("must be below the {}-bit sample precision", image.precision()),
                ));
            }
        }
        self.require_quality()?;
        let colorspace = self.derive_colorspace(Some(image.format()), subsampling);
        let bound = self.compress_bound()?;
        let full = CroppingRegion::new(0, 0, image.width(), image.height());
        let params = self.engine_params(subsampling, colorspace, image.precision(), ScalingFactor::UNSCALED, full);

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            subsampling = %subsampling,
            colorspace = ?colorspace,
            "compressing packed pixels"
        );
        let jpeg = self.call("compress", |engine| engine.compress_packed(&image, &params))?;
        check_output_bound("compress", jpeg.len(), bound)?;
        Ok(jpeg)
    }

    fn compress_yuv(&mut self, image: &'src YuvImage) -> TjResult<Vec<u8>> {
        if self.params.is_lossless() {
            return Err(TjError::invalid_parameter_value(
                Param::Lossless.name(),
                1,
                "planar YUV images cannot be compressed losslessly",
            ));
        }
        if self.params.precision() != 8 {
            return Err(TjError::invalid_parameter_value(
                Param::Precision.name(),
                self.params.precision() as i64,
                "planar YUV compression requires 8-bit samples",
            ));
        }
        self.require_quality()?;
        let subsampling = image.subsampling();
        let colorspace = self.derive_colorspace(None, subsampling);
        let bound = self.compress_bound()?;
        let full = CroppingRegion::new(0, 0, image.width(), image.height());
        let params = self.engine_params(subsampling, colorspace, 8, ScalingFactor::UNSCALED, full);

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            subsampling = %subsampling,
            "compressing planar YUV"
        );
        let jpeg = self.call("compress from YUV", |engine| engine.compress_from_yuv(image, &params))?;
        check_output_bound("compress from YUV", jpeg.len(), bound)?;
        Ok(jpeg)
    }

    // -------------------------------------------------------------------------
    // Planar YUV
    // -------------------------------------------------------------------------

    /// Convert the bound 8-bit packed pixels into a planar YUV image whose rows
    /// are padded to `align` bytes.
    pub fn encode_yuv(&mut self, align: u32) -> TjResult<YuvImage> {
        self.ensure_open()?;
        let Binding::Packed(image) = &self.binding else {
            return Err(TjError::no_source_bound("encode to YUV"));
        };
        let image = *image;
        if image.precision() != 8 {
            return Err(TjError::invalid_parameter_value(
                Param::Precision.name(),
                image.precision() as i64,
                "YUV encoding requires 8-bit samples",
            ));
        }
        if image.format() == PixelFormat::Cmyk {
            return Err(TjError::invalid_argument(
                "pixel format",
                image.format().to_string(),
                "CMYK pixels cannot be encoded to YUV",
            ));
        }
        if self.params.is_lossless() {
            return Err(TjError::invalid_parameter_value(
                Param::Lossless.name(),
                1,
                "lossless mode and planar YUV are mutually exclusive",
            ));
        }
        let subsampling = self.params.subsampling();
        if !subsampling.is_known() {
            return Err(TjError::subsampling_required("YUV encoding"));
        }
        let mut yuv = YuvImage::new(image.width(), align, image.height(), subsampling)?;
        let full = CroppingRegion::new(0, 0, image.width(), image.height());
        let params = self.engine_params(subsampling, Colorspace::YCbCr, 8, ScalingFactor::UNSCALED, full);

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            align,
            subsampling = %subsampling,
            "encoding packed pixels to YUV"
        );
        self.call("encode YUV", |engine| engine.encode_yuv(&image, &mut yuv, &params))?;
        Ok(yuv)
    }

    /// Decompress the bound JPEG into a planar YUV image of the scaled (and
    /// cropped) size at the JPEG's subsampling.
    pub fn decompress_to_yuv(&mut self, align: u32) -> TjResult<YuvImage> {
        self.ensure_open()?;
        let (jpeg, header) = self.require_header("decompress to YUV")?;
        if header.lossless {
            return Err(TjError::invalid_parameter_value(
                Param::Lossless.name(),
                1,
                "lossless JPEG images cannot be decompressed to YUV",
            ));
        }
        if !header.subsampling.is_known() {
            return Err(TjError::invalid_subsampling(header.subsampling.id()));
        }
        let region = resolve_crop(self.crop, self.scaling, header.width, header.height, header.subsampling)?;
        let mut yuv = YuvImage::new(region.width, align, region.height, header.subsampling)?;
        let params = self.engine_params(header.subsampling, header.colorspace, 8, self.scaling, region);

        tracing::debug!(
            width = region.width,
            height = region.height,
            align,
            scaling = %self.scaling,
            "decompressing JPEG to YUV"
        );
        self.call("decompress to YUV", |engine| engine.decompress_to_yuv(jpeg, &mut yuv, &params))?;
        Ok(yuv)
    }

    // -------------------------------------------------------------------------
    // Decompression
    // -------------------------------------------------------------------------

    /// Output size of the next decompression: scaled, then cropped. For a bound
    /// planar YUV image, its own dimensions.
    pub fn scaled_dimensions(&self) -> TjResult<(u32, u32)> {
        self.ensure_open()?;
        if let Binding::PlanarYuv(image) = &self.binding {
            return Ok((image.width(), image.height()));
        }
        let (_, header) = self.require_header("decompress")?;
        let region = resolve_crop(self.crop, self.scaling, header.width, header.height, header.subsampling)?;
        Ok((region.width, region.height))
    }

    /// Decompress into 8-bit packed pixels at (`x`, `y`) of `dst`. A `pitch` of 0
    /// means tightly packed rows.
    pub fn decompress(
        &mut self,
        dst: &mut [u8],
        x: u32,
        y: u32,
        pitch: usize,
        format: PixelFormat,
    ) -> TjResult<()> {
        self.decompress_samples(PackedSamplesMut::Eight(dst), x, y, pitch, format)
    }

    /// 12-bit counterpart of [`CodecSession::decompress`].
    pub fn decompress_12(
        &mut self,
        dst: &mut [i16],
        x: u32,
        y: u32,
        pitch: usize,
        format: PixelFormat,
    ) -> TjResult<()> {
        self.decompress_samples(PackedSamplesMut::Twelve(dst), x, y, pitch, format)
    }

    /// 16-bit counterpart of [`CodecSession::decompress`].
    pub fn decompress_16(
        &mut self,
        dst: &mut [u16],
        x: u32,
        y: u32,
        pitch: usize,
        format: PixelFormat,
    ) -> TjResult<()> {
        self.decompress_samples(PackedSamplesMut::Sixteen(dst), x, y, pitch, format)
    }

    fn decompress_samples(
        &mut self,
        samples: PackedSamplesMut<'_>,
        x: u32,
        y: u32,
        pitch: usize,
        format: PixelFormat,
    ) -> TjResult<()> {
        self.ensure_open()?;
        let precision = samples.precision();

        if let Binding::PlanarYuv(image) = self.binding {
            if precision != 8 {
                return Err(precision_mismatch(8, precision));
            }
            let mut dst = PackedImageMut::new(samples, x, y, image.width(), pitch, image.height(), format)?;
            let full = CroppingRegion::new(0, 0, image.width(), image.height());
            let params = self.engine_params(image.subsampling(), Colorspace::YCbCr, 8, ScalingFactor::UNSCALED, full);
            tracing::debug!(width = image.width(), height = image.height(), format = %format, "decoding YUV");
            return self.call("decode YUV", |engine| engine.decode_yuv(image, &mut dst, &params));
        }

        let (jpeg, header) = self.require_header("decompress")?;
        if header.precision != precision {
            return Err(precision_mismatch(header.precision, precision));
        }
        if header.lossless && !self.scaling.is_unscaled() {
            return Err(TjError::invalid_argument(
                "scaling factor",
                self.scaling.to_string(),
                "lossless JPEG images cannot be scaled",
            ));
        }
        let region = resolve_crop(self.crop, self.scaling, header.width, header.height, header.subsampling)?;
        let mut dst = PackedImageMut::new(samples, x, y, region.width, pitch, region.height, format)?;
        let params = self.engine_params(header.subsampling, header.colorspace, precision, self.scaling, region);

        tracing::debug!(
            width = region.width,
            height = region.height,
            scaling = %self.scaling,
            format = %format,
            "decompressing JPEG"
        );
        self.call("decompress", |engine| engine.decompress_packed(jpeg, &mut dst, &params))
    }

    // -------------------------------------------------------------------------
    // Transforms
    // -------------------------------------------------------------------------

    /// Apply each descriptor to the bound JPEG. Outputs come back in descriptor
    /// order; NO_OUTPUT descriptors yield an empty buffer.
    pub fn transform(&mut self, descriptors: &[TransformDescriptor]) -> TjResult<Vec<Vec<u8>>> {
        self.ensure_open()?;
        let (jpeg, header) = self.require_header("transform")?;
        if descriptors.is_empty() {
            return Err(TjError::invalid_argument("transforms", "0", "at least one descriptor is required"));
        }

        let mut plans = Vec::with_capacity(descriptors.len());
        let mut bounds = Vec::with_capacity(descriptors.len());
        let icc = if self.icc_profile.is_some() {
            self.icc_profile.clone()
        } else {
            header.icc_profile.clone()
        };
        for descriptor in descriptors {
            let plan = plan_transform(&header, descriptor)?;
            let bound = jpeg_buffer_size(plan.region.width, plan.region.height, plan.subsampling)?
                + icc_allowance(icc.as_deref());
            tracing::debug!(
                op = %plan.op,
                width = plan.region.width,
                height = plan.region.height,
                subsampling = %plan.subsampling,
                "transform planned"
            );
            plans.push(plan);
            bounds.push(bound);
        }

        let full = CroppingRegion::new(0, 0, header.width, header.height);
        let mut params = self.engine_params(
            header.subsampling,
            header.colorspace,
            header.precision,
            ScalingFactor::UNSCALED,
            full,
        );
        params.icc_profile = icc;
        let outputs = self.call("transform", |engine| engine.transform(jpeg, &plans, &params))?;
        if outputs.len() != plans.len() {
            return Err(TjError::engine_failed(format!(
                "engine returned {} transform outputs for {} descriptors",
                outputs.len(),
                plans.len()
            )));
        }
        for (output, bound) in outputs.iter().zip(&bounds) {
            check_output_bound("transform", output.len(), *bound)?;
        }
        Ok(outputs)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Release the engine and clear the binding. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.binding = Binding::Empty;
        if self.engine_open {
            self.engine.release();
            self.engine_open = false;
        }
        self.closed = true;
        tracing::debug!("session closed");
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn require_header(&self, operation: &'static str) -> TjResult<(&'src [u8], HeaderInfo)> {
        self.binding
            .decoded_jpeg()
            .map(|(data, header)| (data, header.clone()))
            .ok_or_else(|| TjError::no_source_bound(operation))
    }

    fn engine_params(
        &self,
        subsampling: Subsampling,
        colorspace: Colorspace,
        precision: u8,
        scaling: ScalingFactor,
        crop: CroppingRegion,
    ) -> EngineParams {
        let p = &self.params;
        let (max_pixels, max_memory) = p.limits();
        EngineParams {
            quality: p.quality(),
            subsampling,
            precision,
            colorspace,
            optimize: p.effective_optimize_for(precision),
            progressive: p.flag(Param::Progressive),
            arithmetic: p.flag(Param::Arithmetic),
            lossless: p
                .is_lossless()
                .then(|| (p.get(Param::LosslessPsv) as u8, p.get(Param::LosslessPt) as u8)),
            restart: p.restart(),
            scan_limit: p.get(Param::ScanLimit) as u32,
            fast_upsample: p.flag(Param::FastUpsample),
            fast_dct: p.flag(Param::FastDct),
            bottom_up: p.flag(Param::BottomUp),
            stop_on_warning: p.stop_on_warning(),
            density: Density {
                x: p.get(Param::XDensity) as u16,
                y: p.get(Param::YDensity) as u16,
                units: p.get(Param::DensityUnits) as u8,
            },
            scaling,
            crop,
            limits: EngineLimits::new(max_pixels, max_memory),
            icc_profile: self.icc_profile.clone(),
        }
    }

    /// Run one engine call, opening the engine on first use. Returns the value
    /// and the warnings the engine raised.
    fn call_raw<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut E) -> EngineResult<T>,
    ) -> TjResult<(T, Vec<String>)> {
        self.ensure_open()?;
        if !self.engine_open {
            self.engine.open()?;
            self.engine_open = true;
            tracing::debug!("native engine opened");
        }
        self.last_warnings.clear();
        let result = f(&mut self.engine);
        let warnings = self.engine.take_warnings();
        match result {
            Ok(value) => Ok((value, warnings)),
            Err(err) => {
                tracing::debug!(operation, error = %err, "engine call failed");
                Err(err.into())
            }
        }
    }

    fn call<T>(&mut self, operation: &'static str, f: impl FnOnce(&mut E) -> EngineResult<T>) -> TjResult<T> {
        let (value, warnings) = self.call_raw(operation, f)?;
        self.record_warnings(operation, warnings);
        Ok(value)
    }

    fn record_warnings(&mut self, operation: &'static str, warnings: Vec<String>) {
        for warning in &warnings {
            if self.config.verbose {
                tracing::info!(operation, warning = %warning, "engine warning");
            } else {
                tracing::warn!(operation, warning = %warning, "engine warning");
            }
        }
        self.last_warnings = warnings;
    }
}

impl<E: NativeEngine> Drop for CodecSession<'_, E> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!("session dropped without close");
            self.close();
        }
    }
}

impl<E: NativeEngine> std::fmt::Debug for CodecSession<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecSession")
            .field("state", &self.state())
            .field("scaling", &self.scaling)
            .field("crop", &self.crop)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn precision_mismatch(jpeg: u8, buffer: u8) -> TjError {
    TjError::invalid_parameter_value(
        Param::Precision.name(),
        jpeg as i64,
        format!("source has {jpeg}-bit samples but the destination holds {buffer}-bit samples"),
    )
}

fn check_output_bound(operation: &'static str, len: usize, bound: usize) -> TjResult<()> {
    if len > bound {
        return Err(TjError::engine_failed(format!(
            "{operation} produced {len} bytes, more than the worst-case bound of {bound}"
        )));
    }
    Ok(())
}

/// Resolve one descriptor against the source header.
fn plan_transform(header: &HeaderInfo, descriptor: &TransformDescriptor) -> TjResult<TransformPlan> {
    let op = descriptor.op;
    let options = descriptor.options;
    let source = header.subsampling;
    let subsampling = if options.contains(TransformOptions::GRAY) {
        Subsampling::Gray
    } else if op.transposes() {
        source.transposed()
    } else {
        source
    };

    let (mut width, mut height) = (header.width, header.height);
    if options.intersects(TransformOptions::PERFECT | TransformOptions::TRIM) {
        let (mcu_w, mcu_h) = source.mcu_block().ok_or_else(|| {
            TjError::unsupported(
                format!("{op} transform"),
                "edge handling needs a known subsampling level",
            )
        })?;
        let partial_right = op.moves_right_edge() && width % mcu_w != 0;
        let partial_bottom = op.moves_bottom_edge() && height % mcu_h != 0;
        if options.contains(TransformOptions::PERFECT) && (partial_right || partial_bottom) {
            return Err(TjError::invalid_argument(
                "transform",
                op.to_string(),
                format!("not perfect: {width}x{height} has partial {mcu_w}x{mcu_h} iMCUs on a moving edge"),
            ));
        }
        if options.contains(TransformOptions::TRIM) {
            if partial_right && width >= mcu_w {
                width -= width % mcu_w;
            }
            if partial_bottom && height >= mcu_h {
                height -= height % mcu_h;
            }
        }
    }

    let (out_w, out_h) = op.output_dimensions(width, height);
    let region = if options.contains(TransformOptions::CROP) {
        resolve_transform_crop(descriptor.region, out_w, out_h, subsampling)?
    } else {
        CroppingRegion::new(0, 0, out_w, out_h)
    };

    Ok(TransformPlan {
        op,
        options,
        source_width: width,
        source_height: height,
        region,
        subsampling,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::native::EngineError;
    use crate::engine::params::Restart;
    use crate::ops::TransformOp;

    /// Engine that records calls and answers from a script.
    #[derive(Debug, Default)]
    struct ScriptedEngine {
        header: Option<HeaderInfo>,
        warnings: Vec<String>,
        opened: u32,
        released: u32,
        calls: Vec<&'static str>,
        last_params: Option<EngineParams>,
    }

    impl NativeEngine for ScriptedEngine {
        fn open(&mut self) -> EngineResult<()> {
            self.opened += 1;
            Ok(())
        }

        fn release(&mut self) {
            self.released += 1;
        }

        fn compress_packed(&mut self, _: &PackedImage<'_>, params: &EngineParams) -> EngineResult<Vec<u8>> {
            self.calls.push("compress_packed");
            self.last_params = Some(params.clone());
            Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
        }

        fn compress_from_yuv(&mut self, _: &YuvImage, params: &EngineParams) -> EngineResult<Vec<u8>> {
            self.calls.push("compress_from_yuv");
            self.last_params = Some(params.clone());
            Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
        }

        fn encode_yuv(&mut self, _: &PackedImage<'_>, _: &mut YuvImage, _: &EngineParams) -> EngineResult<()> {
            self.calls.push("encode_yuv");
            Ok(())
        }

        fn decompress_header(&mut self, _: &[u8]) -> EngineResult<HeaderInfo> {
            self.calls.push("decompress_header");
            self.header
                .clone()
                .ok_or_else(|| EngineError::CorruptHeader("not a JPEG file".into()))
        }

        fn decompress_packed(&mut self, _: &[u8], _: &mut PackedImageMut<'_>, params: &EngineParams) -> EngineResult<()> {
            self.calls.push("decompress_packed");
            self.last_params = Some(params.clone());
            Ok(())
        }

        fn decompress_to_yuv(&mut self, _: &[u8], _: &mut YuvImage, _: &EngineParams) -> EngineResult<()> {
            self.calls.push("decompress_to_yuv");
            Ok(())
        }

        fn decode_yuv(&mut self, _: &YuvImage, _: &mut PackedImageMut<'_>, _: &EngineParams) -> EngineResult<()> {
            self.calls.push("decode_yuv");
            Ok(())
        }

        fn transform(&mut self, _: &[u8], plans: &[TransformPlan], _: &EngineParams) -> EngineResult<Vec<Vec<u8>>> {
            self.calls.push("transform");
            Ok(plans
                .iter()
                .map(|p| if p.produces_output() { vec![1, 2, 3] } else { Vec::new() })
                .collect())
        }

        fn take_warnings(&mut self) -> Vec<String> {
            std::mem::take(&mut self.warnings)
        }
    }

    fn header(width: u32, height: u32, subsampling: Subsampling) -> HeaderInfo {
        HeaderInfo {
            width,
            height,
            subsampling,
            precision: 8,
            colorspace: Colorspace::YCbCr,
            progressive: false,
            arithmetic: false,
            lossless: false,
            lossless_psv: 1,
            lossless_pt: 0,
            restart: Restart::None,
            density: None,
            icc_profile: None,
        }
    }

    fn scripted<'a>(header: Option<HeaderInfo>) -> CodecSession<'a, ScriptedEngine> {
        let engine = ScriptedEngine {
            header,
            ..Default::default()
        };
        CodecSession::with_engine(engine, SessionConfig::default()).unwrap()
    }

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

    #[test]
    fn compress_requires_source() {
        let mut session = scripted(None);
        assert_eq!(session.compress(), Err(TjError::no_source_bound("compress")));
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn compress_requires_subsampling_and_quality() {
        let pixels = vec![0u8; 16 * 16 * 3];
        let mut session = scripted(None);
        session
            .bind_packed(PackedImage::tight(&pixels[..], 16, 16, PixelFormat::Rgb).unwrap())
            .unwrap();
        assert_eq!(session.compress(), Err(TjError::subsampling_required("compress")));

        session.set(Param::Subsampling, Subsampling::S420.id()).unwrap();
        assert!(matches!(
            session.compress(),
            Err(TjError::InvalidParameterValue { param: "quality", .. })
        ));

        session.set(Param::Quality, 90).unwrap();
        let jpeg = session.compress().unwrap();
        assert!(!jpeg.is_empty());
        let params = session.engine().last_params.clone().unwrap();
        assert_eq!(params.subsampling, Subsampling::S420);
        assert_eq!(params.colorspace, Colorspace::YCbCr);
        assert_eq!(params.quality, Some(90));
    }

    #[test]
    fn gray_pixels_compress_as_gray() {
        let pixels = vec![0u8; 8 * 8];
        let mut session = scripted(None);
        session.set(Param::Subsampling, Subsampling::S420.id()).unwrap();
        session.set(Param::Quality, 75).unwrap();
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Gray).unwrap())
            .unwrap();
        session.compress().unwrap();
        let params = session.engine().last_params.clone().unwrap();
        assert_eq!(params.subsampling, Subsampling::Gray);
        assert_eq!(params.colorspace, Colorspace::Gray);
    }

    #[test]
    fn compress_into_checks_capacity() {
        let pixels = vec![0u8; 8 * 8 * 3];
        let mut session = scripted(None);
        session.set(Param::Subsampling, Subsampling::S444.id()).unwrap();
        session.set(Param::Quality, 75).unwrap();
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Rgb).unwrap())
            .unwrap();
        let bound = jpeg_buffer_size(8, 8, Subsampling::S444).unwrap();
        let mut small = vec![0u8; bound - 1];
        assert_eq!(
            session.compress_into(&mut small),
            Err(TjError::destination_too_small(bound as u64, bound as u64 - 1))
        );
        let mut dst = vec![0u8; bound];
        assert_eq!(session.compress_into(&mut dst).unwrap(), 4);
        assert_eq!(&dst[..4], JPEG);
    }

    #[test]
    fn binding_yuv_sets_subsampling() {
        let yuv = YuvImage::new(16, 4, 16, Subsampling::S422).unwrap();
        let mut session = scripted(None);
        session.bind_planar_yuv(&yuv).unwrap();
        assert_eq!(session.state(), SessionState::BoundPlanarYuv);
        assert_eq!(session.get(Param::Subsampling).unwrap(), Subsampling::S422.id());

        session.set(Param::Quality, 80).unwrap();
        session.compress().unwrap();
        assert_eq!(session.engine().calls, ["compress_from_yuv"]);

        session.set(Param::Lossless, 1).unwrap();
        assert!(matches!(
            session.compress(),
            Err(TjError::InvalidParameterValue { param: "lossless", .. })
        ));
    }

    #[test]
    fn header_read_populates_parameters() {
        let mut session = scripted(Some(header(640, 480, Subsampling::S420)));
        let info = session.decompress_header(JPEG).unwrap();
        assert_eq!(info.width, 640);
        assert_eq!(session.state(), SessionState::DecodedHeader);
        assert_eq!(session.get(Param::JpegWidth).unwrap(), 640);
        assert_eq!(session.get(Param::JpegHeight).unwrap(), 480);
        assert_eq!(session.get(Param::Subsampling).unwrap(), Subsampling::S420.id());
        assert!(matches!(
            session.set(Param::Precision, 12),
            Err(TjError::InvalidParameterValue { param: "precision", .. })
        ));
    }

    #[test]
    fn corrupt_header_leaves_jpeg_bound() {
        let mut session = scripted(None);
        assert!(matches!(
            session.decompress_header(JPEG),
            Err(TjError::CorruptHeader { .. })
        ));
        assert_eq!(session.state(), SessionState::BoundJpeg);
        let mut dst = vec![0u8; 16];
        assert_eq!(
            session.decompress(&mut dst, 0, 0, 0, PixelFormat::Rgb),
            Err(TjError::no_source_bound("decompress"))
        );
    }

    #[test]
    fn header_warnings_follow_policy() {
        let mut session = scripted(Some(header(16, 16, Subsampling::S444)));
        session.engine.warnings = vec!["missing EOI marker".into()];
        session.decompress_header(JPEG).unwrap();
        assert_eq!(session.warnings(), ["missing EOI marker"]);

        session.set(Param::StopOnWarning, 1).unwrap();
        session.engine.warnings = vec!["missing EOI marker".into()];
        assert_eq!(
            session.decompress_header(JPEG),
            Err(TjError::header_warning("missing EOI marker"))
        );
        assert_eq!(session.state(), SessionState::BoundJpeg);
    }

    #[test]
    fn decompress_sizes_destination_from_scaling_and_crop() {
        let mut session = scripted(Some(header(640, 480, Subsampling::S420)));
        session.decompress_header(JPEG).unwrap();
        session.set_scaling_factor(ScalingFactor::new(1, 2).unwrap()).unwrap();
        session.set_cropping_region(CroppingRegion::new(16, 0, 0, 0)).unwrap();
        assert_eq!(session.scaled_dimensions().unwrap(), (304, 240));

        let required = 304 * 240 * 3;
        let mut short = vec![0u8; required - 1];
        assert_eq!(
            session.decompress(&mut short, 0, 0, 0, PixelFormat::Rgb),
            Err(TjError::destination_too_small(required as u64, required as u64 - 1))
        );
        let mut dst = vec![0u8; required];
        session.decompress(&mut dst, 0, 0, 0, PixelFormat::Rgb).unwrap();
        let params = session.engine().last_params.clone().unwrap();
        assert_eq!(params.crop, CroppingRegion::new(16, 0, 304, 240));
    }

    #[test]
    fn crop_checked_against_known_header() {
        let mut session = scripted(Some(header(640, 480, Subsampling::S420)));
        session.decompress_header(JPEG).unwrap();
        assert_eq!(
            session.set_cropping_region(CroppingRegion::new(8, 0, 0, 0)),
            Err(TjError::invalid_crop_alignment("x", 8, 16))
        );
    }

    #[test]
    fn precision_must_match_destination() {
        let mut session = scripted(Some(header(8, 8, Subsampling::S444)));
        session.decompress_header(JPEG).unwrap();
        let mut dst = vec![0i16; 8 * 8 * 3];
        assert!(matches!(
            session.decompress_12(&mut dst, 0, 0, 0, PixelFormat::Rgb),
            Err(TjError::InvalidParameterValue { param: "precision", .. })
        ));
    }

    #[test]
    fn unsupported_scaling_rejected() {
        let mut session = scripted(None);
        let bogus = ScalingFactor::new(3, 5).unwrap();
        assert!(matches!(
            session.set_scaling_factor(bogus),
            Err(TjError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn transform_resolves_geometry() {
        let mut session = scripted(Some(header(641, 480, Subsampling::S420)));
        session.decompress_header(JPEG).unwrap();

        let perfect = TransformDescriptor::new(TransformOp::HFlip).with_options(TransformOptions::PERFECT);
        assert!(matches!(session.transform(&[perfect]), Err(TjError::InvalidArgument { .. })));

        let trimmed = TransformDescriptor::new(TransformOp::Rot90)
            .with_options(TransformOptions::TRIM | TransformOptions::NO_OUTPUT);
        let plain = TransformDescriptor::new(TransformOp::VFlip);
        let outputs = session.transform(&[trimmed, plain]).unwrap();
        assert!(outputs[0].is_empty());
        assert_eq!(outputs[1], [1, 2, 3]);

        let plan = plan_transform(&header(641, 480, Subsampling::S422), &trimmed).unwrap();
        assert_eq!(plan.subsampling, Subsampling::S440);
        assert_eq!((plan.source_width, plan.source_height), (641, 480));
        assert_eq!(plan.region, CroppingRegion::new(0, 0, 480, 641));

        let plan = plan_transform(
            &header(641, 481, Subsampling::S420),
            &TransformDescriptor::new(TransformOp::Rot180).with_options(TransformOptions::TRIM),
        )
        .unwrap();
        assert_eq!((plan.source_width, plan.source_height), (640, 480));
    }

    #[test]
    fn transform_crop_uses_destination_mcu() {
        let h = header(640, 480, Subsampling::S422);
        let crop = TransformDescriptor::new(TransformOp::Transpose)
            .with_options(TransformOptions::CROP)
            .cropped(CroppingRegion::new(8, 16, 64, 64));
        // 4:2:2 transposes to 4:4:0, whose iMCU is 8x16.
        let plan = plan_transform(&h, &crop).unwrap();
        assert_eq!(plan.region, CroppingRegion::new(8, 16, 64, 64));

        let bad = crop.cropped(CroppingRegion::new(8, 8, 64, 64));
        assert_eq!(plan_transform(&h, &bad), Err(TjError::invalid_crop_alignment("y", 8, 16)));

        let gray = bad.with_options(TransformOptions::CROP | TransformOptions::GRAY);
        assert_eq!(plan_transform(&h, &gray).unwrap().subsampling, Subsampling::Gray);
    }

    #[test]
    fn close_is_idempotent_and_terminal() {
        let mut session = scripted(Some(header(8, 8, Subsampling::S444)));
        session.decompress_header(JPEG).unwrap();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.engine().released, 1);
        assert_eq!(session.compress(), Err(TjError::session_closed()));
        assert_eq!(session.get(Param::Quality), Err(TjError::session_closed()));
        assert_eq!(session.decompress_header(JPEG), Err(TjError::session_closed()));
    }

    #[test]
    fn engine_opened_lazily_once() {
        let mut session = scripted(Some(header(8, 8, Subsampling::S444)));
        assert_eq!(session.engine().opened, 0);
        session.decompress_header(JPEG).unwrap();
        session.decompress_header(JPEG).unwrap();
        assert_eq!(session.engine().opened, 1);
    }

    #[test]
    fn sixteen_bit_bind_leaves_precision_parameter() {
        let pixels = vec![0u16; 8 * 8 * 3];
        let mut session = scripted(None);
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Rgb).unwrap())
            .unwrap();
        assert_eq!(session.state(), SessionState::BoundPackedPixel { precision: 16 });
        assert_eq!(session.get(Param::Precision).unwrap(), 8);
        session.set(Param::Lossless, 0).unwrap();

        session.set(Param::Subsampling, Subsampling::S444.id()).unwrap();
        session.set(Param::Quality, 90).unwrap();
        assert!(matches!(
            session.compress(),
            Err(TjError::InvalidParameterValue { param: "precision", .. })
        ));
        assert!(session.engine().calls.is_empty());

        session.set(Param::Lossless, 1).unwrap();
        session.compress().unwrap();
        assert_eq!(session.engine().last_params.as_ref().unwrap().precision, 16);
    }

    #[test]
    fn point_transform_checked_against_bound_precision() {
        let pixels = vec![0u8; 8 * 8 * 3];
        let mut session = scripted(None);
        session.set(Param::Subsampling, Subsampling::S444.id()).unwrap();
        session.set(Param::Lossless, 1).unwrap();
        session.set(Param::Precision, 12).unwrap();
        session.set(Param::LosslessPt, 10).unwrap();
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Rgb).unwrap())
            .unwrap();
        assert!(matches!(
            session.compress(),
            Err(TjError::InvalidParameterValue { param: "losslessPointTransform", .. })
        ));
    }

    #[test]
    fn lossless_forces_444() {
        let pixels = vec![0u8; 8 * 8 * 3];
        let mut session = scripted(None);
        session.set(Param::Subsampling, Subsampling::S420.id()).unwrap();
        session.set(Param::Lossless, 1).unwrap();
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Rgb).unwrap())
            .unwrap();
        assert_eq!(
            session.compress_bound().unwrap(),
            jpeg_buffer_size(8, 8, Subsampling::S444).unwrap()
        );
        session.compress().unwrap();
        let params = session.engine().last_params.clone().unwrap();
        assert_eq!(params.subsampling, Subsampling::S444);
        assert_eq!(params.colorspace, Colorspace::Rgb);
        assert_eq!(params.lossless, Some((1, 0)));
        assert_eq!(session.get(Param::Subsampling).unwrap(), Subsampling::S420.id());
    }

    #[test]
    fn lossless_gray_stays_gray() {
        let pixels = vec![0u8; 8 * 8];
        let mut session = scripted(None);
        session.set(Param::Subsampling, Subsampling::S420.id()).unwrap();
        session.set(Param::Lossless, 1).unwrap();
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Gray).unwrap())
            .unwrap();
        assert_eq!(
            session.compress_bound().unwrap(),
            jpeg_buffer_size(8, 8, Subsampling::Gray).unwrap()
        );
        session.compress().unwrap();
        assert_eq!(session.engine().last_params.as_ref().unwrap().subsampling, Subsampling::Gray);
    }

    #[test]
    fn twelve_bit_buffer_implies_optimize() {
        let pixels = vec![0i16; 8 * 8 * 3];
        let mut session = scripted(None);
        session.set(Param::Subsampling, Subsampling::S444.id()).unwrap();
        session.set(Param::Quality, 75).unwrap();
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Rgb).unwrap())
            .unwrap();
        session.compress().unwrap();
        let params = session.engine().last_params.clone().unwrap();
        assert_eq!(params.precision, 12);
        assert!(params.optimize);
    }

    #[test]
    fn snapshot_applies_optimize_implication() {
        let pixels = vec![0u8; 8 * 8 * 3];
        let mut session = scripted(None);
        session.set(Param::Subsampling, Subsampling::S444.id()).unwrap();
        session.set(Param::Quality, 75).unwrap();
        session.set(Param::Progressive, 1).unwrap();
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Rgb).unwrap())
            .unwrap();
        session.compress().unwrap();
        assert!(session.engine().last_params.as_ref().unwrap().optimize);
        assert_eq!(session.get(Param::Optimize).unwrap(), 0);
    }
}
