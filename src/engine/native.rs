// src/engine/native.rs
//
// Boundary to the native codec engine: the trait a backend implements and the
// value types crossing it. Everything here is already validated by the session;
// an engine only has to do pixel work and report what it could not do.

use crate::engine::buffers::{PackedImage, PackedImageMut, YuvImage};
use crate::engine::catalog::{Colorspace, Subsampling};
use crate::engine::cropping::CroppingRegion;
use crate::engine::firewall::EngineLimits;
use crate::engine::params::Restart;
use crate::engine::scaling::ScalingFactor;
use crate::error::TjError;
use crate::ops::{TransformOp, TransformOptions};
use thiserror::Error;

/// Failures reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("corrupt JPEG data: {0}")]
    CorruptHeader(String),

    /// Non-fatal condition that aborted the call because stop-on-warning is set.
    #[error("{0}")]
    Warning(String),

    #[error("{operation}: {reason}")]
    Unsupported {
        operation: &'static str,
        reason: String,
    },

    #[error("{what} {actual} exceeds limit of {max}")]
    LimitExceeded {
        what: &'static str,
        actual: u64,
        max: u64,
    },

    #[error("{0}")]
    Failed(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl From<EngineError> for TjError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::CorruptHeader(message) => TjError::corrupt_header(message),
            EngineError::Warning(message) => TjError::warning(message),
            EngineError::Unsupported { operation, reason } => TjError::unsupported(operation, reason),
            EngineError::LimitExceeded { what, actual, max } => {
                TjError::limit_exceeded(what, actual, max)
            }
            EngineError::Failed(message) => TjError::engine_failed(message),
        }
    }
}

/// JFIF pixel density.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Density {
    pub x: u16,
    pub y: u16,
    /// 0 = aspect ratio only, 1 = dots per inch, 2 = dots per cm.
    pub units: u8,
}

impl Default for Density {
    fn default() -> Self {
        Self {
            x: 1,
            y: 1,
            units: 0,
        }
    }
}

/// What a header read reveals about a JPEG stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderInfo {
    pub width: u32,
    pub height: u32,
    pub subsampling: Subsampling,
    pub precision: u8,
    pub colorspace: Colorspace,
    pub progressive: bool,
    pub arithmetic: bool,
    pub lossless: bool,
    pub lossless_psv: u8,
    pub lossless_pt: u8,
    pub restart: Restart,
    /// `None` when the stream has no JFIF marker.
    pub density: Option<Density>,
    pub icc_profile: Option<Vec<u8>>,
}

/// Parameter snapshot handed to the engine for one call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineParams {
    pub quality: Option<u8>,
    pub subsampling: Subsampling,
    pub precision: u8,
    pub colorspace: Colorspace,
    pub optimize: bool,
    pub progressive: bool,
    pub arithmetic: bool,
    /// `(predictor, point transform)` when lossless coding is requested.
    pub lossless: Option<(u8, u8)>,
    pub restart: Restart,
    pub scan_limit: u32,
    pub fast_upsample: bool,
    pub fast_dct: bool,
    pub bottom_up: bool,
    pub stop_on_warning: bool,
    pub density: Density,
    pub scaling: ScalingFactor,
    /// Resolved region in scaled coordinates; covers the whole image when uncropped.
    pub crop: CroppingRegion,
    pub limits: EngineLimits,
    pub icc_profile: Option<Vec<u8>>,
}

/// One transform, resolved against the source header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformPlan {
    pub op: TransformOp,
    pub options: TransformOptions,
    /// Source area the transform reads after TRIM.
    pub source_width: u32,
    pub source_height: u32,
    /// Region of the transformed image to emit.
    pub region: CroppingRegion,
    pub subsampling: Subsampling,
}

impl TransformPlan {
    pub fn produces_output(&self) -> bool {
        !self.options.contains(TransformOptions::NO_OUTPUT)
    }
}

/// Native codec engine driven by a [`crate::engine::CodecSession`].
///
/// Buffers are borrowed for the duration of a call only. When
/// `stop_on_warning` is clear, an engine finishes the call despite warnings
/// and hands them out through [`NativeEngine::take_warnings`]; when it is set,
/// the first warning aborts with [`EngineError::Warning`].
pub trait NativeEngine {
    /// Acquire native resources. Called once, before the first operation.
    fn open(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Release native resources. Called at most once.
    fn release(&mut self) {}

    fn compress_packed(&mut self, src: &PackedImage<'_>, params: &EngineParams) -> EngineResult<Vec<u8>>;

    fn compress_from_yuv(&mut self, src: &YuvImage, params: &EngineParams) -> EngineResult<Vec<u8>>;

    fn encode_yuv(
        &mut self,
        src: &PackedImage<'_>,
        dst: &mut YuvImage,
        params: &EngineParams,
    ) -> EngineResult<()>;

    fn decompress_header(&mut self, jpeg: &[u8]) -> EngineResult<HeaderInfo>;

    fn decompress_packed(
        &mut self,
        jpeg: &[u8],
        dst: &mut PackedImageMut<'_>,
        params: &EngineParams,
    ) -> EngineResult<()>;

    fn decompress_to_yuv(
        &mut self,
        jpeg: &[u8],
        dst: &mut YuvImage,
        params: &EngineParams,
    ) -> EngineResult<()>;

    fn decode_yuv(
        &mut self,
        src: &YuvImage,
        dst: &mut PackedImageMut<'_>,
        params: &EngineParams,
    ) -> EngineResult<()>;

    /// One output per plan, in order; plans without output yield an empty buffer.
    fn transform(
        &mut self,
        jpeg: &[u8],
        plans: &[TransformPlan],
        params: &EngineParams,
    ) -> EngineResult<Vec<Vec<u8>>>;

    /// Warnings raised since the last call, oldest first.
    fn take_warnings(&mut self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_onto_taxonomy() {
        assert_eq!(
            TjError::from(EngineError::CorruptHeader("no SOI".into())),
            TjError::corrupt_header("no SOI")
        );
        assert!(TjError::from(EngineError::Warning("late EOI".into())).is_warning());
        assert!(matches!(
            TjError::from(EngineError::Unsupported {
                operation: "compress",
                reason: "arithmetic coding".into()
            }),
            TjError::Unsupported { .. }
        ));
        assert_eq!(
            TjError::from(EngineError::LimitExceeded { what: "pixel count", actual: 10, max: 5 }),
            TjError::limit_exceeded("pixel count", 10, 5)
        );
    }
}
