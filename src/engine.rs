// src/engine.rs
//
// The core of tjkit. A codec session that:
// 1. Validates geometry and parameters up front
// 2. Binds one source representation at a time
// 3. Hands only resolved, checked requests to the native engine
//
// This file is a facade over the decomposed modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Largest width or height a JPEG frame can carry through libjpeg
/// (`JPEG_MAX_DIMENSION`).
pub const MAX_DIMENSION: u32 = 65500;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod buffers;
mod catalog;
mod common;
mod config;
mod convert;
mod cropping;
mod firewall;
mod header;
mod mozjpeg_backend;
mod native;
mod params;
mod scaling;
mod session;
mod sizing;
mod source;

pub use buffers::{PackedGeometry, PackedImage, PackedImageMut, PackedSamples, PackedSamplesMut, YuvImage};
pub use catalog::{Channel, Colorspace, PixelFormat, Subsampling};
pub use config::SessionConfig;
pub use convert::{luma, rgb_to_ycc, ycc_to_rgb};
pub use cropping::{resolve_crop, resolve_transform_crop, CroppingRegion};
pub use firewall::EngineLimits;
pub use header::{has_eoi, read_header, HeaderScan};
pub use mozjpeg_backend::MozjpegEngine;
pub use native::{
    Density, EngineError, EngineParams, EngineResult, HeaderInfo, NativeEngine, TransformPlan,
};
pub use params::{CodecParameters, Param, Restart};
pub use scaling::{best_factor_for, scaling_factors, ScalingFactor, SCALING_FACTORS};
pub use session::CodecSession;
pub use sizing::{
    jpeg_buffer_size, plane_height, plane_size, plane_width, yuv_buffer_size, PlaneLayout,
    YuvLayout, MAX_BUFFER_SIZE,
};
pub use source::SessionState;
