// lib.rs
//
// tjkit: TurboJPEG-style geometry, parameter and session layer.
//
// Design goals:
// - Every size computation is overflow-checked before a buffer is touched
// - One named-parameter store instead of flag sets and globals
// - Sessions bind one source at a time and never copy caller buffers
// - The pixel work lives behind a swappable native engine

//! Geometry, parameters and sessions for TurboJPEG-style JPEG codecs.
//!
//! ```no_run
//! use tjkit::{CodecSession, Param, PackedImage, PixelFormat, Subsampling};
//!
//! # fn main() -> tjkit::TjResult<()> {
//! let pixels = vec![0u8; 64 * 64 * 3];
//! let mut session = CodecSession::new();
//! session.set(Param::Subsampling, Subsampling::S420.id())?;
//! session.set(Param::Quality, 90)?;
//! session.bind_packed(PackedImage::tight(&pixels[..], 64, 64, PixelFormat::Rgb)?)?;
//! let jpeg = session.compress()?;
//! # let _ = jpeg;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    best_factor_for, jpeg_buffer_size, plane_height, plane_size, plane_width, scaling_factors,
    yuv_buffer_size, CodecParameters, CodecSession, Colorspace, CroppingRegion, HeaderInfo,
    MozjpegEngine, NativeEngine, PackedImage, PackedImageMut, Param, PixelFormat, ScalingFactor,
    SessionConfig, SessionState, Subsampling, YuvImage, YuvLayout,
};
pub use error::{ErrorCategory, TjError, TjResult};
pub use ops::{TransformDescriptor, TransformOp, TransformOptions};

/// Get library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
