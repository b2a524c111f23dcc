// src/error.rs
//
// Unified error handling for tjkit
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: contract violations at the call site, recoverable
// - CodecError: issues reported by the native codec engine
// - ResourceLimit: size overflow, pixel/memory limits, short buffers
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used to decide how a caller should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by user
    UserError,
    /// Failures or warnings raised by the codec engine
    CodecError,
    /// Size/memory/pixel limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

/// tjkit error types
///
/// Every variant carries the offending value(s) so callers can build an
/// actionable message without re-deriving the context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TjError {
    // Catalog Errors
    #[error("Invalid pixel format id: {id}")]
    InvalidFormat { id: i32 },

    #[error("Invalid subsampling level: {id} (only 4:4:4, 4:2:2, 4:2:0, gray, 4:4:0, 4:1:1 and 4:4:1 have MCU geometry)")]
    InvalidSubsampling { id: i32 },

    // Sizing Errors
    #[error("{what} for {width}x{height} exceeds the maximum buffer size of {limit} bytes")]
    SizeOverflow {
        what: &'static str,
        width: u64,
        height: u64,
        limit: u64,
    },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Scaling / Cropping Errors
    #[error(
        "Requested scale exceeds available factors: image {jpeg_width}x{jpeg_height}, desired {desired_width}x{desired_height}"
    )]
    NoSuitableScale {
        jpeg_width: u32,
        jpeg_height: u32,
        desired_width: u32,
        desired_height: u32,
    },

    #[error("Cropping region {axis}={offset} is not divisible by the scaled iMCU size ({alignment})")]
    InvalidCropAlignment {
        axis: &'static str,
        offset: u32,
        alignment: u32,
    },

    #[error("Crop bounds ({x}+{width}, {y}+{height}) exceed image dimensions ({img_width}x{img_height})")]
    InvalidCropBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    #[error("Cannot crop ({x}, {y}, {width}x{height}): subsampling level of the JPEG image is unknown")]
    SubsamplingUnknown {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    // Parameter Errors
    #[error("Invalid value {value} for parameter {param}: {reason}")]
    InvalidParameterValue {
        param: &'static str,
        value: i64,
        reason: Cow<'static, str>,
    },

    #[error("Unknown parameter: '{name}'")]
    UnknownParameter { name: Cow<'static, str> },

    // State Errors
    #[error("No source image is bound; {operation} requires one")]
    NoSourceBound { operation: &'static str },

    #[error("The subsampling parameter must be set before {operation} from packed pixels")]
    SubsamplingRequired { operation: &'static str },

    #[error("Session is closed")]
    SessionClosed,

    #[error("Destination buffer too small: {required} samples required, {actual} provided")]
    DestinationTooSmall { required: u64, actual: u64 },

    // Engine Errors
    #[error("Corrupt JPEG header: {message}")]
    CorruptHeader { message: Cow<'static, str> },

    #[error("Warning while reading JPEG header: {message}")]
    HeaderWarning { message: Cow<'static, str> },

    #[error("Codec warning: {message}")]
    Warning { message: Cow<'static, str> },

    #[error("{operation} is not supported: {reason}")]
    Unsupported {
        operation: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("{what} {actual} exceeds limit of {max}")]
    LimitExceeded {
        what: &'static str,
        actual: u64,
        max: u64,
    },

    #[error("Codec engine failed: {message}")]
    EngineFailed { message: Cow<'static, str> },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

pub type TjResult<T> = std::result::Result<T, TjError>;

// Constructor Helpers
impl TjError {
    pub fn invalid_format(id: i32) -> Self {
        Self::InvalidFormat { id }
    }

    pub fn invalid_subsampling(id: i32) -> Self {
        Self::InvalidSubsampling { id }
    }

    pub fn size_overflow(what: &'static str, width: u64, height: u64, limit: u64) -> Self {
        Self::SizeOverflow {
            what,
            width,
            height,
            limit,
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn no_suitable_scale(jpeg_dims: (u32, u32), desired_dims: (u32, u32)) -> Self {
        Self::NoSuitableScale {
            jpeg_width: jpeg_dims.0,
            jpeg_height: jpeg_dims.1,
            desired_width: desired_dims.0,
            desired_height: desired_dims.1,
        }
    }

    pub fn invalid_crop_alignment(axis: &'static str, offset: u32, alignment: u32) -> Self {
        Self::InvalidCropAlignment {
            axis,
            offset,
            alignment,
        }
    }

    pub fn invalid_crop_bounds(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::InvalidCropBounds {
            x,
            y,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn subsampling_unknown(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::SubsamplingUnknown {
            x,
            y,
            width,
            height,
        }
    }

    pub fn invalid_parameter_value(
        param: &'static str,
        value: i64,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidParameterValue {
            param,
            value,
            reason: reason.into(),
        }
    }

    pub fn unknown_parameter(name: impl Into<Cow<'static, str>>) -> Self {
        Self::UnknownParameter { name: name.into() }
    }

    pub fn no_source_bound(operation: &'static str) -> Self {
        Self::NoSourceBound { operation }
    }

    pub fn subsampling_required(operation: &'static str) -> Self {
        Self::SubsamplingRequired { operation }
    }

    pub fn session_closed() -> Self {
        Self::SessionClosed
    }

    pub fn destination_too_small(required: u64, actual: u64) -> Self {
        Self::DestinationTooSmall { required, actual }
    }

    pub fn corrupt_header(message: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptHeader {
            message: message.into(),
        }
    }

    pub fn header_warning(message: impl Into<Cow<'static, str>>) -> Self {
        Self::HeaderWarning {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn unsupported(
        operation: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn limit_exceeded(what: &'static str, actual: u64, max: u64) -> Self {
        Self::LimitExceeded { what, actual, max }
    }

    pub fn engine_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::EngineFailed {
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Non-fatal engine diagnostics. These only surface as errors when the
    /// stop-on-warning parameter is set.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning { .. } | Self::HeaderWarning { .. })
    }

    /// Check if this error is recoverable (user can fix it)
    ///
    /// - UserError and ResourceLimit errors are recoverable
    /// - Warnings are recoverable even though they are reported by the codec
    /// - Other CodecError and InternalBug errors are not recoverable
    pub fn is_recoverable(&self) -> bool {
        if self.is_warning() {
            return true;
        }
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit => true,
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidFormat { .. }
            | Self::InvalidSubsampling { .. }
            | Self::InvalidArgument { .. }
            | Self::NoSuitableScale { .. }
            | Self::InvalidCropAlignment { .. }
            | Self::InvalidCropBounds { .. }
            | Self::SubsamplingUnknown { .. }
            | Self::InvalidParameterValue { .. }
            | Self::UnknownParameter { .. }
            | Self::NoSourceBound { .. }
            | Self::SubsamplingRequired { .. }
            | Self::SessionClosed => ErrorCategory::UserError,

            Self::CorruptHeader { .. }
            | Self::HeaderWarning { .. }
            | Self::Warning { .. }
            | Self::Unsupported { .. }
            | Self::EngineFailed { .. } => ErrorCategory::CodecError,

            // DestinationTooSmall sits here because the fix is always "hand in a larger
            // buffer", the same shape as the other size limits.
            Self::SizeOverflow { .. }
            | Self::LimitExceeded { .. }
            | Self::DestinationTooSmall { .. } => ErrorCategory::ResourceLimit,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "TJKIT_USER_ERROR",
            ErrorCategory::CodecError => "TJKIT_CODEC_ERROR",
            ErrorCategory::ResourceLimit => "TJKIT_RESOURCE_LIMIT",
            ErrorCategory::InternalBug => "TJKIT_INTERNAL_BUG",
        }
    }
}
