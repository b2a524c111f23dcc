// src/ops.rs
//
// Lossless transform operations.
// Descriptors are plain values; the session resolves them against the decoded
// header before anything reaches the engine.

use crate::engine::CroppingRegion;
use std::fmt;

/// Spatial transform applied to the DCT coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransformOp {
    #[default]
    None,
    /// Flip horizontally (mirror image)
    HFlip,
    /// Flip vertically (upside down)
    VFlip,
    /// Mirror across the upper-left to lower-right diagonal
    Transpose,
    /// Mirror across the upper-right to lower-left diagonal
    Transverse,
    /// Rotate 90 degrees clockwise
    Rot90,
    Rot180,
    /// Rotate 270 degrees clockwise (90 counter-clockwise)
    Rot270,
}

impl TransformOp {
    pub const ALL: [TransformOp; 8] = [
        TransformOp::None,
        TransformOp::HFlip,
        TransformOp::VFlip,
        TransformOp::Transpose,
        TransformOp::Transverse,
        TransformOp::Rot90,
        TransformOp::Rot180,
        TransformOp::Rot270,
    ];

    /// True when rows become columns.
    pub const fn transposes(self) -> bool {
        matches!(
            self,
            TransformOp::Transpose | TransformOp::Transverse | TransformOp::Rot90 | TransformOp::Rot270
        )
    }

    /// True when the right edge of the source ends up somewhere other than the
    /// right/bottom edge, so a partial iMCU column there cannot be kept.
    pub const fn moves_right_edge(self) -> bool {
        matches!(
            self,
            TransformOp::HFlip | TransformOp::Rot270 | TransformOp::Transverse | TransformOp::Rot180
        )
    }

    /// Vertical counterpart of [`TransformOp::moves_right_edge`].
    pub const fn moves_bottom_edge(self) -> bool {
        matches!(
            self,
            TransformOp::VFlip | TransformOp::Rot90 | TransformOp::Transverse | TransformOp::Rot180
        )
    }

    /// Output dimensions for a `width` x `height` source.
    pub const fn output_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.transposes() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl fmt::Display for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformOp::None => "none",
            TransformOp::HFlip => "hflip",
            TransformOp::VFlip => "vflip",
            TransformOp::Transpose => "transpose",
            TransformOp::Transverse => "transverse",
            TransformOp::Rot90 => "rot90",
            TransformOp::Rot180 => "rot180",
            TransformOp::Rot270 => "rot270",
        };
        f.write_str(name)
    }
}

bitflags::bitflags! {
    /// Transform options, bit-compatible with the TurboJPEG `TJXOPT_*` values.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TransformOptions: u32 {
        /// Fail instead of silently keeping partial iMCUs on edges that move.
        const PERFECT = 1;
        /// Drop partial iMCUs on edges that move.
        const TRIM = 1 << 1;
        /// Emit only the descriptor's region.
        const CROP = 1 << 2;
        /// Drop the chroma components.
        const GRAY = 1 << 3;
        /// Validate without producing output.
        const NO_OUTPUT = 1 << 4;
        const PROGRESSIVE = 1 << 5;
        /// Do not copy extra markers (ICC, EXIF, comments).
        const COPY_NONE = 1 << 6;
        const ARITHMETIC = 1 << 7;
        const OPTIMIZE = 1 << 8;
    }
}

/// One requested transform. `region` is only honoured with [`TransformOptions::CROP`]
/// and is expressed in transformed-image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformDescriptor {
    pub op: TransformOp,
    pub options: TransformOptions,
    pub region: CroppingRegion,
}

impl TransformDescriptor {
    pub fn new(op: TransformOp) -> Self {
        Self {
            op,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options |= options;
        self
    }

    /// Crop to `region`; sets [`TransformOptions::CROP`].
    pub fn cropped(mut self, region: CroppingRegion) -> Self {
        self.region = region;
        self.options |= TransformOptions::CROP;
        self
    }
}
