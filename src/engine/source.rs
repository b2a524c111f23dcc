// src/engine/source.rs
//
// Source binding: which image representation a session currently reads from.
// Exactly one representation is bound at a time; rebinding replaces it wholesale.

use crate::engine::buffers::{PackedImage, YuvImage};
use crate::engine::native::HeaderInfo;

/// The currently bound source. Borrowed data stays with the caller for `'src`.
#[derive(Clone, Debug, Default)]
pub enum Binding<'src> {
    #[default]
    Empty,
    /// Packed pixels for compression or YUV encoding.
    Packed(PackedImage<'src>),
    /// Planar YUV image for compression or decoding.
    PlanarYuv(&'src YuvImage),
    /// JPEG stream for decompression or transforms; `header` is `None` until a
    /// header read succeeds.
    Jpeg {
        data: &'src [u8],
        header: Option<HeaderInfo>,
    },
}

/// Observable session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    BoundPackedPixel { precision: u8 },
    BoundPlanarYuv,
    /// A JPEG is bound but its header could not be read.
    BoundJpeg,
    DecodedHeader,
    Closed,
}

impl<'src> Binding<'src> {
    pub fn state(&self) -> SessionState {
        match self {
            Binding::Empty => SessionState::Empty,
            Binding::Packed(image) => SessionState::BoundPackedPixel {
                precision: image.precision(),
            },
            Binding::PlanarYuv(_) => SessionState::BoundPlanarYuv,
            Binding::Jpeg { header: None, .. } => SessionState::BoundJpeg,
            Binding::Jpeg { header: Some(_), .. } => SessionState::DecodedHeader,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Empty => "empty",
            Binding::Packed(_) => "packed",
            Binding::PlanarYuv(_) => "planar-yuv",
            Binding::Jpeg { .. } => "jpeg",
        }
    }

    /// JPEG bytes and header, when a header has been read.
    pub fn decoded_jpeg(&self) -> Option<(&'src [u8], &HeaderInfo)> {
        match self {
            Binding::Jpeg {
                data,
                header: Some(header),
            } => Some((*data, header)),
            _ => None,
        }
    }

    pub fn header(&self) -> Option<&HeaderInfo> {
        self.decoded_jpeg().map(|(_, header)| header)
    }
}
