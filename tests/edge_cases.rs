// tests/edge_cases.rs
//
// Edge case tests for tjkit
// Tests boundary values, invalid inputs, error taxonomy and session state

use tjkit::engine::{
    best_factor_for, jpeg_buffer_size, plane_height, plane_size, plane_width, resolve_crop,
    yuv_buffer_size, Channel, CodecParameters, CroppingRegion, Param, PixelFormat, ScalingFactor,
    SessionState, Subsampling, YuvImage, YuvLayout,
};
use tjkit::{CodecSession, ErrorCategory, PackedImage, TjError};

// Helper to create a valid 4:2:0 JPEG of the specified size
fn create_valid_jpeg(width: u32, height: u32) -> Vec<u8> {
    let pixels: Vec<u8> = (0..height)
        .flat_map(|y| (0..width).flat_map(move |x| [(x % 256) as u8, (y % 256) as u8, 128]))
        .collect();

    use mozjpeg::ColorSpace;
    use mozjpeg::Compress;

    let mut comp = Compress::new(ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(80.0);
    comp.set_color_space(ColorSpace::JCS_YCbCr);
    comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));

    let mut output = Vec::new();
    {
        let mut writer = comp.start_compress(&mut output).unwrap();
        let stride = width as usize * 3;
        for row in pixels.chunks(stride) {
            writer.write_scanlines(row).unwrap();
        }
        writer.finish().unwrap();
    }
    output
}

mod catalog_tests {
    use super::*;

    #[test]
    fn test_unknown_ids_rejected() {
        assert_eq!(PixelFormat::from_id(12), Err(TjError::invalid_format(12)));
        assert_eq!(PixelFormat::from_id(-1), Err(TjError::invalid_format(-1)));
        assert_eq!(Subsampling::from_id(7), Err(TjError::invalid_subsampling(7)));
        assert_eq!(Subsampling::from_id(-1).unwrap(), Subsampling::Unknown);
    }

    #[test]
    fn test_unknown_subsampling_has_no_mcu() {
        assert!(Subsampling::Unknown.mcu_block().is_none());
        assert!(matches!(
            Subsampling::Unknown.mcu_width(),
            Err(TjError::InvalidSubsampling { id: -1 })
        ));
    }

    #[test]
    fn test_gray_has_no_color_offsets() {
        for channel in [Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha] {
            assert_eq!(PixelFormat::Gray.channel_offset(channel), None);
        }
        assert_eq!(PixelFormat::Gray.sample_size(), 1);
        assert_eq!(PixelFormat::Cmyk.sample_size(), 4);
    }
}

mod sizing_tests {
    use super::*;

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            jpeg_buffer_size(0, 10, Subsampling::S444),
            Err(TjError::InvalidArgument { .. })
        ));
        assert!(matches!(
            yuv_buffer_size(10, 4, 0, Subsampling::S420),
            Err(TjError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_documented_overflow_boundary() {
        assert!(matches!(
            jpeg_buffer_size(18919, 18919, Subsampling::S444),
            Err(TjError::SizeOverflow { width: 18919, height: 18919, .. })
        ));
        assert!(jpeg_buffer_size(100, 100, Subsampling::S444).unwrap() > 0);
    }

    #[test]
    fn test_non_power_of_two_alignment_rejected() {
        assert!(matches!(
            yuv_buffer_size(10, 3, 10, Subsampling::S420),
            Err(TjError::InvalidArgument { .. })
        ));
        assert!(matches!(
            YuvLayout::new(10, 0, 10, Subsampling::S420),
            Err(TjError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_gray_has_single_plane() {
        assert!(plane_width(1, 10, Subsampling::Gray).is_err());
        assert_eq!(plane_width(0, 10, Subsampling::Gray).unwrap(), 10);
        let layout = YuvLayout::new(10, 1, 10, Subsampling::Gray).unwrap();
        assert_eq!(layout.planes().len(), 1);
        assert_eq!(layout.total_size(), 100);
    }

    #[test]
    fn test_odd_dimensions_round_up_chroma() {
        // 4:2:0 chroma of a 3x3 image is 2x2
        assert_eq!(plane_width(1, 3, Subsampling::S420).unwrap(), 2);
        assert_eq!(plane_height(2, 3, Subsampling::S420).unwrap(), 2);
        // 4:1:1 chroma of a 5-wide image is 2 wide
        assert_eq!(plane_width(1, 5, Subsampling::S411).unwrap(), 2);
        assert_eq!(plane_size(1, 3, 0, 3, Subsampling::S420).unwrap(), 4);
    }

    #[test]
    fn test_unknown_subsampling_rejected_by_planes() {
        assert!(matches!(
            yuv_buffer_size(16, 1, 16, Subsampling::Unknown),
            Err(TjError::InvalidSubsampling { .. })
        ));
    }
}

mod scaling_and_crop_tests {
    use super::*;

    #[test]
    fn test_scale_too_small_reports_request() {
        let err = best_factor_for(6400, 4800, 100, 100).unwrap_err();
        assert_eq!(err, TjError::no_suitable_scale((6400, 4800), (100, 100)));
        assert!(err.to_string().contains("6400x4800"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_zero_desired_means_unbounded() {
        assert_eq!(best_factor_for(640, 480, 0, 0).unwrap(), ScalingFactor::UNSCALED);
        let half = ScalingFactor::new(1, 2).unwrap();
        assert_eq!(best_factor_for(640, 480, 320, 0).unwrap(), half);
    }

    #[test]
    fn test_crop_alignment_and_expansion() {
        let expanded = resolve_crop(
            CroppingRegion::new(16, 0, 0, 0),
            ScalingFactor::UNSCALED,
            640,
            480,
            Subsampling::S420,
        )
        .unwrap();
        assert_eq!((expanded.width, expanded.height), (624, 480));

        assert_eq!(
            resolve_crop(
                CroppingRegion::new(8, 0, 0, 0),
                ScalingFactor::UNSCALED,
                640,
                480,
                Subsampling::S420,
            ),
            Err(TjError::invalid_crop_alignment("x", 8, 16))
        );
    }

    #[test]
    fn test_crop_past_edge_rejected() {
        assert!(matches!(
            resolve_crop(
                CroppingRegion::new(0, 470, 0, 20),
                ScalingFactor::UNSCALED,
                640,
                480,
                Subsampling::S444,
            ),
            Err(TjError::InvalidCropBounds { .. })
        ));
    }

    #[test]
    fn test_crop_with_unknown_subsampling() {
        assert_eq!(
            resolve_crop(
                CroppingRegion::new(16, 0, 0, 0),
                ScalingFactor::UNSCALED,
                640,
                480,
                Subsampling::Unknown,
            ),
            Err(TjError::subsampling_unknown(16, 0, 0, 0))
        );
    }
}

mod parameter_tests {
    use super::*;

    #[test]
    fn test_restart_keys_exclusive() {
        let mut params = CodecParameters::new();
        params.set(Param::RestartRows, 4).unwrap();
        params.set(Param::RestartBlocks, 10).unwrap();
        assert_eq!(params.get(Param::RestartRows), 0);
        params.set(Param::RestartRows, 2).unwrap();
        assert_eq!(params.get(Param::RestartBlocks), 0);
    }

    #[test]
    fn test_precision_16_requires_lossless() {
        let mut params = CodecParameters::new();
        assert!(matches!(
            params.set(Param::Precision, 16),
            Err(TjError::InvalidParameterValue { param: "precision", value: 16, .. })
        ));
        params.set(Param::Lossless, 1).unwrap();
        params.set(Param::Precision, 16).unwrap();
        assert!(params.set(Param::Lossless, 0).is_err());
    }

    #[test]
    fn test_out_of_range_values() {
        let mut params = CodecParameters::new();
        for (param, value) in [
            (Param::Quality, 0),
            (Param::Quality, 101),
            (Param::LosslessPsv, 8),
            (Param::LosslessPt, 8),
            (Param::RestartBlocks, 65536),
            (Param::DensityUnits, 3),
            (Param::MaxPixels, -1),
        ] {
            let err = params.set(param, value).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::UserError, "{err}");
        }
    }

    #[test]
    fn test_unknown_parameter_name() {
        let mut params = CodecParameters::new();
        assert_eq!(
            params.set_named("qualty", 90),
            Err(TjError::unknown_parameter("qualty"))
        );
        params.set_named("fastDCT", 1).unwrap();
        assert_eq!(params.get(Param::FastDct), 1);
    }

    #[test]
    fn test_read_only_keys() {
        let mut params = CodecParameters::new();
        assert!(params.set(Param::JpegWidth, 10).is_err());
        assert_eq!(params.get(Param::JpegWidth), -1);
    }
}

mod session_state_tests {
    use super::*;

    #[test]
    fn test_empty_session_has_no_source() {
        let mut session = CodecSession::new();
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.compress(), Err(TjError::no_source_bound("compress")));
        assert!(matches!(
            session.encode_yuv(4),
            Err(TjError::NoSourceBound { .. })
        ));
        assert!(matches!(
            session.transform(&[]),
            Err(TjError::NoSourceBound { .. })
        ));
        let mut dst = [0u8; 3];
        assert!(matches!(
            session.decompress(&mut dst, 0, 0, 0, PixelFormat::Rgb),
            Err(TjError::NoSourceBound { .. })
        ));
    }

    #[test]
    fn test_close_twice_then_everything_fails() {
        let mut session = CodecSession::new();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.compress(), Err(TjError::session_closed()));
        assert_eq!(session.set(Param::Quality, 90), Err(TjError::session_closed()));
        assert_eq!(session.encode_yuv(1).unwrap_err(), TjError::session_closed());
    }

    #[test]
    fn test_rebinding_replaces_source() {
        let pixels = vec![0u8; 8 * 8 * 3];
        let yuv = YuvImage::new(8, 1, 8, Subsampling::S440).unwrap();
        let mut session = CodecSession::new();
        session
            .bind_packed(PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Rgb).unwrap())
            .unwrap();
        assert_eq!(session.state(), SessionState::BoundPackedPixel { precision: 8 });
        session.bind_planar_yuv(&yuv).unwrap();
        assert_eq!(session.state(), SessionState::BoundPlanarYuv);
        assert_eq!(session.get(Param::Subsampling).unwrap(), Subsampling::S440.id());
        // Planar images are not packed sources.
        assert!(matches!(session.encode_yuv(1), Err(TjError::NoSourceBound { .. })));
    }

    #[test]
    fn test_packed_view_rejects_short_buffer() {
        let pixels = vec![0u8; 8 * 8 * 3 - 1];
        assert!(matches!(
            PackedImage::tight(&pixels[..], 8, 8, PixelFormat::Rgb),
            Err(TjError::InvalidArgument { .. })
        ));
        assert!(matches!(
            PackedImage::new(&pixels[..], 0, 0, 8, 10, 1, PixelFormat::Rgb),
            Err(TjError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_corrupt_jpeg_is_fatal() {
        let garbage = b"not a jpeg at all";
        let mut session = CodecSession::new();
        let err = session.decompress_header(garbage).unwrap_err();
        assert!(matches!(err, TjError::CorruptHeader { .. }));
        assert!(!err.is_recoverable());
        assert_eq!(session.state(), SessionState::BoundJpeg);
    }

    #[test]
    fn test_truncated_jpeg_warns() {
        let mut jpeg = create_valid_jpeg(16, 16);
        jpeg.truncate(jpeg.len() - 2);

        let mut session = CodecSession::new();
        session.decompress_header(&jpeg).unwrap();
        assert!(!session.warnings().is_empty());

        let mut strict = CodecSession::new();
        strict.set(Param::StopOnWarning, 1).unwrap();
        let err = strict.decompress_header(&jpeg).unwrap_err();
        assert!(matches!(err, TjError::HeaderWarning { .. }));
        assert!(err.is_warning());
    }

    #[test]
    fn test_lossy_source_accepts_supported_factor() {
        let jpeg = create_valid_jpeg(32, 32);
        let mut session = CodecSession::new();
        session.decompress_header(&jpeg).unwrap();
        // A lossy header accepts any supported factor.
        session
            .set_scaling_factor(ScalingFactor::new(3, 8).unwrap())
            .unwrap();
        assert_eq!(session.scaled_dimensions().unwrap(), (12, 12));
    }

    #[test]
    fn test_decompress_with_offset_and_pitch() {
        let jpeg = create_valid_jpeg(16, 16);
        let mut session = CodecSession::new();
        session.decompress_header(&jpeg).unwrap();
        // 16 RGBX pixels at x=2 need a pitch of at least 72.
        let pitch = 80;
        let required = (4 + 16 - 1) * pitch + (2 + 16) * 4;
        let mut short = vec![0u8; required - 1];
        assert_eq!(
            session.decompress(&mut short, 2, 4, pitch, PixelFormat::Rgbx),
            Err(TjError::destination_too_small(required as u64, required as u64 - 1))
        );
        let mut dst = vec![0u8; required];
        session.decompress(&mut dst, 2, 4, pitch, PixelFormat::Rgbx).unwrap();
        // Rows above the offset are untouched.
        assert!(dst[..4 * pitch].iter().all(|&b| b == 0));
    }
}
