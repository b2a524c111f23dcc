#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tjkit::engine::{
    jpeg_buffer_size, resolve_crop, resolve_transform_crop, scaling_factors, yuv_buffer_size,
    CroppingRegion, Subsampling, YuvLayout,
};

#[derive(Arbitrary, Debug)]
struct Input {
    width: u32,
    height: u32,
    align: u8,
    subsampling: u8,
    factor: u8,
    crop: (u32, u32, u32, u32),
}

fuzz_target!(|data: Input| {
    let subsampling = Subsampling::KNOWN[data.subsampling as usize % Subsampling::KNOWN.len()];
    let factors = scaling_factors();
    let scaling = factors[data.factor as usize % factors.len()];
    let region = CroppingRegion::new(data.crop.0, data.crop.1, data.crop.2, data.crop.3);
    let align = 1u32 << (data.align % 8);

    let _ = jpeg_buffer_size(data.width, data.height, subsampling);
    if let Ok(layout) = YuvLayout::new(data.width, align, data.height, subsampling) {
        assert_eq!(
            yuv_buffer_size(data.width, align, data.height, subsampling).ok(),
            Some(layout.total_size())
        );
    }

    if let Ok(resolved) = resolve_crop(region, scaling, data.width, data.height, subsampling) {
        let scaled_w = scaling.scale(data.width) as u64;
        let scaled_h = scaling.scale(data.height) as u64;
        assert!(resolved.x as u64 + resolved.width as u64 <= scaled_w);
        assert!(resolved.y as u64 + resolved.height as u64 <= scaled_h);
    }
    if let Ok(resolved) = resolve_transform_crop(region, data.width, data.height, subsampling) {
        assert!(resolved.x as u64 + resolved.width as u64 <= data.width as u64);
        assert!(resolved.y as u64 + resolved.height as u64 <= data.height as u64);
    }
});
