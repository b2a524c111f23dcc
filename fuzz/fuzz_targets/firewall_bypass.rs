#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tjkit::engine::EngineLimits;

#[derive(Arbitrary, Debug)]
struct Input {
    max_pixels: u64,
    max_memory_bytes: u64,
    width: u32,
    height: u32,
    bytes_per_pixel: u8,
}

fuzz_target!(|data: Input| {
    let limits = EngineLimits::new(data.max_pixels, data.max_memory_bytes);
    let pixels = data.width as u64 * data.height as u64;
    let bpp = data.bytes_per_pixel as u64;

    let result = limits.enforce_image(data.width, data.height, bpp);
    if result.is_ok() {
        // Nothing over a non-zero limit may slip through.
        assert!(data.max_pixels == 0 || pixels <= data.max_pixels);
        assert!(data.max_memory_bytes == 0 || pixels.saturating_mul(bpp) <= data.max_memory_bytes);
    }
    if data.max_pixels == 0 && data.max_memory_bytes == 0 {
        assert!(result.is_ok());
    }
});
