#![no_main]

use libfuzzer_sys::fuzz_target;
use tjkit::engine::read_header;
use tjkit::CodecSession;

fuzz_target!(|data: &[u8]| {
    let scanned = read_header(data);

    // The session path must agree with the raw scanner on what is readable.
    let mut session = CodecSession::new();
    match (session.decompress_header(data), scanned) {
        (Ok(info), Ok(scan)) => {
            assert_eq!((info.width, info.height), (scan.info.width, scan.info.height));
            let _ = session.scaled_dimensions();
        }
        (Err(_), _) => {}
        (Ok(_), Err(err)) => panic!("session accepted a header the scanner rejected: {err}"),
    }
});
