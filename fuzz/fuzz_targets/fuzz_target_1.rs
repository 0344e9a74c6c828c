#![no_main]

use jpeg_scan_engine::{Decompressor, EnabledFeatures, ReadStatus, SliceSource};

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // small budget so the spill path gets exercised as well
    let features = EnabledFeatures::low_memory(64 * 1024);

    let mut d = Decompressor::new(&features);
    d.set_source(Box::new(SliceSource::with_chunk_size(data.to_vec(), 97)));

    loop {
        match d.read_header(true) {
            Ok(ReadStatus::Suspended) => continue,
            Ok(_) => break,
            Err(_) => return,
        }
    }

    loop {
        match d.read_coefficients() {
            Ok(true) => break,
            Ok(false) => continue,
            Err(_) => return,
        }
    }

    let _ = d.finish_decompress();
});
