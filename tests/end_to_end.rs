/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::hash::Hasher;
use std::io::Read;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use jpeg_scan_engine::{
    get_version_string, jpeg_code, simple_progression, Block, ChunkedSource, CoefficientRow,
    CoefficientSink, ComponentInfo, Compressor, ConsumeStatus, Decompressor, EnabledFeatures, EntropyDecoder,
    ErrorClass, ExitCode, ForwardTransform, FrameHeader, FrameSpec, HuffmanDecoder, JSample,
    JpegCodec, LimitedDestination, McuOutcome, ReadStatus, ReaderSource, ScanLayout, SliceSource,
    TableManager, VecDestination, WarningKind, WriteStatus,
};
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rstest::rstest;
use siphasher::sip::SipHasher13;

/// the coefficient blocks of every component, `width_in_blocks * height_in_blocks` each
type Image = Vec<Vec<Block>>;

fn init_logging() {
    // several tests race to install the logger, only the first one wins
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init();
}

/// handy function to compare two images, and print the first mismatch. Useful for debugging.
#[track_caller]
fn assert_eq_image(a: &Image, b: &Image) {
    assert_eq!(a.len(), b.len(), "component count");
    for (ci, (pa, pb)) in a.iter().zip(b.iter()).enumerate() {
        assert_eq!(pa.len(), pb.len(), "block count of component {0}", ci);
        for (i, (ba, bb)) in pa.iter().zip(pb.iter()).enumerate() {
            assert_eq!(ba, bb, "component {0} first mismatch at block {1}", ci, i);
        }
    }
}

fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

fn image_hash(image: &Image) -> u64 {
    let mut h = SipHasher13::new();
    for plane in image {
        for block in plane {
            for &c in block.iter() {
                h.write_i16(c);
            }
        }
    }
    h.finish()
}

fn frame_spec(width: u32, height: u32, sampling: &[(u8, u8)]) -> FrameSpec {
    let mut spec = FrameSpec::new(width, height, sampling.len());
    for (c, &(h, v)) in spec.components.iter_mut().zip(sampling.iter()) {
        c.h_samp_factor = h;
        c.v_samp_factor = v;
    }
    spec
}

/// random coefficients with a realistic shape: a DC term and a few small AC terms
fn random_image(frame: &FrameHeader, seed: u64) -> Image {
    let mut rng = ChaCha12Rng::seed_from_u64(seed);

    frame
        .components
        .iter()
        .map(|c| {
            let count = (c.width_in_blocks * c.height_in_blocks) as usize;
            (0..count)
                .map(|_| {
                    let mut b = [0i16; 64];
                    b[0] = rng.gen_range(-600..600);
                    for coef in b[1..].iter_mut() {
                        if rng.gen_ratio(1, 6) {
                            *coef = rng.gen_range(-40..40);
                        }
                    }
                    b
                })
                .collect()
        })
        .collect()
}

fn empty_image(frame: &FrameHeader) -> Image {
    frame
        .components
        .iter()
        .map(|c| vec![[0i16; 64]; (c.width_in_blocks * c.height_in_blocks) as usize])
        .collect()
}

struct EncodeOptions {
    progressive: bool,
    restart_interval: u32,
    restart_in_rows: u32,
    features: EnabledFeatures,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            progressive: false,
            restart_interval: 0,
            restart_in_rows: 0,
            features: EnabledFeatures::default(),
        }
    }
}

fn start_compressor(spec: FrameSpec, options: &EncodeOptions) -> (Compressor, VecDestination) {
    let dest = VecDestination::new();
    let mut c = Compressor::new(&options.features);
    c.set_destination(Box::new(dest.clone()));
    c.set_defaults(spec).unwrap();
    if options.progressive {
        c.simple_progression().unwrap();
    }
    c.set_restart_interval(options.restart_interval).unwrap();
    c.set_restart_in_rows(options.restart_in_rows).unwrap();
    c.start_compress(true).unwrap();
    (c, dest)
}

/// feeds every iMCU row, calling `on_suspend` whenever the destination is full
fn write_image(c: &mut Compressor, image: &Image, on_suspend: &mut dyn FnMut()) {
    let frame = c.frame().unwrap().clone();

    for imcu_row in 0..frame.total_imcu_rows {
        let rows: Vec<&[Block]> = frame
            .components
            .iter()
            .zip(image.iter())
            .map(|(ci, blocks)| {
                let w = ci.width_in_blocks as usize;
                let start = imcu_row as usize * usize::from(ci.v_samp_factor);
                let n = ci.block_rows_in_imcu_row(imcu_row) as usize;
                &blocks[start * w..(start + n) * w]
            })
            .collect();

        while c.write_coefficients(&rows).unwrap() == WriteStatus::Suspended {
            on_suspend();
        }
    }

    while !c.finish_compress().unwrap() {
        on_suspend();
    }
}

/// compresses a random image, returns the datastream and the image
fn encode_random(spec: FrameSpec, options: &EncodeOptions, seed: u64) -> (Vec<u8>, Image) {
    let (mut c, dest) = start_compressor(spec, options);
    let image = random_image(c.frame().unwrap(), seed);
    write_image(&mut c, &image, &mut || panic!("memory destination never suspends"));
    (dest.contents(), image)
}

/// copies the real blocks of every component out of the decompressor
fn extract_image(d: &mut Decompressor) -> Image {
    let frame = d.frame().unwrap().clone();
    let mut image = empty_image(&frame);

    for (ci, c) in frame.components.iter().enumerate() {
        let w = c.width_in_blocks as usize;
        for row in 0..c.height_in_blocks as usize {
            let blocks = d.access_coefficients(ci, row, 1).unwrap();
            image[ci][row * w..(row + 1) * w].copy_from_slice(&blocks[..w]);
        }
    }
    image
}

/// decodes the whole datastream, retrying on suspension
fn decode(d: &mut Decompressor) -> Image {
    loop {
        match d.read_header(true).unwrap() {
            ReadStatus::HeaderOk => break,
            ReadStatus::Suspended => continue,
            ReadStatus::HeaderTablesOnly => panic!("expected an image"),
        }
    }
    while !d.read_coefficients().unwrap() {}
    extract_image(d)
}

fn decompressor_for(data: Vec<u8>, features: &EnabledFeatures) -> Decompressor {
    let mut d = Decompressor::new(features);
    d.set_source(Box::new(SliceSource::new(data)));
    d
}

/// collects rows handed out by `read_imcu_row` or `output_imcu_row`
struct CollectRows {
    image: Image,
    rows_seen: u32,
}

impl CoefficientSink for CollectRows {
    fn consume_row(&mut self, row: &CoefficientRow<'_>) -> jpeg_scan_engine::Result<()> {
        let c = row.component;
        let w = c.width_in_blocks as usize;
        let first = row.imcu_row as usize * usize::from(c.v_samp_factor);
        let plane = &mut self.image[c.component_index];

        for y in 0..row.block_rows {
            let src = &row.blocks[y * row.blocks_per_row..y * row.blocks_per_row + w];
            plane[(first + y) * w..(first + y + 1) * w].copy_from_slice(src);
        }
        if c.component_index == 0 {
            self.rows_seen += 1;
        }
        Ok(())
    }
}

#[rstest]
fn sequential_roundtrip(
    #[values(
        vec![(1, 1)],
        vec![(2, 2), (1, 1), (1, 1)],
        vec![(2, 1), (1, 1), (1, 1)],
        vec![(1, 2), (1, 1), (1, 1)],
        vec![(1, 1), (1, 1), (1, 1), (1, 1)]
    )]
    sampling: Vec<(u8, u8)>,
    #[values((1, 1), (17, 9), (48, 33))] size: (u32, u32),
    #[values(0, 3)] restart_interval: u32,
) {
    init_logging();

    let spec = frame_spec(size.0, size.1, &sampling);
    let options = EncodeOptions {
        restart_interval,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 1);

    let mut d = decompressor_for(data, &EnabledFeatures::default());
    let decoded = decode(&mut d);
    assert_eq_image(&decoded, &image);
    assert_eq!(d.num_warnings(), 0);

    // geometry
    let frame = d.frame().unwrap();
    let hmax = u32::from(sampling.iter().map(|s| s.0).max().unwrap());
    let vmax = u32::from(sampling.iter().map(|s| s.1).max().unwrap());
    assert_eq!(frame.total_imcu_rows, ceil_div(size.1, 8 * vmax));
    for (c, &(h, v)) in frame.components.iter().zip(sampling.iter()) {
        assert_eq!(
            c.width_in_blocks,
            ceil_div(ceil_div(size.0 * u32::from(h), hmax), 8)
        );
        assert_eq!(
            c.height_in_blocks,
            ceil_div(ceil_div(size.1 * u32::from(v), vmax), 8)
        );
        assert_eq!(
            d.coefficient_block_rows(c.component_index).unwrap() % usize::from(v),
            0
        );
    }

    assert!(d.finish_decompress().unwrap());
}

#[rstest]
fn progressive_roundtrip(
    #[values(vec![(1, 1)], vec![(2, 2), (1, 1), (1, 1)])] sampling: Vec<(u8, u8)>,
    #[values(0, 2)] restart_interval: u32,
) {
    init_logging();

    let spec = frame_spec(40, 24, &sampling);
    let options = EncodeOptions {
        progressive: true,
        restart_interval,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 2);
    let scans = simple_progression(sampling.len()).len() as u32;

    let mut d = decompressor_for(data, &EnabledFeatures::default());
    let decoded = decode(&mut d);
    assert_eq_image(&decoded, &image);
    assert!(d.has_multiple_scans());
    assert_eq!(d.input_scan_number(), scans);
    assert_eq!(d.num_warnings(), 0);
    assert_eq!(d.metrics().scans(), scans);

    // every coefficient went through its full successive approximation chain
    let coef_bits = d.coef_bits().unwrap();
    for ci in 0..sampling.len() {
        assert!(coef_bits.component(ci).unwrap().iter().all(|&b| b == 0));
    }

    assert!(d.finish_decompress().unwrap());
}

#[rstest]
fn restart_in_rows_roundtrip(#[values(false, true)] progressive: bool) {
    let spec = frame_spec(64, 48, &[(2, 2), (1, 1), (1, 1)]);
    let options = EncodeOptions {
        progressive,
        restart_in_rows: 1,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 3);

    // one DRI and one restart marker per MCU row
    assert!(data.windows(2).any(|w| w == [0xff, jpeg_code::DRI]));
    assert!(data.windows(2).any(|w| w == [0xff, jpeg_code::RST0]));

    let mut d = decompressor_for(data, &EnabledFeatures::default());
    assert_eq_image(&decode(&mut d), &image);
    assert_eq!(d.num_warnings(), 0);
}

/// a budget far below the image size forces the coefficient arrays out to the
/// backing store, which must not change the result
#[rstest]
fn spills_under_low_memory(#[values(false, true)] progressive: bool) {
    init_logging();

    let features = EnabledFeatures::low_memory(16 * 1024);
    let spec = frame_spec(256, 256, &[(2, 2), (1, 1), (1, 1)]);
    let options = EncodeOptions {
        progressive,
        features: features.clone(),
        ..Default::default()
    };

    let (mut c, dest) = start_compressor(spec, &options);
    let image = random_image(c.frame().unwrap(), 4);
    write_image(&mut c, &image, &mut || panic!("memory destination never suspends"));
    if progressive {
        assert!(c.metrics().swap_writes() > 0);
    }

    let mut d = decompressor_for(dest.contents(), &features);
    let decoded = decode(&mut d);
    assert!(d.metrics().swap_writes() > 0);
    assert!(d.metrics().bytes_spilled() > 0);
    assert_eq_image(&decoded, &image);
    assert!(d.finish_decompress().unwrap());
}

/// handing out the data one byte at a time makes every operation suspend over
/// and over, the result must be the same as decoding in one go
#[rstest]
fn bytewise_input_matches(
    #[values(false, true)] progressive: bool,
    #[values(0, 1)] restart_interval: u32,
) {
    let spec = frame_spec(33, 17, &[(2, 1), (1, 1), (1, 1)]);
    let options = EncodeOptions {
        progressive,
        restart_interval,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 5);

    let mut whole = decompressor_for(data.clone(), &EnabledFeatures::default());
    let expected = image_hash(&decode(&mut whole));
    assert_eq!(expected, image_hash(&image));

    let mut d = Decompressor::new(&EnabledFeatures::default());
    d.set_source(Box::new(SliceSource::with_chunk_size(data, 1)));
    let decoded = decode(&mut d);
    assert_eq!(image_hash(&decoded), expected);
    assert_eq!(d.num_warnings(), 0);
    while !d.finish_decompress().unwrap() {}
}

/// hands out a single byte per `read`, so new data arrives in the middle of MCUs
struct TrickleReader {
    data: Vec<u8>,
    pos: usize,
}

impl Read for TrickleReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos == self.data.len() || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.data[self.pos];
        self.pos += 1;
        Ok(1)
    }
}

#[rstest]
fn reader_source_trickle(
    #[values(false, true)] progressive: bool,
    #[values(0, 2)] restart_interval: u32,
) {
    let spec = frame_spec(64, 48, &[(2, 2), (1, 1), (1, 1)]);
    let options = EncodeOptions {
        progressive,
        restart_interval,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 16);

    let mut d = Decompressor::new(&EnabledFeatures::default());
    d.set_source(Box::new(ReaderSource::new(TrickleReader { data, pos: 0 })));
    assert_eq_image(&decode(&mut d), &image);
    assert_eq!(d.num_warnings(), 0);
    assert!(d.finish_decompress().unwrap());
}

/// chunks are queued while the decompressor runs, several at a time, and the
/// sender goes away once everything was sent
#[rstest]
fn chunked_source_while_decoding(
    #[values(false, true)] progressive: bool,
    #[values(1, 11, 300)] chunk_size: usize,
) {
    let spec = frame_spec(48, 40, &[(2, 2), (1, 1), (1, 1)]);
    let options = EncodeOptions {
        progressive,
        restart_interval: 3,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 17);

    let (source, sender) = ChunkedSource::new();
    let mut chunks = data.chunks(chunk_size);
    let mut sender = Some(sender);
    let mut feed = |count: usize| {
        for _ in 0..count {
            match chunks.next() {
                Some(chunk) => sender.as_ref().unwrap().push(chunk).unwrap(),
                None => {
                    if let Some(s) = sender.take() {
                        s.finish();
                    }
                }
            }
        }
    };

    let mut d = Decompressor::new(&EnabledFeatures::default());
    d.set_source(Box::new(source));
    feed(3);
    loop {
        match d.read_header(true).unwrap() {
            ReadStatus::HeaderOk => break,
            ReadStatus::Suspended => feed(2),
            ReadStatus::HeaderTablesOnly => panic!("expected an image"),
        }
    }
    while !d.read_coefficients().unwrap() {
        feed(3);
    }

    assert_eq_image(&extract_image(&mut d), &image);
    assert_eq!(d.num_warnings(), 0);
}

fn find_after(data: &[u8], start: usize, pattern: [u8; 2]) -> usize {
    start
        + data[start..]
            .windows(2)
            .position(|w| w == pattern)
            .unwrap()
}

/// RST2 replaced by RST6: the resync discards the marker and carries on as if
/// it had been the right one
#[test]
fn corrupted_restart_marker_resyncs() {
    let spec = frame_spec(32, 8, &[(1, 1)]);
    let options = EncodeOptions {
        restart_interval: 1,
        ..Default::default()
    };
    let (mut data, image) = encode_random(spec, &options, 6);

    let sos = find_after(&data, 0, [0xff, jpeg_code::SOS]);
    let rst2 = find_after(&data, sos, [0xff, jpeg_code::RST0 + 2]);
    data[rst2 + 1] = jpeg_code::RST0 + 6;

    let mut d = decompressor_for(data, &EnabledFeatures::default());
    let decoded = decode(&mut d);
    assert_eq_image(&decoded, &image);
    assert_eq!(d.warnings().get(&WarningKind::MustResync), Some(&1));
    assert_eq!(d.num_warnings(), 1);
}

/// garbage in front of a restart marker is skipped with a single warning
#[test]
fn garbage_before_restart_marker() {
    let spec = frame_spec(32, 8, &[(1, 1)]);
    let options = EncodeOptions {
        restart_interval: 2,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 7);

    let sos = find_after(&data, 0, [0xff, jpeg_code::SOS]);
    let rst0 = find_after(&data, sos, [0xff, jpeg_code::RST0]);
    let mut corrupted = data[..rst0].to_vec();
    corrupted.extend_from_slice(&[0x12, 0x34, 0x56]);
    corrupted.extend_from_slice(&data[rst0..]);

    let mut d = decompressor_for(corrupted, &EnabledFeatures::default());
    assert_eq_image(&decode(&mut d), &image);
    assert_eq!(d.warnings().get(&WarningKind::ExtraneousData), Some(&1));
    assert_eq!(d.num_warnings(), 1);
}

#[rstest]
fn truncated_stream(#[values(false, true)] warnings_as_errors: bool) {
    let spec = frame_spec(64, 128, &[(1, 1)]);
    let (data, _image) = encode_random(spec, &EncodeOptions::default(), 8);

    let features = EnabledFeatures {
        treat_warnings_as_errors: warnings_as_errors,
        ..Default::default()
    };
    let mut d = decompressor_for(data[..data.len() / 2].to_vec(), &features);
    assert_eq!(d.read_header(true).unwrap(), ReadStatus::HeaderOk);

    if warnings_as_errors {
        let e = d.read_coefficients().unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::WarningAsError);
        d.abort();
        return;
    }

    assert!(d.read_coefficients().unwrap());
    assert_eq!(d.warnings().get(&WarningKind::PrematureEnd), Some(&1));

    // everything after the point where the data ran out reads as zero
    let decoded = extract_image(&mut d);
    let last_row = &decoded[0][decoded[0].len() - 8..];
    assert!(last_row.iter().all(|b| b.iter().all(|&c| c == 0)));
    assert!(d.finish_decompress().unwrap());
}

/// tables written once in an abbreviated datastream stay defined for the image
/// datastreams that follow, even from a different source
#[test]
fn abbreviated_datastreams() {
    let spec = frame_spec(16, 16, &[(2, 2), (1, 1), (1, 1)]);
    let dest = VecDestination::new();

    let mut c = Compressor::new(&EnabledFeatures::default());
    c.set_destination(Box::new(dest.clone()));
    c.set_defaults(spec).unwrap();
    assert!(c.write_tables().unwrap());
    let tables = dest.take();
    assert!(tables.windows(2).any(|w| w == [0xff, jpeg_code::DQT]));

    let mut images = Vec::new();
    for seed in 0..2 {
        c.start_compress(false).unwrap();
        let image = random_image(c.frame().unwrap(), seed);
        write_image(&mut c, &image, &mut || panic!("memory destination never suspends"));
        let data = dest.take();
        assert!(!data.windows(2).any(|w| w == [0xff, jpeg_code::DHT]));
        images.push((data, image));
    }

    let mut d = Decompressor::new(&EnabledFeatures::default());
    d.set_source(Box::new(SliceSource::new(tables)));
    assert_eq!(d.read_header(false).unwrap(), ReadStatus::HeaderTablesOnly);
    assert_eq!(d.tables().quant(0), c.tables().quant(0));

    for (data, image) in images {
        d.set_source(Box::new(SliceSource::new(data)));
        assert_eq_image(&decode(&mut d), &image);
        assert!(d.finish_decompress().unwrap());
    }
}

/// a destination that only takes a few bytes at a time produces the same
/// datastream as one that takes everything
#[rstest]
fn suspending_destination(#[values(false, true)] progressive: bool) {
    let spec = frame_spec(48, 32, &[(2, 2), (1, 1), (1, 1)]);
    let options = EncodeOptions {
        progressive,
        features: EnabledFeatures {
            output_buffer_size: 64,
            ..Default::default()
        },
        ..Default::default()
    };
    let (reference, image) = encode_random(spec.clone(), &options, 9);

    let limited = LimitedDestination::new(0);
    let mut c = Compressor::new(&options.features);
    c.set_destination(Box::new(limited.clone()));
    c.set_defaults(spec).unwrap();
    if progressive {
        c.simple_progression().unwrap();
    }
    c.start_compress(true).unwrap();

    let mut suspensions = 0;
    write_image(&mut c, &image, &mut || {
        suspensions += 1;
        limited.grant(64);
    });

    assert!(suspensions > 0);
    assert_eq!(limited.contents(), reference);
}

/// buffered image mode shows every scan in its own output pass, the last one
/// holds the final coefficients
#[test]
fn buffered_image_passes() {
    init_logging();

    let spec = frame_spec(24, 24, &[(2, 2), (1, 1), (1, 1)]);
    let options = EncodeOptions {
        progressive: true,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 10);
    let scans = simple_progression(3).len();

    let mut d = Decompressor::new(&EnabledFeatures::default());
    d.set_source(Box::new(SliceSource::with_chunk_size(data, 7)));
    while d.read_header(true).unwrap() == ReadStatus::Suspended {}
    d.set_buffered_image(true).unwrap();

    let frame = d.frame().unwrap().clone();
    let mut sink = CollectRows {
        image: empty_image(&frame),
        rows_seen: 0,
    };

    let mut passes = 0;
    loop {
        d.start_output(d.input_scan_number()).unwrap();
        assert!(d.output_scan_number() >= 1);

        let mut row = 0;
        while row < frame.total_imcu_rows {
            if d.output_imcu_row(&mut sink).unwrap() {
                row += 1;
                // output never runs ahead of input
                assert!(
                    d.input_complete()
                        || d.input_scan_number() > d.output_scan_number()
                        || d.input_row() >= d.output_row()
                );
            }
        }
        while !d.finish_output().unwrap() {}
        passes += 1;

        if d.input_complete() {
            break;
        }
    }

    assert_eq!(passes, scans);
    assert_eq!(sink.rows_seen, frame.total_imcu_rows * scans as u32);
    assert_eq_image(&sink.image, &image);
    assert!(d.finish_decompress().unwrap());
}

/// single scan images are handed out row by row without keeping the whole image
#[test]
fn streaming_rows() {
    let spec = frame_spec(40, 40, &[(2, 2), (1, 1), (1, 1)]);
    let options = EncodeOptions {
        restart_interval: 2,
        ..Default::default()
    };
    let (data, image) = encode_random(spec, &options, 11);

    let mut d = Decompressor::new(&EnabledFeatures::default());
    d.set_source(Box::new(SliceSource::with_chunk_size(data, 13)));
    while d.read_header(true).unwrap() == ReadStatus::Suspended {}
    assert!(!d.has_multiple_scans());

    let frame = d.frame().unwrap().clone();
    let mut sink = CollectRows {
        image: empty_image(&frame),
        rows_seen: 0,
    };

    while sink.rows_seen < frame.total_imcu_rows {
        d.read_imcu_row(&mut sink).unwrap();
    }
    assert_eq!(
        d.read_imcu_row(&mut sink).unwrap_err().exit_code(),
        ExitCode::BadState
    );
    assert_eq_image(&sink.image, &image);

    while !d.finish_decompress().unwrap() {}
    assert_eq!(d.num_warnings(), 0);
}

/// consume_input reports each step of the datastream
#[test]
fn consume_input_steps() {
    let spec = frame_spec(8, 16, &[(1, 1)]);
    let (data, _image) = encode_random(spec, &EncodeOptions::default(), 12);

    let mut d = decompressor_for(data, &EnabledFeatures::default());
    let mut steps = Vec::new();
    loop {
        let s = d.consume_input().unwrap();
        steps.push(s);
        if s == ConsumeStatus::ReachedEoi {
            break;
        }
    }

    assert_eq!(
        steps,
        vec![
            ConsumeStatus::ReachedSos,
            ConsumeStatus::RowCompleted,
            ConsumeStatus::ScanCompleted,
            ConsumeStatus::ReachedEoi
        ]
    );
    assert!(d.input_complete());
}

#[test]
fn saved_markers_and_jfif() {
    let spec = frame_spec(8, 8, &[(1, 1)]);
    let options = EncodeOptions {
        features: EnabledFeatures {
            write_jfif_header: true,
            ..Default::default()
        },
        ..Default::default()
    };

    let (mut c, dest) = start_compressor(spec, &options);
    let exif = b"Exif\0\0 some exif";
    c.write_marker(jpeg_code::APP0 + 1, exif).unwrap();
    c.write_marker(jpeg_code::COM, b"a comment").unwrap();
    let image = random_image(c.frame().unwrap(), 13);
    write_image(&mut c, &image, &mut || panic!("memory destination never suspends"));

    let mut d = decompressor_for(dest.contents(), &EnabledFeatures::default());
    d.save_markers(jpeg_code::APP0 + 1, 4).unwrap();
    d.save_markers(jpeg_code::COM, 1000).unwrap();
    assert_eq!(
        d.save_markers(jpeg_code::DQT, 10).unwrap_err().exit_code(),
        ExitCode::SyntaxError
    );
    assert_eq_image(&decode(&mut d), &image);

    assert_eq!(d.jfif().unwrap().major_version, 1);
    let saved = d.saved_markers().unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].code, jpeg_code::APP0 + 1);
    assert_eq!(saved[0].data, b"Exif");
    assert_eq!(saved[0].original_length, exif.len());
    assert_eq!(saved[1].data, b"a comment");
}

#[test]
fn output_scale_changes_geometry_only() {
    let spec = frame_spec(100, 60, &[(2, 2), (1, 1), (1, 1)]);
    let (data, image) = encode_random(spec, &EncodeOptions::default(), 14);

    let mut d = decompressor_for(data, &EnabledFeatures::default());
    assert_eq!(d.read_header(true).unwrap(), ReadStatus::HeaderOk);
    d.set_output_scale(4).unwrap();
    assert_eq!(
        d.set_output_scale(0).unwrap_err().exit_code(),
        ExitCode::SyntaxError
    );

    let frame = d.frame().unwrap();
    assert_eq!(frame.output_width, 50);
    assert_eq!(frame.output_height, 30);
    assert_eq!(frame.components[0].dct_h_scaled_size, 4);

    assert!(d.read_coefficients().unwrap());
    assert_eq_image(&extract_image(&mut d), &image);
    assert_eq!(
        d.set_output_scale(8).unwrap_err().exit_code(),
        ExitCode::BadState
    );
}

/// a transform that only keeps the average of the block, shifted to be signed
struct AverageOnly;

impl ForwardTransform for AverageOnly {
    fn transform(
        &mut self,
        _component: &ComponentInfo,
        samples: &[JSample; 64],
        block: &mut Block,
    ) -> jpeg_scan_engine::Result<()> {
        let sum: i32 = samples.iter().map(|&s| i32::from(s)).sum();
        *block = [0; 64];
        block[0] = (sum / 64 - 128) as i16;
        Ok(())
    }
}

#[test]
fn raw_samples_go_through_the_transform() {
    let dest = VecDestination::new();
    let mut c = Compressor::new(&EnabledFeatures::default());
    c.set_destination(Box::new(dest.clone()));
    c.set_defaults(frame_spec(16, 16, &[(1, 1)])).unwrap();
    c.start_compress(true).unwrap();

    assert_eq!(
        c.write_raw_data(&[&[0; 10][..]], &mut AverageOnly)
            .unwrap_err()
            .exit_code(),
        ExitCode::SyntaxError
    );

    // two blocks per row, the left one dark and the right one bright
    for imcu_row in 0..2u8 {
        let mut samples: Vec<JSample> = vec![0; 8 * 16];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = if i % 16 < 8 { 10 * imcu_row } else { 200 };
        }
        let status = c.write_raw_data(&[samples.as_slice()], &mut AverageOnly).unwrap();
        assert_eq!(status, WriteStatus::RowCompleted);
    }

    // one row too many
    assert_eq!(
        c.write_raw_data(&[&[0; 128][..]], &mut AverageOnly)
            .unwrap_err()
            .exit_code(),
        ExitCode::BadState
    );
    assert!(c.finish_compress().unwrap());

    let mut d = decompressor_for(dest.contents(), &EnabledFeatures::default());
    let decoded = decode(&mut d);
    let dc: Vec<i16> = decoded[0].iter().map(|b| b[0]).collect();
    assert_eq!(dc, [-128, 72, -118, 72]);
    assert!(decoded[0].iter().all(|b| b[1..].iter().all(|&c| c == 0)));
}

/// wraps the Huffman decoder and counts the MCUs it hands back
struct CountingDecoder {
    inner: HuffmanDecoder,
    mcus: Arc<AtomicU32>,
}

impl EntropyDecoder for CountingDecoder {
    fn start_pass(
        &mut self,
        frame: &FrameHeader,
        layout: &ScanLayout,
        tables: &TableManager,
    ) -> jpeg_scan_engine::Result<()> {
        self.inner.start_pass(frame, layout, tables)
    }

    fn decode_mcu(
        &mut self,
        input: &[u8],
        marker_pending: bool,
        at_end: bool,
        blocks: &mut [Block],
    ) -> jpeg_scan_engine::Result<McuOutcome> {
        let outcome = self.inner.decode_mcu(input, marker_pending, at_end, blocks)?;
        if matches!(outcome, McuOutcome::Decoded { .. }) {
            self.mcus.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    fn restart(&mut self) -> usize {
        self.inner.restart()
    }
}

#[test]
fn replaceable_entropy_decoder() {
    let spec = frame_spec(32, 32, &[(2, 2), (1, 1), (1, 1)]);
    let (data, image) = encode_random(spec, &EncodeOptions::default(), 15);

    let mcus = Arc::new(AtomicU32::new(0));
    let mut d = Decompressor::new(&EnabledFeatures::default());
    d.set_source(Box::new(SliceSource::with_chunk_size(data, 5)));
    d.set_entropy_decoder(Box::new(CountingDecoder {
        inner: HuffmanDecoder::new(),
        mcus: mcus.clone(),
    }));

    assert_eq_image(&decode(&mut d), &image);
    // 2x2 MCUs of 16x16 samples
    assert_eq!(mcus.load(Ordering::Relaxed), 4);
}

#[test]
fn error_codes() {
    assert_eq!(ExitCode::ShortRead.as_integer_error_code(), 3);
    assert_eq!(ExitCode::BadState.class(), ErrorClass::Usage);
    assert!(jpeg_code::is_rst(jpeg_code::RST0 + 5));
    assert!(!jpeg_code::is_rst(jpeg_code::EOI));

    let mut d = Decompressor::new(&EnabledFeatures::default());
    let e = d.read_header(true).unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::BadState);
    assert_eq!(e.exit_code().class(), ErrorClass::Usage);
}

#[test]
fn version_string() {
    assert!(get_version_string().starts_with(env!("CARGO_PKG_VERSION")));
}
