/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::{debug, info};

use crate::consts::{DCTSIZE, DCTSIZE2, MAX_COMPS_IN_SCAN, NUM_ARITH_TBLS, ZIGZAG_TO_RASTER};
use crate::enabled_features::EnabledFeatures;
use crate::engine_error::{err_exit_code, ExitCode, Result, WarningKind};
use crate::helpers::{b_short, lbits, rbits};
use crate::io::source::InputAdapter;
use crate::jpeg::component_info::ComponentInfo;
use crate::jpeg::frame::FrameHeader;
use crate::jpeg::jpeg_code;
use crate::jpeg::scan::ScanInfo;
use crate::jpeg::tables::{HuffTable, QuantTable, TableKind, TableManager};
use crate::memory::pool::{PoolAllocator, PoolHandle, PoolId};

/// An APPn or COM segment kept for the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMarker {
    /// marker code, APP0..APP15 or COM
    pub code: u8,
    /// length of the segment data as it appeared in the datastream
    pub original_length: usize,
    /// the data, possibly truncated to the save limit
    pub data: Vec<u8>,
}

/// A saved segment whose data lives in the image pool
struct SavedSegment {
    code: u8,
    original_length: usize,
    data: PoolHandle<u8>,
}

/// Content of a JFIF APP0 segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JfifHeader {
    /// major version, 1 for every known writer
    pub major_version: u8,
    /// minor version
    pub minor_version: u8,
    /// 0 for an aspect ratio, 1 for dots per inch, 2 for dots per cm
    pub density_unit: u8,
    /// horizontal density
    pub x_density: u16,
    /// vertical density
    pub y_density: u16,
}

/// Where the marker reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStatus {
    /// more data is needed, call again once it is available
    Suspended,
    /// a scan header was read, entropy coded data follows
    ReachedSos(ScanInfo),
    /// the end of the datastream
    ReachedEoi,
}

/// State the marker reader updates while parsing
pub struct MarkerContext<'a> {
    pub tables: &'a mut TableManager,
    pub frame: &'a mut Option<FrameHeader>,
    pub features: &'a EnabledFeatures,
    pub warnings: &'a mut Vec<WarningKind>,
    pub pools: &'a mut PoolAllocator,
}

const NUM_SAVE_SLOTS: usize = 17;
const COM_SLOT: usize = 16;

fn save_slot(code: u8) -> Option<usize> {
    match code {
        jpeg_code::APP0..=jpeg_code::APP15 => Some(usize::from(code - jpeg_code::APP0)),
        jpeg_code::COM => Some(COM_SLOT),
        _ => None,
    }
}

fn ensure_space(segment: &[u8], hpos: usize, amount: usize) -> Result<()> {
    if hpos + amount > segment.len() {
        return err_exit_code(ExitCode::BadMarker, "marker segment is too short");
    }
    Ok(())
}

/// Suspendable parser for everything outside of entropy coded data. A segment is
/// only parsed once it is completely buffered, so suspending never leaves a
/// segment half applied.
pub struct MarkerReader {
    saw_soi: bool,
    saw_sof: bool,
    save_limits: [usize; NUM_SAVE_SLOTS],
    saved: Vec<SavedSegment>,
    restart_interval: u32,
    jfif: Option<JfifHeader>,
}

impl Default for MarkerReader {
    fn default() -> Self {
        MarkerReader {
            saw_soi: false,
            saw_sof: false,
            save_limits: [0; NUM_SAVE_SLOTS],
            saved: Vec::new(),
            restart_interval: 0,
            jfif: None,
        }
    }
}

impl MarkerReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares for a new datastream. The save policy is kept.
    pub fn reset(&mut self) {
        self.saw_soi = false;
        self.saw_sof = false;
        self.saved.clear();
        self.restart_interval = 0;
        self.jfif = None;
    }

    /// Keeps up to `length_limit` bytes of every APPn or COM segment with the given
    /// code. A limit of zero stops saving.
    pub fn save_markers(&mut self, code: u8, length_limit: usize) -> Result<()> {
        match save_slot(code) {
            Some(slot) => {
                self.save_limits[slot] = length_limit.min(65533);
                Ok(())
            }
            None => err_exit_code(
                ExitCode::SyntaxError,
                format!("marker {0:#04x} can't be saved", code),
            ),
        }
    }

    /// Copies the saved segments out of the image pool
    pub fn saved_markers(&self, pools: &PoolAllocator) -> Result<Vec<SavedMarker>> {
        self.saved
            .iter()
            .map(|s| {
                Ok(SavedMarker {
                    code: s.code,
                    original_length: s.original_length,
                    data: pools.get(&s.data)?.to_vec(),
                })
            })
            .collect()
    }

    pub fn restart_interval(&self) -> u32 {
        self.restart_interval
    }

    pub fn saw_sof(&self) -> bool {
        self.saw_sof
    }

    pub fn jfif(&self) -> Option<&JfifHeader> {
        self.jfif.as_ref()
    }

    /// Reads markers until SOS or EOI, or until the input runs dry.
    pub fn read_markers(
        &mut self,
        input: &mut InputAdapter,
        ctx: &mut MarkerContext,
    ) -> Result<MarkerStatus> {
        loop {
            if !input.skip_pending()? {
                return Ok(MarkerStatus::Suspended);
            }

            if !self.saw_soi {
                if !input.ensure(2)? {
                    if input.at_end() {
                        return err_exit_code(ExitCode::ShortRead, "datastream is empty");
                    }
                    return Ok(MarkerStatus::Suspended);
                }

                let data = input.data();
                if data[0] != 0xff || data[1] != jpeg_code::SOI {
                    return err_exit_code(
                        ExitCode::BadMarker,
                        format!("datastream starts with {0:#04x} {1:#04x}, not SOI", data[0], data[1]),
                    );
                }
                input.consume(2);
                self.process_soi();
                continue;
            }

            let Some(marker) = input.next_marker()? else {
                return Ok(MarkerStatus::Suspended);
            };

            if input.take_discarded() > 0 {
                ctx.warnings.push(WarningKind::ExtraneousData);
            }
            ctx.warnings.append(&mut input.take_warnings());

            match marker {
                jpeg_code::SOI => {
                    return err_exit_code(ExitCode::BadMarker, "duplicate SOI marker");
                }

                jpeg_code::EOI => {
                    input.unread_marker = None;
                    debug!("reached EOI");
                    return Ok(MarkerStatus::ReachedEoi);
                }

                // parameterless markers
                jpeg_code::RST0..=jpeg_code::RST7 | jpeg_code::TEM => {
                    debug!("ignoring parameterless marker {0:#04x}", marker);
                    input.unread_marker = None;
                }

                jpeg_code::APP0..=jpeg_code::APP15 | jpeg_code::COM => {
                    if !self.read_variable(input, marker, ctx)? {
                        return Ok(MarkerStatus::Suspended);
                    }
                }

                jpeg_code::SOF0
                | jpeg_code::SOF1
                | jpeg_code::SOF2
                | jpeg_code::SOF9
                | jpeg_code::SOF10
                | jpeg_code::DHT
                | jpeg_code::DQT
                | jpeg_code::DAC
                | jpeg_code::DRI
                | jpeg_code::SOS => {
                    let Some(segment) = Self::buffered_segment(input)? else {
                        return Ok(MarkerStatus::Suspended);
                    };
                    let len = segment.len();

                    let scan = self.parse_segment(marker, &segment, ctx)?;

                    input.consume(len + 2);
                    input.unread_marker = None;

                    if let Some(scan) = scan {
                        return Ok(MarkerStatus::ReachedSos(scan));
                    }
                }

                jpeg_code::SOF3
                | jpeg_code::SOF5
                | jpeg_code::SOF6
                | jpeg_code::SOF7
                | jpeg_code::JPG
                | jpeg_code::SOF11
                | jpeg_code::SOF13
                | jpeg_code::SOF14
                | jpeg_code::SOF15 => {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        format!("coding process of SOF marker {0:#04x} is not supported", marker),
                    );
                }

                _ => {
                    return err_exit_code(
                        ExitCode::BadMarker,
                        format!("unexpected marker {0:#04x}", marker),
                    );
                }
            }
        }
    }

    fn process_soi(&mut self) {
        debug!("SOI");
        self.saw_soi = true;
        self.restart_interval = 0;
    }

    /// length of the segment at the current position, excluding the length bytes
    fn segment_length(input: &mut InputAdapter) -> Result<Option<usize>> {
        if !input.ensure(2)? {
            return Self::short_or_suspend(input);
        }
        let data = input.data();
        let length = usize::from(b_short(data[0], data[1]));
        if length < 2 {
            return err_exit_code(ExitCode::BadMarker, "marker segment length below 2");
        }
        Ok(Some(length - 2))
    }

    fn short_or_suspend<T>(input: &InputAdapter) -> Result<Option<T>> {
        if input.at_end() {
            return err_exit_code(ExitCode::ShortRead, "datastream ends inside a marker segment");
        }
        Ok(None)
    }

    /// copy of the segment content once it is completely buffered
    fn buffered_segment(input: &mut InputAdapter) -> Result<Option<Vec<u8>>> {
        let Some(length) = Self::segment_length(input)? else {
            return Ok(None);
        };
        if !input.ensure(length + 2)? {
            return Self::short_or_suspend(input);
        }
        Ok(Some(input.data()[2..2 + length].to_vec()))
    }

    /// APPn and COM: examined, saved up to the limit, and the rest skipped
    fn read_variable(
        &mut self,
        input: &mut InputAdapter,
        marker: u8,
        ctx: &mut MarkerContext,
    ) -> Result<bool> {
        let Some(length) = Self::segment_length(input)? else {
            return Ok(false);
        };

        let limit = save_slot(marker).map_or(0, |s| self.save_limits[s]);
        let examine = if marker == jpeg_code::APP0 { 14 } else { 0 };
        let keep = length.min(limit.max(examine));

        if !input.ensure(keep + 2)? {
            return Ok(Self::short_or_suspend::<()>(input)?.is_some());
        }

        let data = &input.data()[2..2 + keep];

        if marker == jpeg_code::APP0 {
            self.examine_app0(data, ctx);
        }

        if limit > 0 {
            let kept = &data[..length.min(limit)];
            let handle = ctx.pools.alloc_small(PoolId::Image, kept.len())?;
            ctx.pools.get_mut(&handle)?.copy_from_slice(kept);
            self.saved.push(SavedSegment {
                code: marker,
                original_length: length,
                data: handle,
            });
        }

        input.skip(length + 2);
        input.unread_marker = None;
        Ok(true)
    }

    fn examine_app0(&mut self, data: &[u8], ctx: &mut MarkerContext) {
        if data.len() >= 14 && &data[0..5] == b"JFIF\0" {
            let header = JfifHeader {
                major_version: data[5],
                minor_version: data[6],
                density_unit: data[7],
                x_density: b_short(data[8], data[9]),
                y_density: b_short(data[10], data[11]),
            };
            if header.major_version != 1 {
                ctx.warnings.push(WarningKind::JfifMajorVersion);
            }
            debug!(
                "JFIF {0}.{1:02} density {2}x{3} unit {4}",
                header.major_version,
                header.minor_version,
                header.x_density,
                header.y_density,
                header.density_unit
            );
            self.jfif = Some(header);
        }
    }

    /// Applies a completely buffered segment. Returns the scan for SOS.
    fn parse_segment(
        &mut self,
        marker: u8,
        segment: &[u8],
        ctx: &mut MarkerContext,
    ) -> Result<Option<ScanInfo>> {
        let len = segment.len();
        let mut hpos = 0;

        match marker {
            jpeg_code::DHT => {
                while hpos < len {
                    let lval = lbits(segment[hpos], 4);
                    let rval = usize::from(rbits(segment[hpos], 4));
                    let kind = match lval {
                        0 => TableKind::DcHuff,
                        1 => TableKind::AcHuff,
                        _ => return err_exit_code(ExitCode::BadMarker, "DHT has invalid table class"),
                    };
                    hpos += 1;

                    ensure_space(segment, hpos, 16)?;
                    let mut bits = [0u8; 17];
                    bits[1..].copy_from_slice(&segment[hpos..hpos + 16]);
                    hpos += 16;

                    let count: usize = bits.iter().map(|&b| usize::from(b)).sum();
                    if count > 256 {
                        return err_exit_code(ExitCode::BadMarker, "DHT declares more than 256 symbols");
                    }
                    ensure_space(segment, hpos, count)?;

                    let table = HuffTable::new(bits, &segment[hpos..hpos + count]);
                    hpos += count;

                    if ctx.tables.define_huff(kind, rval, table).is_err() {
                        return err_exit_code(ExitCode::BadMarker, "DHT has invalid index");
                    }
                }
            }

            jpeg_code::DQT => {
                while hpos < len {
                    let lval = lbits(segment[hpos], 4);
                    let rval = usize::from(rbits(segment[hpos], 4));
                    if lval >= 2 {
                        return err_exit_code(ExitCode::BadMarker, "DQT has invalid precision");
                    }
                    hpos += 1;

                    let mut values = [0u16; DCTSIZE2];
                    let width = if lval == 0 { 1 } else { 2 };
                    ensure_space(segment, hpos, DCTSIZE2 * width)?;

                    for i in 0..DCTSIZE2 {
                        let v = if lval == 0 {
                            u16::from(segment[hpos + i])
                        } else {
                            b_short(segment[hpos + 2 * i], segment[hpos + 2 * i + 1])
                        };
                        // stored in zigzag order
                        values[usize::from(ZIGZAG_TO_RASTER[i])] = v;
                    }
                    hpos += DCTSIZE2 * width;

                    if values.contains(&0) {
                        if ctx.features.reject_dqts_with_zeros {
                            return err_exit_code(ExitCode::UnsupportedJpeg, "DQT has zero value");
                        }
                        ctx.warnings.push(WarningKind::ZeroQuantEntry);
                    }

                    if ctx.tables.define_quant(rval, QuantTable { values }).is_err() {
                        return err_exit_code(ExitCode::BadMarker, "DQT has invalid index");
                    }
                }
            }

            jpeg_code::DAC => {
                while hpos < len {
                    ensure_space(segment, hpos, 2)?;
                    let index = usize::from(segment[hpos]);
                    let val = segment[hpos + 1];
                    hpos += 2;

                    if index >= 2 * NUM_ARITH_TBLS {
                        return err_exit_code(ExitCode::BadMarker, "DAC has invalid index");
                    }
                    if index >= NUM_ARITH_TBLS {
                        ctx.tables
                            .define_arith(TableKind::ArithAc, index - NUM_ARITH_TBLS, val)?;
                    } else {
                        // L must not exceed U
                        if rbits(val, 4) > lbits(val, 4) {
                            return err_exit_code(ExitCode::BadMarker, "DAC has L > U");
                        }
                        ctx.tables.define_arith(TableKind::ArithDc, index, val)?;
                    }
                }
            }

            jpeg_code::DRI => {
                if len != 2 {
                    return err_exit_code(ExitCode::BadMarker, "DRI has invalid length");
                }
                self.restart_interval = u32::from(b_short(segment[0], segment[1]));
                hpos = 2;
                debug!("restart interval {0}", self.restart_interval);
            }

            jpeg_code::SOF0 | jpeg_code::SOF1 | jpeg_code::SOF2 | jpeg_code::SOF9 | jpeg_code::SOF10 => {
                if self.saw_sof {
                    return err_exit_code(ExitCode::BadMarker, "duplicate SOF marker");
                }
                let progressive = marker == jpeg_code::SOF2 || marker == jpeg_code::SOF10;
                let arith = marker == jpeg_code::SOF9 || marker == jpeg_code::SOF10;

                ensure_space(segment, 0, 6)?;
                let data_precision = segment[0];
                let image_height = u32::from(b_short(segment[1], segment[2]));
                let image_width = u32::from(b_short(segment[3], segment[4]));
                let ncomps = usize::from(segment[5]);
                hpos = 6;

                if len != 6 + ncomps * 3 {
                    return err_exit_code(ExitCode::BadMarker, "SOF has invalid length");
                }

                let mut components = Vec::with_capacity(ncomps);
                for i in 0..ncomps {
                    components.push(ComponentInfo {
                        component_id: segment[hpos],
                        component_index: i,
                        h_samp_factor: lbits(segment[hpos + 1], 4),
                        v_samp_factor: rbits(segment[hpos + 1], 4),
                        quant_tbl_no: segment[hpos + 2],
                        component_needed: true,
                        ..Default::default()
                    });
                    hpos += 3;
                }

                let mut frame = FrameHeader {
                    image_width,
                    image_height,
                    data_precision,
                    progressive_mode: progressive,
                    arith_code: arith,
                    components,
                    ..Default::default()
                };
                frame.validate(ctx.features)?;
                frame.compute_geometry(DCTSIZE)?;

                info!(
                    "SOF{0:x} {1}x{2} precision={3} components={4}",
                    marker & 0x0f,
                    image_width,
                    image_height,
                    data_precision,
                    ncomps
                );

                *ctx.frame = Some(frame);
                self.saw_sof = true;
            }

            jpeg_code::SOS => {
                let Some(frame) = ctx.frame.as_mut() else {
                    return err_exit_code(ExitCode::BadMarker, "SOS before SOF");
                };

                ensure_space(segment, 0, 1)?;
                let n = usize::from(segment[0]);
                if n == 0 || n > MAX_COMPS_IN_SCAN || len != 4 + 2 * n {
                    return err_exit_code(ExitCode::BadMarker, "SOS has invalid length");
                }
                hpos = 1;

                let mut component_index = [0u8; MAX_COMPS_IN_SCAN];
                for i in 0..n {
                    let Some(ci) = frame.find_component_by_id(segment[hpos]) else {
                        return err_exit_code(
                            ExitCode::BadMarker,
                            "component id mismatch in start-of-scan",
                        );
                    };
                    if component_index[..i].contains(&(ci as u8)) {
                        return err_exit_code(ExitCode::BadMarker, "component repeated in scan");
                    }

                    let c = &mut frame.components[ci];
                    c.dc_tbl_no = lbits(segment[hpos + 1], 4);
                    c.ac_tbl_no = rbits(segment[hpos + 1], 4);
                    if c.dc_tbl_no >= 4 || c.ac_tbl_no >= 4 {
                        return err_exit_code(ExitCode::BadMarker, "huffman table number mismatch");
                    }

                    component_index[i] = ci as u8;
                    hpos += 2;
                }

                let scan = ScanInfo {
                    comps_in_scan: n as u8,
                    component_index,
                    ss: segment[hpos],
                    se: segment[hpos + 1],
                    ah: lbits(segment[hpos + 2], 4),
                    al: rbits(segment[hpos + 2], 4),
                };
                debug!(
                    "SOS components={0} Ss={1} Se={2} Ah={3} Al={4}",
                    n, scan.ss, scan.se, scan.ah, scan.al
                );
                return Ok(Some(scan));
            }

            _ => {}
        }

        if hpos != len {
            return err_exit_code(
                ExitCode::BadMarker,
                format!("size mismatch in marker {0:#04x}", marker),
            );
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::source::SliceSource;

    fn read_all(data: &[u8], chunk: usize) -> (Vec<MarkerStatus>, TableManager, Option<FrameHeader>, Vec<WarningKind>) {
        let mut input = InputAdapter::default();
        input.set_source(Box::new(SliceSource::with_chunk_size(data, chunk)));

        let mut tables = TableManager::default();
        let mut frame = None;
        let features = EnabledFeatures::default();
        let mut warnings = Vec::new();
        let mut pools = PoolAllocator::new(1 << 20);
        let mut reader = MarkerReader::new();
        reader.save_markers(jpeg_code::COM, 3).unwrap();

        let mut statuses = Vec::new();
        for _ in 0..1000 {
            let mut ctx = MarkerContext {
                tables: &mut tables,
                frame: &mut frame,
                features: &features,
                warnings: &mut warnings,
                pools: &mut pools,
            };
            let s = reader.read_markers(&mut input, &mut ctx).unwrap();
            if s != MarkerStatus::Suspended {
                statuses.push(s);
            }
            if s == MarkerStatus::ReachedEoi {
                break;
            }
        }
        let saved = reader.saved_markers(&pools).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].data, b"hel");
        assert_eq!(saved[0].original_length, 5);
        // the kept bytes are charged to the image pool
        assert_eq!(pools.bytes_in_use(PoolId::Image), 3);
        (statuses, tables, frame, warnings)
    }

    fn stream() -> Vec<u8> {
        let mut v = vec![0xff, 0xd8];
        // COM "hello"
        v.extend_from_slice(&[0xff, 0xfe, 0, 7]);
        v.extend_from_slice(b"hello");
        // DQT 0, all 2s
        v.extend_from_slice(&[0xff, 0xdb, 0, 67, 0]);
        v.extend_from_slice(&[2; 64]);
        // SOF0 16x8 one component
        v.extend_from_slice(&[0xff, 0xc0, 0, 11, 8, 0, 8, 0, 16, 1, 1, 0x11, 0]);
        // garbage
        v.extend_from_slice(&[0x55]);
        // SOS
        v.extend_from_slice(&[0xff, 0xda, 0, 8, 1, 1, 0x00, 0, 63, 0]);
        v.extend_from_slice(&[0xff, 0xd9]);
        v
    }

    #[test]
    fn parses_headers_in_one_go_and_bytewise() {
        for chunk in [usize::MAX, 1] {
            let (statuses, tables, frame, warnings) = read_all(&stream(), chunk);
            assert_eq!(statuses.len(), 2);
            assert!(matches!(statuses[0], MarkerStatus::ReachedSos(s) if s.se == 63));
            assert_eq!(statuses[1], MarkerStatus::ReachedEoi);
            assert_eq!(tables.quant(0).unwrap().values[5], 2);
            let frame = frame.unwrap();
            assert_eq!(frame.image_width, 16);
            assert_eq!(frame.components[0].width_in_blocks, 2);
            assert_eq!(warnings, vec![WarningKind::ExtraneousData]);
        }
    }

    #[test]
    fn restart_interval_segment() {
        let mut data = vec![0xff, 0xd8, 0xff, 0xdd, 0, 4, 0x01, 0x02];
        data.extend_from_slice(&[0xff, 0xdd, 0, 5, 0, 0, 0]);

        let mut input = InputAdapter::default();
        input.set_source(Box::new(SliceSource::new(data)));
        let mut tables = TableManager::default();
        let mut frame = None;
        let features = EnabledFeatures::default();
        let mut warnings = Vec::new();
        let mut pools = PoolAllocator::new(1 << 20);
        let mut ctx = MarkerContext {
            tables: &mut tables,
            frame: &mut frame,
            features: &features,
            warnings: &mut warnings,
            pools: &mut pools,
        };

        // the second DRI is one byte too long
        let mut reader = MarkerReader::new();
        assert_eq!(
            reader.read_markers(&mut input, &mut ctx).unwrap_err().exit_code(),
            ExitCode::BadMarker
        );
        assert_eq!(reader.restart_interval(), 0x0102);
    }

    #[test]
    fn rejects_missing_soi_and_lossless() {
        let mut input = InputAdapter::default();
        input.set_source(Box::new(SliceSource::new(vec![0xff, 0xd9])));
        let mut tables = TableManager::default();
        let mut frame = None;
        let features = EnabledFeatures::default();
        let mut warnings = Vec::new();
        let mut pools = PoolAllocator::new(1 << 20);
        let mut ctx = MarkerContext {
            tables: &mut tables,
            frame: &mut frame,
            features: &features,
            warnings: &mut warnings,
            pools: &mut pools,
        };
        let mut reader = MarkerReader::new();
        assert_eq!(
            reader.read_markers(&mut input, &mut ctx).unwrap_err().exit_code(),
            ExitCode::BadMarker
        );

        let mut input = InputAdapter::default();
        input.set_source(Box::new(SliceSource::new(vec![0xff, 0xd8, 0xff, 0xc3, 0, 2])));
        let mut reader = MarkerReader::new();
        assert_eq!(
            reader.read_markers(&mut input, &mut ctx).unwrap_err().exit_code(),
            ExitCode::UnsupportedJpeg
        );
    }
}
