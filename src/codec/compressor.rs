/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::{debug, info};

use crate::codec::coef_controller::{CoefArrays, ScanCursor};
use crate::codec::common::{CodecCommon, GlobalState, JpegCodec};
use crate::consts::{DCTSIZE2, NUM_HUFF_TBLS, NUM_QUANT_TBLS};
use crate::enabled_features::EnabledFeatures;
use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::helpers::catch_unwind_result;
use crate::io::destination::{DataDestination, OutputAdapter};
use crate::jpeg::component_info::ComponentInfo;
use crate::jpeg::entropy_encoder::{EntropyEncoder, HuffmanEncoder};
use crate::jpeg::frame::{FrameHeader, FrameSpec};
use crate::jpeg::jpeg_code;
use crate::jpeg::marker_writer::{
    write_dht, write_dqt, write_dri, write_eoi, write_jfif_app0, write_marker_segment,
    write_sof, write_soi, write_sos,
};
use crate::jpeg::scan::{ScanInfo, ScanLayout};
use crate::jpeg::scan_script::{self, sequential_script, validate_scan_script};
use crate::jpeg::tables::{TableKind, TableManager};
use crate::jpeg::{Block, JSample};
use crate::metrics::CpuTimeMeasure;

/// Result of writing one iMCU row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// the row was accepted
    RowCompleted,
    /// the destination is full, nothing was accepted
    Suspended,
}

/// Turns an 8x8 block of samples into quantized coefficients, the forward DCT
/// stage in front of the compressor
pub trait ForwardTransform {
    /// `samples` are row-major, `block` receives coefficients in natural order
    fn transform(
        &mut self,
        component: &ComponentInfo,
        samples: &[JSample; DCTSIZE2],
        block: &mut Block,
    ) -> Result<()>;
}

struct EncodeScan {
    layout: ScanLayout,
    cursor: ScanCursor,
    cpu_time: CpuTimeMeasure,
}

/// Writes coefficient blocks as a JPEG datastream. Every operation that reports
/// suspension may be called again once the destination has room.
pub struct Compressor {
    common: CodecCommon,
    output: OutputAdapter,
    tables: TableManager,
    encoder: Box<dyn EntropyEncoder>,

    spec: Option<FrameSpec>,
    scan_script: Option<Vec<ScanInfo>>,
    restart_interval: u32,
    restart_in_rows: u32,

    frame: Option<FrameHeader>,
    arrays: Option<CoefArrays>,
    scans: Vec<ScanInfo>,
    next_scan: usize,
    active: Option<EncodeScan>,
    scratch: Vec<Block>,

    next_input_row: u32,
    last_restart_interval: u32,
    eoi_written: bool,
    tables_only_pending: bool,
}

impl JpegCodec for Compressor {
    fn common(&self) -> &CodecCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CodecCommon {
        &mut self.common
    }

    fn abort(&mut self) {
        self.common.release_stream();
        self.output.discard_pending();
        self.reset_stream_state();
    }
}

impl Compressor {
    /// Creates a compressor. A destination and a frame have to be set before
    /// `start_compress`.
    pub fn new(features: &EnabledFeatures) -> Self {
        Compressor {
            common: CodecCommon::new(features),
            output: OutputAdapter::new(features.output_buffer_size),
            tables: TableManager::default(),
            encoder: Box::new(HuffmanEncoder::new()),
            spec: None,
            scan_script: None,
            restart_interval: 0,
            restart_in_rows: 0,
            frame: None,
            arrays: None,
            scans: Vec::new(),
            next_scan: 0,
            active: None,
            scratch: Vec::new(),
            next_input_row: 0,
            last_restart_interval: 0,
            eoi_written: false,
            tables_only_pending: false,
        }
    }

    /// Sets where the compressed bytes go
    pub fn set_destination(&mut self, dest: Box<dyn DataDestination>) {
        self.output.set_destination(dest);
    }

    /// Replaces the Huffman entropy encoder
    pub fn set_entropy_encoder(&mut self, encoder: Box<dyn EntropyEncoder>) {
        self.encoder = encoder;
    }

    fn require_idle(&self, operation: &str) -> Result<()> {
        if self.tables_only_pending {
            return err_exit_code(
                ExitCode::BadState,
                format!("{0} called while write_tables is suspended", operation),
            );
        }
        self.common.require_state(&[GlobalState::Initial], operation)
    }

    /// Sets the frame parameters of the next datastream
    pub fn set_frame(&mut self, spec: FrameSpec) -> Result<()> {
        self.require_idle("set_frame")?;
        self.spec = Some(spec);
        Ok(())
    }

    /// Sets the frame and installs the standard tables at quality 75, a
    /// sequential script and no restart markers.
    pub fn set_defaults(&mut self, spec: FrameSpec) -> Result<()> {
        self.set_frame(spec)?;
        self.tables.set_quality(75, true)?;
        self.tables.set_std_huff_tables()?;
        self.scan_script = None;
        self.restart_interval = 0;
        self.restart_in_rows = 0;
        Ok(())
    }

    /// Replaces the quantization tables with the standard ones scaled to `quality`
    pub fn set_quality(&mut self, quality: u32, force_baseline: bool) -> Result<()> {
        self.require_idle("set_quality")?;
        self.tables.set_quality(quality, force_baseline)
    }

    /// geometry of the datastream being written, set by `start_compress`
    pub fn frame(&self) -> Option<&FrameHeader> {
        self.frame.as_ref()
    }

    /// tables defined so far and their sent flags
    pub fn tables(&self) -> &TableManager {
        &self.tables
    }

    /// direct access for defining tables, redefining a table marks it unsent
    pub fn tables_mut(&mut self) -> &mut TableManager {
        &mut self.tables
    }

    /// `None` writes one sequential scan per image
    pub fn set_scan_script(&mut self, script: Option<Vec<ScanInfo>>) -> Result<()> {
        self.require_idle("set_scan_script")?;
        self.scan_script = script;
        Ok(())
    }

    /// Selects the standard progressive script for the frame's component count
    pub fn simple_progression(&mut self) -> Result<()> {
        self.require_idle("simple_progression")?;
        let Some(spec) = self.spec.as_ref() else {
            return err_exit_code(
                ExitCode::BadState,
                "simple_progression needs the frame to be set first",
            );
        };
        self.scan_script = Some(scan_script::simple_progression(spec.components.len()));
        Ok(())
    }

    /// MCUs per restart interval, 0 disables restart markers
    pub fn set_restart_interval(&mut self, mcus: u32) -> Result<()> {
        self.require_idle("set_restart_interval")?;
        if mcus > 65535 {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!("restart interval {0} does not fit in DRI", mcus),
            );
        }
        self.restart_interval = mcus;
        Ok(())
    }

    /// Restart interval in MCU rows, overrides `set_restart_interval` if nonzero
    pub fn set_restart_in_rows(&mut self, rows: u32) -> Result<()> {
        self.require_idle("set_restart_in_rows")?;
        self.restart_in_rows = rows;
        Ok(())
    }

    /// Marks every defined table as sent (`true`) or unsent (`false`)
    pub fn suppress_tables(&mut self, suppress: bool) {
        self.tables.suppress_tables(suppress);
    }

    /// Writes a datastream holding only the tables that haven't been sent yet,
    /// and marks them sent. False means suspend.
    pub fn write_tables(&mut self) -> Result<bool> {
        if !self.tables_only_pending {
            self.common
                .require_state(&[GlobalState::Initial], "write_tables")?;
            if !self.output.has_destination() {
                return err_exit_code(ExitCode::BadState, "no data destination was set");
            }
            self.common.begin_stream();

            let out = self.output.pending_mut();
            write_soi(out);

            for selector in 0..NUM_QUANT_TBLS {
                if let (Some(q), false) = (
                    self.tables.quant(selector),
                    self.tables.is_sent(TableKind::Quant, selector),
                ) {
                    write_dqt(out, selector, q)?;
                    self.tables.mark_sent(TableKind::Quant, selector)?;
                }
            }

            for kind in [TableKind::DcHuff, TableKind::AcHuff] {
                for selector in 0..NUM_HUFF_TBLS {
                    if let (Some(h), false) = (
                        self.tables.huff(kind, selector),
                        self.tables.is_sent(kind, selector),
                    ) {
                        write_dht(out, kind, selector, h)?;
                        self.tables.mark_sent(kind, selector)?;
                    }
                }
            }

            write_eoi(out);
            self.tables_only_pending = true;
            debug!("tables-only datastream of {0} bytes", out.len());
        }

        if !self.output.finish()? {
            return Ok(false);
        }

        self.tables_only_pending = false;
        Ok(true)
    }

    /// Starts a datastream: checks the parameters, sets up the coefficient arrays
    /// and writes everything up to the frame header. `write_all_tables` forces
    /// every table out even if it was sent before.
    pub fn start_compress(&mut self, write_all_tables: bool) -> Result<()> {
        self.require_idle("start_compress")?;
        if !self.output.has_destination() {
            return err_exit_code(ExitCode::BadState, "no data destination was set");
        }
        if self.spec.is_none() {
            return err_exit_code(ExitCode::BadState, "start_compress without a frame");
        }

        self.common.begin_stream();
        self.reset_stream_state();
        let Some(spec) = self.spec.as_ref() else {
            return err_exit_code(ExitCode::BadState, "start_compress without a frame");
        };

        let n = spec.components.len();
        let scans = match self.scan_script.as_ref() {
            Some(script) => script.clone(),
            None => sequential_script(n),
        };
        let progressive = validate_scan_script(&scans, n)?;
        let mut frame = FrameHeader::from_spec(spec, progressive, &self.common.features)?;

        for c in frame.components.iter_mut() {
            match self.tables.quant(usize::from(c.quant_tbl_no)) {
                Some(q) => c.quant_table = Some(*q),
                None => {
                    return err_exit_code(
                        ExitCode::MissingTable,
                        format!("quantization table {0} is not defined", c.quant_tbl_no),
                    )
                }
            }
        }

        if write_all_tables {
            self.tables.suppress_tables(false);
        }

        let arrays = CoefArrays::request(&mut self.common.mem, &frame, scans.len() > 1)?;
        self.common.mem.realize_virt_arrays()?;

        let out = self.output.pending_mut();
        write_soi(out);
        if self.common.features.write_jfif_header {
            write_jfif_app0(out)?;
        }

        for c in frame.components.iter() {
            let selector = usize::from(c.quant_tbl_no);
            if !self.tables.is_sent(TableKind::Quant, selector) {
                if let Some(q) = self.tables.quant(selector) {
                    write_dqt(out, selector, q)?;
                }
                self.tables.mark_sent(TableKind::Quant, selector)?;
            }
        }

        let sof = if progressive {
            jpeg_code::SOF2
        } else if is_baseline(&frame) {
            jpeg_code::SOF0
        } else {
            jpeg_code::SOF1
        };
        write_sof(out, sof, &frame)?;

        // suspension here only delays the output, it is retried with the first row
        let _ = self.output.flush(false)?;

        let passes = if scans.len() > 1 {
            1 + scans.len() as u32
        } else {
            1
        };
        self.common
            .progress
            .start(u64::from(frame.total_imcu_rows) * u64::from(passes), passes);

        info!(
            "compressing {0}x{1} components={2} scans={3} SOF{4:x}",
            frame.image_width,
            frame.image_height,
            n,
            scans.len(),
            sof - jpeg_code::SOF0
        );

        self.frame = Some(frame);
        self.arrays = Some(arrays);
        self.scans = scans;
        self.common.state = GlobalState::HeaderParsed;
        Ok(())
    }

    /// Writes an APPn or COM marker. Only allowed before the first row.
    pub fn write_marker(&mut self, code: u8, data: &[u8]) -> Result<()> {
        self.common
            .require_state(&[GlobalState::HeaderParsed], "write_marker")?;
        if self.next_input_row > 0 {
            return err_exit_code(
                ExitCode::BadState,
                "markers can only be written before the first row",
            );
        }
        if !((jpeg_code::APP0..=jpeg_code::APP15).contains(&code) || code == jpeg_code::COM) {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!("marker {0:#04x} is not an APPn or COM marker", code),
            );
        }
        write_marker_segment(self.output.pending_mut(), code, data)
    }

    fn check_next_row(&self, num_components: usize) -> Result<&FrameHeader> {
        self.common.require_state(
            &[GlobalState::HeaderParsed, GlobalState::ScanActive],
            "writing rows",
        )?;
        let Some(frame) = self.frame.as_ref() else {
            return err_exit_code(ExitCode::BadState, "no datastream was started");
        };
        if self.next_input_row >= frame.total_imcu_rows {
            return err_exit_code(ExitCode::BadState, "all rows have been written");
        }
        if num_components != frame.num_components() {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!(
                    "got rows for {0} components, the frame has {1}",
                    num_components,
                    frame.num_components()
                ),
            );
        }
        Ok(frame)
    }

    /// Accepts the next iMCU row: for every component, the blocks of its real
    /// block rows, `width_in_blocks` per row. Padding blocks are filled in.
    pub fn write_coefficients(&mut self, rows: &[&[Block]]) -> Result<WriteStatus> {
        self.check_next_row(rows.len())?;
        if !self.output.flush(false)? {
            return Ok(WriteStatus::Suspended);
        }
        self.accept_row(rows)?;
        Ok(WriteStatus::RowCompleted)
    }

    /// Accepts the next iMCU row as samples: for every component, `8 * block rows`
    /// lines of `8 * width_in_blocks` samples. Each 8x8 block goes through
    /// `transform`.
    pub fn write_raw_data(
        &mut self,
        rows: &[&[JSample]],
        transform: &mut dyn ForwardTransform,
    ) -> Result<WriteStatus> {
        let frame = self.check_next_row(rows.len())?;
        let imcu_row = self.next_input_row;

        let mut converted = Vec::with_capacity(rows.len());
        for (c, samples) in frame.components.iter().zip(rows.iter()) {
            let width = c.width_in_blocks as usize;
            let block_rows = c.block_rows_in_imcu_row(imcu_row) as usize;
            let stride = width * 8;

            if samples.len() != block_rows * 8 * stride {
                return err_exit_code(
                    ExitCode::SyntaxError,
                    format!(
                        "component {0} row {1} needs {2} samples, got {3}",
                        c.component_index,
                        imcu_row,
                        block_rows * 8 * stride,
                        samples.len()
                    ),
                );
            }

            let mut blocks = vec![[0i16; DCTSIZE2]; block_rows * width];
            let mut gathered: [JSample; DCTSIZE2] = [0; DCTSIZE2];
            for by in 0..block_rows {
                for bx in 0..width {
                    for y in 0..8 {
                        let start = (by * 8 + y) * stride + bx * 8;
                        gathered[y * 8..y * 8 + 8].copy_from_slice(&samples[start..start + 8]);
                    }
                    let block = &mut blocks[by * width + bx];
                    catch_unwind_result(|| transform.transform(c, &gathered, block))?;
                }
            }
            converted.push(blocks);
        }

        if !self.output.flush(false)? {
            return Ok(WriteStatus::Suspended);
        }

        let refs: Vec<&[Block]> = converted.iter().map(|b| b.as_slice()).collect();
        self.accept_row(&refs)?;
        Ok(WriteStatus::RowCompleted)
    }

    fn accept_row(&mut self, rows: &[&[Block]]) -> Result<()> {
        let (Some(frame), Some(arrays)) = (self.frame.as_ref(), self.arrays.as_ref()) else {
            return err_exit_code(ExitCode::AssertionFailure, "no datastream was started");
        };
        let imcu_row = self.next_input_row;
        let total_imcu_rows = frame.total_imcu_rows;

        for (c, blocks) in frame.components.iter().zip(rows.iter()) {
            arrays.store_input_row(&mut self.common.mem, c, imcu_row, blocks)?;
        }

        if self.scans.len() == 1 {
            if self.active.is_none() {
                self.begin_scan(0)?;
            }
            self.encode_imcu_row()?;
        }

        self.next_input_row += 1;
        self.common.report_row(u64::from(total_imcu_rows));
        Ok(())
    }

    /// Writes the tables a scan needs, DRI if the interval changed and SOS
    fn begin_scan(&mut self, index: usize) -> Result<()> {
        let Some(frame) = self.frame.as_mut() else {
            return err_exit_code(ExitCode::AssertionFailure, "no frame");
        };
        let info = self.scans[index];
        let layout = ScanLayout::new(frame, &info, self.restart_interval, self.restart_in_rows)?;

        let out = self.output.pending_mut();
        for &ci in &layout.comps[..layout.comps_in_scan] {
            let c = &frame.components[ci];

            let (dc, ac) = if frame.progressive_mode {
                (info.ss == 0 && info.ah == 0, info.ss > 0)
            } else {
                (true, true)
            };

            for (needed, kind, selector) in [
                (dc, TableKind::DcHuff, c.dc_tbl_no),
                (ac, TableKind::AcHuff, c.ac_tbl_no),
            ] {
                let selector = usize::from(selector);
                if !needed || self.tables.is_sent(kind, selector) {
                    continue;
                }
                let Some(h) = self.tables.huff(kind, selector) else {
                    return err_exit_code(
                        ExitCode::MissingTable,
                        format!("{0:?} table {1} is not defined", kind, selector),
                    );
                };
                write_dht(out, kind, selector, h)?;
                self.tables.mark_sent(kind, selector)?;
            }
        }

        if layout.restart_interval != self.last_restart_interval {
            write_dri(out, layout.restart_interval)?;
            self.last_restart_interval = layout.restart_interval;
        }

        write_sos(out, frame, &layout)?;
        self.encoder.start_pass(frame, &layout, &self.tables)?;
        self.scratch.resize(layout.blocks_in_mcu, [0; DCTSIZE2]);

        debug!(
            "scan {0}: components={1} Ss={2} Se={3} Ah={4} Al={5}",
            index, info.comps_in_scan, info.ss, info.se, info.ah, info.al
        );

        self.active = Some(EncodeScan {
            cursor: ScanCursor::new(&layout),
            layout,
            cpu_time: CpuTimeMeasure::new(),
        });
        self.common.state = GlobalState::ScanActive;
        Ok(())
    }

    /// Encodes the iMCU row at the cursor, returns false once the scan is complete
    fn encode_imcu_row(&mut self) -> Result<bool> {
        let (Some(frame), Some(arrays), Some(scan)) = (
            self.frame.as_ref(),
            self.arrays.as_ref(),
            self.active.as_mut(),
        ) else {
            return err_exit_code(ExitCode::AssertionFailure, "no active scan");
        };

        let mcu = &mut self.scratch[..scan.layout.blocks_in_mcu];
        loop {
            if scan.cursor.restart_due(&scan.layout) {
                self.encoder.emit_restart(scan.cursor.next_restart_num())?;
                scan.cursor.restart_done(&scan.layout);
            }

            arrays.load_mcu(&mut self.common.mem, frame, &scan.layout, &scan.cursor, mcu)?;
            self.encoder.encode_mcu(mcu)?;

            if scan.cursor.mcu_done(&scan.layout) {
                continue;
            }
            if scan.cursor.mcu_row_done(frame, &scan.layout) {
                continue;
            }
            break;
        }

        let more = scan.cursor.imcu_row_done(frame);
        self.encoder.take_output(self.output.pending_mut());
        Ok(more)
    }

    fn finish_scan(&mut self) -> Result<()> {
        let Some(scan) = self.active.take() else {
            return err_exit_code(ExitCode::AssertionFailure, "no active scan");
        };

        self.encoder.finish_pass()?;
        self.encoder.take_output(self.output.pending_mut());
        self.common
            .mem
            .metrics_mut()
            .record_scan(scan.cpu_time.elapsed());
        self.common.state = GlobalState::ScanComplete;
        self.next_scan += 1;
        Ok(())
    }

    /// Writes the remaining scans and EOI and flushes everything. All rows must
    /// have been written. False means suspend.
    pub fn finish_compress(&mut self) -> Result<bool> {
        self.common.require_state(
            &[
                GlobalState::HeaderParsed,
                GlobalState::ScanActive,
                GlobalState::ScanComplete,
                GlobalState::StreamComplete,
            ],
            "finish_compress",
        )?;
        let Some(frame) = self.frame.as_ref() else {
            return err_exit_code(ExitCode::BadState, "no datastream was started");
        };
        if self.next_input_row < frame.total_imcu_rows {
            return err_exit_code(
                ExitCode::BadState,
                format!(
                    "finish_compress after {0} of {1} rows",
                    self.next_input_row, frame.total_imcu_rows
                ),
            );
        }
        let total_imcu_rows = frame.total_imcu_rows;

        if self.scans.len() == 1 {
            if self.active.is_some() {
                self.finish_scan()?;
                self.common.report_pass_done();
            }
        } else {
            while self.next_scan < self.scans.len() {
                if self.active.is_none() {
                    self.begin_scan(self.next_scan)?;
                }

                if !self.output.flush(false)? {
                    return Ok(false);
                }

                let more = self.encode_imcu_row()?;
                self.common.report_row(u64::from(total_imcu_rows));
                if !more {
                    self.finish_scan()?;
                    self.common.report_pass_done();
                }
            }
        }

        if !self.eoi_written {
            write_eoi(self.output.pending_mut());
            self.eoi_written = true;
            self.common.state = GlobalState::StreamComplete;
        }

        if !self.output.finish()? {
            return Ok(false);
        }

        info!(
            "datastream complete, {0} bytes",
            self.output.bytes_written()
        );
        self.common.finish_stream();
        self.reset_stream_state();
        Ok(true)
    }

    fn reset_stream_state(&mut self) {
        self.frame = None;
        self.arrays = None;
        self.scans.clear();
        self.next_scan = 0;
        self.active = None;
        self.next_input_row = 0;
        self.last_restart_interval = 0;
        self.eoi_written = false;
        self.tables_only_pending = false;
    }
}

/// 8-bit samples, table selectors 0 and 1 only and 8-bit quantizers
fn is_baseline(frame: &FrameHeader) -> bool {
    frame.data_precision == 8
        && frame.components.iter().all(|c| {
            c.quant_tbl_no <= 1
                && c.dc_tbl_no <= 1
                && c.ac_tbl_no <= 1
                && c.quant_table.map_or(false, |q| q.is_8bit())
        })
}
