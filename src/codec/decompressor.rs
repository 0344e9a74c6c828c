/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::{debug, info};

use crate::codec::coef_controller::{CoefArrays, ScanCursor};
use crate::codec::common::{CodecCommon, GlobalState, JpegCodec};
use crate::consts::DCTSIZE;
use crate::enabled_features::EnabledFeatures;
use crate::engine_error::{err_exit_code, ExitCode, Result, WarningKind};
use crate::helpers::catch_unwind_result;
use crate::io::source::{DataSource, InputAdapter};
use crate::jpeg::bit_reader::ZeroFill;
use crate::jpeg::coef_bits::CoefBits;
use crate::jpeg::component_info::ComponentInfo;
use crate::jpeg::entropy_decoder::{EntropyDecoder, HuffmanDecoder, McuOutcome};
use crate::jpeg::frame::FrameHeader;
use crate::jpeg::jpeg_code;
use crate::jpeg::marker_reader::{
    JfifHeader, MarkerContext, MarkerReader, MarkerStatus, SavedMarker,
};
use crate::jpeg::scan::{ScanInfo, ScanLayout};
use crate::jpeg::scan_script::MAX_AH_AL;
use crate::jpeg::tables::TableManager;
use crate::jpeg::Block;
use crate::metrics::CpuTimeMeasure;

/// Result of [`Decompressor::read_header`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// more input is needed
    Suspended,
    /// the frame header and the first scan header were read
    HeaderOk,
    /// the datastream only contained tables, they stay defined for the next one
    HeaderTablesOnly,
}

/// Result of [`Decompressor::consume_input`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeStatus {
    /// more input is needed
    Suspended,
    /// a scan header was read
    ReachedSos,
    /// the end of the datastream was reached
    ReachedEoi,
    /// an iMCU row of the current scan was decoded
    RowCompleted,
    /// the last iMCU row of the current scan was decoded
    ScanCompleted,
}

/// One iMCU row of coefficients of a single component
pub struct CoefficientRow<'a> {
    /// the component the blocks belong to
    pub component: &'a ComponentInfo,
    /// index of the iMCU row
    pub imcu_row: u32,
    /// `block_rows` rows of `blocks_per_row` blocks, natural coefficient order
    pub blocks: &'a [Block],
    /// row length, including the padding blocks to the right
    pub blocks_per_row: usize,
    /// number of block rows inside the image
    pub block_rows: usize,
}

/// Receives decoded coefficient rows, e.g. the inverse transform stage
pub trait CoefficientSink {
    /// called once per component for every iMCU row
    fn consume_row(&mut self, row: &CoefficientRow<'_>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputState {
    Initial,
    InHeader,
    ScanPending(ScanInfo),
    InScan,
    BetweenScans,
    Eoi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Undecided,
    /// every iMCU row of every component is kept
    FullImage,
    /// one iMCU row at a time, single scan images only
    Streaming,
}

struct ActiveScan {
    layout: ScanLayout,
    cursor: ScanCursor,
    /// the data of the current restart interval ran out, the rest of it is skipped
    insufficient: bool,
    /// the entropy decoder was reset for the pending restart marker
    restart_started: bool,
    /// a wrong restart marker was found and the warning was already given
    resync_in_progress: bool,
    cpu_time: CpuTimeMeasure,
}

/// Reads a JPEG datastream into coefficient blocks. Every operation may be called
/// again after it reported suspension, once more input is available.
pub struct Decompressor {
    common: CodecCommon,
    input: InputAdapter,
    markers: MarkerReader,
    tables: TableManager,
    decoder: Box<dyn EntropyDecoder>,

    frame: Option<FrameHeader>,
    coef_bits: Option<CoefBits>,
    arrays: Option<CoefArrays>,
    scan: Option<ActiveScan>,
    scratch: Vec<Block>,

    input_state: InputState,
    output_mode: OutputMode,
    buffered_image: bool,
    has_multiple_scans: bool,

    input_scan_number: u32,
    input_imcu_row: u32,
    output_scan_number: u32,
    output_imcu_row: u32,
    output_active: bool,

    /// streaming mode: a decoded row waits to be handed out
    row_ready: bool,
}

impl JpegCodec for Decompressor {
    fn common(&self) -> &CodecCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CodecCommon {
        &mut self.common
    }

    fn abort(&mut self) {
        self.common.release_stream();
        self.reset_stream_state();
    }
}

impl Decompressor {
    /// Creates a decompressor. No input is read until a source is set and
    /// `read_header` is called.
    pub fn new(features: &EnabledFeatures) -> Self {
        Decompressor {
            common: CodecCommon::new(features),
            input: InputAdapter::default(),
            markers: MarkerReader::new(),
            tables: TableManager::default(),
            decoder: Box::new(HuffmanDecoder::new()),
            frame: None,
            coef_bits: None,
            arrays: None,
            scan: None,
            scratch: Vec::new(),
            input_state: InputState::Initial,
            output_mode: OutputMode::Undecided,
            buffered_image: false,
            has_multiple_scans: false,
            input_scan_number: 0,
            input_imcu_row: 0,
            output_scan_number: 0,
            output_imcu_row: 0,
            output_active: false,
            row_ready: false,
        }
    }

    /// Sets where compressed data comes from. Bytes buffered from a previous source
    /// are dropped.
    pub fn set_source(&mut self, source: Box<dyn DataSource>) {
        self.input.set_source(source);
    }

    /// Replaces the Huffman entropy decoder
    pub fn set_entropy_decoder(&mut self, decoder: Box<dyn EntropyDecoder>) {
        self.decoder = decoder;
    }

    /// Keeps up to `length_limit` bytes of every APPn or COM marker with this code
    pub fn save_markers(&mut self, code: u8, length_limit: usize) -> Result<()> {
        self.markers.save_markers(code, length_limit)
    }

    /// APPn and COM markers saved so far, in datastream order. They are released
    /// with the datastream.
    pub fn saved_markers(&self) -> Result<Vec<SavedMarker>> {
        self.markers.saved_markers(self.common.mem.pools())
    }

    /// the JFIF header, if the datastream had one
    pub fn jfif(&self) -> Option<&JfifHeader> {
        self.markers.jfif()
    }

    /// the frame header, available once `read_header` returned `HeaderOk`
    pub fn frame(&self) -> Option<&FrameHeader> {
        self.frame.as_ref()
    }

    /// tables defined so far, including those carried over from earlier datastreams
    pub fn tables(&self) -> &TableManager {
        &self.tables
    }

    /// refinement state of a progressive image
    pub fn coef_bits(&self) -> Option<&CoefBits> {
        self.coef_bits.as_ref()
    }

    /// true for progressive images and images whose first scan doesn't carry
    /// every component
    pub fn has_multiple_scans(&self) -> bool {
        self.has_multiple_scans
    }

    /// number of scans started so far
    pub fn input_scan_number(&self) -> u32 {
        self.input_scan_number
    }

    /// iMCU row the input side is working on
    pub fn input_row(&self) -> u32 {
        self.input_imcu_row
    }

    /// scan shown by the current output pass
    pub fn output_scan_number(&self) -> u32 {
        self.output_scan_number
    }

    /// next iMCU row the output side will hand out
    pub fn output_row(&self) -> u32 {
        self.output_imcu_row
    }

    /// true once EOI was reached
    pub fn input_complete(&self) -> bool {
        self.input_state == InputState::Eoi
    }

    /// Reads markers up to the first scan. A datastream holding only tables
    /// yields `HeaderTablesOnly`, which is an error if `require_image` is set.
    pub fn read_header(&mut self, require_image: bool) -> Result<ReadStatus> {
        match self.input_state {
            InputState::Initial => {
                if !self.input.has_source() {
                    return err_exit_code(ExitCode::BadState, "no data source was set");
                }
                self.common.begin_stream();
                self.reset_stream_state();
                self.input_state = InputState::InHeader;
            }
            InputState::InHeader => {}
            _ => {
                return err_exit_code(
                    ExitCode::BadState,
                    "read_header called after the header was read",
                )
            }
        }

        match self.read_markers()? {
            MarkerStatus::Suspended => Ok(ReadStatus::Suspended),
            MarkerStatus::ReachedSos(scan) => {
                self.header_complete(scan)?;
                Ok(ReadStatus::HeaderOk)
            }
            MarkerStatus::ReachedEoi => {
                if self.frame.is_some() {
                    return err_exit_code(ExitCode::BadMarker, "EOI before the first scan");
                }

                info!("tables-only datastream");
                self.common.release_stream();
                self.reset_stream_state();
                self.input.reset_stream();

                if require_image {
                    return err_exit_code(
                        ExitCode::SyntaxError,
                        "datastream contains tables but no image",
                    );
                }
                Ok(ReadStatus::HeaderTablesOnly)
            }
        }
    }

    fn read_markers(&mut self) -> Result<MarkerStatus> {
        let mut warnings = Vec::new();
        let r = self.markers.read_markers(
            &mut self.input,
            &mut MarkerContext {
                tables: &mut self.tables,
                frame: &mut self.frame,
                features: &self.common.features,
                warnings: &mut warnings,
                pools: self.common.mem.pools_mut(),
            },
        );
        self.common.warn_all(warnings)?;
        r
    }

    fn header_complete(&mut self, scan: ScanInfo) -> Result<()> {
        let Some(frame) = self.frame.as_ref() else {
            return err_exit_code(ExitCode::BadMarker, "SOS without a frame header");
        };

        let n = frame.num_components();
        self.has_multiple_scans = frame.progressive_mode || usize::from(scan.comps_in_scan) < n;
        if frame.progressive_mode {
            self.coef_bits = Some(CoefBits::new(n));
        }

        let nscans = if frame.progressive_mode {
            2 + 3 * n as u64
        } else if self.has_multiple_scans {
            n as u64
        } else {
            1
        };
        self.common
            .progress
            .start(u64::from(frame.total_imcu_rows) * nscans, 1);

        info!(
            "header {0}x{1} components={2} progressive={3} multiple_scans={4}",
            frame.image_width,
            frame.image_height,
            n,
            frame.progressive_mode,
            self.has_multiple_scans
        );

        self.input_state = InputState::ScanPending(scan);
        self.common.state = GlobalState::HeaderParsed;
        Ok(())
    }

    fn require_header(&self, operation: &str) -> Result<&FrameHeader> {
        match (self.input_state, self.frame.as_ref()) {
            (InputState::Initial | InputState::InHeader, _) | (_, None) => err_exit_code(
                ExitCode::BadState,
                format!("{0} called before the header was read", operation),
            ),
            (_, Some(frame)) => Ok(frame),
        }
    }

    fn require_undecided(&self, operation: &str) -> Result<()> {
        self.require_header(operation)?;
        if self.output_mode != OutputMode::Undecided {
            return err_exit_code(
                ExitCode::BadState,
                format!("{0} called after decoding started", operation),
            );
        }
        Ok(())
    }

    /// Scales the output by `scale_num`/8. Only the scaled block size and the
    /// output dimensions change, the coefficient data is the same.
    pub fn set_output_scale(&mut self, scale_num: u32) -> Result<()> {
        self.require_undecided("set_output_scale")?;
        if scale_num == 0 || scale_num > 2 * DCTSIZE {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!("output scale {0}/8 is not supported", scale_num),
            );
        }
        if let Some(frame) = self.frame.as_mut() {
            frame.compute_geometry(scale_num)?;
        }
        Ok(())
    }

    /// Keeps every scan's result for output passes driven by the caller
    pub fn set_buffered_image(&mut self, buffered_image: bool) -> Result<()> {
        self.require_undecided("set_buffered_image")?;
        self.buffered_image = buffered_image;
        Ok(())
    }

    fn start_input(&mut self, mode: OutputMode) -> Result<()> {
        if self.output_mode != OutputMode::Undecided {
            return Ok(());
        }
        let Some(frame) = self.frame.as_ref() else {
            return err_exit_code(ExitCode::BadState, "decoding started before the header");
        };

        let arrays = CoefArrays::request(
            &mut self.common.mem,
            frame,
            mode != OutputMode::Streaming,
        )?;
        self.common.mem.realize_virt_arrays()?;

        debug!(
            "output mode {0:?} spilling={1}",
            mode,
            self.common.mem.is_spilling()
        );

        self.arrays = Some(arrays);
        self.output_mode = mode;
        Ok(())
    }

    /// Advances the input side by one step: a header, a scan header, or an iMCU
    /// row of entropy coded data.
    pub fn consume_input(&mut self) -> Result<ConsumeStatus> {
        match self.input_state {
            InputState::Initial | InputState::InHeader => {
                return Ok(match self.read_header(false)? {
                    ReadStatus::Suspended => ConsumeStatus::Suspended,
                    ReadStatus::HeaderOk => ConsumeStatus::ReachedSos,
                    ReadStatus::HeaderTablesOnly => ConsumeStatus::ReachedEoi,
                })
            }
            _ => {}
        }

        if self.output_mode == OutputMode::Undecided {
            self.start_input(OutputMode::FullImage)?;
        }
        if self.output_mode == OutputMode::Streaming && self.row_ready {
            return err_exit_code(
                ExitCode::BadState,
                "the decoded row has to be read before more input is consumed",
            );
        }

        self.consume_step()
    }

    fn consume_step(&mut self) -> Result<ConsumeStatus> {
        match self.input_state {
            InputState::ScanPending(scan) => {
                self.start_scan(scan)?;
                self.input_state = InputState::InScan;
                self.decode_imcu_row()
            }
            InputState::InScan => self.decode_imcu_row(),
            InputState::BetweenScans => match self.read_markers()? {
                MarkerStatus::Suspended => Ok(ConsumeStatus::Suspended),
                MarkerStatus::ReachedSos(scan) => {
                    self.start_scan(scan)?;
                    self.input_state = InputState::InScan;
                    Ok(ConsumeStatus::ReachedSos)
                }
                MarkerStatus::ReachedEoi => {
                    debug!("EOI after {0} scans", self.input_scan_number);
                    self.input_state = InputState::Eoi;
                    self.common.state = GlobalState::StreamComplete;
                    if self.output_scan_number > self.input_scan_number {
                        self.output_scan_number = self.input_scan_number;
                    }
                    Ok(ConsumeStatus::ReachedEoi)
                }
            },
            InputState::Eoi => Ok(ConsumeStatus::ReachedEoi),
            InputState::Initial | InputState::InHeader => {
                err_exit_code(ExitCode::BadState, "no header was read")
            }
        }
    }

    fn start_scan(&mut self, scan: ScanInfo) -> Result<()> {
        let Some(frame) = self.frame.as_mut() else {
            return err_exit_code(ExitCode::BadState, "scan without a frame");
        };

        if frame.arith_code {
            return err_exit_code(
                ExitCode::UnsupportedJpeg,
                "arithmetic coded images are not supported",
            );
        }

        if frame.progressive_mode {
            let bad = scan.ss > scan.se
                || scan.se > 63
                || (scan.ss == 0 && scan.se != 0)
                || (scan.ss != 0 && scan.comps_in_scan != 1)
                || scan.al > MAX_AH_AL
                || (scan.ah != 0 && scan.al + 1 != scan.ah);
            if bad {
                return err_exit_code(
                    ExitCode::BadScanScript,
                    format!(
                        "invalid progressive scan Ss={0} Se={1} Ah={2} Al={3}",
                        scan.ss, scan.se, scan.ah, scan.al
                    ),
                );
            }

            if let Some(coef_bits) = self.coef_bits.as_ref() {
                for _ in coef_bits.check_scan(&scan) {
                    self.common.warn(WarningKind::BogusProgression)?;
                }
            }
        } else if !scan.is_full_spectrum() || scan.ah != 0 || scan.al != 0 {
            self.common.warn(WarningKind::NotSequential)?;
        }

        // the first scan of a component fixes its quantization table
        for &ci in scan.components() {
            let c = &mut frame.components[usize::from(ci)];
            if c.quant_table.is_none() {
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
        }

        let layout = ScanLayout::new(frame, &scan, self.markers.restart_interval(), 0)?;
        self.decoder.start_pass(frame, &layout, &self.tables)?;
        self.scratch.resize(layout.blocks_in_mcu, [0; 64]);

        self.input_scan_number += 1;
        self.input_imcu_row = 0;
        self.common.state = GlobalState::ScanActive;

        info!(
            "scan {0}: components={1} Ss={2} Se={3} Ah={4} Al={5} restart={6}",
            self.input_scan_number,
            scan.comps_in_scan,
            scan.ss,
            scan.se,
            scan.ah,
            scan.al,
            layout.restart_interval
        );

        self.scan = Some(ActiveScan {
            cursor: ScanCursor::new(&layout),
            layout,
            insufficient: false,
            restart_started: false,
            resync_in_progress: false,
            cpu_time: CpuTimeMeasure::new(),
        });
        Ok(())
    }

    fn decode_imcu_row(&mut self) -> Result<ConsumeStatus> {
        let Some(mut scan) = self.scan.take() else {
            return err_exit_code(ExitCode::AssertionFailure, "no active scan");
        };
        let r = self.decode_imcu_row_of(&mut scan);
        self.scan = Some(scan);
        let status = r?;

        if status == ConsumeStatus::ScanCompleted {
            self.finish_scan()?;
        }
        Ok(status)
    }

    fn decode_imcu_row_of(&mut self, scan: &mut ActiveScan) -> Result<ConsumeStatus> {
        loop {
            if scan.cursor.restart_due(&scan.layout) && !self.process_restart(scan)? {
                return Ok(ConsumeStatus::Suspended);
            }

            if !self.decode_mcu(scan)? {
                return Ok(ConsumeStatus::Suspended);
            }

            if scan.cursor.mcu_done(&scan.layout) {
                continue;
            }
            let Some(frame) = self.frame.as_ref() else {
                return err_exit_code(ExitCode::AssertionFailure, "no frame");
            };
            if scan.cursor.mcu_row_done(frame, &scan.layout) {
                continue;
            }
            break;
        }

        let Some(frame) = self.frame.as_ref() else {
            return err_exit_code(ExitCode::AssertionFailure, "no frame");
        };
        let total_imcu_rows = frame.total_imcu_rows;
        let more = scan.cursor.imcu_row_done(frame);
        self.input_imcu_row = scan.cursor.imcu_row;
        self.common.report_row(u64::from(total_imcu_rows));

        Ok(if more {
            ConsumeStatus::RowCompleted
        } else {
            ConsumeStatus::ScanCompleted
        })
    }

    /// Decodes the MCU at the cursor. Its blocks are only written back once the
    /// entropy decoder had all the data it needed, false means suspend.
    fn decode_mcu(&mut self, scan: &mut ActiveScan) -> Result<bool> {
        let (Some(frame), Some(arrays)) = (self.frame.as_ref(), self.arrays.as_ref()) else {
            return err_exit_code(ExitCode::AssertionFailure, "decoding without arrays");
        };

        let mcu = &mut self.scratch[..scan.layout.blocks_in_mcu];
        arrays.load_mcu(&mut self.common.mem, frame, &scan.layout, &scan.cursor, mcu)?;

        if scan.insufficient {
            if frame.progressive_mode {
                // the coefficients keep whatever earlier scans gave them
                return Ok(true);
            }
            mcu.fill([0; 64]);
        } else {
            loop {
                let outcome = self.decoder.decode_mcu(
                    self.input.data(),
                    self.input.unread_marker.is_some(),
                    self.input.at_end(),
                    mcu,
                )?;

                match outcome {
                    McuOutcome::NeedData => {
                        if !self.input.fill_more()? {
                            return Ok(false);
                        }
                        // the aborted attempt may have touched the blocks already
                        arrays.load_mcu(&mut self.common.mem, frame, &scan.layout, &scan.cursor, mcu)?;
                    }
                    McuOutcome::Decoded {
                        consumed,
                        zero_fill,
                        bad_codes,
                    } => {
                        self.input.consume(consumed);

                        match zero_fill {
                            Some(ZeroFill::Marker) => {
                                scan.insufficient = true;
                                self.common.warn(WarningKind::HitMarker)?;
                            }
                            Some(ZeroFill::EndOfData) => {
                                scan.insufficient = true;
                                if self.input.note_premature_end() {
                                    self.common.warn(WarningKind::PrematureEnd)?;
                                }
                            }
                            None => {}
                        }

                        if bad_codes > 0 {
                            self.common.warn(WarningKind::HuffBadCode)?;
                        }
                        break;
                    }
                }
            }
        }

        arrays.store_mcu(&mut self.common.mem, frame, &scan.layout, &scan.cursor, mcu)?;
        Ok(true)
    }

    /// Reads the restart marker that ends the current interval. A wrong marker
    /// triggers a resync. False means suspend; calling again continues where it
    /// stopped.
    fn process_restart(&mut self, scan: &mut ActiveScan) -> Result<bool> {
        if !scan.restart_started {
            let extra = self.decoder.restart();
            if !scan.insufficient {
                self.input.add_discarded(extra);
            }
            scan.restart_started = true;
        }

        let expected = scan.cursor.next_restart_num();

        if !scan.resync_in_progress {
            let marker = self.input.next_marker()?;
            self.common.warn_all(self.input.take_warnings())?;
            let Some(marker) = marker else {
                return Ok(false);
            };

            if marker == jpeg_code::RST0 + expected {
                self.input.unread_marker = None;
                if self.input.take_discarded() > 0 {
                    self.common.warn(WarningKind::ExtraneousData)?;
                }
            } else {
                debug!(
                    "found marker {0:#04x} where RST{1} was expected",
                    marker, expected
                );
                scan.resync_in_progress = true;
                self.input.take_discarded();
                self.common.warn(WarningKind::MustResync)?;
            }
        }

        if scan.resync_in_progress {
            let done = self.input.resync_to_restart(expected)?;
            self.common.warn_all(self.input.take_warnings())?;
            self.input.take_discarded();
            if !done {
                return Ok(false);
            }
            scan.resync_in_progress = false;
        }

        scan.restart_started = false;
        scan.cursor.restart_done(&scan.layout);

        // a marker that was left for the marker reader means the interval is empty
        scan.insufficient = self.input.unread_marker.is_some();
        Ok(true)
    }

    fn finish_scan(&mut self) -> Result<()> {
        let Some(scan) = self.scan.take() else {
            return err_exit_code(ExitCode::AssertionFailure, "no active scan");
        };

        let extra = self.decoder.restart();
        if !scan.insufficient {
            self.input.add_discarded(extra);
        }

        if let Some(coef_bits) = self.coef_bits.as_mut() {
            coef_bits.commit_scan(&scan.layout.info);
        }

        self.common
            .mem
            .metrics_mut()
            .record_scan(scan.cpu_time.elapsed());
        self.common.state = GlobalState::ScanComplete;
        self.input_state = InputState::BetweenScans;

        debug!("scan {0} complete", self.input_scan_number);
        Ok(())
    }

    /// Decodes the whole datastream into the coefficient arrays. False means the
    /// input suspended, call again once more data is available.
    pub fn read_coefficients(&mut self) -> Result<bool> {
        self.require_header("read_coefficients")?;
        self.start_input(OutputMode::FullImage)?;
        if self.output_mode != OutputMode::FullImage {
            return err_exit_code(
                ExitCode::BadState,
                "coefficients are not kept in streaming mode",
            );
        }

        loop {
            match self.consume_step()? {
                ConsumeStatus::Suspended => return Ok(false),
                ConsumeStatus::ReachedEoi => return Ok(true),
                _ => {}
            }
        }
    }

    /// Block rows `start_row..start_row+num_rows` of a component. `num_rows` may be
    /// at most the component's vertical sampling factor.
    pub fn access_coefficients(
        &mut self,
        component: usize,
        start_row: usize,
        num_rows: usize,
    ) -> Result<&[Block]> {
        let Some(arrays) = self.arrays.as_ref() else {
            return err_exit_code(ExitCode::BadState, "no coefficients have been decoded");
        };
        let rows = arrays.block_rows(&mut self.common.mem, component, start_row, num_rows)?;
        Ok(rows)
    }

    /// number of block rows stored for a component, a multiple of its vertical
    /// sampling factor
    pub fn coefficient_block_rows(&self, component: usize) -> Result<usize> {
        let Some(arrays) = self.arrays.as_ref() else {
            return err_exit_code(ExitCode::BadState, "no coefficients have been decoded");
        };
        arrays.block_row_count(&self.common.mem, component)
    }

    /// Starts an output pass showing the image as of `scan_number`. Numbers below 1
    /// mean 1, after EOI numbers past the last scan mean the last scan.
    pub fn start_output(&mut self, scan_number: u32) -> Result<()> {
        self.require_header("start_output")?;
        if !self.buffered_image {
            return err_exit_code(ExitCode::BadState, "buffered image mode is not enabled");
        }
        self.start_input(OutputMode::FullImage)?;

        let mut scan_number = scan_number.max(1);
        if self.input_state == InputState::Eoi && scan_number > self.input_scan_number {
            scan_number = self.input_scan_number;
        }

        self.output_scan_number = scan_number;
        self.output_imcu_row = 0;
        self.output_active = true;
        debug!("output pass for scan {0}", scan_number);
        Ok(())
    }

    fn input_behind_output(&self) -> bool {
        self.input_state != InputState::Eoi
            && (self.input_scan_number < self.output_scan_number
                || (self.input_scan_number == self.output_scan_number
                    && self.input_imcu_row <= self.output_imcu_row))
    }

    /// Hands the next iMCU row of the output pass to `sink`, consuming input
    /// first if the input side hasn't got that far. False means suspend.
    pub fn output_imcu_row(&mut self, sink: &mut dyn CoefficientSink) -> Result<bool> {
        let total = self.require_header("output_imcu_row")?.total_imcu_rows;
        if !self.output_active {
            return err_exit_code(ExitCode::BadState, "no output pass was started");
        }
        if self.output_imcu_row >= total {
            return err_exit_code(ExitCode::BadState, "output pass is complete");
        }

        while self.input_behind_output() {
            if self.consume_step()? == ConsumeStatus::Suspended {
                return Ok(false);
            }
        }

        self.deliver_row(sink, self.output_imcu_row)?;
        self.output_imcu_row += 1;
        Ok(true)
    }

    /// Ends an output pass. Input is consumed up to the start of the next scan so
    /// the following pass has something new to show. False means suspend.
    pub fn finish_output(&mut self) -> Result<bool> {
        if !self.output_active {
            return err_exit_code(ExitCode::BadState, "no output pass was started");
        }

        while self.input_scan_number <= self.output_scan_number
            && self.input_state != InputState::Eoi
        {
            if self.consume_step()? == ConsumeStatus::Suspended {
                return Ok(false);
            }
        }

        self.output_active = false;
        Ok(true)
    }

    /// Hands the next iMCU row to `sink` without buffered image mode. Single scan
    /// images are decoded row by row, multi-scan images are read completely
    /// first. False means suspend.
    pub fn read_imcu_row(&mut self, sink: &mut dyn CoefficientSink) -> Result<bool> {
        let frame = self.require_header("read_imcu_row")?;
        let total = frame.total_imcu_rows;

        if self.buffered_image {
            return err_exit_code(
                ExitCode::BadState,
                "buffered image mode uses start_output and output_imcu_row",
            );
        }
        if self.output_imcu_row >= total {
            return err_exit_code(ExitCode::BadState, "all rows have been read");
        }

        if self.has_multiple_scans {
            self.start_input(OutputMode::FullImage)?;
        } else {
            self.start_input(OutputMode::Streaming)?;
        }

        if self.output_mode == OutputMode::Streaming {
            if !self.row_ready {
                match self.consume_step()? {
                    ConsumeStatus::Suspended => return Ok(false),
                    ConsumeStatus::RowCompleted | ConsumeStatus::ScanCompleted => {
                        self.row_ready = true;
                    }
                    s => {
                        return err_exit_code(
                            ExitCode::AssertionFailure,
                            format!("unexpected {0:?} while streaming", s),
                        )
                    }
                }
            }
        } else {
            while self.input_state != InputState::Eoi {
                if self.consume_step()? == ConsumeStatus::Suspended {
                    return Ok(false);
                }
            }
        }

        self.deliver_row(sink, self.output_imcu_row)?;
        self.row_ready = false;
        self.output_imcu_row += 1;
        Ok(true)
    }

    fn deliver_row(&mut self, sink: &mut dyn CoefficientSink, imcu_row: u32) -> Result<()> {
        let (Some(frame), Some(arrays)) = (self.frame.as_ref(), self.arrays.as_ref()) else {
            return err_exit_code(ExitCode::AssertionFailure, "output without arrays");
        };

        for c in frame.components.iter() {
            let window = arrays.imcu_window(&mut self.common.mem, c, imcu_row, false)?;
            let blocks_per_row = c.padded_width_in_blocks() as usize;
            let block_rows = c.block_rows_in_imcu_row(imcu_row) as usize;

            let row = CoefficientRow {
                component: c,
                imcu_row,
                blocks: &window[..block_rows * blocks_per_row],
                blocks_per_row,
                block_rows,
            };
            catch_unwind_result(|| sink.consume_row(&row))?;
        }

        Ok(())
    }

    /// Reads the rest of the datastream up to EOI and releases its memory. False
    /// means suspend.
    pub fn finish_decompress(&mut self) -> Result<bool> {
        let total = self.require_header("finish_decompress")?.total_imcu_rows;

        if self.output_mode == OutputMode::Streaming && self.output_imcu_row < total {
            return err_exit_code(
                ExitCode::BadState,
                format!(
                    "finish_decompress after {0} of {1} rows",
                    self.output_imcu_row, total
                ),
            );
        }

        self.start_input(OutputMode::FullImage)?;
        while self.input_state != InputState::Eoi {
            if self.consume_step()? == ConsumeStatus::Suspended {
                return Ok(false);
            }
        }

        self.common.report_pass_done();
        self.common.finish_stream();
        self.reset_stream_state();
        self.input.reset_stream();
        Ok(true)
    }

    /// forgets everything about the current datastream, tables excepted
    fn reset_stream_state(&mut self) {
        self.markers.reset();
        self.frame = None;
        self.coef_bits = None;
        self.arrays = None;
        self.scan = None;
        self.input_state = InputState::Initial;
        self.output_mode = OutputMode::Undecided;
        self.buffered_image = false;
        self.has_multiple_scans = false;
        self.input_scan_number = 0;
        self.input_imcu_row = 0;
        self.output_scan_number = 0;
        self.output_imcu_row = 0;
        self.output_active = false;
        self.row_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::source::{ChunkedSource, SliceSource};

    fn stream_for(data: Vec<u8>) -> Decompressor {
        let mut d = Decompressor::new(&EnabledFeatures::default());
        d.set_source(Box::new(SliceSource::new(data)));
        d
    }

    #[test]
    fn tables_only_stream() {
        // SOI, DRI, EOI
        let data = vec![0xff, 0xd8, 0xff, 0xdd, 0, 4, 0, 1, 0xff, 0xd9];

        let mut d = stream_for(data.clone());
        assert_eq!(d.read_header(false).unwrap(), ReadStatus::HeaderTablesOnly);
        assert_eq!(d.global_state(), GlobalState::Initial);

        let mut d = stream_for(data);
        let e = d.read_header(true).unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::SyntaxError);
    }

    #[test]
    fn operations_need_a_header() {
        let (source, sender) = ChunkedSource::new();
        sender.push(&[0xff, 0xd8]).unwrap();

        let mut d = Decompressor::new(&EnabledFeatures::default());
        d.set_source(Box::new(source));
        assert_eq!(
            d.read_coefficients().unwrap_err().exit_code(),
            ExitCode::BadState
        );
        assert_eq!(d.read_header(false).unwrap(), ReadStatus::Suspended);
        assert_eq!(d.start_output(1).unwrap_err().exit_code(), ExitCode::BadState);

        // a premature end inside the header is reported as a tables-only stream
        sender.finish();
        assert_eq!(d.read_header(false).unwrap(), ReadStatus::HeaderTablesOnly);
        assert_eq!(d.common().warnings()[&WarningKind::PrematureEnd], 1);

        let mut d = Decompressor::new(&EnabledFeatures::default());
        assert_eq!(d.read_header(false).unwrap_err().exit_code(), ExitCode::BadState);
    }

    #[test]
    fn rejects_arithmetic_frames() {
        let mut data = vec![0xff, 0xd8];
        data.extend_from_slice(&[0xff, 0xdb, 0, 67, 0]);
        data.extend_from_slice(&[1; 64]);
        // SOF9
        data.extend_from_slice(&[0xff, 0xc9, 0, 11, 8, 0, 8, 0, 8, 1, 1, 0x11, 0]);
        data.extend_from_slice(&[0xff, 0xda, 0, 8, 1, 1, 0x00, 0, 63, 0]);
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&[0xff, 0xd9]);

        let mut d = stream_for(data);
        assert_eq!(d.read_header(true).unwrap(), ReadStatus::HeaderOk);
        assert_eq!(
            d.read_coefficients().unwrap_err().exit_code(),
            ExitCode::UnsupportedJpeg
        );
        d.abort();
        assert_eq!(d.global_state(), GlobalState::Initial);
        assert!(d.frame().is_none());
    }
}
