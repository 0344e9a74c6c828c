/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::{MAX_BLOCKS_IN_MCU, MAX_COMPS_IN_SCAN, ZIGZAG_TO_RASTER};
use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::helpers::devli;
use crate::jpeg::bit_reader::{BitReader, BitState, NeedData, ZeroFill};
use crate::jpeg::frame::FrameHeader;
use crate::jpeg::huffman::HuffTree;
use crate::jpeg::scan::ScanLayout;
use crate::jpeg::tables::{TableKind, TableManager};
use crate::jpeg::Block;

/// What happened while decoding one MCU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McuOutcome {
    /// The buffered data ended in the middle of the MCU. Nothing was committed and
    /// the same MCU must be decoded again once more data is available.
    NeedData,

    /// The MCU was decoded and the decoder state advanced.
    Decoded {
        /// number of input bytes that belong to the MCU
        consumed: usize,
        /// set if the data ran out (marker or end of data) and zeros were substituted
        zero_fill: Option<ZeroFill>,
        /// number of invalid Huffman codes that were read as symbol 0
        bad_codes: u32,
    },
}

/// Turns entropy coded bytes into coefficient blocks, one MCU at a time.
///
/// Implementations must not keep any state change from a call that returned
/// `McuOutcome::NeedData`, the scan controller retries the same MCU with the
/// same blocks later.
pub trait EntropyDecoder: Send {
    /// Prepares for a new scan. The components of the layout already carry their
    /// table selectors.
    fn start_pass(
        &mut self,
        frame: &FrameHeader,
        layout: &ScanLayout,
        tables: &TableManager,
    ) -> Result<()>;

    /// Decodes one MCU from `input` into `blocks`, which hold the current content
    /// of the MCU's blocks in MCU order. `marker_pending` tells the decoder that a
    /// marker follows the buffered data, `at_end` that no more data will come.
    fn decode_mcu(
        &mut self,
        input: &[u8],
        marker_pending: bool,
        at_end: bool,
        blocks: &mut [Block],
    ) -> Result<McuOutcome>;

    /// Resets the entropy context at a restart boundary and returns the number of
    /// whole bytes that were still sitting in the bit register.
    fn restart(&mut self) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
struct SavedState {
    bits: BitState,
    last_dc_val: [i16; MAX_COMPS_IN_SCAN],
    eobrun: u32,
}

/// Huffman decoding for sequential and progressive scans
pub struct HuffmanDecoder {
    progressive: bool,
    ss: usize,
    se: usize,
    ah: u8,
    al: u8,
    blocks_in_mcu: usize,
    membership: [usize; MAX_BLOCKS_IN_MCU],
    dc_trees: Vec<HuffTree>,
    ac_trees: Vec<HuffTree>,
    state: SavedState,
}

impl Default for HuffmanDecoder {
    fn default() -> Self {
        HuffmanDecoder {
            progressive: false,
            ss: 0,
            se: 63,
            ah: 0,
            al: 0,
            blocks_in_mcu: 0,
            membership: [0; MAX_BLOCKS_IN_MCU],
            dc_trees: Vec::new(),
            ac_trees: Vec::new(),
            state: SavedState::default(),
        }
    }
}

fn load_tree(tables: &TableManager, kind: TableKind, selector: u8) -> Result<HuffTree> {
    match tables.huff(kind, usize::from(selector)) {
        Some(t) => HuffTree::from_table(t),
        None => err_exit_code(
            ExitCode::MissingTable,
            format!("{0:?} table {1} used by scan is not defined", kind, selector),
        ),
    }
}

/// Symbol 0 is substituted for invalid codes and counted.
#[inline(always)]
fn decode_symbol(
    reader: &mut BitReader,
    tree: &HuffTree,
    bad_codes: &mut u32,
) -> std::result::Result<u8, NeedData> {
    match reader.decode(tree)? {
        Some(s) => Ok(s),
        None => {
            *bad_codes += 1;
            Ok(0)
        }
    }
}

/// reads a DC difference, sizes over 15 are not representable and count as bad codes
#[inline(always)]
fn decode_dc_diff(
    reader: &mut BitReader,
    tree: &HuffTree,
    bad_codes: &mut u32,
) -> std::result::Result<i16, NeedData> {
    let mut s = decode_symbol(reader, tree, bad_codes)?;
    if s > 15 {
        *bad_codes += 1;
        s = 0;
    }
    if s == 0 {
        return Ok(0);
    }
    let r = reader.read(u32::from(s))?;
    Ok(devli(s, r))
}

impl HuffmanDecoder {
    /// decoder without tables, `start_pass` loads them
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_sequential(
        &self,
        reader: &mut BitReader,
        state: &mut SavedState,
        blocks: &mut [Block],
        bad_codes: &mut u32,
    ) -> std::result::Result<(), NeedData> {
        for (b, block) in blocks.iter_mut().enumerate().take(self.blocks_in_mcu) {
            let slot = self.membership[b];
            *block = [0; 64];

            let diff = decode_dc_diff(reader, &self.dc_trees[slot], bad_codes)?;
            let dc = state.last_dc_val[slot].wrapping_add(diff);
            state.last_dc_val[slot] = dc;
            block[0] = dc;

            let ac = &self.ac_trees[slot];
            let mut k = 1;
            while k < 64 {
                let rs = decode_symbol(reader, ac, bad_codes)?;
                let r = usize::from(rs >> 4);
                let s = rs & 15;

                if s != 0 {
                    k += r;
                    let v = reader.read(u32::from(s))?;
                    block[usize::from(ZIGZAG_TO_RASTER[k.min(63)])] = devli(s, v);
                    k += 1;
                } else if r == 15 {
                    k += 16;
                } else {
                    break;
                }
            }
        }
        Ok(())
    }

    fn decode_dc_first(
        &self,
        reader: &mut BitReader,
        state: &mut SavedState,
        blocks: &mut [Block],
        bad_codes: &mut u32,
    ) -> std::result::Result<(), NeedData> {
        for (b, block) in blocks.iter_mut().enumerate().take(self.blocks_in_mcu) {
            let slot = self.membership[b];
            let diff = decode_dc_diff(reader, &self.dc_trees[slot], bad_codes)?;
            let dc = state.last_dc_val[slot].wrapping_add(diff);
            state.last_dc_val[slot] = dc;
            block[0] = (i32::from(dc) << self.al) as i16;
        }
        Ok(())
    }

    fn decode_dc_refine(
        &self,
        reader: &mut BitReader,
        blocks: &mut [Block],
    ) -> std::result::Result<(), NeedData> {
        let p1 = 1i16 << self.al;
        for block in blocks.iter_mut().take(self.blocks_in_mcu) {
            if reader.read(1)? != 0 {
                block[0] |= p1;
            }
        }
        Ok(())
    }

    fn decode_ac_first(
        &self,
        reader: &mut BitReader,
        state: &mut SavedState,
        block: &mut Block,
        bad_codes: &mut u32,
    ) -> std::result::Result<(), NeedData> {
        if state.eobrun > 0 {
            state.eobrun -= 1;
            return Ok(());
        }

        let tree = &self.ac_trees[0];
        let mut k = self.ss;
        while k <= self.se {
            let rs = decode_symbol(reader, tree, bad_codes)?;
            let r = rs >> 4;
            let s = rs & 15;

            if s != 0 {
                k += usize::from(r);
                let v = reader.read(u32::from(s))?;
                block[usize::from(ZIGZAG_TO_RASTER[k.min(63)])] =
                    (i32::from(devli(s, v)) << self.al) as i16;
            } else if r == 15 {
                k += 15;
            } else {
                // EOBr, this block and the next 2^r + extra - 1 blocks end here
                let mut run = 1u32 << r;
                if r != 0 {
                    run += u32::from(reader.read(u32::from(r))?);
                }
                state.eobrun = run - 1;
                break;
            }
            k += 1;
        }
        Ok(())
    }

    fn decode_ac_refine(
        &self,
        reader: &mut BitReader,
        state: &mut SavedState,
        block: &mut Block,
        bad_codes: &mut u32,
    ) -> std::result::Result<(), NeedData> {
        let p1 = 1i16 << self.al;
        let m1 = -1i16 << self.al;
        let tree = &self.ac_trees[0];

        let mut k = self.ss;

        if state.eobrun == 0 {
            while k <= self.se {
                let rs = decode_symbol(reader, tree, bad_codes)?;
                let mut r = i32::from(rs >> 4);
                let s = rs & 15;

                let mut new_value = 0i16;
                if s != 0 {
                    if s != 1 {
                        *bad_codes += 1;
                    }
                    new_value = if reader.read(1)? != 0 { p1 } else { m1 };
                } else if r != 15 {
                    state.eobrun = 1u32 << r;
                    if r != 0 {
                        state.eobrun += u32::from(reader.read(r as u32)?);
                    }
                    break;
                }

                // skip r zero coefficients, refining the nonzero ones on the way
                loop {
                    let coef = &mut block[usize::from(ZIGZAG_TO_RASTER[k.min(63)])];
                    if *coef != 0 {
                        refine(reader, coef, p1, m1)?;
                    } else {
                        r -= 1;
                        if r < 0 {
                            break;
                        }
                    }
                    k += 1;
                    if k > self.se {
                        break;
                    }
                }

                if new_value != 0 {
                    block[usize::from(ZIGZAG_TO_RASTER[k.min(63)])] = new_value;
                }
                k += 1;
            }
        }

        if state.eobrun > 0 {
            // the rest of the band only has correction bits for coefficients already nonzero
            while k <= self.se {
                let coef = &mut block[usize::from(ZIGZAG_TO_RASTER[k])];
                if *coef != 0 {
                    refine(reader, coef, p1, m1)?;
                }
                k += 1;
            }
            state.eobrun -= 1;
        }

        Ok(())
    }
}

#[inline(always)]
fn refine(
    reader: &mut BitReader,
    coef: &mut i16,
    p1: i16,
    m1: i16,
) -> std::result::Result<(), NeedData> {
    if reader.read(1)? != 0 && (*coef & p1) == 0 {
        *coef = if *coef >= 0 {
            coef.wrapping_add(p1)
        } else {
            coef.wrapping_add(m1)
        };
    }
    Ok(())
}

impl EntropyDecoder for HuffmanDecoder {
    fn start_pass(
        &mut self,
        frame: &FrameHeader,
        layout: &ScanLayout,
        tables: &TableManager,
    ) -> Result<()> {
        let info = &layout.info;

        self.progressive = frame.progressive_mode;
        self.ss = usize::from(info.ss);
        self.se = usize::from(info.se.min(63));
        self.ah = info.ah;
        self.al = info.al;
        self.blocks_in_mcu = layout.blocks_in_mcu;
        self.membership = layout.mcu_membership;
        self.state = SavedState::default();

        let (need_dc, need_ac) = if self.progressive {
            (info.is_dc_scan() && info.ah == 0, !info.is_dc_scan())
        } else {
            (true, true)
        };

        self.dc_trees.clear();
        self.ac_trees.clear();
        for &ci in &layout.comps[..layout.comps_in_scan] {
            let c = &frame.components[ci];
            self.dc_trees.push(if need_dc {
                load_tree(tables, TableKind::DcHuff, c.dc_tbl_no)?
            } else {
                HuffTree::default()
            });
            self.ac_trees.push(if need_ac {
                load_tree(tables, TableKind::AcHuff, c.ac_tbl_no)?
            } else {
                HuffTree::default()
            });
        }

        Ok(())
    }

    fn decode_mcu(
        &mut self,
        input: &[u8],
        marker_pending: bool,
        at_end: bool,
        blocks: &mut [Block],
    ) -> Result<McuOutcome> {
        if blocks.len() < self.blocks_in_mcu {
            return err_exit_code(
                ExitCode::AssertionFailure,
                format!(
                    "MCU needs {0} blocks, {1} supplied",
                    self.blocks_in_mcu,
                    blocks.len()
                ),
            );
        }

        let mut reader = BitReader::new(input, self.state.bits, marker_pending, at_end);
        let mut state = self.state;
        let mut bad_codes = 0;

        let r = if !self.progressive {
            self.decode_sequential(&mut reader, &mut state, blocks, &mut bad_codes)
        } else if self.ss == 0 {
            if self.ah == 0 {
                self.decode_dc_first(&mut reader, &mut state, blocks, &mut bad_codes)
            } else {
                self.decode_dc_refine(&mut reader, blocks)
            }
        } else if self.ah == 0 {
            self.decode_ac_first(&mut reader, &mut state, &mut blocks[0], &mut bad_codes)
        } else {
            self.decode_ac_refine(&mut reader, &mut state, &mut blocks[0], &mut bad_codes)
        };

        match r {
            Err(NeedData) => Ok(McuOutcome::NeedData),
            Ok(()) => {
                state.bits = reader.state();
                self.state = state;
                Ok(McuOutcome::Decoded {
                    consumed: reader.consumed(),
                    zero_fill: reader.zero_fill(),
                    bad_codes,
                })
            }
        }
    }

    fn restart(&mut self) -> usize {
        let discarded = (self.state.bits.bits_left / 8) as usize;
        self.state = SavedState::default();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enabled_features::EnabledFeatures;
    use crate::jpeg::bit_writer::BitWriter;
    use crate::jpeg::frame::{FrameSpec, FrameHeader};
    use crate::jpeg::huffman::HuffCodes;
    use crate::jpeg::scan::ScanInfo;

    fn setup(progressive: bool, scan: ScanInfo) -> (HuffmanDecoder, TableManager) {
        let mut tables = TableManager::default();
        tables.set_std_huff_tables().unwrap();

        let mut frame =
            FrameHeader::from_spec(&FrameSpec::new(8, 8, 1), progressive, &EnabledFeatures::default())
                .unwrap();
        let layout = ScanLayout::new(&mut frame, &scan, 0, 0).unwrap();

        let mut d = HuffmanDecoder::new();
        d.start_pass(&frame, &layout, &tables).unwrap();
        (d, tables)
    }

    fn codes(tables: &TableManager, kind: TableKind) -> HuffCodes {
        HuffCodes::construct(tables.huff(kind, 0).unwrap()).unwrap()
    }

    #[test]
    fn sequential_block() {
        let (mut d, tables) = setup(false, ScanInfo::sequential(&[0]));
        let dc = codes(&tables, TableKind::DcHuff);
        let ac = codes(&tables, TableKind::AcHuff);

        // DC diff of 5 (size 3), AC -1 at zigzag 1, EOB
        let mut w = BitWriter::new(16);
        w.write(u64::from(dc.c_val[3]), u32::from(dc.c_len[3]));
        w.write(5, 3);
        w.write(u64::from(ac.c_val[0x01]), u32::from(ac.c_len[0x01]));
        w.write(0, 1);
        w.write(u64::from(ac.c_val[0x00]), u32::from(ac.c_len[0x00]));
        w.pad();
        let mut data = Vec::new();
        w.take_bytes(&mut data);

        // truncated input suspends without touching the state
        let mut blocks = [[7i16; 64]; 1];
        assert_eq!(
            d.decode_mcu(&data[..1], false, false, &mut blocks).unwrap(),
            McuOutcome::NeedData
        );

        match d.decode_mcu(&data, false, false, &mut blocks).unwrap() {
            McuOutcome::Decoded {
                zero_fill,
                bad_codes,
                ..
            } => {
                assert_eq!(zero_fill, None);
                assert_eq!(bad_codes, 0);
            }
            McuOutcome::NeedData => panic!("expected a decoded MCU"),
        }
        assert_eq!(blocks[0][0], 5);
        assert_eq!(blocks[0][1], -1);
        assert_eq!(blocks[0][2..].iter().filter(|&&x| x != 0).count(), 0);
    }

    #[test]
    fn marker_fills_with_zeros() {
        let (mut d, _) = setup(false, ScanInfo::sequential(&[0]));
        let mut blocks = [[3i16; 64]; 1];
        match d.decode_mcu(&[], true, false, &mut blocks).unwrap() {
            McuOutcome::Decoded { zero_fill, .. } => assert_eq!(zero_fill, Some(ZeroFill::Marker)),
            McuOutcome::NeedData => panic!("expected a decoded MCU"),
        }
        // zero bits decode as a DC difference of size 0
        assert_eq!(blocks[0][0], 0);
    }

    #[test]
    fn dc_refinement_sets_bit() {
        let (mut d, _) = setup(true, ScanInfo::dc_scan(&[0], 1, 0));
        let mut blocks = [[0i16; 64]; 1];
        blocks[0][0] = -4;
        let data = [0x80];
        d.decode_mcu(&data, false, true, &mut blocks).unwrap();
        assert_eq!(blocks[0][0], -3);
    }

    #[test]
    fn restart_discards_register() {
        let (mut d, _) = setup(true, ScanInfo::dc_scan(&[0], 1, 0));
        let mut blocks = [[0i16; 64]; 1];
        let data = [0x80, 0x12, 0x34];
        d.decode_mcu(&data, false, false, &mut blocks).unwrap();
        assert!(d.restart() >= 1);
        assert_eq!(d.restart(), 0);
    }
}
