/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::num::NonZeroI16;

use crate::consts::{MAX_BLOCKS_IN_MCU, MAX_COMPS_IN_SCAN, ZIGZAG_TO_RASTER};
use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::helpers::u16_bit_length;
use crate::jpeg::bit_writer::BitWriter;
use crate::jpeg::frame::FrameHeader;
use crate::jpeg::huffman::HuffCodes;
use crate::jpeg::jpeg_code;
use crate::jpeg::scan::ScanLayout;
use crate::jpeg::tables::{TableKind, TableManager};
use crate::jpeg::Block;

/// Turns coefficient blocks into entropy coded bytes, one MCU at a time. The
/// output is collected internally until the scan controller takes it.
pub trait EntropyEncoder: Send {
    /// Prepares for a new scan
    fn start_pass(
        &mut self,
        frame: &FrameHeader,
        layout: &ScanLayout,
        tables: &TableManager,
    ) -> Result<()>;

    /// Encodes the blocks of one MCU, in MCU order
    fn encode_mcu(&mut self, blocks: &[Block]) -> Result<()>;

    /// Terminates the current restart interval with RSTn and resets the entropy context
    fn emit_restart(&mut self, restart_num: u8) -> Result<()>;

    /// Flushes any pending state and pads the last byte
    fn finish_pass(&mut self) -> Result<()>;

    /// Moves the bytes produced so far into `out`
    fn take_output(&mut self, out: &mut Vec<u8>);
}

/// Huffman encoding for sequential and progressive scans
pub struct HuffmanEncoder {
    progressive: bool,
    ss: u8,
    se: u8,
    ah: u8,
    al: u8,
    blocks_in_mcu: usize,
    membership: [usize; MAX_BLOCKS_IN_MCU],
    dc_codes: Vec<HuffCodes>,
    ac_codes: Vec<HuffCodes>,
    last_dc: [i16; MAX_COMPS_IN_SCAN],
    eobrun: u16,
    correction_bits: Vec<u8>,
    huffw: BitWriter,
}

impl Default for HuffmanEncoder {
    fn default() -> Self {
        HuffmanEncoder {
            progressive: false,
            ss: 0,
            se: 63,
            ah: 0,
            al: 0,
            blocks_in_mcu: 0,
            membership: [0; MAX_BLOCKS_IN_MCU],
            dc_codes: Vec::new(),
            ac_codes: Vec::new(),
            last_dc: [0; MAX_COMPS_IN_SCAN],
            eobrun: 0,
            correction_bits: Vec::new(),
            huffw: BitWriter::new(4096),
        }
    }
}

fn load_codes(tables: &TableManager, kind: TableKind, selector: u8) -> Result<HuffCodes> {
    match tables.huff(kind, usize::from(selector)) {
        Some(t) => HuffCodes::construct(t),
        None => err_exit_code(
            ExitCode::MissingTable,
            format!("{0:?} table {1} used by scan is not defined", kind, selector),
        ),
    }
}

impl HuffmanEncoder {
    /// encoder without tables, `start_pass` loads them
    pub fn new() -> Self {
        Self::default()
    }

    /// flushes a pending EOB run and the correction bits that belong to it
    fn flush_eobrun(&mut self) {
        if let Some(actbl) = self.ac_codes.first() {
            encode_eobrun(&mut self.huffw, actbl, &mut self.eobrun);
        }
        encode_crbits(&mut self.huffw, &mut self.correction_bits);
    }
}

impl EntropyEncoder for HuffmanEncoder {
    fn start_pass(
        &mut self,
        frame: &FrameHeader,
        layout: &ScanLayout,
        tables: &TableManager,
    ) -> Result<()> {
        let info = &layout.info;

        self.progressive = frame.progressive_mode;
        self.ss = info.ss;
        self.se = info.se.min(63);
        self.ah = info.ah;
        self.al = info.al;
        self.blocks_in_mcu = layout.blocks_in_mcu;
        self.membership = layout.mcu_membership;
        self.last_dc = [0; MAX_COMPS_IN_SCAN];
        self.eobrun = 0;
        self.correction_bits.clear();

        let (need_dc, need_ac) = if self.progressive {
            (info.is_dc_scan() && info.ah == 0, !info.is_dc_scan())
        } else {
            (true, true)
        };

        self.dc_codes.clear();
        self.ac_codes.clear();
        for &ci in &layout.comps[..layout.comps_in_scan] {
            let c = &frame.components[ci];
            self.dc_codes.push(if need_dc {
                load_codes(tables, TableKind::DcHuff, c.dc_tbl_no)?
            } else {
                HuffCodes::default()
            });
            if need_ac {
                let codes = load_codes(tables, TableKind::AcHuff, c.ac_tbl_no)?;
                if self.progressive && codes.max_eob_run == 0 {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        "there must be at least one EOB symbol run in the huffman table to encode EOBs",
                    );
                }
                self.ac_codes.push(codes);
            }
        }

        Ok(())
    }

    fn encode_mcu(&mut self, blocks: &[Block]) -> Result<()> {
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

        if !self.progressive {
            for (b, block) in blocks.iter().enumerate().take(self.blocks_in_mcu) {
                let slot = self.membership[b];

                // unzigzag
                let mut zz = [0i16; 64];
                for (i, z) in zz.iter_mut().enumerate() {
                    *z = block[usize::from(ZIGZAG_TO_RASTER[i])];
                }

                // diff coding for dc
                let dc = zz[0];
                zz[0] = dc.wrapping_sub(self.last_dc[slot]);
                self.last_dc[slot] = dc;

                encode_block_seq(
                    &mut self.huffw,
                    &self.dc_codes[slot],
                    &self.ac_codes[slot],
                    &zz,
                )?;
            }
        } else if self.ss == 0 {
            for (b, block) in blocks.iter().enumerate().take(self.blocks_in_mcu) {
                let slot = self.membership[b];
                if self.ah == 0 {
                    // diff coding & bitshifting for dc
                    let tmp = block[0] >> self.al;
                    let v = tmp.wrapping_sub(self.last_dc[slot]);
                    self.last_dc[slot] = tmp;

                    write_coef(&mut self.huffw, v, 0, &self.dc_codes[slot])?;
                } else {
                    // fetch bit from current bitplane
                    self.huffw.write(((block[0] >> self.al) & 1) as u64, 1);
                }
            }
        } else {
            // copy the coefficients of the band and shift right by al
            let mut zz = [0i16; 64];
            for bpos in self.ss..=self.se {
                zz[usize::from(bpos)] = div_pow2(
                    blocks[0][usize::from(ZIGZAG_TO_RASTER[usize::from(bpos)])],
                    self.al,
                );
            }

            let actbl = &self.ac_codes[0];
            if self.ah == 0 {
                encode_ac_prg_fs(
                    &mut self.huffw,
                    actbl,
                    &zz,
                    &mut self.eobrun,
                    self.ss,
                    self.se,
                )?;
            } else {
                encode_ac_prg_sa(
                    &mut self.huffw,
                    actbl,
                    &zz,
                    &mut self.eobrun,
                    self.ss,
                    self.se,
                    &mut self.correction_bits,
                )?;
            }
        }

        Ok(())
    }

    fn emit_restart(&mut self, restart_num: u8) -> Result<()> {
        if self.progressive {
            self.flush_eobrun();
        }
        self.huffw.write_marker(jpeg_code::RST0 + (restart_num & 7));

        self.last_dc = [0; MAX_COMPS_IN_SCAN];
        self.eobrun = 0;
        Ok(())
    }

    fn finish_pass(&mut self) -> Result<()> {
        if self.progressive {
            self.flush_eobrun();
        }
        self.huffw.pad();

        if !self.huffw.has_no_remainder() {
            return err_exit_code(
                ExitCode::AssertionFailure,
                "shouldnt have a remainder after padding",
            );
        }
        Ok(())
    }

    fn take_output(&mut self, out: &mut Vec<u8>) {
        self.huffw.take_bytes(out);
    }
}

fn encode_block_seq(
    huffw: &mut BitWriter,
    dctbl: &HuffCodes,
    actbl: &HuffCodes,
    block: &[i16; 64],
) -> Result<()> {
    // encode DC
    write_coef(huffw, block[0], 0, dctbl)?;

    let mut z = 0;

    // encode AC
    for &tmp in &block[1..] {
        if tmp == 0 {
            z += 1;
            continue;
        }

        // if we have 16 or more zero, we need to write them in blocks of 16
        while z >= 16 {
            write_symbol(huffw, actbl, 0xF0)?;
            z -= 16;
        }

        write_coef(huffw, tmp, z, actbl)?;

        z = 0;
    }

    // write eob if needed
    if z != 0 {
        write_symbol(huffw, actbl, 0x00)?;
    }
    Ok(())
}

#[inline(always)]
fn write_symbol(huffw: &mut BitWriter, tbl: &HuffCodes, symbol: u8) -> Result<()> {
    if !tbl.has_symbol(symbol) {
        return err_exit_code(
            ExitCode::MissingTable,
            format!("huffman table has no code for symbol {0:#04x}", symbol),
        );
    }
    huffw.write(
        tbl.c_val[usize::from(symbol)].into(),
        tbl.c_len[usize::from(symbol)].into(),
    );
    Ok(())
}

/// encodes a coefficient which is a huffman code specifying the size followed
/// by the coefficient itself
#[inline(always)]
fn write_coef(huffw: &mut BitWriter, coef: i16, z: u8, tbl: &HuffCodes) -> Result<()> {
    // vli encode
    let (n, s) = envli(coef);
    if s > 15 {
        return err_exit_code(
            ExitCode::SyntaxError,
            format!("coefficient {0} is out of range", coef),
        );
    }
    let hc = usize::from(((z & 0xf) << 4) + s);

    if tbl.c_len[hc] == 0 {
        return err_exit_code(
            ExitCode::MissingTable,
            format!("huffman table has no code for symbol {0:#04x}", hc),
        );
    }

    // write to huffman writer (combine into single write)
    let val = (u64::from(tbl.c_val[hc]) << s) | u64::from(n);
    let new_bits = u32::from(tbl.c_len[hc]) + u32::from(s);
    huffw.write(val, new_bits);
    Ok(())
}

/// progressive AC encoding (first pass)
fn encode_ac_prg_fs(
    huffw: &mut BitWriter,
    actbl: &HuffCodes,
    block: &[i16; 64],
    eobrun: &mut u16,
    from: u8,
    to: u8,
) -> Result<()> {
    let mut z = 0;
    for bpos in from..=to {
        let tmp = block[usize::from(bpos)];
        if tmp != 0 {
            encode_eobrun(huffw, actbl, eobrun);

            while z >= 16 {
                write_symbol(huffw, actbl, 0xF0)?;
                z -= 16;
            }

            write_coef(huffw, tmp, z, actbl)?;

            z = 0;
        } else {
            z += 1;
        }
    }

    // check eob, increment eobrun if needed
    if z > 0 {
        *eobrun += 1;

        if *eobrun == actbl.max_eob_run {
            encode_eobrun(huffw, actbl, eobrun);
        }
    }

    Ok(())
}

/// progressive AC SA encoding subsequent pass
fn encode_ac_prg_sa(
    huffw: &mut BitWriter,
    actbl: &HuffCodes,
    block: &[i16; 64],
    eobrun: &mut u16,
    from: u8,
    to: u8,
    correction_bits: &mut Vec<u8>,
) -> Result<()> {
    // find the position after the last newly nonzero coefficient
    let eob = (from..=to)
        .rev()
        .find(|&bpos| block[usize::from(bpos)].abs() == 1)
        .map_or(from, |bpos| bpos + 1);

    // encode eobrun if needed
    if eob > from && *eobrun > 0 {
        encode_eobrun(huffw, actbl, eobrun);
        encode_crbits(huffw, correction_bits);
    }

    let mut z = 0;
    for bpos in from..eob {
        let tmp = block[usize::from(bpos)];
        if tmp == 0 {
            z += 1;
            if z == 16 {
                write_symbol(huffw, actbl, 0xF0)?;
                encode_crbits(huffw, correction_bits);
                z = 0;
            }
        } else if tmp == 1 || tmp == -1 {
            write_coef(huffw, tmp, z, actbl)?;
            encode_crbits(huffw, correction_bits);
            z = 0;
        } else {
            // already nonzero, only the correction bit is sent
            correction_bits.push((tmp & 0x1) as u8);
        }
    }

    // fast processing after eob
    for bpos in eob..=to {
        let tmp = block[usize::from(bpos)];
        if tmp != 0 {
            correction_bits.push((tmp & 0x1) as u8);
        }
    }

    if eob <= to {
        *eobrun += 1;

        if *eobrun == actbl.max_eob_run {
            encode_eobrun(huffw, actbl, eobrun);
            encode_crbits(huffw, correction_bits);
        }
    }

    Ok(())
}

/// encodes the eob run which consists of a huffman code the high 4 bits specifying the log2 of the run
/// followed by the number number encoded into the minimum number of bits
fn encode_eobrun(huffw: &mut BitWriter, actbl: &HuffCodes, eobrun: &mut u16) {
    if *eobrun > 0 {
        debug_assert!(*eobrun <= actbl.max_eob_run);

        let s = u16_bit_length(*eobrun) - 1;

        let n = encode_eobrun_bits(s, *eobrun);
        let hc = usize::from(s << 4);
        huffw.write(actbl.c_val[hc].into(), actbl.c_len[hc].into());
        huffw.write(u64::from(n), u32::from(s));
        *eobrun = 0;
    }
}

/// encodes the correction bits, which are simply encoded as a vector of single bit values
fn encode_crbits(huffw: &mut BitWriter, correction_bits: &mut Vec<u8>) {
    for x in correction_bits.drain(..) {
        huffw.write(u64::from(x), 1);
    }
}

/// divide power of 2 rounding towards zero
fn div_pow2(v: i16, p: u8) -> i16 {
    (if v < 0 { v + ((1 << p) - 1) } else { v }) >> p
}

/// prepares a coefficient for encoding. Calculates the bitlength s makes v positive by adding 1 << s  - 1 if the number is negative or zero
#[inline(always)]
fn envli(v: i16) -> (u16, u8) {
    if let Some(nz) = NonZeroI16::new(v) {
        let s = 16 - nz.unsigned_abs().leading_zeros();
        let mask = i32::from(nz.get() >> 15);

        // two's complement of s bits, so the writer never sees stray high bits
        let n = (i32::from(nz.get()) + (((1i32 << s) - 1) & mask)) as u16;

        debug_assert_eq!(
            n,
            if v > 0 {
                v as u16
            } else {
                (i32::from(v) - 1 + (1 << s)) as u16
            }
        );
        (n, s as u8)
    } else {
        (0, 0)
    }
}

/// encoding for eobrun length. Chop off highest bit since we know it is always 1.
fn encode_eobrun_bits(s: u8, v: u16) -> u16 {
    v - (1 << s)
}
