/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Quantization, Huffman and arithmetic conditioning tables keyed by selector.
//! Each slot remembers whether it has been written to a datastream already so an
//! encoder can skip retransmitting tables in abbreviated datastreams.

use crate::consts::{DCTSIZE2, NUM_ARITH_TBLS, NUM_HUFF_TBLS, NUM_QUANT_TBLS};
use crate::engine_error::{err_exit_code, ExitCode, Result};

/// Quantization table, values in natural (row-major) order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantTable {
    /// quantizer step sizes
    pub values: [u16; DCTSIZE2],
}

impl QuantTable {
    /// true if every entry fits in 8 bits, which is required for baseline
    pub fn is_8bit(&self) -> bool {
        self.values.iter().all(|&v| v <= 255)
    }

    /// Builds a table from one of the Annex K base tables scaled by a percentage
    /// as returned by `quality_scaling`.
    pub fn scaled(base: &[u16; DCTSIZE2], scale_factor: u32, force_baseline: bool) -> Self {
        let mut values = [0u16; DCTSIZE2];
        for (v, &b) in values.iter_mut().zip(base.iter()) {
            let mut temp = (u32::from(b) * scale_factor + 50) / 100;
            temp = temp.clamp(1, 32767);
            if force_baseline && temp > 255 {
                temp = 255;
            }
            *v = temp as u16;
        }
        QuantTable { values }
    }
}

/// Huffman table as transmitted in a DHT marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffTable {
    /// bits[k] = number of codes of length k, bits[0] is unused
    pub bits: [u8; 17],
    /// symbols in order of increasing code length
    pub huffval: Vec<u8>,
}

impl HuffTable {
    /// Creates a table from the code length counts and the symbols
    pub fn new(bits: [u8; 17], huffval: &[u8]) -> Self {
        HuffTable {
            bits,
            huffval: huffval.to_vec(),
        }
    }

    /// number of symbols declared by the length counts
    pub fn num_symbols(&self) -> usize {
        self.bits[1..].iter().map(|&b| usize::from(b)).sum()
    }
}

/// Which table family a selector refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// quantization table, selectors 0..4
    Quant,
    /// DC Huffman table, selectors 0..4
    DcHuff,
    /// AC Huffman table, selectors 0..4
    AcHuff,
    /// DC arithmetic conditioning (L and U packed as U<<4|L), selectors 0..16
    ArithDc,
    /// AC arithmetic conditioning (Kx), selectors 0..16
    ArithAc,
}

/// A table of any kind, used by the generic `define`
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    /// quantization table
    Quant(QuantTable),
    /// Huffman table
    Huff(HuffTable),
    /// arithmetic conditioning value
    Arith(u8),
}

#[derive(Debug, Clone)]
struct Slot<T> {
    table: Option<T>,
    sent: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot {
            table: None,
            sent: false,
        }
    }
}

impl<T> Slot<T> {
    fn define(&mut self, table: T) {
        self.table = Some(table);
        self.sent = false;
    }
}

/// Owner of every table of a compressor or decompressor instance. Tables survive
/// the end of a datastream and are carried into the next one.
#[derive(Debug, Clone, Default)]
pub struct TableManager {
    quant: [Slot<QuantTable>; NUM_QUANT_TBLS],
    dc_huff: [Slot<HuffTable>; NUM_HUFF_TBLS],
    ac_huff: [Slot<HuffTable>; NUM_HUFF_TBLS],
    arith_dc: [Slot<u8>; NUM_ARITH_TBLS],
    arith_ac: [Slot<u8>; NUM_ARITH_TBLS],
}

fn check_selector(kind: TableKind, selector: usize) -> Result<()> {
    let limit = match kind {
        TableKind::Quant => NUM_QUANT_TBLS,
        TableKind::DcHuff | TableKind::AcHuff => NUM_HUFF_TBLS,
        TableKind::ArithDc | TableKind::ArithAc => NUM_ARITH_TBLS,
    };
    if selector >= limit {
        return err_exit_code(
            ExitCode::SyntaxError,
            format!("{0:?} table selector {1} out of range", kind, selector),
        );
    }
    Ok(())
}

impl TableManager {
    /// Defines (or redefines) a table. Redefinition replaces the content and
    /// clears the sent flag.
    pub fn define(&mut self, kind: TableKind, selector: usize, table: Table) -> Result<()> {
        check_selector(kind, selector)?;
        match (kind, table) {
            (TableKind::Quant, Table::Quant(q)) => self.quant[selector].define(q),
            (TableKind::DcHuff, Table::Huff(h)) => self.dc_huff[selector].define(h),
            (TableKind::AcHuff, Table::Huff(h)) => self.ac_huff[selector].define(h),
            (TableKind::ArithDc, Table::Arith(a)) => self.arith_dc[selector].define(a),
            (TableKind::ArithAc, Table::Arith(a)) => self.arith_ac[selector].define(a),
            (kind, _) => {
                return err_exit_code(
                    ExitCode::SyntaxError,
                    format!("table content does not match kind {0:?}", kind),
                )
            }
        }
        Ok(())
    }

    /// Defines a quantization table.
    pub fn define_quant(&mut self, selector: usize, table: QuantTable) -> Result<()> {
        self.define(TableKind::Quant, selector, Table::Quant(table))
    }

    /// Defines a DC or AC Huffman table.
    pub fn define_huff(&mut self, kind: TableKind, selector: usize, table: HuffTable) -> Result<()> {
        self.define(kind, selector, Table::Huff(table))
    }

    /// Defines an arithmetic conditioning value for the DC or AC family.
    pub fn define_arith(&mut self, kind: TableKind, selector: usize, value: u8) -> Result<()> {
        self.define(kind, selector, Table::Arith(value))
    }

    /// Marks a table as already written to the output.
    pub fn mark_sent(&mut self, kind: TableKind, selector: usize) -> Result<()> {
        check_selector(kind, selector)?;
        if !self.is_defined(kind, selector) {
            return err_exit_code(
                ExitCode::MissingTable,
                format!("{0:?} table {1} not defined", kind, selector),
            );
        }
        *self.sent_flag(kind, selector) = true;
        Ok(())
    }

    fn sent_flag(&mut self, kind: TableKind, selector: usize) -> &mut bool {
        match kind {
            TableKind::Quant => &mut self.quant[selector].sent,
            TableKind::DcHuff => &mut self.dc_huff[selector].sent,
            TableKind::AcHuff => &mut self.ac_huff[selector].sent,
            TableKind::ArithDc => &mut self.arith_dc[selector].sent,
            TableKind::ArithAc => &mut self.arith_ac[selector].sent,
        }
    }

    /// True if the table was written since it was last defined.
    pub fn is_sent(&self, kind: TableKind, selector: usize) -> bool {
        match kind {
            TableKind::Quant => self.quant.get(selector).map_or(false, |s| s.sent),
            TableKind::DcHuff => self.dc_huff.get(selector).map_or(false, |s| s.sent),
            TableKind::AcHuff => self.ac_huff.get(selector).map_or(false, |s| s.sent),
            TableKind::ArithDc => self.arith_dc.get(selector).map_or(false, |s| s.sent),
            TableKind::ArithAc => self.arith_ac.get(selector).map_or(false, |s| s.sent),
        }
    }

    /// True if the selector holds a table.
    pub fn is_defined(&self, kind: TableKind, selector: usize) -> bool {
        match kind {
            TableKind::Quant => self.quant.get(selector).map_or(false, |s| s.table.is_some()),
            TableKind::DcHuff => self.dc_huff.get(selector).map_or(false, |s| s.table.is_some()),
            TableKind::AcHuff => self.ac_huff.get(selector).map_or(false, |s| s.table.is_some()),
            TableKind::ArithDc => self.arith_dc.get(selector).map_or(false, |s| s.table.is_some()),
            TableKind::ArithAc => self.arith_ac.get(selector).map_or(false, |s| s.table.is_some()),
        }
    }

    /// Sets the sent flag of every defined table. `suppress_tables(true)` makes the
    /// next datastream omit all tables, `suppress_tables(false)` forces them all out.
    pub fn suppress_tables(&mut self, suppress: bool) {
        for s in self.quant.iter_mut().filter(|s| s.table.is_some()) {
            s.sent = suppress;
        }
        for s in self.dc_huff.iter_mut().filter(|s| s.table.is_some()) {
            s.sent = suppress;
        }
        for s in self.ac_huff.iter_mut().filter(|s| s.table.is_some()) {
            s.sent = suppress;
        }
        for s in self.arith_dc.iter_mut().filter(|s| s.table.is_some()) {
            s.sent = suppress;
        }
        for s in self.arith_ac.iter_mut().filter(|s| s.table.is_some()) {
            s.sent = suppress;
        }
    }

    /// Quantization table for a selector
    pub fn quant(&self, selector: usize) -> Option<&QuantTable> {
        self.quant.get(selector).and_then(|s| s.table.as_ref())
    }

    /// DC or AC Huffman table for a selector
    pub fn huff(&self, kind: TableKind, selector: usize) -> Option<&HuffTable> {
        match kind {
            TableKind::DcHuff => self.dc_huff.get(selector).and_then(|s| s.table.as_ref()),
            TableKind::AcHuff => self.ac_huff.get(selector).and_then(|s| s.table.as_ref()),
            _ => None,
        }
    }

    /// Arithmetic conditioning value for a selector
    pub fn arith(&self, kind: TableKind, selector: usize) -> Option<u8> {
        match kind {
            TableKind::ArithDc => self.arith_dc.get(selector).and_then(|s| s.table),
            TableKind::ArithAc => self.arith_ac.get(selector).and_then(|s| s.table),
            _ => None,
        }
    }

    /// Installs the Annex K Huffman tables: selector 0 luminance, selector 1 chrominance.
    pub fn set_std_huff_tables(&mut self) -> Result<()> {
        self.define_huff(
            TableKind::DcHuff,
            0,
            HuffTable::new(DC_LUMINANCE_BITS, &DC_LUMINANCE_VALUES),
        )?;
        self.define_huff(
            TableKind::AcHuff,
            0,
            HuffTable::new(AC_LUMINANCE_BITS, &AC_LUMINANCE_VALUES),
        )?;
        self.define_huff(
            TableKind::DcHuff,
            1,
            HuffTable::new(DC_CHROMINANCE_BITS, &DC_CHROMINANCE_VALUES),
        )?;
        self.define_huff(
            TableKind::AcHuff,
            1,
            HuffTable::new(AC_CHROMINANCE_BITS, &AC_CHROMINANCE_VALUES),
        )
    }

    /// Installs the Annex K quantization tables scaled to a 1..=100 quality:
    /// selector 0 luminance, selector 1 chrominance.
    pub fn set_quality(&mut self, quality: u32, force_baseline: bool) -> Result<()> {
        let scale = quality_scaling(quality);
        self.define_quant(
            0,
            QuantTable::scaled(&STD_LUMINANCE_QUANT_TBL, scale, force_baseline),
        )?;
        self.define_quant(
            1,
            QuantTable::scaled(&STD_CHROMINANCE_QUANT_TBL, scale, force_baseline),
        )
    }
}

/// Converts a 1..100 quality rating into a percentage scaling of the base tables.
/// 50 gives the tables as published, 100 gives all ones.
pub fn quality_scaling(quality: u32) -> u32 {
    let quality = quality.clamp(1, 100);
    if quality < 50 {
        5000 / quality
    } else {
        200 - quality * 2
    }
}

pub const STD_LUMINANCE_QUANT_TBL: [u16; DCTSIZE2] = [
    16, 11, 10, 16, 24, 40, 51, 61, 12, 12, 14, 19, 26, 58, 60, 55, 14, 13, 16, 24, 40, 57, 69,
    56, 14, 17, 22, 29, 51, 87, 80, 62, 18, 22, 37, 56, 68, 109, 103, 77, 24, 35, 55, 64, 81,
    104, 113, 92, 49, 64, 78, 87, 103, 121, 120, 101, 72, 92, 95, 98, 112, 100, 103, 99,
];

pub const STD_CHROMINANCE_QUANT_TBL: [u16; DCTSIZE2] = [
    17, 18, 24, 47, 99, 99, 99, 99, 18, 21, 26, 66, 99, 99, 99, 99, 24, 26, 56, 99, 99, 99, 99,
    99, 47, 66, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99,
];

const DC_LUMINANCE_BITS: [u8; 17] = [0, 0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const DC_LUMINANCE_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const DC_CHROMINANCE_BITS: [u8; 17] = [0, 0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const DC_CHROMINANCE_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const AC_LUMINANCE_BITS: [u8; 17] = [0, 0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];
const AC_LUMINANCE_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

const AC_CHROMINANCE_BITS: [u8; 17] = [0, 0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
const AC_CHROMINANCE_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redefine_clears_sent() {
        let mut tm = TableManager::default();
        assert!(!tm.is_defined(TableKind::Quant, 0));
        assert!(tm.mark_sent(TableKind::Quant, 0).is_err());

        tm.set_quality(75, true).unwrap();
        tm.mark_sent(TableKind::Quant, 0).unwrap();
        assert!(tm.is_sent(TableKind::Quant, 0));
        assert!(!tm.is_sent(TableKind::Quant, 1));

        tm.define_quant(0, QuantTable { values: [1; 64] }).unwrap();
        assert!(!tm.is_sent(TableKind::Quant, 0));
        assert_eq!(tm.quant(0).unwrap().values[10], 1);
    }

    #[test]
    fn suppress_only_touches_defined() {
        let mut tm = TableManager::default();
        tm.set_std_huff_tables().unwrap();
        tm.suppress_tables(true);
        assert!(tm.is_sent(TableKind::DcHuff, 0));
        assert!(tm.is_sent(TableKind::AcHuff, 1));
        assert!(!tm.is_sent(TableKind::DcHuff, 2));
        assert!(!tm.is_defined(TableKind::DcHuff, 2));

        tm.suppress_tables(false);
        assert!(!tm.is_sent(TableKind::AcHuff, 1));
    }

    #[test]
    fn bad_selector_or_kind() {
        let mut tm = TableManager::default();
        assert_eq!(
            tm.define_quant(4, QuantTable { values: [1; 64] })
                .unwrap_err()
                .exit_code(),
            ExitCode::SyntaxError
        );
        assert!(tm
            .define(TableKind::Quant, 0, Table::Arith(3))
            .is_err());
        tm.define(TableKind::ArithAc, 15, Table::Arith(5)).unwrap();
        assert_eq!(tm.arith(TableKind::ArithAc, 15), Some(5));
    }

    #[test]
    fn std_tables_are_consistent() {
        let mut tm = TableManager::default();
        tm.set_std_huff_tables().unwrap();
        for kind in [TableKind::DcHuff, TableKind::AcHuff] {
            for sel in 0..2 {
                let t = tm.huff(kind, sel).unwrap();
                assert_eq!(t.num_symbols(), t.huffval.len());
            }
        }

        assert_eq!(quality_scaling(50), 100);
        assert_eq!(quality_scaling(75), 50);
        let q = QuantTable::scaled(&STD_LUMINANCE_QUANT_TBL, quality_scaling(75), true);
        assert_eq!(q.values[0], 8);
        assert!(q.is_8bit());
    }
}
