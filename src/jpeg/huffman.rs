/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Derived Huffman tables. `HuffCodes` is what the encoder uses to emit symbols,
//! `HuffTree` is the decode tree with an 8 bit lookahead table.

use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::jpeg::tables::HuffTable;

#[derive(Copy, Clone, Debug)]
pub struct HuffCodes {
    pub c_val: [u16; 256],
    pub c_len: [u16; 256],
    pub max_eob_run: u16,
}

impl Default for HuffCodes {
    fn default() -> Self {
        HuffCodes {
            c_val: [0; 256],
            c_len: [0; 256],
            max_eob_run: 0,
        }
    }
}

impl HuffCodes {
    /// Assigns canonical codes to the symbols of a DHT style table.
    ///
    /// Symbol-value of code is its position in the table, codes of each length
    /// are consecutive and the first code of length n+1 is (last code of length n + 1) << 1.
    pub fn construct(table: &HuffTable) -> Result<Self> {
        let mut hc = HuffCodes::default();

        if table.num_symbols() > table.huffval.len() || table.num_symbols() > 256 {
            return err_exit_code(
                ExitCode::BadMarker,
                "huffman table declares more symbols than it holds",
            );
        }

        let mut k = 0;
        let mut code: u32 = 0;

        for len in 1..=16u16 {
            for _ in 0..table.bits[usize::from(len)] {
                if code >= (1u32 << len) {
                    return err_exit_code(
                        ExitCode::BadMarker,
                        "invalid huffman code layout, too many codes for a given length",
                    );
                }

                let symbol = usize::from(table.huffval[k]);
                hc.c_len[symbol] = len;
                hc.c_val[symbol] = code as u16;

                k += 1;
                code += 1;
            }

            code <<= 1;
        }

        hc.post_initialize();

        Ok(hc)
    }

    fn post_initialize(&mut self) {
        // find out eobrun (runs of all zero blocks) max value. This is used encoding progressive files.
        //
        // G.1.2.2 reserves 15 huffman symbols for encoding long runs of up to 32767 empty
        // blocks. Figure out the largest run this table can express so we never exceed it.
        self.max_eob_run = 0;

        let mut i: i32 = 14;
        while i >= 0 {
            if self.c_len[((i << 4) & 0xff) as usize] > 0 {
                self.max_eob_run = ((2 << i) - 1) as u16;
                break;
            }

            i -= 1;
        }
    }

    /// true if the table can encode the symbol
    pub fn has_symbol(&self, symbol: u8) -> bool {
        self.c_len[usize::from(symbol)] > 0
    }
}

#[derive(Copy, Clone, Debug)]
pub struct HuffTree {
    pub node: [[u16; 2]; 256],
    pub peek_code: [(u8, u8); 256],
}

impl Default for HuffTree {
    fn default() -> Self {
        HuffTree {
            node: [[0; 2]; 256],
            peek_code: [(0, 0); 256],
        }
    }
}

#[inline(always)]
fn bitn(c: u16, n: u16) -> u16 {
    (c >> n) & 0x1
}

impl HuffTree {
    /// construct the huffman tree codes from the HuffCodes as a source
    pub fn construct_hufftree(hc: &HuffCodes) -> Result<Self> {
        let mut ht = HuffTree::default();

        // initial value for next free place, node 0 is the root
        let mut nextfree = 1;
        for i in 0..256 {
            // reset current node
            let mut node = 0;

            // go through each code & store path
            if hc.c_len[i] > 0 {
                let mut j = hc.c_len[i] - 1;
                while j > 0 {
                    if node > 0xff {
                        return err_exit_code(ExitCode::BadMarker, "Huffman table out of space");
                    }

                    let branch = usize::from(bitn(hc.c_val[i], j));
                    if ht.node[node][branch] == 0 {
                        ht.node[node][branch] = nextfree;
                        nextfree += 1;
                    }
                    node = usize::from(ht.node[node][branch]);

                    j -= 1;
                }

                if node > 0xff {
                    return err_exit_code(ExitCode::BadMarker, "Huffman table out of space");
                }

                // last link is number of targetvalue + 256
                ht.node[node][usize::from(bitn(hc.c_val[i], 0))] = (i + 256) as u16;
            }
        }

        // every illegal code gets 0xffff so a corrupt stream ends the walk instead of looping
        for x in &mut ht.node {
            if x[0] == 0 {
                x[0] = 0xffff;
            }
            if x[1] == 0 {
                x[1] = 0xffff;
            }
        }

        // precalculate decoding peeking into the stream. This lets us quickly decode
        // small code without jumping through the node table
        for peekbyte in 0..256 {
            let mut node = 0;
            let mut len: u8 = 0;

            while node < 256 && len <= 7 {
                node = ht.node[usize::from(node)][(peekbyte >> (7 - len)) & 0x1];

                len += 1;
            }

            if node == 0xffff || node < 256 {
                // invalid code or code was too long to fit, take the long path
                ht.peek_code[peekbyte] = (0, 0xff);
            } else {
                ht.peek_code[peekbyte] = ((node - 256) as u8, len);
            }
        }
        Ok(ht)
    }

    /// builds the decode tree straight from a table
    pub fn from_table(table: &HuffTable) -> Result<Self> {
        Self::construct_hufftree(&HuffCodes::construct(table)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::tables::{TableKind, TableManager};

    #[test]
    fn std_tables_build() {
        let mut tm = TableManager::default();
        tm.set_std_huff_tables().unwrap();

        let dc = HuffCodes::construct(tm.huff(TableKind::DcHuff, 0).unwrap()).unwrap();
        // category 0 is the 2 bit code 00 in the luminance DC table
        assert_eq!((dc.c_val[0], dc.c_len[0]), (0, 2));
        assert_eq!((dc.c_val[11], dc.c_len[11]), (0x1fe, 9));

        let ac = HuffCodes::construct(tm.huff(TableKind::AcHuff, 0).unwrap()).unwrap();
        // EOB is 1010, the only EOB run symbol is EOB itself
        assert_eq!((ac.c_val[0], ac.c_len[0]), (0b1010, 4));
        assert_eq!(ac.max_eob_run, 1);
        assert!(ac.has_symbol(0xf0));

        let tree = HuffTree::construct_hufftree(&ac).unwrap();
        // 1010xxxx peeks as EOB
        assert_eq!(tree.peek_code[0b1010_0110], (0, 4));
        // 16 bit codes don't fit in the peek table
        assert_eq!(tree.peek_code[0xff].1, 0xff);
    }

    #[test]
    fn overfull_table_rejected() {
        let mut bits = [0u8; 17];
        bits[1] = 3;
        let t = HuffTable::new(bits, &[1, 2, 3]);
        assert_eq!(
            HuffCodes::construct(&t).unwrap_err().exit_code(),
            ExitCode::BadMarker
        );
    }
}
