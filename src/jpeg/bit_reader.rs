/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::jpeg::huffman::HuffTree;

/// Returned when the bytes buffered so far don't hold enough bits. Nothing that was
/// read through the reader should be committed in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedData;

/// Why zero bits had to be invented to satisfy a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroFill {
    /// a marker is sitting in the entropy coded data
    Marker,
    /// the source has no more data and never will
    EndOfData,
}

/// Bit register carried between MCUs, so a reader over a new slice can pick up
/// where the last one stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitState {
    pub bits: u64,
    pub bits_left: u32,
}

/// Bit reader over the entropy coded bytes currently buffered. 0xFF 0x00 is unstuffed,
/// anything else after 0xFF is a marker that stops the reader without being consumed.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bits: u64,
    bits_left: u32,
    marker_ahead: bool,
    at_end: bool,
    zero_fill: Option<ZeroFill>,
}

impl<'a> BitReader<'a> {
    /// `marker_pending` is set when the input already pulled a marker out of the stream,
    /// `at_end` when the source will never deliver more than `data`.
    pub fn new(data: &'a [u8], state: BitState, marker_pending: bool, at_end: bool) -> Self {
        BitReader {
            data,
            pos: 0,
            bits: state.bits,
            bits_left: state.bits_left,
            marker_ahead: marker_pending,
            at_end,
            zero_fill: None,
        }
    }

    /// number of bytes taken from the slice
    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn state(&self) -> BitState {
        BitState {
            bits: self.bits,
            bits_left: self.bits_left,
        }
    }

    /// set if any zero bits had to be invented
    pub fn zero_fill(&self) -> Option<ZeroFill> {
        self.zero_fill
    }

    /// loads as many whole bytes as fit, stopping in front of a marker
    #[inline(always)]
    fn fill(&mut self) {
        while self.bits_left <= 56 && !self.marker_ahead {
            let b = match self.data.get(self.pos) {
                Some(&b) => b,
                None => break,
            };

            if b != 0xff {
                self.bits = (self.bits << 8) | u64::from(b);
                self.bits_left += 8;
                self.pos += 1;
            } else {
                // 0xff is an escape code, if the next byte is zero, then it is just a normal 0xff
                match self.data.get(self.pos + 1) {
                    None => break,
                    Some(0) => {
                        self.bits = (self.bits << 8) | 0xff;
                        self.bits_left += 8;
                        self.pos += 2;
                    }
                    Some(_) => {
                        self.marker_ahead = true;
                    }
                }
            }
        }
    }

    #[cold]
    fn pad_with_zeros(&mut self, bits_needed: u32) -> Result<(), NeedData> {
        let reason = if self.marker_ahead {
            ZeroFill::Marker
        } else if self.at_end {
            ZeroFill::EndOfData
        } else {
            return Err(NeedData);
        };

        while self.bits_left < bits_needed {
            self.bits <<= 8;
            self.bits_left += 8;
        }
        if self.zero_fill.is_none() {
            self.zero_fill = Some(reason);
        }
        Ok(())
    }

    #[inline(always)]
    fn ensure(&mut self, bits_needed: u32) -> Result<(), NeedData> {
        if self.bits_left < bits_needed {
            self.fill();
            if self.bits_left < bits_needed {
                self.pad_with_zeros(bits_needed)?;
            }
        }
        Ok(())
    }

    #[inline(always)]
    pub fn read(&mut self, bits_to_read: u32) -> Result<u16, NeedData> {
        if bits_to_read == 0 {
            return Ok(0);
        }

        self.ensure(bits_to_read)?;

        let retval =
            (self.bits >> (self.bits_left - bits_to_read) & ((1 << bits_to_read) - 1)) as u16;
        self.bits_left -= bits_to_read;
        Ok(retval)
    }

    /// Decodes the next Huffman symbol. `None` means the bits don't form a valid code,
    /// in which case the walk stops on the bit that made it invalid.
    #[inline(always)]
    pub fn decode(&mut self, tree: &HuffTree) -> Result<Option<u8>, NeedData> {
        if self.bits_left < 8 {
            self.fill();
        }

        if self.bits_left >= 8 {
            // use lookup table to figure out the first code in this byte and how long it is
            let peek = ((self.bits >> (self.bits_left - 8)) & 0xff) as usize;
            let (code, code_len) = tree.peek_code[peek];
            if code_len <= 8 {
                self.bits_left -= u32::from(code_len);
                return Ok(Some(code));
            }
        }

        // take slow path since the code is longer than 8 bits or we are close to a marker
        let mut node: u16 = 0;
        loop {
            let bit = self.read(1)?;
            node = tree.node[usize::from(node)][usize::from(bit)];
            if node == 0xffff {
                return Ok(None);
            }
            if node >= 256 {
                return Ok(Some((node - 256) as u8));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstuffs_and_stops_at_marker() {
        let data = [0x12, 0xff, 0x00, 0x34, 0xff, 0xd0, 0x56];
        let mut r = BitReader::new(&data, BitState::default(), false, false);
        assert_eq!(r.read(8), Ok(0x12));
        assert_eq!(r.read(8), Ok(0xff));
        assert_eq!(r.read(4), Ok(0x3));
        assert_eq!(r.read(4), Ok(0x4));
        assert_eq!(r.zero_fill(), None);

        // past the marker everything reads as zero
        assert_eq!(r.read(16), Ok(0));
        assert_eq!(r.zero_fill(), Some(ZeroFill::Marker));
        assert_eq!(r.consumed(), 4);
    }

    #[test]
    fn suspends_without_data() {
        let data = [0xab, 0xff];
        let mut r = BitReader::new(&data, BitState::default(), false, false);
        assert_eq!(r.read(8), Ok(0xab));
        // a trailing 0xff could still be a marker or a stuffed byte
        assert_eq!(r.read(1), Err(NeedData));

        let mut r = BitReader::new(&data[..1], BitState::default(), false, true);
        assert_eq!(r.read(12), Ok(0xab0));
        assert_eq!(r.zero_fill(), Some(ZeroFill::EndOfData));
    }

    #[test]
    fn state_carries_over() {
        let data = [0b1011_0110];
        let mut r = BitReader::new(&data, BitState::default(), false, false);
        assert_eq!(r.read(3), Ok(0b101));
        let state = r.state();
        let consumed = r.consumed();

        let mut r = BitReader::new(&data[consumed..], state, false, false);
        assert_eq!(r.read(5), Ok(0b10110));
        assert_eq!(r.read(1), Err(NeedData));
    }
}
