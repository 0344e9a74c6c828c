/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

pub struct BitWriter {
    data_buffer: Vec<u8>,
    fill_register: u64,
    current_bit: u32,
}

// use to write varying sized bits for coding JPEG. Escapes 0xff -> [0xff,0]
impl BitWriter {
    pub fn new(capacity: usize) -> Self {
        return BitWriter {
            current_bit: 64,
            fill_register: 0,
            data_buffer: Vec::<u8>::with_capacity(capacity),
        };
    }

    #[inline(never)]
    fn flush_bytes_slowly(&mut self) {
        let mut tmp_current_bit = self.current_bit;
        let mut tmp_fill_register = self.fill_register;

        while tmp_current_bit <= 56 {
            let b = (tmp_fill_register >> 56) as u8;
            if b != 0xff {
                self.data_buffer.push(b);
            } else {
                // escape 0xff here to avoid multiple scans of the same data
                self.data_buffer.extend_from_slice(&[0xff, 0]);
            }

            tmp_fill_register <<= 8;
            tmp_current_bit += 8;
        }

        self.fill_register = tmp_fill_register;
        self.current_bit = tmp_current_bit;
    }

    #[inline(always)]
    pub fn write(&mut self, mut val: u64, mut new_bits: u32) {
        debug_assert!(new_bits <= 64, "new_bits {0} should be <= 64", new_bits);
        debug_assert!(
            new_bits == 64 || val < (1 << new_bits),
            "value {0} should fit into the number of {1} bits provided",
            val,
            new_bits
        );

        // first see if everything fits in the current register
        if new_bits <= self.current_bit {
            self.fill_register |= val.wrapping_shl(self.current_bit - new_bits); // support corner case where new_bits is zero, we don't want to panic
            self.current_bit = self.current_bit - new_bits;
        } else {
            // if not, fill up the register so to the 64 bit boundary we can flush it hopefully without any 0xff bytes
            let fill = self.fill_register | val.wrapping_shr(new_bits - self.current_bit);

            new_bits -= self.current_bit;
            val &= (1 << new_bits) - 1;

            // flush bytes slowly if we have any 0xff bytes
            if (fill & 0x8080808080808080 & !fill.wrapping_add(0x0101010101010101)) != 0 {
                self.fill_register = fill;
                self.current_bit = 0;
                self.flush_bytes_slowly();
            } else {
                self.data_buffer.extend_from_slice(&fill.to_be_bytes());
            }
            self.fill_register = val.wrapping_shl(64 - new_bits); // support corner case where new_bits is zero, we don't want to panic
            self.current_bit = 64 - new_bits;
        }
    }

    /// pads the last partial byte with 1 bits
    pub fn pad(&mut self) {
        let remainder = self.current_bit & 7;
        if remainder != 0 {
            self.write((1 << remainder) - 1, remainder);
        }

        self.flush_bytes_slowly();

        debug_assert!(
            self.current_bit == 64,
            "there should be no remainder after padding"
        );
    }

    /// Pads and then writes a marker without escaping. Used for restart markers
    /// inside entropy coded data.
    pub fn write_marker(&mut self, code: u8) {
        self.pad();
        self.data_buffer.extend_from_slice(&[0xff, code]);
    }

    /// moves the completed (escaped) bytes into `out`
    pub fn take_bytes(&mut self, out: &mut Vec<u8>) {
        // flush any remaining whole bytes
        self.flush_bytes_slowly();

        out.extend_from_slice(&self.data_buffer[..]);

        self.data_buffer.clear();
    }

    pub fn has_no_remainder(&self) -> bool {
        return self.current_bit == 64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::u16_bit_length;
    use crate::jpeg::bit_reader::{BitReader, BitState};

    // write a test pattern with an escape and see if it matches
    #[test]
    fn write_simple() {
        let arr = [0x12u8, 0x34, 0x45, 0x67, 0x89, 0xff, 00, 0xee];

        let mut b = BitWriter::new(64);

        b.write(1, 4);
        b.write(2, 4);
        b.write(3, 4);
        b.write(4, 4);
        b.write(4, 4);
        b.write(0x56, 8);
        b.write(0x78, 8);
        b.write(0x9f, 8);
        b.write(0xfe, 8);
        b.write(0xe, 4);

        let mut w = Vec::new();
        b.take_bytes(&mut w);

        assert_eq!(w[..], arr);
        assert!(b.has_no_remainder());
    }

    #[test]
    fn pad_with_ones_then_marker() {
        let mut b = BitWriter::new(64);
        b.write(0, 3);
        b.write_marker(0xd3);

        let mut w = Vec::new();
        b.take_bytes(&mut w);
        assert_eq!(w, [0x1f, 0xff, 0xd3]);
    }

    /// verify the the bits roundtrip correctly with random bits
    #[test]
    fn roundtrip_randombits() {
        use rand::Rng;

        const ITERATIONS: usize = 10000;

        let mut rng = crate::helpers::get_rand_from_seed([0u8; 32]);
        let mut test_data = Vec::with_capacity(ITERATIONS);

        for _ in 0..ITERATIONS {
            let bits = rng.gen_range(0..=16);
            let v = rng.gen_range(0..=65535) & ((1 << bits) - 1);
            test_data.push((v as u16, bits as u32));
        }

        let mut buf = Vec::new();
        let mut b = BitWriter::new(1024);
        for i in &test_data {
            b.write(u64::from(i.0), i.1);

            // randomly flush the buffer
            if rng.gen_range(0..50) == 0 {
                b.take_bytes(&mut buf);
            }
        }
        b.pad();
        b.take_bytes(&mut buf);

        let mut r = BitReader::new(&buf, BitState::default(), false, true);
        for i in &test_data {
            assert_eq!(Ok(i.0), r.read(i.1));
        }
        assert_eq!(r.zero_fill(), None);

        assert_eq!(u16_bit_length(2047), 11);
    }
}
