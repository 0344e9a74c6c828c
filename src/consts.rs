/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/// Number of coefficients in a block
pub const DCTSIZE2: usize = 64;

/// Side of a block in samples
pub const DCTSIZE: u32 = 8;

/// Quantization tables are numbered 0..NUM_QUANT_TBLS-1
pub const NUM_QUANT_TBLS: usize = 4;

/// Huffman tables are numbered 0..NUM_HUFF_TBLS-1
pub const NUM_HUFF_TBLS: usize = 4;

/// Arithmetic-coding conditioning tables are numbered 0..NUM_ARITH_TBLS-1
pub const NUM_ARITH_TBLS: usize = 16;

/// JPEG limit on number of components in one scan
pub const MAX_COMPS_IN_SCAN: usize = 4;

/// JPEG limit on sampling factors
pub const MAX_SAMP_FACTOR: u8 = 4;

/// JPEG limit on number of blocks in an MCU (same for compression and decompression)
pub const MAX_BLOCKS_IN_MCU: usize = 10;

/// Limit on the number of components in a frame
pub const MAX_COMPONENTS: usize = 10;

/// Largest image dimension the marker format can express
pub const JPEG_MAX_DIMENSION: u32 = 65500;

/// Sentinel in the refinement state for a coefficient no scan has touched yet
pub const COEF_BITS_UNTOUCHED: i8 = -1;

pub const RASTER_TO_ZIGZAG: [u8; 64] = [
    0, 1, 5, 6, 14, 15, 27, 28, 2, 4, 7, 13, 16, 26, 29, 42, 3, 8, 12, 17, 25, 30, 41, 43, 9, 11,
    18, 24, 31, 40, 44, 53, 10, 19, 23, 32, 39, 45, 52, 54, 20, 22, 33, 38, 46, 51, 55, 60, 21, 34,
    37, 47, 50, 56, 59, 61, 35, 36, 48, 49, 57, 58, 62, 63,
];

/// maps a zigzag index (the order coefficients appear in the bitstream) to the
/// natural row-major position inside a block
pub const ZIGZAG_TO_RASTER: [u8; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

#[test]
fn zigzag_tables_are_inverse() {
    for i in 0..64 {
        assert_eq!(RASTER_TO_ZIGZAG[ZIGZAG_TO_RASTER[i] as usize] as usize, i);
    }
}
