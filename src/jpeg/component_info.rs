/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::helpers::round_up;
use crate::jpeg::tables::QuantTable;

/// One color channel of the frame. The identity, sampling factors and block grid are
/// fixed once the frame header has been parsed or configured, the per-scan fields are
/// rewritten every time the component takes part in a scan.
#[derive(Debug, Clone, Default)]
pub struct ComponentInfo {
    /// identifier as written in the frame header
    pub component_id: u8,

    /// position of the component in the frame header
    pub component_index: usize,

    /// sample factor horizontal
    pub h_samp_factor: u8,

    /// sample factor vertical
    pub v_samp_factor: u8,

    /// quantization table selector
    pub quant_tbl_no: u8,

    /// DC entropy table selector, taken from the current scan
    pub dc_tbl_no: u8,

    /// AC entropy table selector, taken from the current scan
    pub ac_tbl_no: u8,

    /// block count horizontal, excluding padding
    pub width_in_blocks: u32,

    /// block count vertical, excluding padding
    pub height_in_blocks: u32,

    /// size of a block after scaled inverse transform, 1..=16
    pub dct_h_scaled_size: u32,

    /// size of a block after scaled inverse transform, 1..=16
    pub dct_v_scaled_size: u32,

    /// actual width of the component in samples after scaling
    pub downsampled_width: u32,

    /// actual height of the component in samples after scaling
    pub downsampled_height: u32,

    /// false if the caller doesn't want this component's output
    pub component_needed: bool,

    /// number of blocks per MCU horizontally in the current scan
    pub mcu_width: u32,

    /// number of blocks per MCU vertically in the current scan
    pub mcu_height: u32,

    /// mcu_width * mcu_height
    pub mcu_blocks: u32,

    /// MCU width in samples, mcu_width * dct_h_scaled_size
    pub mcu_sample_width: u32,

    /// number of genuine blocks in the last MCU column
    pub last_col_width: u32,

    /// number of genuine blocks in the last MCU row
    pub last_row_height: u32,

    /// quantization table as it was when the component first appeared in a scan
    pub quant_table: Option<QuantTable>,
}

impl ComponentInfo {
    /// row length of the coefficient array, a whole number of MCUs wide
    pub fn padded_width_in_blocks(&self) -> u32 {
        round_up(self.width_in_blocks, u32::from(self.h_samp_factor))
    }

    /// number of block rows of the coefficient array, a whole number of iMCU rows
    pub fn padded_height_in_blocks(&self) -> u32 {
        round_up(self.height_in_blocks, u32::from(self.v_samp_factor))
    }

    /// number of genuine block rows inside a given iMCU row
    pub fn block_rows_in_imcu_row(&self, imcu_row: u32) -> u32 {
        let v = u32::from(self.v_samp_factor);
        let start = imcu_row * v;
        if start >= self.height_in_blocks {
            0
        } else {
            (self.height_in_blocks - start).min(v)
        }
    }
}

#[test]
fn padding_rounds_to_sampling_factor() {
    let c = ComponentInfo {
        h_samp_factor: 2,
        v_samp_factor: 2,
        width_in_blocks: 5,
        height_in_blocks: 3,
        ..Default::default()
    };

    assert_eq!(c.padded_width_in_blocks(), 6);
    assert_eq!(c.padded_height_in_blocks(), 4);
    assert_eq!(c.block_rows_in_imcu_row(0), 2);
    assert_eq!(c.block_rows_in_imcu_row(1), 1);
    assert_eq!(c.block_rows_in_imcu_row(2), 0);
}
