/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Moves coefficient blocks between the virtual arrays and the MCUs of a scan,
//! and keeps track of where inside the scan the controller currently is.

use log::debug;

use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::jpeg::component_info::ComponentInfo;
use crate::jpeg::frame::FrameHeader;
use crate::jpeg::scan::ScanLayout;
use crate::jpeg::Block;
use crate::memory::memory_manager::{MemoryManager, VirtBarrayHandle};
use crate::memory::pool::PoolId;

/// used to keep track of the position inside a scan while encoding or decoding
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanCursor {
    /// iMCU row being processed
    pub imcu_row: u32,

    /// MCU row within the iMCU row
    pub mcu_vert_offset: u32,

    /// MCU within the MCU row
    pub mcu_ctr: u32,

    /// MCUs left until the next restart marker
    restarts_to_go: u32,

    /// number of the next RSTn, 0..7
    next_restart_num: u8,
}

impl ScanCursor {
    pub fn new(layout: &ScanLayout) -> Self {
        ScanCursor {
            restarts_to_go: layout.restart_interval,
            ..Default::default()
        }
    }

    /// true if a restart marker precedes the next MCU
    pub fn restart_due(&self, layout: &ScanLayout) -> bool {
        layout.restart_interval > 0 && self.restarts_to_go == 0
    }

    pub fn next_restart_num(&self) -> u8 {
        self.next_restart_num
    }

    /// starts a new restart interval
    pub fn restart_done(&mut self, layout: &ScanLayout) {
        self.restarts_to_go = layout.restart_interval;
        self.next_restart_num = (self.next_restart_num + 1) & 7;
    }

    /// advances past one MCU, returns false at the end of the MCU row
    pub fn mcu_done(&mut self, layout: &ScanLayout) -> bool {
        if layout.restart_interval > 0 {
            self.restarts_to_go = self.restarts_to_go.saturating_sub(1);
        }
        self.mcu_ctr += 1;
        self.mcu_ctr < layout.mcus_per_row
    }

    /// advances past one MCU row, returns false at the end of the iMCU row
    pub fn mcu_row_done(&mut self, frame: &FrameHeader, layout: &ScanLayout) -> bool {
        self.mcu_ctr = 0;
        self.mcu_vert_offset += 1;
        self.mcu_vert_offset < layout.mcu_rows_in_imcu_row(frame, self.imcu_row)
    }

    /// advances to the next iMCU row, returns false at the end of the scan
    pub fn imcu_row_done(&mut self, frame: &FrameHeader) -> bool {
        self.mcu_ctr = 0;
        self.mcu_vert_offset = 0;
        self.imcu_row += 1;
        self.imcu_row < frame.total_imcu_rows
    }
}

/// Block arrays of every component. Full image arrays hold every iMCU row, single
/// row arrays only hold the iMCU row being worked on and are reused for each row.
pub struct CoefArrays {
    handles: Vec<VirtBarrayHandle>,
    full_image: bool,
}

impl CoefArrays {
    /// Requests one array per component. The caller realizes them together with
    /// any other arrays of the datastream.
    pub fn request(mem: &mut MemoryManager, frame: &FrameHeader, full_image: bool) -> Result<Self> {
        let mut handles = Vec::with_capacity(frame.components.len());

        for c in frame.components.iter() {
            let v = usize::from(c.v_samp_factor);
            let rows = if full_image {
                c.padded_height_in_blocks() as usize
            } else {
                v
            };

            handles.push(mem.request_virt_barray(
                PoolId::Image,
                true,
                c.padded_width_in_blocks() as usize,
                rows,
                v,
            )?);
        }

        debug!(
            "requested {0} coefficient arrays full_image={1}",
            handles.len(),
            full_image
        );

        Ok(CoefArrays {
            handles,
            full_image,
        })
    }

    fn handle(&self, component_index: usize) -> Result<VirtBarrayHandle> {
        match self.handles.get(component_index) {
            Some(h) => Ok(*h),
            None => err_exit_code(
                ExitCode::BadVirtualAccess,
                format!("no coefficient array for component {0}", component_index),
            ),
        }
    }

    /// the `v_samp_factor` block rows that make up an iMCU row of a component
    pub fn imcu_window<'a>(
        &self,
        mem: &'a mut MemoryManager,
        c: &ComponentInfo,
        imcu_row: u32,
        writable: bool,
    ) -> Result<&'a mut [Block]> {
        let v = usize::from(c.v_samp_factor);
        let start = if self.full_image {
            imcu_row as usize * v
        } else {
            0
        };
        mem.access_virt_barray(self.handle(c.component_index)?, start, v, writable)
    }

    /// Block rows `start_row..start_row+num_rows` of a full image array
    pub fn block_rows<'a>(
        &self,
        mem: &'a mut MemoryManager,
        component_index: usize,
        start_row: usize,
        num_rows: usize,
    ) -> Result<&'a mut [Block]> {
        if !self.full_image {
            return err_exit_code(
                ExitCode::BadState,
                "coefficients are only kept for the current row",
            );
        }
        mem.access_virt_barray(self.handle(component_index)?, start_row, num_rows, false)
    }

    /// number of block rows of a component's array
    pub fn block_row_count(&self, mem: &MemoryManager, component_index: usize) -> Result<usize> {
        Ok(mem.barray_extent(self.handle(component_index)?)?.1)
    }

    /// Copies the blocks of the MCU at the cursor into `mcu`, in MCU order
    pub fn load_mcu(
        &self,
        mem: &mut MemoryManager,
        frame: &FrameHeader,
        layout: &ScanLayout,
        cursor: &ScanCursor,
        mcu: &mut [Block],
    ) -> Result<()> {
        self.transfer_mcu(mem, frame, layout, cursor, mcu, false)
    }

    /// Writes the blocks of `mcu` back to the MCU at the cursor
    pub fn store_mcu(
        &self,
        mem: &mut MemoryManager,
        frame: &FrameHeader,
        layout: &ScanLayout,
        cursor: &ScanCursor,
        mcu: &mut [Block],
    ) -> Result<()> {
        self.transfer_mcu(mem, frame, layout, cursor, mcu, true)
    }

    fn transfer_mcu(
        &self,
        mem: &mut MemoryManager,
        frame: &FrameHeader,
        layout: &ScanLayout,
        cursor: &ScanCursor,
        mcu: &mut [Block],
        store: bool,
    ) -> Result<()> {
        let mut blkn = 0;
        let mcu_col = cursor.mcu_ctr as usize;

        for &ci in &layout.comps[..layout.comps_in_scan] {
            let c = &frame.components[ci];
            let row_len = c.padded_width_in_blocks() as usize;
            let window = self.imcu_window(mem, c, cursor.imcu_row, store)?;

            let mut move_block = |index: usize, blkn: usize| {
                if store {
                    window[index] = mcu[blkn];
                } else {
                    mcu[blkn] = window[index];
                }
            };

            if layout.is_interleaved() {
                let h = c.mcu_width as usize;
                for yi in 0..c.mcu_height as usize {
                    for xi in 0..h {
                        move_block(yi * row_len + mcu_col * h + xi, blkn);
                        blkn += 1;
                    }
                }
            } else {
                move_block(cursor.mcu_vert_offset as usize * row_len + mcu_col, blkn);
                blkn += 1;
            }
        }

        Ok(())
    }

    /// Stores one iMCU row of caller supplied blocks for a component and fills
    /// the padding around them: dummy blocks to the right get zero AC and the DC
    /// of their left neighbour, dummy rows at the bottom get zero AC and the DC of
    /// the last real block row.
    pub fn store_input_row(
        &self,
        mem: &mut MemoryManager,
        c: &ComponentInfo,
        imcu_row: u32,
        blocks: &[Block],
    ) -> Result<()> {
        let width = c.width_in_blocks as usize;
        let row_len = c.padded_width_in_blocks() as usize;
        let real_rows = c.block_rows_in_imcu_row(imcu_row) as usize;
        let v = usize::from(c.v_samp_factor);

        if blocks.len() != real_rows * width {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!(
                    "component {0} row {1} needs {2} blocks, got {3}",
                    c.component_index,
                    imcu_row,
                    real_rows * width,
                    blocks.len()
                ),
            );
        }

        let window = self.imcu_window(mem, c, imcu_row, true)?;

        for y in 0..real_rows {
            let row = &mut window[y * row_len..(y + 1) * row_len];
            row[..width].copy_from_slice(&blocks[y * width..(y + 1) * width]);

            let dc = row[width - 1][0];
            for b in row[width..].iter_mut() {
                *b = [0; 64];
                b[0] = dc;
            }
        }

        if real_rows > 0 {
            let last = (real_rows - 1) * row_len;
            for y in real_rows..v {
                for x in 0..row_len {
                    let dc = window[last + x][0];
                    let b = &mut window[y * row_len + x];
                    *b = [0; 64];
                    b[0] = dc;
                }
            }
        }

        Ok(())
    }
}
