/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::{MAX_BLOCKS_IN_MCU, MAX_COMPS_IN_SCAN};
use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::jpeg::frame::FrameHeader;

/// Describes a single scan: which components take part, the spectral selection
/// `[ss, se]` (zigzag positions) and the successive approximation bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanInfo {
    /// Number of components in this scan (1-4)
    pub comps_in_scan: u8,
    /// Component indices (position in the frame header) in scan order
    pub component_index: [u8; MAX_COMPS_IN_SCAN],
    /// Spectral selection start (0 for DC, 1-63 for AC)
    pub ss: u8,
    /// Spectral selection end (0 for DC-only, 63 for full AC)
    pub se: u8,
    /// Successive approximation high bit, 0 for the first scan of a coefficient
    pub ah: u8,
    /// Successive approximation low bit (point transform)
    pub al: u8,
}

impl ScanInfo {
    /// A DC scan over several components
    pub fn dc_scan(components: &[u8], ah: u8, al: u8) -> Self {
        let mut s = Self::sequential(components);
        s.se = 0;
        s.ah = ah;
        s.al = al;
        s
    }

    /// An AC scan for a single component.
    pub const fn ac_scan(component: u8, ss: u8, se: u8, ah: u8, al: u8) -> Self {
        Self {
            comps_in_scan: 1,
            component_index: [component, 0, 0, 0],
            ss,
            se,
            ah,
            al,
        }
    }

    /// A full spectrum scan as used by sequential images. At most four components
    /// are used, the rest of the slice is ignored.
    pub fn sequential(components: &[u8]) -> Self {
        let n = components.len().min(MAX_COMPS_IN_SCAN);
        let mut component_index = [0; MAX_COMPS_IN_SCAN];
        component_index[..n].copy_from_slice(&components[..n]);
        Self {
            comps_in_scan: n as u8,
            component_index,
            ss: 0,
            se: 63,
            ah: 0,
            al: 0,
        }
    }

    /// the frame component indices that take part in the scan
    pub fn components(&self) -> &[u8] {
        &self.component_index[..usize::from(self.comps_in_scan).min(MAX_COMPS_IN_SCAN)]
    }

    /// Returns true if the scan codes the DC coefficient.
    pub const fn is_dc_scan(&self) -> bool {
        self.ss == 0
    }

    /// Returns true if this is a refinement scan (successive approximation).
    pub const fn is_refinement(&self) -> bool {
        self.ah != 0
    }

    /// true for a scan that would be legal in a sequential image
    pub const fn is_full_spectrum(&self) -> bool {
        self.ss == 0 && self.se == 63 && self.ah == 0 && self.al == 0
    }
}

/// MCU structure of the scan currently being read or written. Building it also
/// updates the per-scan fields of the frame's components.
#[derive(Debug, Clone)]
pub struct ScanLayout {
    /// the scan header this layout was built from
    pub info: ScanInfo,

    /// frame component index of each scan component
    pub comps: [usize; MAX_COMPS_IN_SCAN],
    /// number of valid entries in `comps`
    pub comps_in_scan: usize,

    /// MCUs in one MCU row
    pub mcus_per_row: u32,
    /// MCU rows in the whole scan
    pub mcu_rows_in_scan: u32,

    /// number of blocks in an MCU, at most 10
    pub blocks_in_mcu: usize,

    /// scan component slot owning each block of the MCU
    pub mcu_membership: [usize; MAX_BLOCKS_IN_MCU],

    /// MCUs between restart markers, 0 if there are none
    pub restart_interval: u32,
}

impl ScanLayout {
    /// `restart_in_rows` takes precedence over `restart_interval` if it is nonzero.
    pub fn new(
        frame: &mut FrameHeader,
        info: &ScanInfo,
        restart_interval: u32,
        restart_in_rows: u32,
    ) -> Result<Self> {
        let comps_in_scan = usize::from(info.comps_in_scan);
        if comps_in_scan == 0 || comps_in_scan > MAX_COMPS_IN_SCAN {
            return err_exit_code(
                ExitCode::BadScanScript,
                format!("scan has {0} components", comps_in_scan),
            );
        }

        let mut comps = [0usize; MAX_COMPS_IN_SCAN];
        for (i, &ci) in info.components().iter().enumerate() {
            if usize::from(ci) >= frame.components.len() {
                return err_exit_code(
                    ExitCode::BadScanScript,
                    format!("scan references missing component {0}", ci),
                );
            }
            comps[i] = usize::from(ci);
        }

        let mut layout = ScanLayout {
            info: *info,
            comps,
            comps_in_scan,
            mcus_per_row: 0,
            mcu_rows_in_scan: 0,
            blocks_in_mcu: 0,
            mcu_membership: [0; MAX_BLOCKS_IN_MCU],
            restart_interval,
        };

        if comps_in_scan == 1 {
            // non-interleaved: one block per MCU, the MCU grid is the component's block grid
            let c = &mut frame.components[comps[0]];

            layout.mcus_per_row = c.width_in_blocks;
            layout.mcu_rows_in_scan = c.height_in_blocks;

            c.mcu_width = 1;
            c.mcu_height = 1;
            c.mcu_blocks = 1;
            c.mcu_sample_width = c.dct_h_scaled_size;
            c.last_col_width = 1;

            let v = u32::from(c.v_samp_factor);
            c.last_row_height = match c.height_in_blocks % v {
                0 => v,
                r => r,
            };

            layout.blocks_in_mcu = 1;
        } else {
            layout.mcus_per_row = frame.mcus_per_row();
            layout.mcu_rows_in_scan = frame.total_imcu_rows;

            for (slot, &ci) in comps[..comps_in_scan].iter().enumerate() {
                let c = &mut frame.components[ci];
                let h = u32::from(c.h_samp_factor);
                let v = u32::from(c.v_samp_factor);

                c.mcu_width = h;
                c.mcu_height = v;
                c.mcu_blocks = h * v;
                c.mcu_sample_width = h * c.dct_h_scaled_size;
                c.last_col_width = match c.width_in_blocks % h {
                    0 => h,
                    r => r,
                };
                c.last_row_height = match c.height_in_blocks % v {
                    0 => v,
                    r => r,
                };

                let mcu_blocks = c.mcu_blocks as usize;
                if layout.blocks_in_mcu + mcu_blocks > MAX_BLOCKS_IN_MCU {
                    return err_exit_code(
                        ExitCode::InconsistentGeometry,
                        format!(
                            "MCU would contain more than {0} blocks",
                            MAX_BLOCKS_IN_MCU
                        ),
                    );
                }

                for b in 0..mcu_blocks {
                    layout.mcu_membership[layout.blocks_in_mcu + b] = slot;
                }
                layout.blocks_in_mcu += mcu_blocks;
            }
        }

        if restart_in_rows > 0 {
            let nominal = u64::from(restart_in_rows) * u64::from(layout.mcus_per_row);
            layout.restart_interval = nominal.min(65535) as u32;
        }

        Ok(layout)
    }

    /// true if the scan carries more than one component
    pub fn is_interleaved(&self) -> bool {
        self.comps_in_scan > 1
    }

    /// total number of MCUs coded by the scan
    pub fn total_mcus(&self) -> u64 {
        u64::from(self.mcus_per_row) * u64::from(self.mcu_rows_in_scan)
    }

    /// Number of MCU rows that make up one iMCU row. Interleaved scans have exactly
    /// one, non-interleaved scans have one per block row of the component (fewer on
    /// the last iMCU row).
    pub fn mcu_rows_in_imcu_row(&self, frame: &FrameHeader, imcu_row: u32) -> u32 {
        if self.is_interleaved() {
            1
        } else {
            let c = &frame.components[self.comps[0]];
            if imcu_row + 1 < frame.total_imcu_rows {
                u32::from(c.v_samp_factor)
            } else {
                c.last_row_height
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enabled_features::EnabledFeatures;
    use crate::jpeg::frame::{ComponentSpec, FrameSpec};

    fn frame(w: u32, h: u32, samp: &[(u8, u8)]) -> FrameHeader {
        let spec = FrameSpec {
            image_width: w,
            image_height: h,
            data_precision: 8,
            components: samp
                .iter()
                .enumerate()
                .map(|(i, &(h, v))| ComponentSpec {
                    component_id: i as u8,
                    h_samp_factor: h,
                    v_samp_factor: v,
                    quant_tbl_no: 0,
                    dc_tbl_no: 0,
                    ac_tbl_no: 0,
                })
                .collect(),
        };
        FrameHeader::from_spec(&spec, true, &EnabledFeatures::default()).unwrap()
    }

    #[test]
    fn interleaved_membership() {
        let mut f = frame(40, 24, &[(2, 2), (1, 1), (1, 1)]);
        let layout = ScanLayout::new(&mut f, &ScanInfo::sequential(&[0, 1, 2]), 0, 1).unwrap();

        assert_eq!(layout.blocks_in_mcu, 6);
        assert_eq!(layout.mcu_membership[..6], [0, 0, 0, 0, 1, 2]);
        assert_eq!(layout.mcus_per_row, 3);
        assert_eq!(layout.mcu_rows_in_scan, 2);
        assert_eq!(layout.restart_interval, 3);

        // 40 wide is 5 luma blocks, the last MCU column has one real block column
        assert_eq!(f.components[0].last_col_width, 1);
        assert_eq!(f.components[0].last_row_height, 1);
        assert_eq!(f.components[1].last_col_width, 1);
    }

    #[test]
    fn noninterleaved_collapses() {
        let mut f = frame(40, 24, &[(2, 2), (1, 1)]);
        let layout = ScanLayout::new(&mut f, &ScanInfo::ac_scan(0, 1, 63, 0, 0), 7, 0).unwrap();

        assert_eq!(layout.blocks_in_mcu, 1);
        assert_eq!(layout.mcus_per_row, 5);
        assert_eq!(layout.mcu_rows_in_scan, 3);
        assert_eq!(layout.restart_interval, 7);
        assert_eq!(layout.mcu_rows_in_imcu_row(&f, 0), 2);
        assert_eq!(layout.mcu_rows_in_imcu_row(&f, 1), 1);

        let layout = ScanLayout::new(&mut f, &ScanInfo::ac_scan(1, 1, 63, 0, 0), 0, 2).unwrap();
        assert_eq!(layout.mcus_per_row, 3);
        assert_eq!(layout.restart_interval, 6);
    }

    #[test]
    fn too_many_blocks() {
        let mut f = frame(64, 64, &[(4, 2), (2, 2), (1, 1)]);
        assert_eq!(
            ScanLayout::new(&mut f, &ScanInfo::sequential(&[0, 1, 2]), 0, 0)
                .unwrap_err()
                .exit_code(),
            ExitCode::InconsistentGeometry
        );
        assert!(ScanLayout::new(&mut f, &ScanInfo::sequential(&[0, 5]), 0, 0).is_err());
    }
}
