/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::{COEF_BITS_UNTOUCHED, DCTSIZE2, ZIGZAG_TO_RASTER};
use crate::jpeg::scan::ScanInfo;

/// Refinement history of a progressive image. For every component and coefficient
/// (natural order) it holds the Al of the last scan that coded it, or -1 if no scan
/// has touched it yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefBits {
    bits: Vec<[i8; DCTSIZE2]>,
}

impl CoefBits {
    /// every coefficient of every component starts out untouched
    pub fn new(num_components: usize) -> Self {
        CoefBits {
            bits: vec![[COEF_BITS_UNTOUCHED; DCTSIZE2]; num_components],
        }
    }

    /// current `Al` per coefficient in natural order, -1 if no scan touched it
    pub fn component(&self, component_index: usize) -> Option<&[i8; DCTSIZE2]> {
        self.bits.get(component_index)
    }

    /// Returns the components of the scan whose history doesn't match its
    /// parameters: an AC scan before any DC, or an Ah different from the last Al
    /// (0 for untouched coefficients). Each component is listed at most once.
    pub fn check_scan(&self, scan: &ScanInfo) -> Vec<usize> {
        let mut bogus = Vec::new();

        for &ci in scan.components() {
            let ci = usize::from(ci);
            let Some(history) = self.bits.get(ci) else {
                continue;
            };

            let mut ok = scan.is_dc_scan() || history[0] >= 0;

            for k in usize::from(scan.ss)..=usize::from(scan.se.min(63)) {
                let expected = history[usize::from(ZIGZAG_TO_RASTER[k])].max(0);
                if i16::from(scan.ah) != i16::from(expected) {
                    ok = false;
                }
            }

            if !ok {
                bogus.push(ci);
            }
        }

        bogus
    }

    /// Records that the scan has been fully decoded.
    pub fn commit_scan(&mut self, scan: &ScanInfo) {
        for &ci in scan.components() {
            if let Some(history) = self.bits.get_mut(usize::from(ci)) {
                for k in usize::from(scan.ss)..=usize::from(scan.se.min(63)) {
                    history[usize::from(ZIGZAG_TO_RASTER[k])] = scan.al as i8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_successive_approximation() {
        let mut cb = CoefBits::new(2);

        let dc = ScanInfo::dc_scan(&[0, 1], 0, 1);
        assert!(cb.check_scan(&dc).is_empty());
        cb.commit_scan(&dc);
        assert_eq!(cb.component(1).unwrap()[0], 1);
        assert_eq!(cb.component(1).unwrap()[1], -1);

        let ac = ScanInfo::ac_scan(0, 1, 2, 0, 2);
        assert!(cb.check_scan(&ac).is_empty());
        cb.commit_scan(&ac);

        // zigzag 2 is natural position 8
        assert_eq!(cb.component(0).unwrap()[8], 2);
        assert_eq!(cb.component(0).unwrap()[2], -1);

        // refinement with the wrong Ah
        assert_eq!(cb.check_scan(&ScanInfo::ac_scan(0, 1, 2, 1, 0)), vec![0]);
        assert!(cb.check_scan(&ScanInfo::ac_scan(0, 1, 2, 2, 1)).is_empty());
    }

    #[test]
    fn ac_before_dc_is_bogus() {
        let cb = CoefBits::new(1);
        assert_eq!(cb.check_scan(&ScanInfo::ac_scan(0, 1, 63, 0, 0)), vec![0]);
    }
}
