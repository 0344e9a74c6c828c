/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Scan scripts for the compressor: validation and the standard progressions.

use crate::consts::{DCTSIZE2, MAX_COMPS_IN_SCAN};
use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::jpeg::scan::ScanInfo;

/// highest successive approximation bit position that can be coded
pub const MAX_AH_AL: u8 = 13;

/// Checks a scan script against a frame of `num_components` components and returns
/// whether it describes a progressive image.
///
/// The first scan decides the mode: anything other than a full spectrum scan
/// makes the script progressive. Progressive scripts must send each coefficient
/// bit exactly once, refinement scans continuing where the previous scan of the
/// same coefficient stopped. Sequential scripts must cover every component exactly
/// once.
pub fn validate_scan_script(scans: &[ScanInfo], num_components: usize) -> Result<bool> {
    if scans.is_empty() {
        return err_exit_code(ExitCode::BadScanScript, "scan script is empty");
    }

    let progressive = !scans[0].is_full_spectrum();

    // last Al sent for each component and zigzag position, -1 if nothing was sent yet
    let mut last_bitpos = vec![[-1i8; DCTSIZE2]; num_components];
    let mut component_sent = vec![false; num_components];

    for (scanno, scan) in scans.iter().enumerate() {
        let ncomps = usize::from(scan.comps_in_scan);
        if ncomps == 0 || ncomps > MAX_COMPS_IN_SCAN {
            return err_exit_code(
                ExitCode::BadScanScript,
                format!("scan {0} has {1} components", scanno, ncomps),
            );
        }

        let mut previous: Option<u8> = None;
        for &ci in scan.components() {
            if usize::from(ci) >= num_components {
                return err_exit_code(
                    ExitCode::BadScanScript,
                    format!("scan {0} references component {1}", scanno, ci),
                );
            }
            // components must appear in frame order
            if previous.map_or(false, |p| ci <= p) {
                return err_exit_code(
                    ExitCode::BadScanScript,
                    format!("scan {0} lists components out of order", scanno),
                );
            }
            previous = Some(ci);
        }

        let (ss, se, ah, al) = (scan.ss, scan.se, scan.ah, scan.al);

        if progressive {
            if se > 63 || ss > se || ah > MAX_AH_AL || al > MAX_AH_AL {
                return err_exit_code(
                    ExitCode::BadScanScript,
                    format!(
                        "scan {0} has invalid parameters Ss={1} Se={2} Ah={3} Al={4}",
                        scanno, ss, se, ah, al
                    ),
                );
            }

            if ss == 0 {
                if se != 0 {
                    return err_exit_code(
                        ExitCode::BadScanScript,
                        format!("scan {0} mixes DC and AC coefficients", scanno),
                    );
                }
            } else if ncomps != 1 {
                return err_exit_code(
                    ExitCode::BadScanScript,
                    format!("AC scan {0} must contain a single component", scanno),
                );
            }

            for &ci in scan.components() {
                let bitpos = &mut last_bitpos[usize::from(ci)];
                if ss != 0 && bitpos[0] < 0 {
                    return err_exit_code(
                        ExitCode::BadScanScript,
                        format!("scan {0} sends AC before DC of component {1}", scanno, ci),
                    );
                }

                for coefi in usize::from(ss)..=usize::from(se) {
                    let last = bitpos[coefi];
                    if last < 0 {
                        // first scan of this coefficient
                        if ah != 0 {
                            return err_exit_code(
                                ExitCode::BadScanScript,
                                format!("scan {0} refines coefficient {1} never sent", scanno, coefi),
                            );
                        }
                    } else if ah == 0 || i16::from(ah) != i16::from(last) || al + 1 != ah {
                        // refinement must continue exactly one bit below the previous scan
                        return err_exit_code(
                            ExitCode::BadScanScript,
                            format!(
                                "scan {0} breaks the successive approximation of coefficient {1}",
                                scanno, coefi
                            ),
                        );
                    }
                    bitpos[coefi] = al as i8;
                }
            }
        } else {
            if !scan.is_full_spectrum() {
                return err_exit_code(
                    ExitCode::BadScanScript,
                    format!("sequential scan {0} must cover the full spectrum", scanno),
                );
            }

            for &ci in scan.components() {
                let sent = &mut component_sent[usize::from(ci)];
                if *sent {
                    return err_exit_code(
                        ExitCode::BadScanScript,
                        format!("component {0} appears in more than one scan", ci),
                    );
                }
                *sent = true;
            }
        }
    }

    // every component needs at least its DC coefficients
    for ci in 0..num_components {
        let missing = if progressive {
            last_bitpos[ci][0] < 0
        } else {
            !component_sent[ci]
        };
        if missing {
            return err_exit_code(
                ExitCode::BadScanScript,
                format!("component {0} is never coded", ci),
            );
        }
    }

    Ok(progressive)
}

/// Single scan for frames of up to four components, one scan per component otherwise.
pub fn sequential_script(num_components: usize) -> Vec<ScanInfo> {
    let all: Vec<u8> = (0..num_components as u8).collect();
    if num_components <= MAX_COMPS_IN_SCAN {
        vec![ScanInfo::sequential(&all)]
    } else {
        all.iter().map(|&c| ScanInfo::sequential(&[c])).collect()
    }
}

fn dc_scans(num_components: usize, ah: u8, al: u8) -> Vec<ScanInfo> {
    let all: Vec<u8> = (0..num_components as u8).collect();
    if num_components <= MAX_COMPS_IN_SCAN {
        vec![ScanInfo::dc_scan(&all, ah, al)]
    } else {
        all.iter().map(|&c| ScanInfo::dc_scan(&[c], ah, al)).collect()
    }
}

fn ac_scans(num_components: usize, ss: u8, se: u8, ah: u8, al: u8) -> Vec<ScanInfo> {
    (0..num_components as u8)
        .map(|c| ScanInfo::ac_scan(c, ss, se, ah, al))
        .collect()
}

/// The standard progression. Three component frames get the luminance/chrominance
/// script that sends the chrominance AC bands early, everything else the generic
/// one: DC with one bit held back, the first five AC coefficients, the rest of the
/// band, then the refinement passes.
pub fn simple_progression(num_components: usize) -> Vec<ScanInfo> {
    let mut scans = Vec::new();

    if num_components == 3 {
        scans.extend(dc_scans(3, 0, 1));
        scans.push(ScanInfo::ac_scan(0, 1, 5, 0, 2));
        scans.push(ScanInfo::ac_scan(2, 1, 63, 0, 1));
        scans.push(ScanInfo::ac_scan(1, 1, 63, 0, 1));
        scans.push(ScanInfo::ac_scan(0, 6, 63, 0, 2));
        scans.push(ScanInfo::ac_scan(0, 1, 63, 2, 1));
        scans.extend(dc_scans(3, 1, 0));
        scans.push(ScanInfo::ac_scan(2, 1, 63, 1, 0));
        scans.push(ScanInfo::ac_scan(1, 1, 63, 1, 0));
        scans.push(ScanInfo::ac_scan(0, 1, 63, 1, 0));
    } else {
        scans.extend(dc_scans(num_components, 0, 1));
        scans.extend(ac_scans(num_components, 1, 5, 0, 2));
        scans.extend(ac_scans(num_components, 6, 63, 0, 2));
        scans.extend(ac_scans(num_components, 1, 63, 2, 1));
        scans.extend(dc_scans(num_components, 1, 0));
        scans.extend(ac_scans(num_components, 1, 63, 1, 0));
    }

    scans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_scripts_are_valid() {
        for n in 1..=6 {
            assert_eq!(validate_scan_script(&simple_progression(n), n).unwrap(), true);
            assert_eq!(validate_scan_script(&sequential_script(n), n).unwrap(), false);
        }
        assert_eq!(simple_progression(3).len(), 10);
        assert_eq!(simple_progression(1).len(), 6);
    }

    #[test]
    fn refinement_chain() {
        let mut script = vec![
            ScanInfo::dc_scan(&[0], 0, 0),
            ScanInfo::ac_scan(0, 1, 63, 0, 2),
            ScanInfo::ac_scan(0, 1, 63, 2, 1),
        ];
        assert!(validate_scan_script(&script, 1).is_ok());

        // skipping a bit plane
        script.push(ScanInfo::ac_scan(0, 1, 63, 2, 0));
        assert_eq!(
            validate_scan_script(&script, 1).unwrap_err().exit_code(),
            ExitCode::BadScanScript
        );
    }

    #[test]
    fn rejects_bad_scripts() {
        let cases: Vec<(Vec<ScanInfo>, usize)> = vec![
            (vec![], 1),
            // AC before DC
            (vec![ScanInfo::ac_scan(0, 1, 63, 0, 0)], 1),
            // interleaved AC scan
            (
                vec![
                    ScanInfo::dc_scan(&[0, 1], 0, 0),
                    ScanInfo {
                        ss: 1,
                        ..ScanInfo::sequential(&[0, 1])
                    },
                ],
                2,
            ),
            // component listed twice in a sequential script
            (
                vec![ScanInfo::sequential(&[0]), ScanInfo::sequential(&[0])],
                1,
            ),
            // component never coded
            (vec![ScanInfo::sequential(&[0])], 2),
            // out of order
            (vec![ScanInfo::sequential(&[1, 0])], 2),
            // DC scan with AC coefficients
            (vec![ScanInfo::dc_scan(&[0], 0, 0), ScanInfo { se: 5, ..ScanInfo::dc_scan(&[0], 0, 0) }], 1),
        ];

        for (script, n) in cases {
            assert!(validate_scan_script(&script, n).is_err(), "{:?}", script);
        }
    }
}
