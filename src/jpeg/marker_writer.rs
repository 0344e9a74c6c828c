/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Serialization of marker segments. Everything is appended to a byte vector that
//! the output adapter later hands to the destination.

use byteorder::{BigEndian, WriteBytesExt};

use crate::consts::{DCTSIZE2, RASTER_TO_ZIGZAG};
use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::jpeg::frame::FrameHeader;
use crate::jpeg::jpeg_code;
use crate::jpeg::scan::ScanLayout;
use crate::jpeg::tables::{HuffTable, QuantTable, TableKind};

/// largest payload of a marker segment, the length field counts itself
pub const MAX_SEGMENT_DATA: usize = 65533;

pub fn write_marker(out: &mut Vec<u8>, code: u8) {
    out.push(0xff);
    out.push(code);
}

pub fn write_soi(out: &mut Vec<u8>) {
    write_marker(out, jpeg_code::SOI);
}

pub fn write_eoi(out: &mut Vec<u8>) {
    write_marker(out, jpeg_code::EOI);
}

fn write_length(out: &mut Vec<u8>, payload: usize) -> Result<()> {
    if payload > MAX_SEGMENT_DATA {
        return err_exit_code(
            ExitCode::SyntaxError,
            format!("marker segment of {0} bytes is too long", payload),
        );
    }
    out.write_u16::<BigEndian>((payload + 2) as u16)?;
    Ok(())
}

/// JFIF 1.01 APP0, aspect ratio 1:1 and no thumbnail
pub fn write_jfif_app0(out: &mut Vec<u8>) -> Result<()> {
    write_marker(out, jpeg_code::APP0);
    write_length(out, 14)?;
    out.extend_from_slice(b"JFIF\0");
    out.push(1);
    out.push(1);
    out.push(0);
    out.write_u16::<BigEndian>(1)?;
    out.write_u16::<BigEndian>(1)?;
    out.push(0);
    out.push(0);
    Ok(())
}

/// DQT for a single table, 16 bit precision only if some entry needs it
pub fn write_dqt(out: &mut Vec<u8>, selector: usize, table: &QuantTable) -> Result<()> {
    let eight_bit = table.is_8bit();
    let payload = 1 + DCTSIZE2 * if eight_bit { 1 } else { 2 };

    write_marker(out, jpeg_code::DQT);
    write_length(out, payload)?;
    out.push(if eight_bit { 0 } else { 0x10 } | selector as u8);

    let mut zigzag = [0u16; DCTSIZE2];
    for (i, &v) in table.values.iter().enumerate() {
        zigzag[usize::from(RASTER_TO_ZIGZAG[i])] = v;
    }

    for v in zigzag {
        if eight_bit {
            out.push(v as u8);
        } else {
            out.write_u16::<BigEndian>(v)?;
        }
    }
    Ok(())
}

pub fn write_dht(out: &mut Vec<u8>, kind: TableKind, selector: usize, table: &HuffTable) -> Result<()> {
    let class = match kind {
        TableKind::DcHuff => 0,
        TableKind::AcHuff => 0x10,
        _ => {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!("{0:?} is not a huffman table", kind),
            )
        }
    };

    write_marker(out, jpeg_code::DHT);
    write_length(out, 1 + 16 + table.huffval.len())?;
    out.push(class | selector as u8);
    out.extend_from_slice(&table.bits[1..]);
    out.extend_from_slice(&table.huffval);
    Ok(())
}

pub fn write_dri(out: &mut Vec<u8>, restart_interval: u32) -> Result<()> {
    let Ok(interval) = u16::try_from(restart_interval) else {
        return err_exit_code(
            ExitCode::SyntaxError,
            format!("restart interval {0} doesn't fit in DRI", restart_interval),
        );
    };

    write_marker(out, jpeg_code::DRI);
    write_length(out, 2)?;
    out.write_u16::<BigEndian>(interval)?;
    Ok(())
}

pub fn write_sof(out: &mut Vec<u8>, code: u8, frame: &FrameHeader) -> Result<()> {
    let (Ok(w), Ok(h)) = (
        u16::try_from(frame.image_width),
        u16::try_from(frame.image_height),
    ) else {
        return err_exit_code(ExitCode::InconsistentGeometry, "image too large for SOF");
    };

    write_marker(out, code);
    write_length(out, 6 + 3 * frame.components.len())?;
    out.push(frame.data_precision);
    out.write_u16::<BigEndian>(h)?;
    out.write_u16::<BigEndian>(w)?;
    out.push(frame.components.len() as u8);

    for c in frame.components.iter() {
        out.push(c.component_id);
        out.push((c.h_samp_factor << 4) | c.v_samp_factor);
        out.push(c.quant_tbl_no);
    }
    Ok(())
}

/// SOS for the scan in `layout`. Progressive scans only name the table they use.
pub fn write_sos(out: &mut Vec<u8>, frame: &FrameHeader, layout: &ScanLayout) -> Result<()> {
    let info = &layout.info;

    write_marker(out, jpeg_code::SOS);
    write_length(out, 4 + 2 * layout.comps_in_scan)?;
    out.push(layout.comps_in_scan as u8);

    for &ci in &layout.comps[..layout.comps_in_scan] {
        let c = &frame.components[ci];

        let (mut td, mut ta) = (c.dc_tbl_no, c.ac_tbl_no);
        if frame.progressive_mode {
            if info.ss == 0 {
                ta = 0;
            } else {
                td = 0;
            }
        }

        out.push(c.component_id);
        out.push((td << 4) | ta);
    }

    out.push(info.ss);
    out.push(info.se);
    out.push((info.ah << 4) | info.al);
    Ok(())
}

/// APPn or COM with arbitrary content
pub fn write_marker_segment(out: &mut Vec<u8>, code: u8, data: &[u8]) -> Result<()> {
    write_marker(out, code);
    write_length(out, data.len())?;
    out.extend_from_slice(data);
    Ok(())
}
