/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/// Start of Frame (size information), coding process: baseline DCT
pub const SOF0: u8 = 0xC0;

/// Start of Frame (size information), coding process: extended sequential DCT
pub const SOF1: u8 = 0xC1;

/// Start of Frame (size information), coding process: progressive DCT
pub const SOF2: u8 = 0xC2;

/// Start of Frame, lossless (sequential), not supported
pub const SOF3: u8 = 0xC3;

/// Huffman Table
pub const DHT: u8 = 0xC4;

/// Start of Frame, differential sequential DCT, not supported
pub const SOF5: u8 = 0xC5;

/// Start of Frame, differential progressive DCT, not supported
pub const SOF6: u8 = 0xC6;

/// Start of Frame, differential lossless, not supported
pub const SOF7: u8 = 0xC7;

/// Reserved for JPEG extensions
pub const JPG: u8 = 0xC8;

/// Start of Frame, extended sequential DCT, arithmetic coding
pub const SOF9: u8 = 0xC9;

/// Start of Frame, progressive DCT, arithmetic coding
pub const SOF10: u8 = 0xCA;

/// Start of Frame, lossless, arithmetic coding, not supported
pub const SOF11: u8 = 0xCB;

/// Define arithmetic coding conditioning
pub const DAC: u8 = 0xCC;

/// Start of Frame, differential sequential, arithmetic coding, not supported
pub const SOF13: u8 = 0xCD;

/// Start of Frame, differential progressive, arithmetic coding, not supported
pub const SOF14: u8 = 0xCE;

/// Start of Frame, differential lossless, arithmetic coding, not supported
pub const SOF15: u8 = 0xCF;

/// Restart 0 segment
pub const RST0: u8 = 0xD0;

/// Restart 7 segment
pub const RST7: u8 = 0xD7;

/// Start of Image
pub const SOI: u8 = 0xD8;

/// End of Image, or End of File
pub const EOI: u8 = 0xD9;

/// Start of Scan
pub const SOS: u8 = 0xDA;

/// Define Quantization Table
pub const DQT: u8 = 0xDB;

/// Define restart interval
pub const DRI: u8 = 0xDD;

/// First application segment
pub const APP0: u8 = 0xE0;

/// Last application segment
pub const APP15: u8 = 0xEF;

/// Comment
pub const COM: u8 = 0xFE;

/// For temporary private use in arithmetic coding
pub const TEM: u8 = 0x01;

/// true for RST0..RST7
pub const fn is_rst(marker: u8) -> bool {
    marker >= RST0 && marker <= RST7
}
