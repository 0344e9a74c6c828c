/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

pub mod bit_reader;
pub mod bit_writer;
pub mod coef_bits;
pub mod component_info;
pub mod entropy_decoder;
pub mod entropy_encoder;
pub mod frame;
pub mod huffman;
pub mod jpeg_code;
pub mod marker_reader;
pub mod marker_writer;
pub mod scan;
pub mod scan_script;
pub mod tables;

use crate::consts::DCTSIZE2;

/// One 8x8 block of quantized DCT coefficients in natural (row-major) order
pub type Block = [i16; DCTSIZE2];

/// A single sample of a downsampled component
pub type JSample = u8;
