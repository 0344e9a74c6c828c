/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::path::PathBuf;

/// Where virtual arrays go when they don't fit in the memory budget
#[derive(Debug, Clone, PartialEq)]
pub enum SpillTarget {
    /// Spill into heap buffers that are not counted against the budget. Useful for
    /// tests and for targets without a filesystem.
    Memory,

    /// Spill into a file inside a temporary directory that is deleted when the
    /// datastream is released. `None` uses the system temp directory.
    TempFile(Option<PathBuf>),
}

/// Configuration of a compressor or decompressor instance. The settings live in the
/// permanent pool and survive abort and the start of a new datastream.
#[derive(Debug, Clone)]
pub struct EnabledFeatures {
    /// maximum number of bytes the pool allocator hands out before virtual arrays
    /// start spilling to the backing store
    pub max_memory_to_use: usize,

    /// largest single allocation that is allowed
    pub max_alloc_chunk: usize,

    /// where virtual arrays spill to
    pub spill_target: SpillTarget,

    /// maximum jpeg width
    pub max_jpeg_width: u32,

    /// maximum jpeg height
    pub max_jpeg_height: u32,

    /// reject/accept images with DQTs with zeros (may cause divide-by-zero downstream)
    pub reject_dqts_with_zeros: bool,

    /// turn the first recoverable warning into a fatal error
    pub treat_warnings_as_errors: bool,

    /// size of the output buffer collected before the destination is asked to flush
    pub output_buffer_size: usize,

    /// write a JFIF APP0 marker after SOI when compressing
    pub write_jfif_header: bool,
}

impl Default for EnabledFeatures {
    fn default() -> Self {
        Self {
            max_memory_to_use: 256 * 1024 * 1024,
            max_alloc_chunk: 1_000_000_000,
            spill_target: SpillTarget::TempFile(None),
            max_jpeg_width: 65500,
            max_jpeg_height: 65500,
            reject_dqts_with_zeros: false,
            treat_warnings_as_errors: false,
            output_buffer_size: 4096,
            write_jfif_header: false,
        }
    }
}

impl EnabledFeatures {
    /// parameters for running with a small memory budget, spilling to memory so the
    /// behavior is identical to the file backed store without touching the disk
    pub fn low_memory(max_memory_to_use: usize) -> Self {
        Self {
            max_memory_to_use,
            spill_target: SpillTarget::Memory,
            ..Self::default()
        }
    }
}
