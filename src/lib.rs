/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

#![doc = include_str!("../README.md")]
// Don't allow any unsafe code by default. Since this code has to potentially deal with
// badly/maliciously formatted images, we want this extra level of safety.
#![forbid(unsafe_code)]
#![forbid(trivial_casts)]
#![forbid(trivial_numeric_casts)]
#![forbid(non_ascii_idents)]
#![forbid(unused_extern_crates)]
#![forbid(unused_import_braces)]
#![forbid(redundant_lifetimes)]
#![forbid(single_use_lifetimes)]
#![forbid(unused_lifetimes)]
#![forbid(unused_macro_rules)]
#![forbid(macro_use_extern_crate)]
#![forbid(missing_unsafe_on_extern)]
#![deny(missing_docs)]

mod codec;
mod consts;
mod helpers;
mod io;
mod jpeg;
mod memory;
mod metrics;

mod enabled_features;
mod engine_error;

pub use codec::common::{ErrorManager, GlobalState, JpegCodec, LogErrorManager};
pub use codec::compressor::{Compressor, ForwardTransform, WriteStatus};
pub use codec::decompressor::{
    CoefficientRow, CoefficientSink, ConsumeStatus, Decompressor, ReadStatus,
};
pub use codec::progress::{Progress, ProgressMonitor};
pub use enabled_features::{EnabledFeatures, SpillTarget};
pub use engine_error::{EngineError, ErrorClass, ExitCode, Result, WarningKind};
pub use helpers::catch_unwind_result;
pub use io::destination::{DataDestination, LimitedDestination, VecDestination, WriteDestination};
pub use io::source::{ChunkSender, ChunkedSource, DataSource, ReaderSource, SliceSource};
pub use jpeg::bit_reader::ZeroFill;
pub use jpeg::coef_bits::CoefBits;
pub use jpeg::component_info::ComponentInfo;
pub use jpeg::entropy_decoder::{EntropyDecoder, HuffmanDecoder, McuOutcome};
pub use jpeg::entropy_encoder::{EntropyEncoder, HuffmanEncoder};
pub use jpeg::frame::{ComponentSpec, FrameHeader, FrameSpec};
pub use jpeg::marker_reader::{JfifHeader, SavedMarker};
pub use jpeg::scan::{ScanInfo, ScanLayout};
pub use jpeg::scan_script::{sequential_script, simple_progression, validate_scan_script};
pub use jpeg::tables::{HuffTable, QuantTable, Table, TableKind, TableManager};
pub use jpeg::{Block, JSample};
pub use metrics::{CpuTimeMeasure, Metrics};

/// Marker codes as they appear after 0xFF in a datastream
pub mod jpeg_code {
    pub use crate::jpeg::jpeg_code::*;
}

static PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

static GIT_VERSION: &str = git_version::git_version!(
    args = ["--abbrev=40", "--always", "--dirty=M"],
    fallback = "0"
);

/// Returns the version string of the library, which includes the package version and the git version.
/// This is useful for debugging and logging purposes to know the exact version of the library is being used
pub fn get_version_string() -> String {
    format!("{}-{}", PACKAGE_VERSION, GIT_VERSION)
}
