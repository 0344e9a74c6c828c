/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::collections::HashMap;

use log::{info, warn};

use crate::codec::progress::{Progress, ProgressMonitor};
use crate::enabled_features::EnabledFeatures;
use crate::engine_error::{err_exit_code, ExitCode, Result, WarningKind};
use crate::memory::memory_manager::MemoryManager;
use crate::memory::pool::PoolId;
use crate::metrics::Metrics;

/// Lifecycle of a datastream inside a compressor or decompressor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalState {
    /// no datastream in progress
    Initial,
    /// frame parameters are known, no scan started yet
    HeaderParsed,
    /// a scan is being read or written
    ScanActive,
    /// the last scan finished, another one may follow
    ScanComplete,
    /// EOI was read or written
    StreamComplete,
}

/// Where recoverable problems are reported
pub trait ErrorManager: Send {
    /// called for every warning, `occurrence` counts warnings of this kind so far
    fn emit_warning(&mut self, kind: WarningKind, occurrence: u32);
}

/// Logs warnings through the `log` facade
#[derive(Debug, Default)]
pub struct LogErrorManager;

impl ErrorManager for LogErrorManager {
    fn emit_warning(&mut self, kind: WarningKind, occurrence: u32) {
        warn!("{0} (occurrence {1})", kind, occurrence);
    }
}

/// State shared by compressors and decompressors
pub struct CodecCommon {
    /// pools and virtual arrays of the instance
    pub mem: MemoryManager,
    /// configuration the instance was created with
    pub features: EnabledFeatures,
    /// lifecycle of the current datastream
    pub state: GlobalState,
    /// what the progress monitor gets to see
    pub progress: Progress,
    warnings: HashMap<WarningKind, u32>,
    error_manager: Box<dyn ErrorManager>,
    progress_monitor: Option<Box<dyn ProgressMonitor>>,
}

impl CodecCommon {
    /// state for a new instance, no datastream in progress
    pub fn new(features: &EnabledFeatures) -> Self {
        CodecCommon {
            mem: MemoryManager::new(features),
            features: features.clone(),
            state: GlobalState::Initial,
            progress: Progress::default(),
            warnings: HashMap::new(),
            error_manager: Box::new(LogErrorManager),
            progress_monitor: None,
        }
    }

    pub fn set_error_manager(&mut self, error_manager: Box<dyn ErrorManager>) {
        self.error_manager = error_manager;
    }

    pub fn set_progress_monitor(&mut self, monitor: Option<Box<dyn ProgressMonitor>>) {
        self.progress_monitor = monitor;
    }

    /// Counts and reports a recoverable problem. Fails if warnings are configured
    /// to be fatal.
    pub fn warn(&mut self, kind: WarningKind) -> Result<()> {
        let count = self.warnings.entry(kind).or_insert(0);
        *count += 1;
        let occurrence = *count;

        self.mem.metrics_mut().record_warning(kind.name());
        self.error_manager.emit_warning(kind, occurrence);

        if self.features.treat_warnings_as_errors {
            return err_exit_code(ExitCode::WarningAsError, kind.to_string());
        }
        Ok(())
    }

    pub fn warn_all(&mut self, kinds: impl IntoIterator<Item = WarningKind>) -> Result<()> {
        for kind in kinds {
            self.warn(kind)?;
        }
        Ok(())
    }

    /// warnings of all kinds for the current datastream
    pub fn num_warnings(&self) -> u32 {
        self.warnings.values().sum()
    }

    /// warning counts per kind
    pub fn warnings(&self) -> &HashMap<WarningKind, u32> {
        &self.warnings
    }

    /// Fails unless the datastream is in one of the given states
    pub fn require_state(&self, allowed: &[GlobalState], operation: &str) -> Result<()> {
        if !allowed.contains(&self.state) {
            return err_exit_code(
                ExitCode::BadState,
                format!("{0} called in state {1:?}", operation, self.state),
            );
        }
        Ok(())
    }

    /// Prepares for a new datastream
    pub fn begin_stream(&mut self) {
        self.warnings.clear();
        self.progress = Progress::default();
    }

    /// counts an iMCU row and tells the progress monitor
    pub fn report_row(&mut self, rows_per_pass: u64) {
        self.mem.metrics_mut().record_imcu_row();
        self.progress.advance(rows_per_pass);
        if let Some(m) = self.progress_monitor.as_mut() {
            m.progress(&self.progress);
        }
    }

    pub fn report_pass_done(&mut self) {
        self.progress.complete_pass();
        if let Some(m) = self.progress_monitor.as_mut() {
            m.progress(&self.progress);
        }
    }

    /// Ends the datastream normally, releasing everything it allocated
    pub fn finish_stream(&mut self) {
        self.mem.metrics().log_metrics();
        info!("datastream finished with {0} warnings", self.num_warnings());
        self.release_stream();
    }

    /// Drops the datastream in progress. Tables and settings are kept.
    pub fn release_stream(&mut self) {
        self.mem.free_pool(PoolId::Image);
        self.state = GlobalState::Initial;
    }
}

/// Operations every compressor and decompressor supports
pub trait JpegCodec {
    /// shared state of the instance
    fn common(&self) -> &CodecCommon;

    /// mutable shared state of the instance
    fn common_mut(&mut self) -> &mut CodecCommon;

    /// Stops the current datastream and releases its memory. Tables and
    /// configuration are kept, so the instance can start a new datastream.
    fn abort(&mut self) {
        self.common_mut().release_stream();
    }

    /// number of warnings raised for the current datastream
    fn num_warnings(&self) -> u32 {
        self.common().num_warnings()
    }

    /// warnings raised for the current datastream, per kind
    fn warnings(&self) -> &HashMap<WarningKind, u32> {
        self.common().warnings()
    }

    /// where in its lifecycle the current datastream is
    fn global_state(&self) -> GlobalState {
        self.common().state
    }

    /// counters collected so far
    fn metrics(&self) -> &Metrics {
        self.common().mem.metrics()
    }

    /// routes warnings somewhere other than the log
    fn set_error_manager(&mut self, error_manager: Box<dyn ErrorManager>) {
        self.common_mut().set_error_manager(error_manager);
    }

    /// installs or removes the progress callback
    fn set_progress_monitor(&mut self, monitor: Option<Box<dyn ProgressMonitor>>) {
        self.common_mut().set_progress_monitor(monitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Collect(Arc<Mutex<Vec<(WarningKind, u32)>>>);

    impl ErrorManager for Collect {
        fn emit_warning(&mut self, kind: WarningKind, occurrence: u32) {
            self.0.lock().unwrap().push((kind, occurrence));
        }
    }

    #[test]
    fn warnings_are_counted_and_routed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut c = CodecCommon::new(&EnabledFeatures::default());
        c.set_error_manager(Box::new(Collect(seen.clone())));

        c.warn(WarningKind::HitMarker).unwrap();
        c.warn_all([WarningKind::HitMarker, WarningKind::MustResync]).unwrap();

        assert_eq!(c.num_warnings(), 3);
        assert_eq!(c.warnings()[&WarningKind::HitMarker], 2);
        assert_eq!(c.mem.metrics().warning_count(WarningKind::MustResync.name()), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (WarningKind::HitMarker, 1),
                (WarningKind::HitMarker, 2),
                (WarningKind::MustResync, 1)
            ]
        );

        c.begin_stream();
        assert_eq!(c.num_warnings(), 0);
    }

    #[test]
    fn warnings_as_errors() {
        let features = EnabledFeatures {
            treat_warnings_as_errors: true,
            ..Default::default()
        };
        let mut c = CodecCommon::new(&features);
        let e = c.warn(WarningKind::PrematureEnd).unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::WarningAsError);
        assert_eq!(c.num_warnings(), 1);
    }
}
