/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::collections::HashMap;
use std::time::Duration;

#[cfg(any(windows, target_os = "linux"))]
use cpu_time::ThreadTime;

use log::info;

/// platform independent threadtime measurement
pub struct CpuTimeMeasure {
    #[cfg(any(windows, target_os = "linux"))]
    start: ThreadTime,
    #[cfg(not(any(windows, target_os = "linux")))]
    start: std::time::Instant,
}

impl CpuTimeMeasure {
    /// starts measuring
    pub fn new() -> Self {
        Self {
            #[cfg(any(windows, target_os = "linux"))]
            start: ThreadTime::now(),
            #[cfg(not(any(windows, target_os = "linux")))]
            start: std::time::Instant::now(),
        }
    }

    /// cpu time spent by this thread since `new`
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Counters collected while a datastream is processed
#[derive(Default, Debug, Clone)]
pub struct Metrics {
    scans: u32,
    imcu_rows: u64,
    swap_reads: u64,
    swap_writes: u64,
    bytes_spilled: u64,
    bytes_restored: u64,
    warnings: HashMap<&'static str, u32>,
    cpu_time_scans: Duration,
}

impl Metrics {
    pub(crate) fn record_scan(&mut self, duration: Duration) {
        self.scans += 1;
        self.cpu_time_scans += duration;
    }

    pub(crate) fn record_imcu_row(&mut self) {
        self.imcu_rows += 1;
    }

    pub(crate) fn record_swap_in(&mut self, bytes: u64) {
        self.swap_reads += 1;
        self.bytes_restored += bytes;
    }

    pub(crate) fn record_swap_out(&mut self, bytes: u64) {
        self.swap_writes += 1;
        self.bytes_spilled += bytes;
    }

    pub(crate) fn record_warning(&mut self, name: &'static str) {
        *self.warnings.entry(name).or_insert(0) += 1;
    }

    /// number of scans that ran to completion
    pub fn scans(&self) -> u32 {
        self.scans
    }

    /// number of times a spilled window was read back in
    pub fn swap_reads(&self) -> u64 {
        self.swap_reads
    }

    /// number of times dirty rows were written to the backing store
    pub fn swap_writes(&self) -> u64 {
        self.swap_writes
    }

    /// total bytes written to the backing store
    pub fn bytes_spilled(&self) -> u64 {
        self.bytes_spilled
    }

    /// total bytes read back from the backing store
    pub fn bytes_restored(&self) -> u64 {
        self.bytes_restored
    }

    /// cpu time spent inside completed scans
    pub fn get_cpu_time_scans(&self) -> Duration {
        self.cpu_time_scans
    }

    /// moves the counters out, leaving zeroes behind
    pub fn drain(&mut self) -> Metrics {
        std::mem::take(self)
    }

    /// adds the counters of another instance to this one
    pub fn merge_from(&mut self, mut source_metrics: Metrics) {
        for (name, count) in source_metrics.warnings.drain() {
            *self.warnings.entry(name).or_insert(0) += count;
        }

        self.scans += source_metrics.scans;
        self.imcu_rows += source_metrics.imcu_rows;
        self.swap_reads += source_metrics.swap_reads;
        self.swap_writes += source_metrics.swap_writes;
        self.bytes_spilled += source_metrics.bytes_spilled;
        self.bytes_restored += source_metrics.bytes_restored;
        self.cpu_time_scans += source_metrics.cpu_time_scans;
    }

    /// number of times a warning of the given kind was raised
    pub fn warning_count(&self, name: &str) -> u32 {
        self.warnings.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn log_metrics(&self) {
        let mut sort_vec: Vec<_> = self.warnings.iter().collect();
        sort_vec.sort_by(|a, b| a.1.cmp(b.1).reverse());

        for (name, count) in sort_vec {
            info!("warning {0:16} count={1}", name, count);
        }

        info!(
            "scans={0} imcu_rows={1} swap_reads={2} swap_writes={3} spilled={4}k scan_cpu={5}ms",
            self.scans,
            self.imcu_rows,
            self.swap_reads,
            self.swap_writes,
            self.bytes_spilled / 1024,
            self.cpu_time_scans.as_millis()
        );
    }
}

#[test]
fn merge_adds_counters() {
    let mut a = Metrics::default();
    a.record_scan(Duration::from_millis(2));
    a.record_warning("MustResync");
    a.record_swap_out(100);

    let mut b = Metrics::default();
    b.record_scan(Duration::from_millis(3));
    b.record_warning("MustResync");
    b.record_swap_in(100);

    a.merge_from(b.drain());
    assert_eq!(a.scans(), 2);
    assert_eq!(a.swap_reads(), 1);
    assert_eq!(a.swap_writes(), 1);
    assert_eq!(a.bytes_spilled(), 100);
    assert_eq!(a.get_cpu_time_scans(), Duration::from_millis(5));
    assert_eq!(a.warning_count("MustResync"), 2);
    assert_eq!(b.scans(), 0);
}
