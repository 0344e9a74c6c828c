/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/// How far a compressor or decompressor got. `pass_counter` counts iMCU rows
/// within the current pass, the pass count is an estimate for progressive input
/// and may grow while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// iMCU rows done so far
    pub pass_counter: u64,
    /// iMCU rows expected
    pub pass_limit: u64,
    /// passes finished
    pub completed_passes: u32,
    /// passes expected
    pub total_passes: u32,
}

impl Progress {
    pub(crate) fn start(&mut self, pass_limit: u64, total_passes: u32) {
        *self = Progress {
            pass_counter: 0,
            pass_limit,
            completed_passes: 0,
            total_passes,
        };
    }

    /// counts one iMCU row, growing the limit if the estimate was too low
    pub(crate) fn advance(&mut self, rows_per_pass: u64) {
        self.pass_counter += 1;
        if self.pass_counter >= self.pass_limit {
            self.pass_limit += rows_per_pass;
        }
    }

    pub(crate) fn complete_pass(&mut self) {
        self.completed_passes += 1;
        self.total_passes = self.total_passes.max(self.completed_passes);
    }
}

/// Receives progress updates after every iMCU row
pub trait ProgressMonitor: Send {
    /// called with the current counters
    fn progress(&mut self, progress: &Progress);
}

#[test]
fn limit_grows_with_the_data() {
    let mut p = Progress::default();
    p.start(4, 1);
    for _ in 0..3 {
        p.advance(2);
    }
    assert_eq!(p.pass_limit, 4);
    p.advance(2);
    assert_eq!(p.pass_limit, 6);
    p.complete_pass();
    assert_eq!(p.completed_passes, 1);
    assert_eq!(p.total_passes, 1);
}
