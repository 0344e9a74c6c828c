/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine_error::{err_exit_code, ExitCode, Result};

/// Receives compressed bytes from a compressor.
pub trait DataDestination: Send {
    /// Offers a chunk of output. Returns false if the chunk can't be taken right
    /// now, in which case nothing of it was taken and the compressor suspends.
    fn flush(&mut self, data: &[u8]) -> Result<bool>;

    /// Called once after the last byte of a datastream was accepted
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes everything to a `Write`, never suspends
pub struct WriteDestination<W> {
    writer: W,
}

impl<W: Write + Send> WriteDestination<W> {
    /// wraps a writer
    pub fn new(writer: W) -> Self {
        WriteDestination { writer }
    }
}

impl<W: Write + Send> DataDestination for WriteDestination<W> {
    fn flush(&mut self, data: &[u8]) -> Result<bool> {
        self.writer.write_all(data)?;
        Ok(true)
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // the protected data is plain bytes, a panic elsewhere doesn't leave it inconsistent
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Collects the output in memory. Clones share the same buffer, so one clone can
/// be handed to the compressor and the other used to read the result.
#[derive(Clone, Default)]
pub struct VecDestination {
    data: Arc<Mutex<Vec<u8>>>,
}

impl VecDestination {
    /// empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.data).clone()
    }

    /// removes and returns everything written so far
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.data))
    }
}

impl DataDestination for VecDestination {
    fn flush(&mut self, data: &[u8]) -> Result<bool> {
        lock(&self.data).extend_from_slice(data);
        Ok(true)
    }
}

#[derive(Default)]
struct LimitedState {
    data: Vec<u8>,
    allowance: usize,
}

/// Collects output in memory but only accepts as many bytes as have been granted
/// with `grant`. Models a destination that fills up and has to be drained by the
/// caller, clones share the same state.
#[derive(Clone, Default)]
pub struct LimitedDestination {
    state: Arc<Mutex<LimitedState>>,
}

impl LimitedDestination {
    /// destination that takes `initial_allowance` bytes before it fills up
    pub fn new(initial_allowance: usize) -> Self {
        LimitedDestination {
            state: Arc::new(Mutex::new(LimitedState {
                data: Vec::new(),
                allowance: initial_allowance,
            })),
        }
    }

    /// allows `n` more bytes to be written
    pub fn grant(&self, n: usize) {
        let mut s = lock(&self.state);
        s.allowance = s.allowance.saturating_add(n);
    }

    /// copy of everything accepted so far
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.state).data.clone()
    }
}

impl DataDestination for LimitedDestination {
    fn flush(&mut self, data: &[u8]) -> Result<bool> {
        let mut s = lock(&self.state);
        if data.len() > s.allowance {
            return Ok(false);
        }
        s.allowance -= data.len();
        s.data.extend_from_slice(data);
        Ok(true)
    }
}

/// Buffers compressed output and hands it to the destination in chunks of at most
/// `buffer_size` bytes. Chunks the destination refuses stay buffered.
pub struct OutputAdapter {
    dest: Option<Box<dyn DataDestination>>,
    pending: Vec<u8>,
    buffer_size: usize,
    bytes_written: u64,
}

impl OutputAdapter {
    pub fn new(buffer_size: usize) -> Self {
        OutputAdapter {
            dest: None,
            pending: Vec::with_capacity(buffer_size),
            buffer_size: buffer_size.max(1),
            bytes_written: 0,
        }
    }

    pub fn set_destination(&mut self, dest: Box<dyn DataDestination>) {
        self.dest = Some(dest);
        self.pending.clear();
        self.bytes_written = 0;
    }

    pub fn has_destination(&self) -> bool {
        self.dest.is_some()
    }

    /// buffer that new output is appended to
    pub fn pending_mut(&mut self) -> &mut Vec<u8> {
        &mut self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// bytes accepted by the destination for the current datastream
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// drops anything not yet accepted, used on abort
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Offers full chunks to the destination, or everything if `all` is set.
    /// Returns false if the destination refused a chunk it was required to take.
    pub fn flush(&mut self, all: bool) -> Result<bool> {
        let Some(dest) = self.dest.as_mut() else {
            return err_exit_code(ExitCode::BadState, "no data destination was set");
        };

        while self.pending.len() >= self.buffer_size || (all && !self.pending.is_empty()) {
            let n = self.pending.len().min(self.buffer_size);
            if !dest.flush(&self.pending[..n])? {
                return Ok(false);
            }
            self.pending.drain(..n);
            self.bytes_written += n as u64;
        }
        Ok(true)
    }

    /// Flushes everything and tells the destination the datastream is complete.
    /// Returns false if the destination is still full.
    pub fn finish(&mut self) -> Result<bool> {
        if !self.flush(true)? {
            return Ok(false);
        }
        if let Some(dest) = self.dest.as_mut() {
            dest.finish()?;
        }
        Ok(true)
    }
}
