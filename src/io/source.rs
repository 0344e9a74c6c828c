/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::{ErrorKind, Read};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};

use crate::consts::DCTSIZE2;
use crate::engine_error::{err_exit_code, ExitCode, Result, WarningKind};
use crate::jpeg::jpeg_code;

/// Supplies compressed bytes to a decompressor.
pub trait DataSource: Send {
    /// Appends whatever is available to `buf` and returns the number of bytes
    /// appended. Zero means nothing is available right now, the decompressor
    /// suspends and the caller retries later.
    fn fill(&mut self, buf: &mut Vec<u8>) -> Result<usize>;

    /// True once the source will never deliver more bytes
    fn at_end(&self) -> bool;
}

/// The whole datastream is in memory. `with_chunk_size` hands it out in pieces,
/// reporting "nothing available" between pieces, which exercises suspension.
pub struct SliceSource {
    data: Vec<u8>,
    pos: usize,
    chunk_size: usize,
    starved: bool,
}

impl SliceSource {
    /// hands out all of `data` on the first request
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self::with_chunk_size(data, usize::MAX)
    }

    /// hands out `chunk_size` bytes per request
    pub fn with_chunk_size(data: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        SliceSource {
            data: data.into(),
            pos: 0,
            chunk_size: chunk_size.max(1),
            starved: false,
        }
    }
}

impl DataSource for SliceSource {
    fn fill(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        if self.chunk_size != usize::MAX {
            // every other call comes back empty handed
            self.starved = !self.starved;
            if self.starved {
                return Ok(0);
            }
        }

        let n = (self.data.len() - self.pos).min(self.chunk_size);
        buf.extend_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Receives chunks pushed from elsewhere (another thread or the caller between
/// calls into the decompressor). The source ends when the sender is dropped.
pub struct ChunkedSource {
    receiver: Receiver<Vec<u8>>,
    disconnected: bool,
}

/// Sending half of a [`ChunkedSource`]
pub struct ChunkSender {
    sender: Sender<Vec<u8>>,
}

impl ChunkedSource {
    /// a connected source and sender
    pub fn new() -> (ChunkedSource, ChunkSender) {
        let (sender, receiver) = channel();
        (
            ChunkedSource {
                receiver,
                disconnected: false,
            },
            ChunkSender { sender },
        )
    }
}

impl ChunkSender {
    /// Queues a chunk. Fails if the source has been dropped.
    pub fn push(&self, chunk: &[u8]) -> Result<()> {
        if self.sender.send(chunk.to_vec()).is_err() {
            return err_exit_code(ExitCode::OsError, "chunked source was dropped");
        }
        Ok(())
    }

    /// Marks the end of the datastream
    pub fn finish(self) {}
}

impl DataSource for ChunkedSource {
    fn fill(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut n = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(chunk) => {
                    n += chunk.len();
                    buf.extend_from_slice(&chunk);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        Ok(n)
    }

    fn at_end(&self) -> bool {
        self.disconnected
    }
}

/// Pulls from a `Read`. A reader returning `WouldBlock` makes the decompressor suspend.
pub struct ReaderSource<R> {
    reader: R,
    eof: bool,
    read_size: usize,
}

impl<R: Read + Send> ReaderSource<R> {
    /// wraps a reader
    pub fn new(reader: R) -> Self {
        ReaderSource {
            reader,
            eof: false,
            read_size: 4096,
        }
    }
}

impl<R: Read + Send> DataSource for ReaderSource<R> {
    fn fill(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        if self.eof {
            return Ok(0);
        }

        let start = buf.len();
        buf.resize(start + self.read_size, 0);
        loop {
            match self.reader.read(&mut buf[start..]) {
                Ok(0) => {
                    self.eof = true;
                    buf.truncate(start);
                    return Ok(0);
                }
                Ok(n) => {
                    buf.truncate(start + n);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    buf.truncate(start);
                    return Ok(0);
                }
                Err(e) => {
                    buf.truncate(start);
                    return Err(e.into());
                }
            }
        }
    }

    fn at_end(&self) -> bool {
        self.eof
    }
}

/// What to do with a marker found where RSTn was expected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResyncAction {
    /// discard the marker and resume decoding
    Discard,
    /// discard the marker and keep looking for the next one
    ScanNext,
    /// leave the marker for the marker reader, the interval is treated as empty
    Leave,
}

fn resync_action(marker: u8, desired: u8) -> ResyncAction {
    let rst = |offset: u8| jpeg_code::RST0 + (desired.wrapping_add(offset) & 7);

    if marker < jpeg_code::SOF0 {
        ResyncAction::ScanNext
    } else if !(jpeg_code::RST0..=jpeg_code::RST7).contains(&marker) {
        ResyncAction::Leave
    } else if marker == rst(1) || marker == rst(2) {
        ResyncAction::Leave
    } else if marker == rst(7) || marker == rst(6) {
        ResyncAction::ScanNext
    } else {
        ResyncAction::Discard
    }
}

/// Buffers the bytes delivered by a [`DataSource`] so the decoder can look ahead
/// and back off when a segment or MCU isn't complete yet. Data that has been
/// consumed is dropped the next time more is pulled from the source.
pub struct InputAdapter {
    source: Option<Box<dyn DataSource>>,
    buffer: Vec<u8>,
    pos: usize,
    at_end: bool,
    pending_skip: usize,

    /// marker code that was read but not yet processed
    pub unread_marker: Option<u8>,

    /// bytes thrown away while looking for the current marker
    discarded: usize,
    premature_end_warned: bool,
    warnings: Vec<WarningKind>,
}

impl Default for InputAdapter {
    fn default() -> Self {
        InputAdapter {
            source: None,
            buffer: Vec::with_capacity(4 * DCTSIZE2),
            pos: 0,
            at_end: false,
            pending_skip: 0,
            unread_marker: None,
            discarded: 0,
            premature_end_warned: false,
            warnings: Vec::new(),
        }
    }
}

impl InputAdapter {
    pub fn set_source(&mut self, source: Box<dyn DataSource>) {
        *self = InputAdapter {
            source: Some(source),
            ..InputAdapter::default()
        };
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Forgets the position inside the current datastream. Bytes already buffered
    /// stay, they may belong to the next datastream.
    pub fn reset_stream(&mut self) {
        self.pending_skip = 0;
        self.unread_marker = None;
        self.discarded = 0;
        self.premature_end_warned = false;
    }

    /// the buffered bytes that haven't been consumed
    pub fn data(&self) -> &[u8] {
        &self.buffer[self.pos..]
    }

    pub fn available(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// true once the source is exhausted and everything it delivered was buffered
    pub fn at_end(&self) -> bool {
        self.at_end
    }

    pub fn consume(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buffer.len());
    }

    /// Pulls more data from the source. Returns false if nothing new arrived, which
    /// means the caller has to suspend (or, if `at_end` is set, that there is
    /// nothing left to wait for).
    pub fn fill_more(&mut self) -> Result<bool> {
        if self.at_end {
            return Ok(false);
        }

        let Some(source) = self.source.as_mut() else {
            return err_exit_code(ExitCode::BadState, "no data source was set");
        };

        if self.pos > 0 {
            self.buffer.drain(..self.pos);
            self.pos = 0;
        }

        let n = source.fill(&mut self.buffer)?;
        if n > 0 {
            return Ok(true);
        }

        if source.at_end() {
            self.at_end = true;
            return Ok(true);
        }
        Ok(false)
    }

    /// Makes sure `n` bytes are buffered. False means suspend, or end of data if
    /// `at_end` is set.
    pub fn ensure(&mut self, n: usize) -> Result<bool> {
        while self.available() < n {
            if !self.fill_more()? || (self.at_end && self.available() < n) {
                return Ok(self.available() >= n);
            }
        }
        Ok(true)
    }

    /// Skips `n` bytes, remembering the part that hasn't arrived yet
    pub fn skip(&mut self, n: usize) {
        let now = n.min(self.available());
        self.consume(now);
        self.pending_skip += n - now;
    }

    /// Works off a skip left over from `skip`. False means suspend.
    pub fn skip_pending(&mut self) -> Result<bool> {
        while self.pending_skip > 0 {
            if self.available() == 0 && !self.ensure(1)? {
                if self.at_end {
                    self.pending_skip = 0;
                    return Ok(true);
                }
                return Ok(false);
            }
            let now = self.pending_skip.min(self.available());
            self.consume(now);
            self.pending_skip -= now;
        }
        Ok(true)
    }

    /// Returns true the first time the datastream is found to be truncated
    pub fn note_premature_end(&mut self) -> bool {
        !std::mem::replace(&mut self.premature_end_warned, true)
    }

    /// Finds the next marker, discarding anything that isn't one. The marker is left in
    /// `unread_marker` until the caller takes it. At the end of the data an EOI is
    /// made up. `None` means suspend.
    pub fn next_marker(&mut self) -> Result<Option<u8>> {
        if let Some(m) = self.unread_marker {
            return Ok(Some(m));
        }

        loop {
            if !self.ensure(2)? {
                if !self.at_end {
                    return Ok(None);
                }

                // nothing more will come, pretend the image ended here
                let rest = self.available();
                self.consume(rest);
                if self.note_premature_end() {
                    self.warnings.push(WarningKind::PrematureEnd);
                }
                self.unread_marker = Some(jpeg_code::EOI);
                return Ok(Some(jpeg_code::EOI));
            }

            let data = self.data();
            let (b0, b1) = (data[0], data[1]);
            if b0 != 0xff {
                self.consume(1);
                self.discarded += 1;
            } else if b1 == 0xff {
                // fill byte
                self.consume(1);
            } else if b1 == 0 {
                self.consume(2);
                self.discarded += 2;
            } else {
                self.consume(2);
                self.unread_marker = Some(b1);
                return Ok(Some(b1));
            }
        }
    }

    /// Counts bytes the entropy decoder had read ahead but never used
    pub fn add_discarded(&mut self, n: usize) {
        self.discarded += n;
    }

    /// Number of bytes that were discarded since the last call
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    /// Moves the warnings raised by the adapter to the caller
    pub fn take_warnings(&mut self) -> Vec<WarningKind> {
        std::mem::take(&mut self.warnings)
    }

    /// Called when RSTn was expected but something else showed up. Discards data
    /// until the decoder can continue: either a restart marker was consumed, or the
    /// marker in `unread_marker` is left for the marker reader and the rest of the
    /// interval reads as empty. `Ok(false)` means suspend.
    pub fn resync_to_restart(&mut self, desired: u8) -> Result<bool> {
        loop {
            let Some(marker) = self.next_marker()? else {
                return Ok(false);
            };

            match resync_action(marker, desired) {
                ResyncAction::Discard => {
                    self.unread_marker = None;
                    return Ok(true);
                }
                ResyncAction::ScanNext => {
                    self.unread_marker = None;
                }
                ResyncAction::Leave => return Ok(true),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(data: &[u8], chunk: usize) -> InputAdapter {
        let mut a = InputAdapter::default();
        a.set_source(Box::new(SliceSource::with_chunk_size(data, chunk)));
        a
    }

    #[test]
    fn markers_and_garbage() {
        let mut a = adapter(&[0x12, 0xff, 0x00, 0xff, 0xff, 0xd9], usize::MAX);
        assert_eq!(a.next_marker().unwrap(), Some(jpeg_code::EOI));
        assert_eq!(a.take_discarded(), 3);
        // still unread
        assert_eq!(a.next_marker().unwrap(), Some(jpeg_code::EOI));
        assert!(a.take_warnings().is_empty());
    }

    #[test]
    fn suspends_and_resumes() {
        let data = [0xaa, 0xbb, 0xff, 0xd8];
        let mut a = adapter(&data, 1);

        let mut found = None;
        for _ in 0..32 {
            found = a.next_marker().unwrap();
            if found.is_some() {
                break;
            }
        }
        assert_eq!(found, Some(jpeg_code::SOI));
        assert_eq!(a.take_discarded(), 2);
    }

    #[test]
    fn synthesizes_eoi() {
        let mut a = adapter(&[0x01], usize::MAX);
        assert_eq!(a.next_marker().unwrap(), Some(jpeg_code::EOI));
        assert_eq!(a.take_warnings(), vec![WarningKind::PrematureEnd]);
        assert!(!a.note_premature_end());
    }

    #[test]
    fn pending_skip() {
        let mut a = adapter(&[1, 2, 3, 4, 5, 6], 2);
        assert!(a.ensure(1).unwrap() || a.ensure(1).unwrap());
        a.skip(4);
        let mut done = false;
        for _ in 0..16 {
            if a.skip_pending().unwrap() {
                done = true;
                break;
            }
        }
        assert!(done);
        assert!(a.ensure(1).unwrap() || a.ensure(1).unwrap());
        assert_eq!(a.data()[0], 5);
    }

    #[test]
    fn resync_policy() {
        let d = 3;
        assert_eq!(resync_action(jpeg_code::RST0 + 4, d), ResyncAction::Leave);
        assert_eq!(resync_action(jpeg_code::RST0 + 5, d), ResyncAction::Leave);
        assert_eq!(resync_action(jpeg_code::RST0 + 2, d), ResyncAction::ScanNext);
        assert_eq!(resync_action(jpeg_code::RST0 + 1, d), ResyncAction::ScanNext);
        assert_eq!(resync_action(jpeg_code::RST0 + 7, d), ResyncAction::Discard);
        assert_eq!(resync_action(jpeg_code::EOI, d), ResyncAction::Leave);
        assert_eq!(resync_action(0x01, d), ResyncAction::ScanNext);

        // RST7 (desired - 2 for RST1) is skipped, RST2 is left for the next interval
        let mut a = adapter(&[0xff, 0xd7, 0x00, 0xff, 0xd2, 0x42], usize::MAX);
        assert!(a.resync_to_restart(1).unwrap());
        assert_eq!(a.unread_marker, Some(jpeg_code::RST0 + 2));
    }

    #[test]
    fn chunked_source() {
        let (source, sender) = ChunkedSource::new();
        let mut a = InputAdapter::default();
        a.set_source(Box::new(source));

        assert!(!a.fill_more().unwrap());
        sender.push(&[0xff, 0xd8]).unwrap();
        assert_eq!(a.next_marker().unwrap(), Some(jpeg_code::SOI));
        a.unread_marker = None;

        sender.finish();
        assert_eq!(a.next_marker().unwrap(), Some(jpeg_code::EOI));
        assert!(a.at_end());
    }
}
