/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::engine_error::{err_exit_code, ExitCode, Result};

/// Secondary storage for the rows of a virtual array that don't fit in its
/// resident window. Offsets are in bytes from the start of the array.
pub trait BackingStore: Send {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;
    fn read_at(&mut self, offset: u64, data: &mut [u8]) -> Result<()>;
}

/// Keeps spilled rows in a heap buffer
#[derive(Default)]
pub struct MemoryBackingStore {
    data: Vec<u8>,
}

impl BackingStore for MemoryBackingStore {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let start = usize::try_from(offset)?;
        let end = start + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&mut self, offset: u64, data: &mut [u8]) -> Result<()> {
        let start = usize::try_from(offset)?;
        let end = start + data.len();
        if end > self.data.len() {
            return err_exit_code(
                ExitCode::BackingStoreFailure,
                format!("read past end of memory store {0} > {1}", end, self.data.len()),
            );
        }
        data.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// Keeps spilled rows in a file. The file lives in a directory owned by the memory
/// manager which is deleted when the image pool is released.
pub struct TempFileBackingStore {
    file: File,
}

impl TempFileBackingStore {
    pub fn create(dir: &Path, name: &str) -> Result<Self> {
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(dir.join(name))
        {
            Ok(file) => Ok(TempFileBackingStore { file }),
            Err(e) => err_exit_code(
                ExitCode::BackingStoreFailure,
                format!("failed to create backing store {0}: {1}", name, e),
            ),
        }
    }
}

fn store_failure<T>(what: &str, e: std::io::Error) -> Result<T> {
    err_exit_code(
        ExitCode::BackingStoreFailure,
        format!("backing store {0} failed: {1}", what, e),
    )
}

impl BackingStore for TempFileBackingStore {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if let Err(e) = self.file.seek(SeekFrom::Start(offset)) {
            return store_failure("seek", e);
        }
        if let Err(e) = self.file.write_all(data) {
            return store_failure("write", e);
        }
        Ok(())
    }

    fn read_at(&mut self, offset: u64, data: &mut [u8]) -> Result<()> {
        if let Err(e) = self.file.seek(SeekFrom::Start(offset)) {
            return store_failure("seek", e);
        }
        if let Err(e) = self.file.read_exact(data) {
            return store_failure("read", e);
        }
        Ok(())
    }
}
