/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::cmp::min;

use log::trace;

use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::memory::backing_store::BackingStore;
use crate::memory::pool::{PoolAllocator, PoolElement, PoolHandle, PoolId};
use crate::metrics::Metrics;

/// A logical 2-D array of `rows × row_len` elements of which only `rows_in_mem`
/// consecutive rows are resident at any time. Rows outside the resident window
/// live in the backing store. Accesses hand out slices of the resident window,
/// swapping as needed.
pub struct VirtualArray<T: PoolElement> {
    pool: PoolId,
    rows: usize,
    row_len: usize,
    max_access: usize,
    pre_zero: bool,

    rows_in_mem: usize,
    mem_buffer: Option<PoolHandle<T>>,
    store: Option<Box<dyn BackingStore>>,

    /// first resident row
    cur_start_row: usize,
    /// rows at and beyond this one were never written
    first_undef_row: usize,
    /// resident rows were modified since they were loaded
    dirty: bool,
}

impl<T: PoolElement> VirtualArray<T> {
    pub fn new(pool: PoolId, pre_zero: bool, row_len: usize, rows: usize, max_access: usize) -> Self {
        VirtualArray {
            pool,
            rows,
            row_len,
            max_access,
            pre_zero,
            rows_in_mem: 0,
            mem_buffer: None,
            store: None,
            cur_start_row: 0,
            first_undef_row: 0,
            dirty: false,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn row_len(&self) -> usize {
        self.row_len
    }

    pub fn max_access(&self) -> usize {
        self.max_access
    }

    pub fn row_bytes(&self) -> usize {
        self.row_len * std::mem::size_of::<T>()
    }

    pub fn is_realized(&self) -> bool {
        self.mem_buffer.is_some()
    }

    pub fn rows_in_mem(&self) -> usize {
        self.rows_in_mem
    }

    pub fn has_backing_store(&self) -> bool {
        self.store.is_some()
    }

    /// Allocates the resident window. If `rows_in_mem` is smaller than the array a
    /// backing store has to be supplied.
    pub fn realize(
        &mut self,
        alloc: &mut PoolAllocator,
        rows_in_mem: usize,
        store: Option<Box<dyn BackingStore>>,
    ) -> Result<()> {
        let rows_in_mem = min(rows_in_mem, self.rows);
        if rows_in_mem < self.rows && store.is_none() {
            return err_exit_code(
                ExitCode::AssertionFailure,
                "partially resident virtual array without backing store",
            );
        }

        self.mem_buffer = Some(alloc.alloc_rows::<T>(self.pool, self.row_len, rows_in_mem)?);
        self.rows_in_mem = rows_in_mem;
        self.store = store;
        self.cur_start_row = 0;
        self.first_undef_row = 0;
        self.dirty = false;
        Ok(())
    }

    /// Returns rows `start_row..start_row+num_rows` as one contiguous slice of
    /// `num_rows * row_len` elements. Content written through a writable access is
    /// preserved exactly, whether or not it is spilled in between.
    pub fn access<'a>(
        &mut self,
        alloc: &'a mut PoolAllocator,
        metrics: &mut Metrics,
        start_row: usize,
        num_rows: usize,
        writable: bool,
    ) -> Result<&'a mut [T]> {
        let end_row = start_row + num_rows;
        let handle = match self.mem_buffer {
            Some(h) => h,
            None => {
                return err_exit_code(
                    ExitCode::BadVirtualAccess,
                    "virtual array accessed before realization",
                )
            }
        };

        if end_row > self.rows || num_rows > self.max_access {
            return err_exit_code(
                ExitCode::BadVirtualAccess,
                format!(
                    "access rows {0}..{1} of {2} (max_access {3})",
                    start_row, end_row, self.rows, self.max_access
                ),
            );
        }

        if start_row < self.cur_start_row || end_row > self.cur_start_row + self.rows_in_mem {
            if self.store.is_none() {
                return err_exit_code(
                    ExitCode::AssertionFailure,
                    "resident virtual array window moved",
                );
            }

            if self.dirty {
                self.do_io(alloc, metrics, true)?;
                self.dirty = false;
            }

            // moving forward keeps as much of the tail as possible resident,
            // moving backward starts the window at the requested row
            let new_start = if start_row > self.cur_start_row {
                end_row.saturating_sub(self.rows_in_mem)
            } else {
                start_row
            };
            self.cur_start_row = min(new_start, self.rows - self.rows_in_mem);

            trace!(
                "virtual array swap to rows {0}..{1}",
                self.cur_start_row,
                self.cur_start_row + self.rows_in_mem
            );

            self.do_io(alloc, metrics, false)?;
        }

        if self.first_undef_row < end_row {
            let undef_row = if self.first_undef_row < start_row {
                if writable {
                    return err_exit_code(
                        ExitCode::BadVirtualAccess,
                        format!(
                            "write to row {0} skips undefined rows from {1}",
                            start_row, self.first_undef_row
                        ),
                    );
                }
                start_row
            } else {
                self.first_undef_row
            };

            if writable {
                self.first_undef_row = end_row;
            }

            if self.pre_zero {
                let buffer = alloc.get_mut(&handle)?;
                let from = (undef_row - self.cur_start_row) * self.row_len;
                let to = (end_row - self.cur_start_row) * self.row_len;
                buffer[from..to].fill(T::zeroed());
            } else if !writable {
                return err_exit_code(
                    ExitCode::BadVirtualAccess,
                    format!("read of undefined row {0}", undef_row),
                );
            }
        }

        if writable {
            self.dirty = true;
        }

        let from = (start_row - self.cur_start_row) * self.row_len;
        let to = from + num_rows * self.row_len;
        Ok(&mut alloc.get_mut(&handle)?[from..to])
    }

    /// Writes the defined part of the resident window to the backing store, or
    /// reads it back.
    fn do_io(&mut self, alloc: &mut PoolAllocator, metrics: &mut Metrics, writing: bool) -> Result<()> {
        let (handle, store) = match (&self.mem_buffer, &mut self.store) {
            (Some(h), Some(s)) => (*h, s),
            _ => return err_exit_code(ExitCode::AssertionFailure, "virtual array has no backing store"),
        };

        // rows past first_undef_row hold nothing worth saving or restoring
        let valid_end = min(self.first_undef_row, self.rows);
        let rows = min(self.rows_in_mem, valid_end.saturating_sub(self.cur_start_row));
        if rows == 0 {
            return Ok(());
        }

        let row_bytes = self.row_len * std::mem::size_of::<T>();
        let offset = (self.cur_start_row * row_bytes) as u64;
        let buffer = &mut alloc.get_mut(&handle)?[0..rows * self.row_len];

        if writing {
            store.write_at(offset, bytemuck::cast_slice(buffer))?;
            metrics.record_swap_out((rows * row_bytes) as u64);
        } else {
            store.read_at(offset, bytemuck::cast_slice_mut(buffer))?;
            metrics.record_swap_in((rows * row_bytes) as u64);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::Block;
    use crate::memory::backing_store::MemoryBackingStore;

    fn make(rows: usize, rows_in_mem: usize, pre_zero: bool) -> (VirtualArray<Block>, PoolAllocator) {
        let mut alloc = PoolAllocator::new(1 << 24);
        let mut a = VirtualArray::<Block>::new(PoolId::Image, pre_zero, 3, rows, 2);
        a.realize(
            &mut alloc,
            rows_in_mem,
            Some(Box::new(MemoryBackingStore::default())),
        )
        .unwrap();
        (a, alloc)
    }

    #[test]
    fn eviction_round_trip() {
        let (mut a, mut alloc) = make(10, 4, true);
        let mut metrics = Metrics::default();

        for row in (0..10).step_by(2) {
            let w = a.access(&mut alloc, &mut metrics, row, 2, true).unwrap();
            for (i, b) in w.iter_mut().enumerate() {
                b[0] = (row * 100 + i) as i16;
                b[63] = -(row as i16);
            }
        }
        assert!(metrics.swap_writes() > 0);

        // read backwards to force the window to move the other way
        for row in (0..10).step_by(2).rev() {
            let r = a.access(&mut alloc, &mut metrics, row, 2, false).unwrap();
            for (i, b) in r.iter().enumerate() {
                assert_eq!(b[0], (row * 100 + i) as i16);
                assert_eq!(b[63], -(row as i16));
            }
        }
        assert!(metrics.swap_reads() > 0);
    }

    #[test]
    fn pre_zero_and_undefined_rows() {
        let (mut a, mut alloc) = make(10, 4, false);
        let mut metrics = Metrics::default();

        // reading never written rows without pre-zero is an error
        assert_eq!(
            a.access(&mut alloc, &mut metrics, 0, 1, false)
                .unwrap_err()
                .exit_code(),
            ExitCode::BadVirtualAccess
        );

        // a writer may not skip rows
        assert!(a.access(&mut alloc, &mut metrics, 3, 1, true).is_err());

        let (mut z, mut alloc) = make(10, 4, true);
        let r = z.access(&mut alloc, &mut metrics, 6, 2, false).unwrap();
        assert!(r.iter().all(|b| b.iter().all(|&c| c == 0)));
    }

    #[test]
    fn out_of_bounds_access() {
        let (mut a, mut alloc) = make(10, 4, true);
        let mut metrics = Metrics::default();
        assert!(a.access(&mut alloc, &mut metrics, 9, 2, true).is_err());
        assert!(a.access(&mut alloc, &mut metrics, 0, 3, true).is_err());
    }
}
