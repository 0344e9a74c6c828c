/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::cmp::max;

use log::{debug, info};
use tempdir::TempDir;

use crate::enabled_features::{EnabledFeatures, SpillTarget};
use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::jpeg::Block;
use crate::memory::backing_store::{BackingStore, MemoryBackingStore, TempFileBackingStore};
use crate::memory::pool::{PoolAllocator, PoolElement, PoolId};
use crate::memory::virtual_array::VirtualArray;
use crate::metrics::Metrics;

/// Handle to a virtual array of sample rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtSarrayHandle {
    index: usize,
    generation: u32,
}

/// Handle to a virtual array of coefficient block rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtBarrayHandle {
    index: usize,
    generation: u32,
}

/// Owns the pools and every virtual array of a compressor or decompressor.
pub struct MemoryManager {
    alloc: PoolAllocator,
    sarrays: Vec<VirtualArray<u8>>,
    barrays: Vec<VirtualArray<Block>>,
    max_memory_to_use: usize,
    spill_target: SpillTarget,
    temp_dir: Option<TempDir>,
    spill_files: u32,
    /// bumped whenever the image pool is freed so stale array handles are caught
    generation: u32,
    metrics: Metrics,
}

impl MemoryManager {
    pub fn new(features: &EnabledFeatures) -> Self {
        MemoryManager {
            alloc: PoolAllocator::new(features.max_alloc_chunk),
            sarrays: Vec::new(),
            barrays: Vec::new(),
            max_memory_to_use: features.max_memory_to_use,
            spill_target: features.spill_target.clone(),
            temp_dir: None,
            spill_files: 0,
            generation: 0,
            metrics: Metrics::default(),
        }
    }

    pub fn pools(&self) -> &PoolAllocator {
        &self.alloc
    }

    pub fn pools_mut(&mut self) -> &mut PoolAllocator {
        &mut self.alloc
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    fn check_pool(pool: PoolId) -> Result<()> {
        if pool != PoolId::Image {
            return err_exit_code(
                ExitCode::SyntaxError,
                "virtual arrays can only be allocated in the image pool",
            );
        }
        Ok(())
    }

    /// Registers a virtual array of sample rows. Nothing is allocated until
    /// `realize_virt_arrays` is called.
    pub fn request_virt_sarray(
        &mut self,
        pool: PoolId,
        pre_zero: bool,
        samples_per_row: usize,
        num_rows: usize,
        max_access: usize,
    ) -> Result<VirtSarrayHandle> {
        Self::check_pool(pool)?;
        check_extent(samples_per_row, num_rows, max_access)?;
        self.sarrays.push(VirtualArray::new(
            pool,
            pre_zero,
            samples_per_row,
            num_rows,
            max_access,
        ));
        Ok(VirtSarrayHandle {
            index: self.sarrays.len() - 1,
            generation: self.generation,
        })
    }

    /// Registers a virtual array of coefficient block rows. Nothing is allocated
    /// until `realize_virt_arrays` is called.
    pub fn request_virt_barray(
        &mut self,
        pool: PoolId,
        pre_zero: bool,
        blocks_per_row: usize,
        num_rows: usize,
        max_access: usize,
    ) -> Result<VirtBarrayHandle> {
        Self::check_pool(pool)?;
        check_extent(blocks_per_row, num_rows, max_access)?;
        self.barrays.push(VirtualArray::new(
            pool,
            pre_zero,
            blocks_per_row,
            num_rows,
            max_access,
        ));
        Ok(VirtBarrayHandle {
            index: self.barrays.len() - 1,
            generation: self.generation,
        })
    }

    /// Allocates storage for every requested but not yet realized array. If all of
    /// them fit in the remaining memory budget they become fully resident, otherwise
    /// the big ones get a window of a whole number of `max_access` row groups and a
    /// backing store.
    pub fn realize_virt_arrays(&mut self) -> Result<()> {
        let mut space_per_minheight: usize = 0;
        let mut maximum_space: usize = 0;

        for a in self.sarrays.iter().filter(|a| !a.is_realized()) {
            space_per_minheight += a.max_access() * a.row_bytes();
            maximum_space += a.rows() * a.row_bytes();
        }
        for a in self.barrays.iter().filter(|a| !a.is_realized()) {
            space_per_minheight += a.max_access() * a.row_bytes();
            maximum_space += a.rows() * a.row_bytes();
        }

        if space_per_minheight == 0 {
            return Ok(());
        }

        let avail = self.max_memory_to_use.saturating_sub(self.alloc.total_in_use());
        let max_minheights = if maximum_space <= avail {
            usize::MAX
        } else {
            max(1, avail / space_per_minheight)
        };

        debug!(
            "realizing virtual arrays: needed={0} per_minheight={1} avail={2}",
            maximum_space, space_per_minheight, avail
        );

        let mut arrays = std::mem::take(&mut self.sarrays);
        let r = self.realize_all(&mut arrays, max_minheights);
        self.sarrays = arrays;
        r?;

        let mut arrays = std::mem::take(&mut self.barrays);
        let r = self.realize_all(&mut arrays, max_minheights);
        self.barrays = arrays;
        r
    }

    fn realize_all<T: PoolElement>(
        &mut self,
        arrays: &mut [VirtualArray<T>],
        max_minheights: usize,
    ) -> Result<()> {
        for a in arrays.iter_mut().filter(|a| !a.is_realized()) {
            let rows = a.rows();
            let max_access = a.max_access();
            let minheights = (rows - 1) / max_access + 1;
            if minheights <= max_minheights {
                a.realize(&mut self.alloc, rows, None)?;
            } else {
                let store = self.open_backing_store()?;
                a.realize(&mut self.alloc, max_minheights * max_access, Some(store))?;
                info!(
                    "virtual array of {0} rows spilled, {1} rows resident",
                    a.rows(),
                    a.rows_in_mem()
                );
            }
        }
        Ok(())
    }

    fn open_backing_store(&mut self) -> Result<Box<dyn BackingStore>> {
        match &self.spill_target {
            SpillTarget::Memory => Ok(Box::new(MemoryBackingStore::default())),
            SpillTarget::TempFile(dir) => {
                if self.temp_dir.is_none() {
                    let created = match dir {
                        Some(d) => TempDir::new_in(d, "jpeg_scan_engine"),
                        None => TempDir::new("jpeg_scan_engine"),
                    };
                    match created {
                        Ok(t) => self.temp_dir = Some(t),
                        Err(e) => {
                            return err_exit_code(
                                ExitCode::BackingStoreFailure,
                                format!("unable to create spill directory: {0}", e),
                            )
                        }
                    }
                }

                self.spill_files += 1;
                let name = format!("varray{0}.bin", self.spill_files);
                match &self.temp_dir {
                    Some(t) => Ok(Box::new(TempFileBackingStore::create(t.path(), &name)?)),
                    None => err_exit_code(ExitCode::AssertionFailure, "spill directory missing"),
                }
            }
        }
    }

    pub fn access_virt_sarray(
        &mut self,
        handle: VirtSarrayHandle,
        start_row: usize,
        num_rows: usize,
        writable: bool,
    ) -> Result<&mut [u8]> {
        if handle.generation != self.generation || handle.index >= self.sarrays.len() {
            return err_exit_code(ExitCode::BadVirtualAccess, "stale virtual array handle");
        }
        self.sarrays[handle.index].access(
            &mut self.alloc,
            &mut self.metrics,
            start_row,
            num_rows,
            writable,
        )
    }

    pub fn access_virt_barray(
        &mut self,
        handle: VirtBarrayHandle,
        start_row: usize,
        num_rows: usize,
        writable: bool,
    ) -> Result<&mut [Block]> {
        if handle.generation != self.generation || handle.index >= self.barrays.len() {
            return err_exit_code(ExitCode::BadVirtualAccess, "stale virtual array handle");
        }
        self.barrays[handle.index].access(
            &mut self.alloc,
            &mut self.metrics,
            start_row,
            num_rows,
            writable,
        )
    }

    /// number of blocks per row and rows of a coefficient array
    pub fn barray_extent(&self, handle: VirtBarrayHandle) -> Result<(usize, usize)> {
        if handle.generation != self.generation || handle.index >= self.barrays.len() {
            return err_exit_code(ExitCode::BadVirtualAccess, "stale virtual array handle");
        }
        let a = &self.barrays[handle.index];
        Ok((a.row_len(), a.rows()))
    }

    /// True if any array of the current datastream had to spill
    pub fn is_spilling(&self) -> bool {
        self.sarrays.iter().any(|a| a.has_backing_store())
            || self.barrays.iter().any(|a| a.has_backing_store())
    }

    /// Releases a pool. Freeing the image pool destroys every virtual array and
    /// its spill storage.
    pub fn free_pool(&mut self, pool: PoolId) {
        self.sarrays.clear();
        self.barrays.clear();
        self.temp_dir = None;
        self.spill_files = 0;
        self.generation = self.generation.wrapping_add(1);
        self.alloc.free_pool(pool);
    }
}

fn check_extent(row_len: usize, num_rows: usize, max_access: usize) -> Result<()> {
    if row_len == 0 || num_rows == 0 || max_access == 0 {
        return err_exit_code(
            ExitCode::SyntaxError,
            format!(
                "empty virtual array request {0}x{1} max_access {2}",
                row_len, num_rows, max_access
            ),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_memory_manager(limit: usize, spill_target: SpillTarget) -> MemoryManager {
        let mut features = EnabledFeatures::low_memory(limit);
        features.spill_target = spill_target;
        MemoryManager::new(&features)
    }

    #[test]
    fn everything_fits() {
        let mut mm = small_memory_manager(1 << 20, SpillTarget::Memory);
        let b = mm.request_virt_barray(PoolId::Image, true, 10, 10, 2).unwrap();
        let s = mm.request_virt_sarray(PoolId::Image, false, 100, 16, 8).unwrap();
        mm.realize_virt_arrays().unwrap();
        assert!(!mm.is_spilling());

        // writes must not skip rows that were never defined
        assert_eq!(
            mm.access_virt_barray(b, 8, 2, true).unwrap_err().exit_code(),
            ExitCode::BadVirtualAccess
        );

        for row in (0..10).step_by(2) {
            mm.access_virt_barray(b, row, 2, true).unwrap()[0][0] = row as i16;
        }
        mm.access_virt_sarray(s, 0, 8, true).unwrap()[99] = 3;
        assert_eq!(mm.access_virt_barray(b, 8, 1, false).unwrap()[0][0], 8);
        assert_eq!(mm.access_virt_sarray(s, 0, 1, false).unwrap()[99], 3);
    }

    #[test]
    fn only_image_pool() {
        let mut mm = small_memory_manager(1 << 20, SpillTarget::Memory);
        assert_eq!(
            mm.request_virt_barray(PoolId::Permanent, true, 1, 1, 1)
                .unwrap_err()
                .exit_code(),
            ExitCode::SyntaxError
        );
    }

    #[test]
    fn spills_to_temp_file() {
        // 40 rows of 4 blocks is 20k, only give it room for a few rows
        let mut mm = small_memory_manager(4096, SpillTarget::TempFile(None));
        let b = mm.request_virt_barray(PoolId::Image, true, 4, 40, 2).unwrap();
        mm.realize_virt_arrays().unwrap();
        assert!(mm.is_spilling());

        for row in 0..40 {
            let w = mm.access_virt_barray(b, row, 1, true).unwrap();
            w[3][17] = row as i16;
        }
        for row in 0..40 {
            let r = mm.access_virt_barray(b, row, 1, false).unwrap();
            assert_eq!(r[3][17], row as i16);
        }
        assert!(mm.metrics().bytes_spilled() > 0);

        mm.free_pool(PoolId::Image);
        assert!(mm.access_virt_barray(b, 0, 1, false).is_err());
    }
}
