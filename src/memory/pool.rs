/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Arena allocator with two lifetimes. Nothing allocated from a pool is ever freed
//! individually; the whole pool is released at once when the datastream (image pool)
//! or the engine instance (permanent pool) goes away.

use std::marker::PhantomData;

use log::debug;

use crate::engine_error::{err_exit_code, ExitCode, Result};
use crate::jpeg::Block;

/// Lifetime of an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolId {
    /// lives as long as the compressor/decompressor instance
    Permanent = 0,
    /// lives until the current datastream is finished or aborted
    Image = 1,
}

pub const NUM_POOLS: usize = 2;

/// Typed handle to a run of elements inside a pool. Handles are invalidated
/// (detected, not undefined) when their pool is freed.
#[derive(Debug)]
pub struct PoolHandle<T> {
    pool: PoolId,
    generation: u32,
    index: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PoolHandle<T> {}

/// Element types that can be allocated from a pool. Each type lives in its own arena
/// so slices come back with the right alignment.
pub trait PoolElement: bytemuck::Pod {
    fn arena(pool: &Pool) -> &Vec<Vec<Self>>;
    fn arena_mut(pool: &mut Pool) -> &mut Vec<Vec<Self>>;
}

impl PoolElement for u8 {
    fn arena(pool: &Pool) -> &Vec<Vec<Self>> {
        &pool.bytes
    }
    fn arena_mut(pool: &mut Pool) -> &mut Vec<Vec<Self>> {
        &mut pool.bytes
    }
}

impl PoolElement for Block {
    fn arena(pool: &Pool) -> &Vec<Vec<Self>> {
        &pool.blocks
    }
    fn arena_mut(pool: &mut Pool) -> &mut Vec<Vec<Self>> {
        &mut pool.blocks
    }
}

#[derive(Default)]
pub struct Pool {
    bytes: Vec<Vec<u8>>,
    blocks: Vec<Vec<Block>>,
    small_bytes: usize,
    large_bytes: usize,
    generation: u32,
}

impl Pool {
    fn in_use(&self) -> usize {
        self.small_bytes + self.large_bytes
    }
}

pub struct PoolAllocator {
    pools: [Pool; NUM_POOLS],
    max_alloc_chunk: usize,
}

impl PoolAllocator {
    pub fn new(max_alloc_chunk: usize) -> Self {
        PoolAllocator {
            pools: [Pool::default(), Pool::default()],
            max_alloc_chunk,
        }
    }

    /// Allocates a small zeroed byte object, charged to the small object count.
    pub fn alloc_small(&mut self, pool: PoolId, size: usize) -> Result<PoolHandle<u8>> {
        let h = self.alloc::<u8>(pool, size)?;
        self.pools[pool as usize].small_bytes += size;
        Ok(h)
    }

    /// Allocates a large zeroed byte object.
    pub fn alloc_large(&mut self, pool: PoolId, size: usize) -> Result<PoolHandle<u8>> {
        let h = self.alloc::<u8>(pool, size)?;
        self.pools[pool as usize].large_bytes += size;
        Ok(h)
    }

    /// Allocates `num_rows` contiguous rows of `samples_per_row` samples.
    pub fn alloc_sarray(
        &mut self,
        pool: PoolId,
        samples_per_row: usize,
        num_rows: usize,
    ) -> Result<PoolHandle<u8>> {
        self.alloc_rows::<u8>(pool, samples_per_row, num_rows)
    }

    /// Allocates `num_rows` contiguous rows of `blocks_per_row` coefficient blocks.
    pub fn alloc_barray(
        &mut self,
        pool: PoolId,
        blocks_per_row: usize,
        num_rows: usize,
    ) -> Result<PoolHandle<Block>> {
        self.alloc_rows::<Block>(pool, blocks_per_row, num_rows)
    }

    /// Allocates `num_rows` contiguous rows of any pool element type, charged as a
    /// large object.
    pub fn alloc_rows<T: PoolElement>(
        &mut self,
        pool: PoolId,
        row_len: usize,
        num_rows: usize,
    ) -> Result<PoolHandle<T>> {
        let count = checked_count(row_len, num_rows)?;
        let bytes = checked_count(count, std::mem::size_of::<T>())?;
        let h = self.alloc::<T>(pool, count)?;
        self.pools[pool as usize].large_bytes += bytes;
        Ok(h)
    }

    fn alloc<T: PoolElement>(&mut self, pool: PoolId, count: usize) -> Result<PoolHandle<T>> {
        let bytes = checked_count(count, std::mem::size_of::<T>())?;
        if bytes > self.max_alloc_chunk {
            return err_exit_code(
                ExitCode::OutOfMemory,
                format!(
                    "allocation of {0} bytes exceeds max_alloc_chunk {1}",
                    bytes, self.max_alloc_chunk
                ),
            );
        }

        let p = &mut self.pools[pool as usize];
        let mut v = Vec::new();
        if v.try_reserve_exact(count).is_err() {
            return err_exit_code(
                ExitCode::OutOfMemory,
                format!("unable to allocate {0} bytes", bytes),
            );
        }
        v.resize(count, T::zeroed());

        let generation = p.generation;
        let arena = T::arena_mut(p);
        arena.push(v);

        Ok(PoolHandle {
            pool,
            generation,
            index: arena.len() - 1,
            _marker: PhantomData,
        })
    }

    fn check<T: PoolElement>(&self, h: &PoolHandle<T>) -> Result<()> {
        let p = &self.pools[h.pool as usize];
        if h.generation != p.generation || h.index >= T::arena(p).len() {
            return err_exit_code(
                ExitCode::BadVirtualAccess,
                format!("stale handle into {0:?} pool", h.pool),
            );
        }
        Ok(())
    }

    pub fn get<T: PoolElement>(&self, h: &PoolHandle<T>) -> Result<&[T]> {
        self.check(h)?;
        Ok(&T::arena(&self.pools[h.pool as usize])[h.index])
    }

    pub fn get_mut<T: PoolElement>(&mut self, h: &PoolHandle<T>) -> Result<&mut [T]> {
        self.check(h)?;
        Ok(&mut T::arena_mut(&mut self.pools[h.pool as usize])[h.index])
    }

    /// Releases everything allocated from the pool. Freeing the permanent pool
    /// releases the image pool as well since nothing in it can outlive the instance.
    pub fn free_pool(&mut self, pool: PoolId) {
        if pool == PoolId::Permanent {
            self.free_pool(PoolId::Image);
        }

        let p = &mut self.pools[pool as usize];
        debug!(
            "freeing {0:?} pool: small={1} large={2}",
            pool, p.small_bytes, p.large_bytes
        );

        let generation = p.generation.wrapping_add(1);
        *p = Pool::default();
        p.generation = generation;
    }

    pub fn bytes_in_use(&self, pool: PoolId) -> usize {
        self.pools[pool as usize].in_use()
    }

    pub fn total_in_use(&self) -> usize {
        self.pools.iter().map(|p| p.in_use()).sum()
    }
}

fn checked_count(a: usize, b: usize) -> Result<usize> {
    match a.checked_mul(b) {
        Some(x) => Ok(x),
        None => err_exit_code(ExitCode::OutOfMemory, "allocation size overflow"),
    }
}
