/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::engine_error::{EngineError, ExitCode};

/// Helper function to catch panics and convert them into the appropriate EngineError.
/// Used around calls into caller supplied collaborators (transforms, sinks) so a
/// panic there surfaces as an error instead of tearing down the caller.
pub fn catch_unwind_result<R>(
    f: impl FnOnce() -> Result<R, EngineError>,
) -> Result<R, EngineError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r.map_err(|e| e.into()),
        Err(err) => {
            if let Some(message) = err.downcast_ref::<&str>() {
                Err(EngineError::new(ExitCode::AssertionFailure, *message))
            } else if let Some(message) = err.downcast_ref::<String>() {
                Err(EngineError::new(ExitCode::AssertionFailure, message))
            } else {
                Err(EngineError::new(
                    ExitCode::AssertionFailure,
                    "unknown panic",
                ))
            }
        }
    }
}

#[inline(always)]
pub const fn u16_bit_length(v: u16) -> u8 {
    return 16 - v.leading_zeros() as u8;
}

#[inline(always)]
pub const fn devli(s: u8, value: u16) -> i16 {
    let shifted = 1 << s;

    if value & (shifted >> 1) != 0 {
        value as i16
    } else {
        value.wrapping_add(2).wrapping_add(!shifted) as i16
    }
}

/// check to make sure the behavior hasn't changed even with the optimization
#[test]
fn devli_test() {
    for s in 0u8..15 {
        for value in 0..(1 << s) {
            assert_eq!(
                devli(s, value),
                if s == 0 {
                    value as i16
                } else if value < (1 << (s as u16 - 1)) {
                    value as i16 + (-1 << s as i16) + 1
                } else {
                    value as i16
                }
            );
        }
    }
}

#[inline(always)]
pub const fn b_short(v1: u8, v2: u8) -> u16 {
    ((v1 as u16) << 8) + v2 as u16
}

#[inline(always)]
pub const fn rbits(c: u8, n: usize) -> u8 {
    return c & (0xFF >> (8 - n));
}

#[inline(always)]
pub const fn lbits(c: u8, n: usize) -> u8 {
    return c >> (8 - n);
}

/// integer division rounding up, used everywhere block and MCU counts are derived
#[inline(always)]
pub const fn div_round_up(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// rounds `a` up to the next multiple of `b`
#[inline(always)]
pub const fn round_up(a: u32, b: u32) -> u32 {
    div_round_up(a, b) * b
}

#[test]
fn round_up_test() {
    assert_eq!(div_round_up(0, 8), 0);
    assert_eq!(div_round_up(1, 8), 1);
    assert_eq!(div_round_up(8, 8), 1);
    assert_eq!(div_round_up(9, 8), 2);
    assert_eq!(round_up(9, 2), 10);
    assert_eq!(round_up(10, 2), 10);
    assert_eq!(lbits(0xAB, 4), 0xA);
    assert_eq!(rbits(0xAB, 4), 0xB);
    assert_eq!(u16_bit_length(0), 0);
    assert_eq!(u16_bit_length(255), 8);
}

#[cfg(test)]
pub fn get_rand_from_seed(seed: [u8; 32]) -> rand_chacha::ChaCha12Rng {
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    ChaCha12Rng::from_seed(seed)
}
