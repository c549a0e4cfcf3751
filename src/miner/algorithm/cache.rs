// src/miner/algorithm/cache.rs
//! Cache generation
//!
//! The cache is a chain of Keccak-512 rows seeded from the epoch seed,
//! then mixed `CACHE_ROUNDS` times with a RandMemoHash pass where each row
//! is rehashed from its predecessor XOR a row it points at.

use super::{CACHE_ROUNDS, HASH_BYTES, keccak512};
use crate::utils::error::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Fills `dest` with the cache for `seed`
///
/// # Arguments
/// * `dest` - Output buffer, a non-zero multiple of `HASH_BYTES`
/// * `seed` - Epoch seed hash
/// * `abort` - Checked before the sequential fill and between mixing rounds
///
/// # Returns
/// - `Ok(())` once every round completed
/// - `Err(EngineError::GenerationCancelled)` if `abort` was raised; `dest`
///   then holds unusable partial data and must be discarded
pub fn generate_cache(dest: &mut [u8], seed: &[u8; 32], abort: &AtomicBool) -> Result<(), EngineError> {
    if dest.is_empty() || dest.len() % HASH_BYTES != 0 {
        return Err(EngineError::Input(format!(
            "cache size {} is not a multiple of {}",
            dest.len(),
            HASH_BYTES
        )));
    }
    let rows = dest.len() / HASH_BYTES;

    if abort.load(Ordering::Relaxed) {
        return Err(EngineError::GenerationCancelled);
    }
    dest[..HASH_BYTES].copy_from_slice(&keccak512(seed));
    for row in 1..rows {
        let (done, rest) = dest.split_at_mut(row * HASH_BYTES);
        rest[..HASH_BYTES].copy_from_slice(&keccak512(&done[(row - 1) * HASH_BYTES..]));
    }

    let mut temp = [0u8; HASH_BYTES];
    for _ in 0..CACHE_ROUNDS {
        if abort.load(Ordering::Relaxed) {
            return Err(EngineError::GenerationCancelled);
        }
        for row in 0..rows {
            let src = ((row + rows - 1) % rows) * HASH_BYTES;
            let dst = row * HASH_BYTES;
            let pick = u32::from_le_bytes([dest[dst], dest[dst + 1], dest[dst + 2], dest[dst + 3]]);
            let xor = (pick as usize % rows) * HASH_BYTES;

            for (i, byte) in temp.iter_mut().enumerate() {
                *byte = dest[src + i] ^ dest[xor + i];
            }
            dest[dst..dst + HASH_BYTES].copy_from_slice(&keccak512(&temp));
        }
    }
    Ok(())
}
