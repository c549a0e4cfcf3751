// src/miner/algorithm/sizes.rs
//! Epoch sizing
//!
//! Maps block numbers to epochs and epochs to their cache size, dataset size
//! and seed hash. Sizes shrink from the linear growth formula to the nearest
//! value whose row count is prime; seeds are a Keccak-256 chain from zero.
//! All three are memoized since they are requested on every verification.

use super::{
    CACHE_BYTES_GROWTH, CACHE_BYTES_INIT, DATASET_BYTES_GROWTH, DATASET_BYTES_INIT, EPOCH_LENGTH,
    HASH_BYTES, MAX_EPOCH, MIX_BYTES, keccak256,
};
use crate::utils::error::EngineError;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Seed chain entries kept in memory; later epochs extend from the last one.
const SEED_MEMO_EPOCHS: u64 = 2048;

lazy_static! {
    static ref CACHE_SIZES: Mutex<HashMap<u64, u64>> = Mutex::new(HashMap::new());
    static ref DATASET_SIZES: Mutex<HashMap<u64, u64>> = Mutex::new(HashMap::new());
    static ref SEEDS: Mutex<Vec<[u8; 32]>> = Mutex::new(vec![[0u8; 32]]);
}

/// Epoch a block belongs to
pub fn epoch(block: u64) -> u64 {
    block / EPOCH_LENGTH
}

/// Rejects epochs past [`MAX_EPOCH`]
///
/// Block numbers come straight from headers, so every path that sizes or
/// seeds an epoch goes through here first.
pub fn check_epoch(epoch: u64) -> Result<u64, EngineError> {
    if epoch > MAX_EPOCH {
        return Err(EngineError::EpochOutOfRange(epoch));
    }
    Ok(epoch)
}

/// Cache size in bytes for `epoch`
pub fn cache_size(epoch: u64) -> Result<u64, EngineError> {
    memoized(&CACHE_SIZES, check_epoch(epoch)?, calc_cache_size)
}

/// Dataset size in bytes for `epoch`
pub fn dataset_size(epoch: u64) -> Result<u64, EngineError> {
    memoized(&DATASET_SIZES, check_epoch(epoch)?, calc_dataset_size)
}

fn memoized(
    memo: &Mutex<HashMap<u64, u64>>,
    epoch: u64,
    calc: fn(u64) -> Option<u64>,
) -> Result<u64, EngineError> {
    let mut memo = memo.lock();
    if let Some(size) = memo.get(&epoch) {
        return Ok(*size);
    }
    let size = calc(epoch).ok_or(EngineError::EpochOutOfRange(epoch))?;
    memo.insert(epoch, size);
    Ok(size)
}

/// Seed hash for `epoch`: 32 zero bytes hashed `epoch` times
pub fn seed_hash(epoch: u64) -> [u8; 32] {
    let mut seeds = SEEDS.lock();
    let memo_limit = epoch.min(SEED_MEMO_EPOCHS) as usize;

    while seeds.len() <= memo_limit {
        let next = keccak256(&seeds[seeds.len() - 1]);
        seeds.push(next);
    }
    let mut seed = seeds[memo_limit];
    drop(seeds);

    for _ in memo_limit as u64..epoch {
        seed = keccak256(&seed);
    }
    seed
}

/// Cache size straight from the growth formula, without memoization
///
/// `None` if the formula overflows for `epoch`.
pub fn calc_cache_size(epoch: u64) -> Option<u64> {
    prime_adjusted(CACHE_BYTES_INIT, CACHE_BYTES_GROWTH, HASH_BYTES as u64, epoch)
}

/// Dataset size straight from the growth formula, without memoization
///
/// `None` if the formula overflows for `epoch`.
pub fn calc_dataset_size(epoch: u64) -> Option<u64> {
    prime_adjusted(DATASET_BYTES_INIT, DATASET_BYTES_GROWTH, MIX_BYTES as u64, epoch)
}

fn prime_adjusted(init: u64, growth: u64, row: u64, epoch: u64) -> Option<u64> {
    let mut size = growth.checked_mul(epoch)?.checked_add(init)?.checked_sub(row)?;
    while !is_prime(size / row) {
        size = size.checked_sub(2 * row)?;
    }
    Some(size)
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut divisor = 3u64;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}
