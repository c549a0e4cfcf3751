// src/miner/algorithm/mod.rs
//! Memory-hard proof-of-work algorithm
//!
//! The pieces, leaves first:
//! - [`sizes`]: block number to epoch, epoch to cache/dataset sizes and seed
//! - [`cache`]: the verification cache built from an epoch seed
//! - [`dataset`]: the full mining dataset expanded from a cache
//! - [`hashimoto`]: the mixing function run per nonce, light or full
//!
//! Every output here is consensus critical. Words are always little-endian
//! and the constants below are fixed by the network, not tunables.

/// Epoch sizing and seed derivation
pub mod sizes;

/// Cache generation from an epoch seed
pub mod cache;

/// Dataset item derivation and parallel dataset generation
pub mod dataset;

/// The hashimoto mixing function
pub mod hashimoto;

use crate::utils::error::EngineError;
use ethereum_types::{H256, U256};
use tiny_keccak::{Hasher, Keccak};

/// Blocks per epoch
pub const EPOCH_LENGTH: u64 = 30_000;
/// Bytes in a cache row / dataset item
pub const HASH_BYTES: usize = 64;
/// 32-bit words in a cache row / dataset item
pub const HASH_WORDS: usize = HASH_BYTES / 4;
/// Width of the hashimoto mix in bytes
pub const MIX_BYTES: usize = 128;
/// 32-bit words in the hashimoto mix
pub const MIX_WORDS: usize = MIX_BYTES / 4;
/// Cache rows folded into each dataset item
pub const DATASET_PARENTS: u32 = 256;
/// Random mixing passes over the cache
pub const CACHE_ROUNDS: usize = 3;
/// Dataset accesses per hashimoto evaluation
pub const ACCESSES: u32 = 64;
/// Dataset size at epoch 0, before prime adjustment
pub const DATASET_BYTES_INIT: u64 = 1 << 30;
/// Dataset growth per epoch
pub const DATASET_BYTES_GROWTH: u64 = 1 << 23;
/// Cache size at epoch 0, before prime adjustment
pub const CACHE_BYTES_INIT: u64 = 1 << 24;
/// Cache growth per epoch
pub const CACHE_BYTES_GROWTH: u64 = 1 << 17;
/// Last epoch caches and datasets are generated for
pub const MAX_EPOCH: u64 = 2048;
/// Revision tag embedded in on-disk file names
pub const ALGORITHM_REVISION: u32 = 23;

const FNV_PRIME: u32 = 0x0100_0193;

/// Common interface for the two ways of reading dataset items
///
/// Full mode reads the materialized dataset; light mode recomputes each
/// requested item from the cache. Both must return identical words.
pub trait ItemSource {
    /// Size in bytes of the (possibly virtual) dataset
    fn dataset_size(&self) -> u64;

    /// The 64-byte dataset item at `index`, as little-endian words
    fn item(&self, index: u32) -> [u32; HASH_WORDS];
}

/// Keccak-256 with the original (pre-SHA3) padding
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Keccak-512 with the original (pre-SHA3) padding
pub fn keccak512(data: &[u8]) -> [u8; HASH_BYTES] {
    let mut hasher = Keccak::v512();
    hasher.update(data);
    let mut out = [0u8; HASH_BYTES];
    hasher.finalize(&mut out);
    out
}

/// FNV-style mixing step used in place of XOR
#[inline]
pub(crate) fn fnv(a: u32, b: u32) -> u32 {
    a.wrapping_mul(FNV_PRIME) ^ b
}

/// Applies [`fnv`] element-wise, folding `data` into `mix`
#[inline]
pub(crate) fn fnv_hash(mix: &mut [u32], data: &[u32]) {
    for (m, d) in mix.iter_mut().zip(data) {
        *m = fnv(*m, *d);
    }
}

/// Reads the `HASH_WORDS` little-endian words of a 64-byte row
#[inline]
pub(crate) fn row_words(bytes: &[u8]) -> [u32; HASH_WORDS] {
    let mut words = [0u32; HASH_WORDS];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Writes words as little-endian bytes into `out`
#[inline]
pub(crate) fn put_words(out: &mut [u8], words: &[u32]) {
    for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

/// Derives the sealing target `2^256 / difficulty`
///
/// # Returns
/// - `Ok(U256)` - the largest result value still accepted
/// - `Err(EngineError::InvalidDifficulty)` - if difficulty is zero
pub fn difficulty_target(difficulty: U256) -> Result<U256, EngineError> {
    if difficulty.is_zero() {
        return Err(EngineError::InvalidDifficulty);
    }
    // 2^256 = MAX + 1, so the quotient gains one exactly when the
    // remainder of MAX wraps around to a full divisor. Difficulty 1 would
    // need 2^256 itself; MAX accepts the same set of results.
    let quotient = U256::MAX / difficulty;
    let remainder = U256::MAX % difficulty;
    if remainder == difficulty - 1 {
        Ok(quotient.saturating_add(U256::one()))
    } else {
        Ok(quotient)
    }
}

/// Whether a hashimoto result, read as a big-endian integer, is at most `target`
pub fn meets_target(result: &H256, target: &U256) -> bool {
    U256::from_big_endian(result.as_bytes()) <= *target
}
