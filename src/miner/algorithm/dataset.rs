// src/miner/algorithm/dataset.rs
//! Dataset generation
//!
//! Every 64-byte dataset item is an independent function of the cache and
//! its index, so generation splits the output into disjoint chunks and
//! fills them on the rayon pool. Progress is reported per whole percent.

use super::{DATASET_PARENTS, HASH_BYTES, HASH_WORDS, fnv, fnv_hash, keccak512, put_words, row_words};
use crate::utils::error::EngineError;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Dataset items produced per parallel task
const CHUNK_ITEMS: usize = 4096;

/// Computes dataset item `index` from `cache`
///
/// Used by full generation and, on demand, by light-mode hashimoto.
pub fn dataset_item(cache: &[u8], index: u32) -> [u32; HASH_WORDS] {
    let rows = (cache.len() / HASH_BYTES) as u32;
    let start = (index % rows) as usize * HASH_BYTES;

    let mut mix = row_words(&cache[start..start + HASH_BYTES]);
    mix[0] ^= index;

    let mut bytes = [0u8; HASH_BYTES];
    put_words(&mut bytes, &mix);
    mix = row_words(&keccak512(&bytes));

    for round in 0..DATASET_PARENTS {
        let parent = (fnv(index ^ round, mix[round as usize % HASH_WORDS]) % rows) as usize;
        let offset = parent * HASH_BYTES;
        fnv_hash(&mut mix, &row_words(&cache[offset..offset + HASH_BYTES]));
    }

    put_words(&mut bytes, &mix);
    row_words(&keccak512(&bytes))
}

/// Expands `cache` into the full dataset in `dest`
///
/// # Arguments
/// * `dest` - Output buffer, a multiple of `HASH_BYTES`
/// * `cache` - Completed cache for the same epoch
/// * `progress` - Called with each newly reached percentage; returning
///   `false` stops generation
///
/// # Returns
/// - `Ok(())` when every item was written
/// - `Err(EngineError::GenerationCancelled)` if `progress` asked to stop.
///   Items already written are complete but `dest` as a whole is not, so
///   callers must not publish it.
pub fn generate_dataset(
    dest: &mut [u8],
    cache: &[u8],
    progress: &(dyn Fn(u32) -> bool + Sync),
) -> Result<(), EngineError> {
    if dest.len() % HASH_BYTES != 0 || cache.is_empty() || cache.len() % HASH_BYTES != 0 {
        return Err(EngineError::Input(format!(
            "dataset {} / cache {} not aligned to {} bytes",
            dest.len(),
            cache.len(),
            HASH_BYTES
        )));
    }
    let items = (dest.len() / HASH_BYTES) as u64;
    if items == 0 {
        return Ok(());
    }

    let finished = AtomicU64::new(0);
    let reported = AtomicU32::new(0);
    let cancelled = AtomicBool::new(false);

    dest.par_chunks_mut(CHUNK_ITEMS * HASH_BYTES)
        .enumerate()
        .try_for_each(|(chunk, out)| {
            if cancelled.load(Ordering::Relaxed) {
                return Err(EngineError::GenerationCancelled);
            }
            let first = chunk * CHUNK_ITEMS;
            for (offset, slot) in out.chunks_exact_mut(HASH_BYTES).enumerate() {
                put_words(slot, &dataset_item(cache, (first + offset) as u32));
            }

            let count = (out.len() / HASH_BYTES) as u64;
            let done = finished.fetch_add(count, Ordering::Relaxed) + count;
            let percent = (done * 100 / items) as u32;

            let mut last = reported.load(Ordering::Relaxed);
            while percent > last {
                match reported.compare_exchange(last, percent, Ordering::AcqRel, Ordering::Relaxed) {
                    Ok(_) => {
                        if !progress(percent) {
                            cancelled.store(true, Ordering::Relaxed);
                            return Err(EngineError::GenerationCancelled);
                        }
                        break;
                    }
                    Err(current) => last = current,
                }
            }
            Ok(())
        })
}
