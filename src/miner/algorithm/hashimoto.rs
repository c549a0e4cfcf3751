// src/miner/algorithm/hashimoto.rs
//! Hashimoto mixing function
//!
//! Binds a header hash and nonce to `ACCESSES` pseudo-random reads of the
//! dataset. Mining reads the materialized dataset ([`MixBuffer::Full`]);
//! verification recomputes only the touched items from the cache
//! ([`MixBuffer::Light`]). Both produce the same [`MixResult`].

use super::dataset::dataset_item;
use super::{
    ACCESSES, HASH_BYTES, HASH_WORDS, ItemSource, MIX_BYTES, MIX_WORDS, fnv, fnv_hash, keccak256,
    keccak512, put_words, row_words,
};
use crate::types::MixResult;
use ethereum_types::H256;

/// Buffer the mix function reads dataset items from
#[derive(Clone, Copy, Debug)]
pub enum MixBuffer<'a> {
    /// Cache plus the size of the dataset it stands in for
    Light {
        /// Completed cache bytes
        cache: &'a [u8],
        /// Size of the virtual dataset in bytes
        dataset_size: u64,
    },
    /// Fully materialized dataset bytes
    Full(&'a [u8]),
}

impl MixBuffer<'_> {
    /// Whether items are read from a materialized dataset
    pub fn is_full(&self) -> bool {
        matches!(self, MixBuffer::Full(_))
    }
}

impl ItemSource for MixBuffer<'_> {
    fn dataset_size(&self) -> u64 {
        match self {
            MixBuffer::Light { dataset_size, .. } => *dataset_size,
            MixBuffer::Full(dataset) => dataset.len() as u64,
        }
    }

    fn item(&self, index: u32) -> [u32; HASH_WORDS] {
        match self {
            MixBuffer::Light { cache, .. } => dataset_item(cache, index),
            MixBuffer::Full(dataset) => {
                let start = index as usize * HASH_BYTES;
                row_words(&dataset[start..start + HASH_BYTES])
            }
        }
    }
}

/// Runs hashimoto over `source` for one nonce
pub fn hashimoto<S: ItemSource + ?Sized>(source: &S, header_hash: &H256, nonce: u64) -> MixResult {
    let rows = (source.dataset_size() / MIX_BYTES as u64) as u32;

    let mut seed_input = [0u8; 40];
    seed_input[..32].copy_from_slice(header_hash.as_bytes());
    seed_input[32..].copy_from_slice(&nonce.to_le_bytes());
    let seed = keccak512(&seed_input);
    let seed_words = row_words(&seed);
    let seed_head = seed_words[0];

    let mut mix = [0u32; MIX_WORDS];
    for (i, word) in mix.iter_mut().enumerate() {
        *word = seed_words[i % HASH_WORDS];
    }

    let items_per_mix = (MIX_BYTES / HASH_BYTES) as u32;
    let mut temp = [0u32; MIX_WORDS];
    for access in 0..ACCESSES {
        let parent = fnv(access ^ seed_head, mix[access as usize % MIX_WORDS]) % rows;
        for j in 0..items_per_mix {
            let start = j as usize * HASH_WORDS;
            temp[start..start + HASH_WORDS].copy_from_slice(&source.item(items_per_mix * parent + j));
        }
        fnv_hash(&mut mix, &temp);
    }

    let mut compressed = [0u32; MIX_WORDS / 4];
    for (out, lane) in compressed.iter_mut().zip(mix.chunks_exact(4)) {
        *out = fnv(fnv(fnv(lane[0], lane[1]), lane[2]), lane[3]);
    }
    let mut digest = [0u8; 32];
    put_words(&mut digest, &compressed);

    let mut result_input = [0u8; HASH_BYTES + 32];
    result_input[..HASH_BYTES].copy_from_slice(&seed);
    result_input[HASH_BYTES..].copy_from_slice(&digest);

    MixResult {
        mix_digest: H256::from(digest),
        result: H256::from(keccak256(&result_input)),
    }
}

/// Entry point taking either buffer kind
pub fn mix(buffer: &MixBuffer<'_>, header_hash: &H256, nonce: u64) -> MixResult {
    hashimoto(buffer, header_hash, nonce)
}

/// Light-mode hashimoto: recomputes dataset items from `cache`
pub fn hashimoto_light(dataset_size: u64, cache: &[u8], header_hash: &H256, nonce: u64) -> MixResult {
    hashimoto(&MixBuffer::Light { cache, dataset_size }, header_hash, nonce)
}

/// Full-mode hashimoto over a materialized dataset
pub fn hashimoto_full(dataset: &[u8], header_hash: &H256, nonce: u64) -> MixResult {
    hashimoto(&MixBuffer::Full(dataset), header_hash, nonce)
}
