// src/resources/mod.rs
//! Per-epoch caches and datasets
//!
//! [`Resources`] hands out shared handles to the cache and dataset of the
//! epoch a block belongs to, generating them on first use. Each kind is kept
//! in a small LRU keyed by epoch; eviction only drops the LRU's reference, so
//! a handle held by a verifier or search worker keeps its buffer alive.
//!
//! Generation runs outside the LRU lock. All callers asking for the same
//! epoch wait on one [`OnceCell`], and a failed generation leaves the cell
//! empty so the next request retries it.

/// Backing memory and dump files
pub mod memory;

use crate::miner::algorithm::cache::generate_cache;
use crate::miner::algorithm::dataset::generate_dataset;
use crate::miner::algorithm::hashimoto::{MixBuffer, mix};
use crate::miner::algorithm::{EPOCH_LENGTH, MAX_EPOCH, sizes};
use crate::stats::{GenerationProgress, Meter, Metrics};
use crate::types::MixResult;
use crate::utils::error::EngineError;
use ethereum_types::H256;
use memory::{Memory, ResourceKind};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Cache size used by the reduced test epochs
pub const TEST_CACHE_BYTES: u64 = 1024;
/// Dataset size used by the reduced test epochs
pub const TEST_DATASET_BYTES: u64 = 32 * 1024;

/// Verification cache of one epoch
pub struct Cache {
    epoch: u64,
    memory: Memory,
    dataset_size: u64,
}

impl Cache {
    /// Epoch this cache belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Cache bytes
    pub fn bytes(&self) -> &[u8] {
        self.memory.bytes()
    }

    /// Size of the dataset this cache expands into
    pub fn dataset_size(&self) -> u64 {
        self.dataset_size
    }

    /// Whether the cache is backed by a mapped file
    pub fn is_mapped(&self) -> bool {
        self.memory.is_mapped()
    }

    /// Light-mode view for the mix function
    pub fn buffer(&self) -> MixBuffer<'_> {
        MixBuffer::Light {
            cache: self.bytes(),
            dataset_size: self.dataset_size,
        }
    }

    /// Runs light-mode hashimoto for one nonce
    pub fn compute(&self, header_hash: &H256, nonce: u64) -> MixResult {
        mix(&self.buffer(), header_hash, nonce)
    }

    /// Hashes consecutive nonces from 0 until `done` is set
    ///
    /// Every attempt is marked on `meter`. Returns the number of hashes.
    pub fn hash_until(&self, header_hash: &H256, done: &AtomicBool, meter: &Meter) -> u64 {
        let mut nonce = 0u64;
        while !done.load(Ordering::Relaxed) {
            std::hint::black_box(self.compute(header_hash, nonce));
            nonce += 1;
            meter.mark(1);
        }
        nonce
    }
}

/// Full mining dataset of one epoch
pub struct Dataset {
    epoch: u64,
    memory: Memory,
}

impl Dataset {
    /// Epoch this dataset belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Dataset bytes
    pub fn bytes(&self) -> &[u8] {
        self.memory.bytes()
    }

    /// Dataset size in bytes
    pub fn size(&self) -> u64 {
        self.bytes().len() as u64
    }

    /// Whether the dataset is backed by a mapped file
    pub fn is_mapped(&self) -> bool {
        self.memory.is_mapped()
    }

    /// Full-mode view for the mix function
    pub fn buffer(&self) -> MixBuffer<'_> {
        MixBuffer::Full(self.bytes())
    }

    /// Runs full-mode hashimoto for one nonce
    pub fn compute(&self, header_hash: &H256, nonce: u64) -> MixResult {
        mix(&self.buffer(), header_hash, nonce)
    }
}

/// Shared reference to a generated cache
pub type CacheHandle = Arc<Cache>;
/// Shared reference to a generated dataset
pub type DatasetHandle = Arc<Dataset>;

/// Storage and retention settings for [`Resources`]
#[derive(Clone, Debug)]
pub struct ResourceConfig {
    /// Directory for cache dumps; `None` keeps caches in memory only
    pub cache_dir: Option<PathBuf>,
    /// Caches kept in memory
    pub caches_in_mem: usize,
    /// Most recent cache dumps kept on disk; 0 disables dumps
    pub caches_on_disk: u64,
    /// Directory for dataset dumps; `None` keeps datasets in memory only
    pub dataset_dir: Option<PathBuf>,
    /// Datasets kept in memory
    pub datasets_in_mem: usize,
    /// Most recent dataset dumps kept on disk; 0 disables dumps
    pub datasets_on_disk: u64,
    /// Blocks before an epoch boundary at which the next epoch is prepared
    pub generate_ahead: u64,
    /// Use the reduced test sizes for every epoch
    pub test_sizes: bool,
}

impl ResourceConfig {
    /// Memory-only settings with reduced sizes
    pub fn test() -> Self {
        ResourceConfig {
            cache_dir: None,
            caches_in_mem: 2,
            caches_on_disk: 0,
            dataset_dir: None,
            datasets_in_mem: 2,
            datasets_on_disk: 0,
            generate_ahead: 0,
            test_sizes: true,
        }
    }
}

struct Slot<T> {
    epoch: u64,
    cell: OnceCell<Arc<T>>,
}

impl<T> Slot<T> {
    fn new(epoch: u64) -> Arc<Self> {
        Arc::new(Slot {
            epoch,
            cell: OnceCell::new(),
        })
    }

    fn get_or_build(
        &self,
        build: impl FnOnce(u64) -> Result<T, EngineError>,
    ) -> Result<Arc<T>, EngineError> {
        self.cell
            .get_or_try_init(|| build(self.epoch).map(Arc::new))
            .cloned()
    }
}

struct EpochLru<T> {
    kind: ResourceKind,
    capacity: usize,
    items: HashMap<u64, Arc<Slot<T>>>,
    order: VecDeque<u64>,
    future: Option<Arc<Slot<T>>>,
}

impl<T> EpochLru<T> {
    fn new(kind: ResourceKind, capacity: usize) -> Self {
        EpochLru {
            kind,
            capacity: capacity.max(1),
            items: HashMap::new(),
            order: VecDeque::new(),
            future: None,
        }
    }

    /// Returns the slot for `epoch`, and a freshly created slot for the
    /// next epoch when `ahead` is set and none exists yet
    fn get(&mut self, epoch: u64, ahead: bool) -> (Arc<Slot<T>>, Option<Arc<Slot<T>>>) {
        let slot = match self.items.get(&epoch) {
            Some(slot) => {
                let slot = Arc::clone(slot);
                self.order.retain(|e| *e != epoch);
                self.order.push_back(epoch);
                slot
            }
            None => {
                let slot = match self.future.take() {
                    Some(future) if future.epoch == epoch => future,
                    other => {
                        self.future = other;
                        Slot::new(epoch)
                    }
                };
                self.insert(epoch, Arc::clone(&slot));
                slot
            }
        };

        let next = epoch + 1;
        let wanted = ahead
            && !self.items.contains_key(&next)
            && self.future.as_ref().is_none_or(|f| f.epoch < next);
        let future = wanted.then(|| {
            let future = Slot::new(next);
            self.future = Some(Arc::clone(&future));
            future
        });
        (slot, future)
    }

    fn insert(&mut self, epoch: u64, slot: Arc<Slot<T>>) {
        self.items.insert(epoch, slot);
        self.order.push_back(epoch);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.items.remove(&evicted);
                log::debug!("Evicted {:?} from memory epoch={}", self.kind, evicted);
            }
        }
    }

    fn epochs(&self) -> Vec<u64> {
        self.order.iter().copied().collect()
    }
}

/// Epoch-indexed cache and dataset manager
pub struct Resources {
    config: ResourceConfig,
    caches: Mutex<EpochLru<Cache>>,
    datasets: Mutex<EpochLru<Dataset>>,
    metrics: Arc<Metrics>,
    shutdown: AtomicBool,
}

impl Resources {
    /// Creates an empty manager
    ///
    /// # Arguments
    /// * `config` - Retention and storage settings
    /// * `metrics` - Receives generation progress
    pub fn new(config: ResourceConfig, metrics: Arc<Metrics>) -> Self {
        Resources {
            caches: Mutex::new(EpochLru::new(ResourceKind::Cache, config.caches_in_mem)),
            datasets: Mutex::new(EpochLru::new(ResourceKind::Dataset, config.datasets_in_mem)),
            config,
            metrics,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Cache for the epoch of `block`, generated or loaded if needed
    ///
    /// # Returns
    /// - `Ok(CacheHandle)` shared with every other caller for that epoch
    /// - `Err(EngineError::GenerationCancelled)` after [`Resources::close`]
    /// - `Err(EngineError::ResourceExhausted)` if memory ran out
    pub fn cache(self: &Arc<Self>, block: u64) -> Result<CacheHandle, EngineError> {
        self.load_cache(sizes::epoch(block), self.wants_next_epoch(block))
    }

    /// Dataset for the epoch of `block`, generated or loaded if needed
    ///
    /// Same return convention as [`Resources::cache`].
    pub fn dataset(self: &Arc<Self>, block: u64) -> Result<DatasetHandle, EngineError> {
        self.load_dataset(sizes::epoch(block), self.wants_next_epoch(block))
    }

    /// Cache of `epoch`, without preparing the next one
    pub fn cache_for_epoch(self: &Arc<Self>, epoch: u64) -> Result<CacheHandle, EngineError> {
        self.load_cache(epoch, false)
    }

    /// Dataset of `epoch`, without preparing the next one
    pub fn dataset_for_epoch(self: &Arc<Self>, epoch: u64) -> Result<DatasetHandle, EngineError> {
        self.load_dataset(epoch, false)
    }

    /// Cancels in-flight generations and refuses new ones
    ///
    /// Handles already generated stay valid.
    pub fn close(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            log::debug!("Resource manager closed");
        }
    }

    /// Epochs with a cache slot in memory, least recently used first
    pub fn cache_epochs(&self) -> Vec<u64> {
        self.caches.lock().epochs()
    }

    /// Epochs with a dataset slot in memory, least recently used first
    pub fn dataset_epochs(&self) -> Vec<u64> {
        self.datasets.lock().epochs()
    }

    /// Cache size in bytes for `epoch` under the current settings
    pub fn cache_size(&self, epoch: u64) -> Result<u64, EngineError> {
        if self.config.test_sizes {
            sizes::check_epoch(epoch).map(|_| TEST_CACHE_BYTES)
        } else {
            sizes::cache_size(epoch)
        }
    }

    /// Dataset size in bytes for `epoch` under the current settings
    pub fn dataset_size(&self, epoch: u64) -> Result<u64, EngineError> {
        if self.config.test_sizes {
            sizes::check_epoch(epoch).map(|_| TEST_DATASET_BYTES)
        } else {
            sizes::dataset_size(epoch)
        }
    }

    fn wants_next_epoch(&self, block: u64) -> bool {
        let ahead = self.config.generate_ahead;
        ahead > 0 && block % EPOCH_LENGTH >= EPOCH_LENGTH.saturating_sub(ahead)
    }

    fn load_cache(self: &Arc<Self>, epoch: u64, ahead: bool) -> Result<CacheHandle, EngineError> {
        let epoch = sizes::check_epoch(epoch)?;
        let (slot, future) = self.caches.lock().get(epoch, ahead && epoch < MAX_EPOCH);
        if let Some(future) = future {
            self.prefetch(ResourceKind::Cache, future.epoch, move |this| {
                future.get_or_build(|e| this.build_cache(e)).map(|_| ())
            });
        }
        slot.get_or_build(|e| self.build_cache(e))
    }

    fn load_dataset(
        self: &Arc<Self>,
        epoch: u64,
        ahead: bool,
    ) -> Result<DatasetHandle, EngineError> {
        let epoch = sizes::check_epoch(epoch)?;
        let (slot, future) = self.datasets.lock().get(epoch, ahead && epoch < MAX_EPOCH);
        if let Some(future) = future {
            self.prefetch(ResourceKind::Dataset, future.epoch, move |this| {
                future.get_or_build(|e| this.build_dataset(e)).map(|_| ())
            });
        }
        slot.get_or_build(|e| self.build_dataset(e))
    }

    fn prefetch(
        self: &Arc<Self>,
        kind: ResourceKind,
        epoch: u64,
        job: impl FnOnce(&Arc<Self>) -> Result<(), EngineError> + Send + 'static,
    ) {
        let this = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("prefetch-{:?}-{}", kind, epoch).to_lowercase())
            .spawn(move || {
                log::debug!("Generating {:?} ahead epoch={}", kind, epoch);
                if let Err(e) = job(&this) {
                    log::debug!("Ahead-of-time {:?} generation failed epoch={}: {}", kind, epoch, e);
                }
            });
        if let Err(e) = spawned {
            log::warn!("Could not start {:?} prefetch for epoch {}: {}", kind, epoch, e);
        }
    }

    /// Directory dumps of `kind` are written to, `None` when kept in memory only
    pub fn persist_dir(&self, kind: ResourceKind) -> Option<&Path> {
        match kind {
            ResourceKind::Cache if self.config.caches_on_disk > 0 => self.config.cache_dir.as_deref(),
            ResourceKind::Dataset if self.config.datasets_on_disk > 0 => {
                self.config.dataset_dir.as_deref()
            }
            _ => None,
        }
    }

    fn keep_on_disk(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Cache => self.config.caches_on_disk,
            ResourceKind::Dataset => self.config.datasets_on_disk,
        }
    }

    fn check_open(&self) -> Result<(), EngineError> {
        if self.shutdown.load(Ordering::Relaxed) {
            Err(EngineError::GenerationCancelled)
        } else {
            Ok(())
        }
    }

    fn publish(&self, kind: ResourceKind, epoch: u64, percent: u32) {
        self.metrics.set_generation(GenerationProgress { kind, epoch, percent });
    }

    fn build_cache(&self, epoch: u64) -> Result<Cache, EngineError> {
        self.check_open()?;
        let size = self.cache_size(epoch)?;
        let seed = sizes::seed_hash(epoch);
        let dataset_size = self.dataset_size(epoch)?;
        let dump = self
            .persist_dir(ResourceKind::Cache)
            .map(|dir| (dir, memory::dump_path(dir, ResourceKind::Cache, &seed)));

        if let Some((_, path)) = &dump {
            match memory::load_heap(path, size) {
                Ok(Some(data)) => {
                    log::debug!("Loaded cache from disk epoch={} path={}", epoch, path.display());
                    return Ok(Cache {
                        epoch,
                        memory: Memory::Heap(data),
                        dataset_size,
                    });
                }
                Ok(None) => {}
                Err(e) => log::warn!("Failed to load cache dump {}: {}", path.display(), e),
            }
        }

        log::info!("Generating cache epoch={} size={}", epoch, size);
        let started = Instant::now();
        self.publish(ResourceKind::Cache, epoch, 0);
        let mut data = memory::allocate(size as usize)?;
        generate_cache(&mut data, &seed, &self.shutdown)?;
        self.publish(ResourceKind::Cache, epoch, 100);
        log::info!("Generated cache epoch={} elapsed={:?}", epoch, started.elapsed());

        if let Some((dir, path)) = &dump {
            let stored = fs::create_dir_all(dir)
                .map_err(EngineError::from_io)
                .and_then(|_| memory::dump_heap(path, &data));
            match stored {
                Ok(()) => self.remove_stale(dir, ResourceKind::Cache, epoch),
                Err(e) => log::warn!("Failed to store cache epoch={}, keeping it in memory only: {}", epoch, e),
            }
        }

        Ok(Cache {
            epoch,
            memory: Memory::Heap(data),
            dataset_size,
        })
    }

    fn build_dataset(self: &Arc<Self>, epoch: u64) -> Result<Dataset, EngineError> {
        self.check_open()?;
        let size = self.dataset_size(epoch)?;
        let seed = sizes::seed_hash(epoch);
        let dump = self
            .persist_dir(ResourceKind::Dataset)
            .map(|dir| (dir, memory::dump_path(dir, ResourceKind::Dataset, &seed)));

        if let Some((_, path)) = &dump {
            match memory::load_mapped(path, size) {
                Ok(Some(memory)) => {
                    log::debug!("Mapped dataset from disk epoch={} path={}", epoch, path.display());
                    return Ok(Dataset { epoch, memory });
                }
                Ok(None) => {}
                Err(e) => log::warn!("Failed to map dataset dump {}: {}", path.display(), e),
            }
        }

        let cache = self.load_cache(epoch, false)?;
        log::info!("Generating dataset epoch={} size={}", epoch, size);
        let started = Instant::now();
        self.publish(ResourceKind::Dataset, epoch, 0);
        let progress = |percent: u32| {
            self.publish(ResourceKind::Dataset, epoch, percent);
            !self.shutdown.load(Ordering::Relaxed)
        };

        let memory = match &dump {
            Some((dir, path)) => {
                let stored = fs::create_dir_all(dir)
                    .map_err(EngineError::from_io)
                    .and_then(|_| {
                        memory::dump_mapped(path, size, |dest| {
                            generate_dataset(dest, cache.bytes(), &progress)
                        })
                    });
                match stored {
                    Ok(memory) => {
                        self.remove_stale(dir, ResourceKind::Dataset, epoch);
                        memory
                    }
                    Err(EngineError::GenerationCancelled) => {
                        return Err(EngineError::GenerationCancelled);
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to store dataset epoch={}, generating in memory instead: {}",
                            epoch,
                            e
                        );
                        self.check_open()?;
                        generate_in_heap(size, cache.bytes(), &progress)?
                    }
                }
            }
            None => generate_in_heap(size, cache.bytes(), &progress)?,
        };
        log::info!("Generated dataset epoch={} elapsed={:?}", epoch, started.elapsed());

        Ok(Dataset { epoch, memory })
    }

    fn remove_stale(&self, dir: &Path, kind: ResourceKind, epoch: u64) {
        memory::remove_stale(dir, kind, epoch, self.keep_on_disk(kind), sizes::seed_hash);
    }
}

fn generate_in_heap(
    size: u64,
    cache: &[u8],
    progress: &(dyn Fn(u32) -> bool + Sync),
) -> Result<Memory, EngineError> {
    let mut data = memory::allocate(size as usize)?;
    generate_dataset(&mut data, cache, progress)?;
    Ok(Memory::Heap(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use std::time::Duration;

    fn manager(config: ResourceConfig) -> Arc<Resources> {
        Arc::new(Resources::new(config, Arc::new(Metrics::new())))
    }

    fn block_of(epoch: u64) -> u64 {
        epoch * EPOCH_LENGTH
    }

    #[test]
    fn epoch_and_block_lookups_share_slots() {
        let resources = manager(ResourceConfig::test());
        let by_block = resources.cache(block_of(1) + 17).unwrap();
        let by_epoch = resources.cache_for_epoch(1).unwrap();
        assert!(Arc::ptr_eq(&by_block, &by_epoch));
        assert_eq!(resources.dataset_for_epoch(1).unwrap().epoch(), 1);
    }

    #[test]
    fn test_sizes_apply_to_every_epoch() {
        let resources = manager(ResourceConfig::test());
        let cache = resources.cache(block_of(3)).unwrap();
        assert_eq!(cache.epoch(), 3);
        assert_eq!(cache.bytes().len() as u64, TEST_CACHE_BYTES);
        assert_eq!(cache.dataset_size(), TEST_DATASET_BYTES);
        assert!(!cache.is_mapped());
    }

    #[test]
    fn least_recently_used_epoch_is_evicted() {
        let resources = manager(ResourceConfig::test());
        let first: Weak<Cache> = Arc::downgrade(&resources.cache(block_of(0)).unwrap());
        resources.cache(block_of(1)).unwrap();
        resources.cache(block_of(2)).unwrap();

        assert_eq!(resources.cache_epochs(), vec![1, 2]);
        assert!(first.upgrade().is_none());
    }

    #[test]
    fn least_recently_used_dataset_is_evicted() {
        let resources = manager(ResourceConfig::test());
        let first: Weak<Dataset> = Arc::downgrade(&resources.dataset(block_of(0)).unwrap());
        let held = resources.dataset(block_of(1)).unwrap();
        resources.dataset(block_of(2)).unwrap();

        assert_eq!(resources.dataset_epochs(), vec![1, 2]);
        assert!(first.upgrade().is_none());

        resources.dataset(block_of(3)).unwrap();
        assert_eq!(resources.dataset_epochs(), vec![2, 3]);
        assert_eq!(held.epoch(), 1);
        assert_eq!(held.size(), TEST_DATASET_BYTES);
    }

    #[test]
    fn epochs_past_the_horizon_create_no_slot() {
        let resources = manager(ResourceConfig::test());
        resources.cache(block_of(0)).unwrap();
        assert!(matches!(
            resources.cache(u64::MAX),
            Err(EngineError::EpochOutOfRange(_))
        ));
        assert!(matches!(
            resources.dataset_for_epoch(MAX_EPOCH + 1),
            Err(EngineError::EpochOutOfRange(_))
        ));
        assert_eq!(resources.cache_epochs(), vec![0]);
        assert!(resources.dataset_epochs().is_empty());
        assert!(resources.cache_for_epoch(MAX_EPOCH).is_ok());
    }

    #[test]
    fn hashing_stops_once_done_is_set() {
        let resources = manager(ResourceConfig::test());
        let cache = resources.cache(block_of(0)).unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let meter = Arc::new(Meter::new());
        let run = {
            let (cache, done, meter) = (Arc::clone(&cache), Arc::clone(&done), Arc::clone(&meter));
            std::thread::spawn(move || cache.hash_until(&H256::zero(), &done, &meter))
        };

        std::thread::sleep(Duration::from_millis(50));
        done.store(true, Ordering::Relaxed);
        let hashes = run.join().unwrap();
        assert!(hashes > 0);
        assert_eq!(meter.count(), hashes);
    }

    #[test]
    fn held_handle_survives_eviction() {
        let resources = manager(ResourceConfig::test());
        let held = resources.cache(block_of(0)).unwrap();
        let expected = held.bytes().to_vec();
        resources.cache(block_of(1)).unwrap();
        resources.cache(block_of(2)).unwrap();

        assert!(!resources.cache_epochs().contains(&0));
        assert_eq!(held.bytes(), &expected[..]);

        let regenerated = resources.cache(block_of(0)).unwrap();
        assert!(!Arc::ptr_eq(&held, &regenerated));
        assert_eq!(regenerated.bytes(), &expected[..]);
    }

    #[test]
    fn recently_used_epoch_is_kept() {
        let resources = manager(ResourceConfig::test());
        resources.cache(block_of(0)).unwrap();
        resources.cache(block_of(1)).unwrap();
        resources.cache(block_of(0)).unwrap();
        resources.cache(block_of(2)).unwrap();
        assert_eq!(resources.cache_epochs(), vec![0, 2]);
    }

    #[test]
    fn concurrent_requests_share_one_generation() {
        let resources = manager(ResourceConfig::test());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resources = Arc::clone(&resources);
                std::thread::spawn(move || resources.dataset(block_of(1)).unwrap())
            })
            .collect();
        let datasets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for dataset in &datasets[1..] {
            assert!(Arc::ptr_eq(&datasets[0], dataset));
        }
        assert_eq!(datasets[0].size(), TEST_DATASET_BYTES);
    }

    #[test]
    fn light_and_full_handles_agree() {
        let resources = manager(ResourceConfig::test());
        let cache = resources.cache(5).unwrap();
        let dataset = resources.dataset(5).unwrap();
        let hash = H256::repeat_byte(0x42);
        for nonce in 0..4 {
            assert_eq!(cache.compute(&hash, nonce), dataset.compute(&hash, nonce));
        }
    }

    #[test]
    fn caches_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResourceConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            caches_on_disk: 2,
            ..ResourceConfig::test()
        };

        let generated = manager(config.clone()).cache(0).unwrap();
        let path = memory::dump_path(dir.path(), ResourceKind::Cache, &sizes::seed_hash(0));
        assert!(path.exists());

        let reloaded = manager(config).cache(0).unwrap();
        assert_eq!(generated.bytes(), reloaded.bytes());
    }

    #[test]
    fn datasets_are_mapped_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResourceConfig {
            dataset_dir: Some(dir.path().to_path_buf()),
            datasets_on_disk: 1,
            ..ResourceConfig::test()
        };

        let generated = manager(config.clone()).dataset(0).unwrap();
        assert!(generated.is_mapped());

        let reloaded = manager(config).dataset(0).unwrap();
        assert!(reloaded.is_mapped());
        assert_eq!(generated.bytes(), reloaded.bytes());
    }

    #[test]
    fn zero_on_disk_keeps_everything_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResourceConfig {
            dataset_dir: Some(dir.path().to_path_buf()),
            datasets_on_disk: 0,
            ..ResourceConfig::test()
        };
        let dataset = manager(config).dataset(0).unwrap();
        assert!(!dataset.is_mapped());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn old_dumps_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResourceConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            caches_on_disk: 1,
            ..ResourceConfig::test()
        };
        let resources = manager(config);
        resources.cache(block_of(0)).unwrap();
        resources.cache(block_of(1)).unwrap();

        let dump = |epoch| memory::dump_path(dir.path(), ResourceKind::Cache, &sizes::seed_hash(epoch));
        assert!(!dump(0).exists());
        assert!(dump(1).exists());
    }

    #[test]
    fn closed_manager_cancels_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResourceConfig {
            dataset_dir: Some(dir.path().to_path_buf()),
            datasets_on_disk: 1,
            ..ResourceConfig::test()
        };
        let resources = manager(config);
        resources.close();

        assert!(matches!(resources.dataset(0), Err(EngineError::GenerationCancelled)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn handles_from_before_close_stay_usable() {
        let resources = manager(ResourceConfig::test());
        let before = resources.cache(0).unwrap();
        resources.close();
        let after = resources.cache(0).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn next_epoch_is_generated_ahead() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResourceConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            caches_on_disk: 3,
            generate_ahead: 100,
            ..ResourceConfig::test()
        };
        let resources = manager(config);
        resources.cache(EPOCH_LENGTH - 50).unwrap();

        let next = memory::dump_path(dir.path(), ResourceKind::Cache, &sizes::seed_hash(1));
        let deadline = Instant::now() + Duration::from_secs(10);
        while !next.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(next.exists());

        // The prepared slot is adopted rather than generated again.
        let cache = resources.cache(EPOCH_LENGTH).unwrap();
        assert_eq!(cache.epoch(), 1);
    }

    #[test]
    fn early_blocks_do_not_prefetch() {
        let config = ResourceConfig {
            generate_ahead: 100,
            ..ResourceConfig::test()
        };
        let mut lru: EpochLru<Cache> = EpochLru::new(ResourceKind::Cache, 2);
        let (_, future) = lru.get(0, false);
        assert!(future.is_none());

        let resources = manager(config);
        assert!(!resources.wants_next_epoch(10));
        assert!(resources.wants_next_epoch(EPOCH_LENGTH - 100));
    }

    #[test]
    fn future_slot_is_created_once() {
        let mut lru: EpochLru<Cache> = EpochLru::new(ResourceKind::Cache, 2);
        let (_, first) = lru.get(0, true);
        assert_eq!(first.map(|s| s.epoch), Some(1));
        let (_, again) = lru.get(0, true);
        assert!(again.is_none());

        let (slot, _) = lru.get(1, false);
        assert!(lru.future.is_none());
        assert_eq!(slot.epoch, 1);
    }

    #[test]
    fn failed_generation_is_retried() {
        let slot: Arc<Slot<u64>> = Slot::new(4);
        let err = slot.get_or_build(|_| Err(EngineError::GenerationCancelled));
        assert!(err.is_err());
        let value = slot.get_or_build(|epoch| Ok(epoch * 10)).unwrap();
        assert_eq!(*value, 40);
    }
}
