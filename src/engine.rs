// src/engine.rs
//! Proof-of-work engine
//!
//! Ties the resource manager, the seal scheduler and the metrics together
//! behind the operations a node's consensus layer calls: verify a header's
//! seal, search for a seal, and tune the number of search threads.
//!
//! Behaviour depends on the [`PowMode`] fixed at construction. Fake modes
//! never touch caches or datasets, and a shared engine forwards every call
//! to the process-wide instance returned by [`Engine::shared`].

use crate::config::Config;
use crate::miner::algorithm::{difficulty_target, meets_target};
use crate::miner::{Scheduler, SearchTarget};
use crate::resources::{CacheHandle, DatasetHandle, Resources};
use crate::stats::Metrics;
use crate::types::{ModeKind, PowHeader, PowMode, RpcDescriptor};
use crate::utils::error::EngineError;
use crossbeam_channel::Receiver;
use ethereum_types::H256;
use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    static ref SHARED: Arc<Engine> = Arc::new(Engine::with_mode(PowMode::Normal, Config::in_memory()));
}

/// Namespace the engine's RPC service is registered under
pub const RPC_NAMESPACE: &str = "eaiash";

/// Interface the consensus layer drives a sealing engine through
pub trait ConsensusEngine<H: PowHeader> {
    /// Checks that the header's nonce and mix digest satisfy its difficulty
    fn verify_header(&self, header: &H) -> Result<(), EngineError>;

    /// Searches for a seal, returning the sealed header or `None` once
    /// `stop` fires
    fn seal(&self, header: &H, stop: &Receiver<()>) -> Result<Option<H>, EngineError>;

    /// Changes the number of local search threads
    fn set_threads(&self, threads: i32);

    /// RPC services exposed by the engine
    fn apis(&self) -> Vec<RpcDescriptor>;
}

/// Memory-hard proof-of-work engine
pub struct Engine {
    mode: PowMode,
    resources: Arc<Resources>,
    scheduler: Scheduler,
    metrics: Arc<Metrics>,
}

impl Engine {
    /// Creates an engine from configuration
    ///
    /// # Returns
    /// - `Ok(Engine)` running in the configured mode
    /// - `Err(EngineError::Config)` if the configuration is invalid
    pub fn new(config: Config) -> Result<Self, EngineError> {
        config.validate()?;
        let mode = match config.mode {
            ModeKind::Normal => PowMode::Normal,
            ModeKind::Test => PowMode::Test,
            ModeKind::Fake => PowMode::Fake {
                fail: config.fake_fail,
            },
            ModeKind::FakeDelay => PowMode::FakeDelay(config.fake_delay()),
            ModeKind::FakeFull => PowMode::FakeFull,
            ModeKind::Shared => PowMode::Shared(Engine::shared()),
        };
        Ok(Self::with_mode(mode, config))
    }

    /// Creates an engine in an explicit mode
    ///
    /// `config.mode` is ignored; test sizes follow `mode`.
    pub fn with_mode(mode: PowMode, config: Config) -> Self {
        match &mode {
            PowMode::Normal => {}
            PowMode::Test => log::info!("Engine running in test mode with reduced sizes"),
            PowMode::Shared(_) => log::info!("Engine delegating to the shared instance"),
            fake => log::warn!("Engine running in {} mode, seals are not checked", fake.kind()),
        }

        let metrics = Arc::new(Metrics::new());
        let mut resource_config = config.resource_config();
        resource_config.test_sizes = matches!(mode, PowMode::Test);

        Engine {
            resources: Arc::new(Resources::new(resource_config, Arc::clone(&metrics))),
            scheduler: Scheduler::new(config.threads, Arc::clone(&metrics)),
            metrics,
            mode,
        }
    }

    /// Process-wide memory-only engine, created on first use
    pub fn shared() -> Arc<Engine> {
        Arc::clone(&SHARED)
    }

    /// Mode the engine was created with
    pub fn mode(&self) -> &PowMode {
        &self.mode
    }

    /// Counters for observability tooling
    pub fn metrics(&self) -> &Arc<Metrics> {
        match &self.mode {
            PowMode::Shared(shared) => shared.metrics(),
            _ => &self.metrics,
        }
    }

    /// Verifies a header's seal against its difficulty
    ///
    /// Runs the mix function in light mode, so only the cache of the
    /// header's epoch is needed.
    ///
    /// # Returns
    /// - `Ok(())` if the seal is valid
    /// - `Err(EngineError::InvalidDifficulty)` for a zero difficulty
    /// - `Err(EngineError::InvalidMixDigest)` if the digest does not match
    /// - `Err(EngineError::InvalidPow)` if the result exceeds the target
    pub fn verify_seal<H: PowHeader>(&self, header: &H) -> Result<(), EngineError> {
        match &self.mode {
            PowMode::FakeFull => return Ok(()),
            PowMode::Fake { fail } => {
                return if *fail == Some(header.number()) {
                    Err(EngineError::InvalidPow)
                } else {
                    Ok(())
                };
            }
            PowMode::FakeDelay(delay) => {
                std::thread::sleep(*delay);
                return Ok(());
            }
            PowMode::Shared(shared) => return shared.verify_seal(header),
            PowMode::Normal | PowMode::Test => {}
        }

        let target = difficulty_target(header.difficulty())?;
        let cache = self.resources.cache(header.number())?;
        let outcome = cache.compute(&header.hash_no_nonce(), header.nonce());

        if outcome.mix_digest != header.mix_digest() {
            return Err(EngineError::InvalidMixDigest);
        }
        if !meets_target(&outcome.result, &target) {
            return Err(EngineError::InvalidPow);
        }
        Ok(())
    }

    /// Searches for a nonce sealing `header`
    ///
    /// # Arguments
    /// * `header` - Unsealed header
    /// * `stop` - Fires (message or disconnect) to abandon the search
    ///
    /// # Returns
    /// - `Ok(Some(header))` carrying the winning nonce and mix digest
    /// - `Ok(None)` once `stop` fired
    /// - `Err(EngineError)` if the difficulty is invalid or the dataset
    ///   could not be generated
    pub fn seal<H: PowHeader>(&self, header: &H, stop: &Receiver<()>) -> Result<Option<H>, EngineError> {
        match &self.mode {
            PowMode::Fake { .. } | PowMode::FakeDelay(_) | PowMode::FakeFull => {
                return Ok(Some(header.with_seal(0, H256::zero())));
            }
            PowMode::Shared(shared) => return shared.seal(header, stop),
            PowMode::Normal | PowMode::Test => {}
        }

        let job = SearchTarget {
            header_hash: header.hash_no_nonce(),
            target: difficulty_target(header.difficulty())?,
        };
        let dataset = self.resources.dataset(header.number())?;
        let sealed = self
            .scheduler
            .seal(&dataset, job, stop)
            .map(|solution| header.with_seal(solution.nonce, solution.mix_digest));
        if sealed.is_some() {
            log::debug!("Sealed header number={}", header.number());
        }
        Ok(sealed)
    }

    /// Changes the number of search threads
    ///
    /// 0 uses every logical CPU and a negative value disables local search.
    /// A running seal restarts with the new count.
    pub fn set_threads(&self, threads: i32) {
        match &self.mode {
            PowMode::Shared(shared) => shared.set_threads(threads),
            _ => self.scheduler.set_threads(threads),
        }
    }

    /// Requested number of search threads
    pub fn threads(&self) -> i32 {
        match &self.mode {
            PowMode::Shared(shared) => shared.threads(),
            _ => self.scheduler.threads(),
        }
    }

    /// One-minute average of local search hashes per second
    pub fn hashrate(&self) -> f64 {
        self.metrics().hashrate.rate1()
    }

    /// RPC services exposed by the engine
    pub fn apis(&self) -> Vec<RpcDescriptor> {
        vec![RpcDescriptor {
            namespace: RPC_NAMESPACE,
            version: "1.0",
            public: true,
        }]
    }

    /// Cancels in-flight cache and dataset generation
    ///
    /// A delegating engine leaves the shared instance running.
    pub fn close(&self) {
        self.resources.close();
    }

    /// Verification cache for the epoch of `block`
    pub fn cache(&self, block: u64) -> Result<CacheHandle, EngineError> {
        match &self.mode {
            PowMode::Shared(shared) => shared.cache(block),
            _ => self.resources.cache(block),
        }
    }

    /// Mining dataset for the epoch of `block`
    pub fn dataset(&self, block: u64) -> Result<DatasetHandle, EngineError> {
        match &self.mode {
            PowMode::Shared(shared) => shared.dataset(block),
            _ => self.resources.dataset(block),
        }
    }
}

impl<H: PowHeader> ConsensusEngine<H> for Engine {
    fn verify_header(&self, header: &H) -> Result<(), EngineError> {
        self.verify_seal(header)
    }

    fn seal(&self, header: &H, stop: &Receiver<()>) -> Result<Option<H>, EngineError> {
        Engine::seal(self, header, stop)
    }

    fn set_threads(&self, threads: i32) {
        Engine::set_threads(self, threads)
    }

    fn apis(&self) -> Vec<RpcDescriptor> {
        Engine::apis(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::memory::ResourceKind;
    use crate::types::Header;
    use ethereum_types::U256;
    use std::time::{Duration, Instant};

    fn test_engine(threads: i32) -> Arc<Engine> {
        let config = Config {
            threads,
            ..Config::test()
        };
        Arc::new(Engine::new(config).unwrap())
    }

    fn header(number: u64, difficulty: u64) -> Header {
        Header::new(number, U256::from(difficulty), H256::repeat_byte(0x33))
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            if Instant::now() > deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    #[test]
    fn sealed_header_verifies() {
        let engine = test_engine(4);
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let sealed = engine.seal(&header(10, 100), &stop_rx).unwrap().unwrap();
        assert_eq!(sealed.number, 10);
        assert!(engine.verify_seal(&sealed).is_ok());
        assert_eq!(engine.metrics().active_workers(), 0);
    }

    #[test]
    fn stop_yields_no_seal() {
        let engine = test_engine(4);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let search = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.seal(&header(1, u64::MAX), &stop_rx))
        };

        assert!(wait_for(|| engine.metrics().active_workers() == 4));
        drop(stop_tx);
        assert_eq!(search.join().unwrap().unwrap(), None);
        assert_eq!(engine.metrics().active_workers(), 0);
    }

    #[test]
    fn set_threads_restarts_running_seal() {
        let engine = test_engine(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let search = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.seal(&header(1, u64::MAX), &stop_rx))
        };

        assert!(wait_for(|| engine.metrics().active_workers() == 1));
        ConsensusEngine::<Header>::set_threads(&*engine, 2);
        assert_eq!(engine.threads(), 2);
        assert!(wait_for(|| engine.metrics().active_workers() == 2));

        drop(stop_tx);
        assert_eq!(search.join().unwrap().unwrap(), None);
    }

    #[test]
    fn unit_difficulty_accepts_any_nonce() {
        let engine = test_engine(1);
        let mut header = header(3, 1);
        header.nonce = 12345;
        header.mix_digest = engine.cache(3).unwrap().compute(&header.hash, header.nonce).mix_digest;
        assert!(engine.verify_header(&header).is_ok());
    }

    #[test]
    fn wrong_digest_and_hard_target_are_rejected() {
        let engine = test_engine(2);
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let sealed = engine.seal(&header(0, 20), &stop_rx).unwrap().unwrap();

        let tampered = Header {
            mix_digest: H256::repeat_byte(0xee),
            ..sealed.clone()
        };
        assert!(matches!(engine.verify_seal(&tampered), Err(EngineError::InvalidMixDigest)));

        let harder = Header {
            difficulty: U256::MAX,
            ..sealed.clone()
        };
        assert!(matches!(engine.verify_seal(&harder), Err(EngineError::InvalidPow)));

        let zero = Header {
            difficulty: U256::zero(),
            ..sealed
        };
        assert!(matches!(engine.verify_seal(&zero), Err(EngineError::InvalidDifficulty)));
    }

    #[test]
    fn out_of_range_block_is_rejected_without_touching_the_lru() {
        let engine = Engine::new(Config::in_memory()).unwrap();
        let sealed = header(u64::MAX, 1000).with_seal(7, H256::repeat_byte(0x11));

        assert!(matches!(engine.verify_seal(&sealed), Err(EngineError::EpochOutOfRange(_))));
        assert!(engine.resources.cache_epochs().is_empty());

        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        assert!(matches!(
            engine.seal(&header(u64::MAX, 1000), &stop_rx),
            Err(EngineError::EpochOutOfRange(_))
        ));
        assert!(engine.resources.dataset_epochs().is_empty());
    }

    #[test]
    fn shared_engine_keeps_everything_in_memory() {
        let shared = Engine::shared();
        assert!(matches!(shared.mode(), PowMode::Normal));
        assert!(shared.resources.persist_dir(ResourceKind::Cache).is_none());
        assert!(shared.resources.persist_dir(ResourceKind::Dataset).is_none());
    }

    #[test]
    fn fake_mode_fails_only_the_configured_block() {
        let engine = Engine::with_mode(PowMode::Fake { fail: Some(5) }, Config::test());
        assert!(matches!(engine.verify_seal(&header(5, 1)), Err(EngineError::InvalidPow)));
        assert!(engine.verify_seal(&header(6, 1)).is_ok());

        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let sealed = engine.seal(&header(5, u64::MAX), &stop_rx).unwrap().unwrap();
        assert_eq!(sealed.nonce, 0);
        assert_eq!(sealed.mix_digest, H256::zero());
        assert!(engine.resources.cache_epochs().is_empty());
    }

    #[test]
    fn fake_delay_waits_before_accepting() {
        let engine = Engine::with_mode(PowMode::FakeDelay(Duration::from_millis(30)), Config::test());
        let started = Instant::now();
        assert!(engine.verify_seal(&header(1, 0)).is_ok());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn full_fake_accepts_anything() {
        let engine = Engine::with_mode(PowMode::FakeFull, Config::test());
        assert!(engine.verify_seal(&header(9, 0)).is_ok());
    }

    #[test]
    fn shared_mode_delegates_everything() {
        let backing = Arc::new(Engine::with_mode(PowMode::Test, Config::test()));
        let engine = Engine::with_mode(PowMode::Shared(Arc::clone(&backing)), Config::test());
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let sealed = engine.seal(&header(2, 10), &stop_rx).unwrap().unwrap();
        assert!(engine.verify_seal(&sealed).is_ok());
        assert!(backing.verify_seal(&sealed).is_ok());
        assert_eq!(backing.resources.cache_epochs(), vec![0]);
        assert!(engine.resources.cache_epochs().is_empty());

        engine.set_threads(3);
        assert_eq!(backing.threads(), 3);
        assert!(Arc::ptr_eq(engine.metrics(), backing.metrics()));
    }

    #[test]
    fn closed_engine_cannot_generate() {
        let engine = test_engine(1);
        engine.close();
        assert!(matches!(
            engine.verify_seal(&header(0, 1)),
            Err(EngineError::GenerationCancelled)
        ));
    }

    #[test]
    fn apis_describe_public_namespace() {
        let engine = test_engine(1);
        let apis = ConsensusEngine::<Header>::apis(&*engine);
        assert_eq!(
            apis,
            vec![RpcDescriptor {
                namespace: "eaiash",
                version: "1.0",
                public: true
            }]
        );
    }

    #[test]
    fn configured_modes_map_to_variants() {
        let config = Config {
            mode: ModeKind::Fake,
            fake_fail: Some(8),
            ..Config::test()
        };
        let engine = Engine::new(config).unwrap();
        assert!(matches!(engine.mode(), PowMode::Fake { fail: Some(8) }));

        let invalid = Config {
            datasets_in_mem: 0,
            ..Config::test()
        };
        assert!(Engine::new(invalid).is_err());
    }
}
