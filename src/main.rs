// src/main.rs
use clap::Parser;
use eaiash::cli::{self, Action};
use eaiash::stats::{Meter, StatsReporter};
use eaiash::types::{Header, ModeKind, PowHeader};
use eaiash::utils::{EngineError, init_bench_logging, init_logging};
use eaiash::{Config, Engine, config};
use ethereum_types::H256;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Main entry point for the eaiash tool
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(EngineError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), EngineError> {
    let cli = cli::Commands::parse();

    match cli.action {
        Action::Makecache(opts) => make_cache(opts),
        Action::Makedag(opts) => make_dataset(opts),
        Action::Seal(opts) => seal_header(opts),
        Action::Verify(opts) => verify_header(opts),
        Action::Benchmark(opts) => run_benchmark(opts),
        Action::Config(opts) => generate_config(opts),
    }
}

/// Memory-only settings for the one-shot tools
fn generation_config(test: bool) -> Config {
    Config {
        mode: if test { ModeKind::Test } else { ModeKind::Normal },
        ..Config::in_memory()
    }
}

/// Generates the verification cache for a block's epoch
///
/// # Arguments
/// * `opts` - Block number, output directory and size selection
fn make_cache(opts: cli::GenerateOptions) -> Result<(), EngineError> {
    init_logging();

    let config = Config {
        cache_dir: Some(opts.dir),
        caches_on_disk: u64::MAX,
        ..generation_config(opts.test)
    };
    let engine = Engine::new(config)?;
    let cache = engine.cache(opts.block)?;
    log::info!(
        "Cache ready epoch={} size={}",
        cache.epoch(),
        cache.bytes().len()
    );
    Ok(())
}

/// Generates the mining dataset for a block's epoch
///
/// # Arguments
/// * `opts` - Block number, output directory and size selection
fn make_dataset(opts: cli::GenerateOptions) -> Result<(), EngineError> {
    init_logging();

    let config = Config {
        dataset_dir: Some(opts.dir),
        datasets_on_disk: u64::MAX,
        ..generation_config(opts.test)
    };
    let engine = Engine::new(config)?;
    let mut reporter = StatsReporter::new(engine.metrics(), Duration::from_secs(10));
    reporter.start_reporting();

    let dataset = engine.dataset(opts.block)?;
    log::info!(
        "Dataset ready epoch={} size={}",
        dataset.epoch(),
        dataset.size()
    );
    Ok(())
}

/// Builds an engine from an optional config file and mode override
fn load_engine(opts: &cli::EngineOptions, threads: Option<i32>) -> Result<Engine, EngineError> {
    let mut config = match &opts.config {
        Some(path) => config::load(path.clone())?,
        None => Config::default(),
    };
    // Apply CLI overrides
    if let Some(mode) = opts.mode {
        config.mode = mode;
    }
    if let Some(threads) = threads {
        config.threads = threads;
    }
    Engine::new(config)
}

/// Seals a synthetic header and prints the result
///
/// # Arguments
/// * `opts` - Engine selection, header fields and an optional timeout
fn seal_header(opts: cli::SealOptions) -> Result<(), EngineError> {
    init_logging();

    let engine = load_engine(&opts.engine, opts.threads)?;
    let hash = opts
        .hash
        .unwrap_or_else(|| H256::from(rand::random::<[u8; 32]>()));
    let header = Header::new(opts.number, opts.difficulty, hash);

    let mut reporter = StatsReporter::new(engine.metrics(), Duration::from_secs(5));
    reporter.start_reporting();

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    // Dropping the sender fires the stop signal.
    let _stop = match opts.timeout {
        Some(timeout) => {
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_secs(timeout));
                drop(stop_tx);
            });
            None
        }
        None => Some(stop_tx),
    };

    log::info!(
        "Sealing header number={} difficulty={} hash={:?}",
        header.number,
        header.difficulty,
        header.hash
    );
    let started = Instant::now();
    match engine.seal(&header, &stop_rx)? {
        Some(sealed) => {
            log::info!("Sealed in {:.2?}", started.elapsed());
            println!("hash       {:?}", sealed.hash_no_nonce());
            println!("nonce      {}", sealed.nonce());
            println!("mix_digest {:?}", sealed.mix_digest());
        }
        None => log::warn!("No seal found before timeout"),
    }
    engine.close();
    Ok(())
}

/// Verifies a sealed header given on the command line
///
/// # Arguments
/// * `opts` - Engine selection and every header field
fn verify_header(opts: cli::VerifyOptions) -> Result<(), EngineError> {
    init_logging();

    let engine = load_engine(&opts.engine, None)?;
    let header = Header::new(opts.number, opts.difficulty, opts.hash).with_seal(opts.nonce, opts.mix_digest);

    engine.verify_seal(&header)?;
    println!("valid");
    Ok(())
}

/// Runs the light-mode hashing benchmark
///
/// # Arguments
/// * `opts` - Benchmark configuration options
///
/// # Operations
/// 1. Initializes benchmark-specific logging
/// 2. Generates or loads the cache for the requested epoch
/// 3. Spawns worker threads hashing consecutive nonces
/// 4. Reports the overall hashrate
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), EngineError> {
    init_bench_logging();

    let engine = Engine::new(generation_config(opts.test))?;
    let cache = engine.cache(opts.block)?;
    let meter = Arc::new(Meter::new());
    let done = Arc::new(AtomicBool::new(false));

    log::info!(
        "Starting light-mode benchmark epoch={} threads={} for {} seconds",
        cache.epoch(),
        opts.threads,
        opts.duration
    );

    let started = Instant::now();
    let handles: Vec<_> = (0..opts.threads)
        .map(|thread| {
            let cache = Arc::clone(&cache);
            let meter = Arc::clone(&meter);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let hash = H256::from_low_u64_be(thread as u64);
                let hashes = cache.hash_until(&hash, &done, &meter);
                log::debug!("Thread {}: {} hashes", thread, hashes);
            })
        })
        .collect();

    std::thread::sleep(Duration::from_secs(opts.duration));
    done.store(true, Ordering::Relaxed);
    for handle in handles {
        if handle.join().is_err() {
            log::error!("Benchmark thread panicked");
        }
    }

    // Report final results
    let elapsed = started.elapsed().as_secs_f64();
    log::info!("Benchmark results:");
    log::info!("Total hashes: {}", meter.count());
    log::info!("Average hashrate: {:.2} H/s", meter.count() as f64 / elapsed);
    log::logger().flush(); // Ensure final results appear

    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), EngineError> {
    init_logging();

    std::fs::write(&opts.output, config::generate_template())?;
    log::info!("Wrote configuration template to {}", opts.output.display());
    Ok(())
}
