// src/utils/logging.rs
//! Logging configuration
//!
//! The library only emits `log` records; binaries pick the backend. The
//! `eaiash` tool uses `env_logger` with a compact single-line format.

use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;

/// Initializes logging for the command line tool
///
/// Logs to stdout at Info unless `RUST_LOG` overrides the filter.
pub fn init_logging() {
    init_with_default(LevelFilter::Info);
}

/// Initializes logging for benchmarks, defaulting to Debug
///
/// Debug level shows per-epoch generation timings and cache evictions.
pub fn init_bench_logging() {
    init_with_default(LevelFilter::Debug);
}

fn init_with_default(level: LevelFilter) {
    let mut builder = common_log_config();

    if env::var("RUST_LOG").is_err() {
        builder.filter_level(level);
    } else {
        builder.parse_env("RUST_LOG");
    }

    // A second init (tests, embedding) keeps the first logger.
    let _ = builder.try_init();
}

/// Base builder: `[ts level module:line] message` on stdout
fn common_log_config() -> Builder {
    let mut builder = Builder::new();

    builder
        .format(|buf, record| {
            use std::io::Write;
            let ts = buf.timestamp_seconds();
            let level = record.level();
            let module = record.module_path().unwrap_or_default();
            let line = record.line().unwrap_or(0);

            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                ts,
                level,
                module,
                line,
                record.args()
            )
        })
        .target(Target::Stdout);

    builder
}
