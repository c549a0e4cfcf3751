// src/cli/commands.rs
use crate::types::ModeKind;
use crate::utils::error::EngineError;
use clap::{Parser, Subcommand};
use ethereum_types::{H256, U256};
use std::path::PathBuf;

/// Eaiash CLI - memory-hard proof-of-work engine tools
#[derive(Parser, Debug)]
#[command(name = "eaiash")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Generate the verification cache for a block's epoch into a directory
    Makecache(GenerateOptions),

    /// Generate the mining dataset for a block's epoch into a directory
    Makedag(GenerateOptions),

    /// Seal a synthetic header and print the nonce and mix digest
    Seal(SealOptions),

    /// Verify the seal of a header
    Verify(VerifyOptions),

    /// Measure light-mode hashing speed
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options shared by the generation commands
#[derive(Parser, Debug)]
pub struct GenerateOptions {
    /// Block number whose epoch is generated
    pub block: u64,

    /// Output directory
    pub dir: PathBuf,

    /// Use the reduced test sizes
    #[arg(long)]
    pub test: bool,
}

/// Engine selection shared by the seal and verify commands
#[derive(Parser, Debug)]
pub struct EngineOptions {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Engine mode (overrides config)
    #[arg(short, long)]
    pub mode: Option<ModeKind>,
}

/// Options for sealing a synthetic header
#[derive(Parser, Debug)]
pub struct SealOptions {
    /// Engine selection
    #[command(flatten)]
    pub engine: EngineOptions,

    /// Number of search threads (overrides config)
    #[arg(short, long, allow_negative_numbers = true)]
    pub threads: Option<i32>,

    /// Block number
    #[arg(short, long, default_value_t = 0)]
    pub number: u64,

    /// Block difficulty (decimal)
    #[arg(short, long, default_value = "100000", value_parser = parse_u256)]
    pub difficulty: U256,

    /// Header hash without nonce (hex, random when omitted)
    #[arg(long, value_parser = parse_h256)]
    pub hash: Option<H256>,

    /// Give up after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Options for verifying a sealed header
#[derive(Parser, Debug)]
pub struct VerifyOptions {
    /// Engine selection
    #[command(flatten)]
    pub engine: EngineOptions,

    /// Block number
    #[arg(short, long)]
    pub number: u64,

    /// Block difficulty (decimal)
    #[arg(short, long, value_parser = parse_u256)]
    pub difficulty: U256,

    /// Header hash without nonce (hex)
    #[arg(long, value_parser = parse_h256)]
    pub hash: H256,

    /// Sealed nonce
    #[arg(long)]
    pub nonce: u64,

    /// Sealed mix digest (hex)
    #[arg(long, value_parser = parse_h256)]
    pub mix_digest: H256,
}

/// Options for running the hashing benchmark
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Block number whose epoch is benchmarked
    #[arg(short, long, default_value_t = 0)]
    pub block: u64,

    /// Duration of benchmark in seconds
    #[arg(short, long, default_value_t = 10)]
    pub duration: u64,

    /// Number of threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Use the reduced test sizes
    #[arg(long)]
    pub test: bool,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "eaiash.toml")]
    pub output: PathBuf,
}

/// Parses a 32-byte hex value, with or without `0x`
pub fn parse_h256(s: &str) -> Result<H256, EngineError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits)?;
    if bytes.len() != 32 {
        return Err(EngineError::Input(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(H256::from_slice(&bytes))
}

/// Parses a decimal 256-bit integer
pub fn parse_u256(s: &str) -> Result<U256, EngineError> {
    U256::from_dec_str(s).map_err(|e| EngineError::Input(format!("bad integer {}: {:?}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_parse_with_and_without_prefix() {
        let plain = parse_h256(&"ab".repeat(32)).unwrap();
        let prefixed = parse_h256(&format!("0x{}", "ab".repeat(32))).unwrap();
        assert_eq!(plain, H256::repeat_byte(0xab));
        assert_eq!(plain, prefixed);
        assert!(matches!(parse_h256("abcd"), Err(EngineError::Input(_))));
        assert!(matches!(parse_h256("zz"), Err(EngineError::Input(_))));
    }

    #[test]
    fn difficulty_parses_decimal() {
        assert_eq!(parse_u256("1000").unwrap(), U256::from(1000));
        assert!(parse_u256("-1").is_err());
    }

    #[test]
    fn seal_command_line() {
        let cli = Commands::try_parse_from([
            "eaiash", "seal", "--mode", "test", "--threads", "-1", "--difficulty", "50",
        ])
        .unwrap();
        match cli.action {
            Action::Seal(opts) => {
                assert_eq!(opts.engine.mode, Some(ModeKind::Test));
                assert_eq!(opts.threads, Some(-1));
                assert_eq!(opts.difficulty, U256::from(50));
                assert!(opts.hash.is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn makedag_takes_block_and_dir() {
        let cli = Commands::try_parse_from(["eaiash", "makedag", "30000", "/tmp/dag", "--test"]).unwrap();
        match cli.action {
            Action::Makedag(opts) => {
                assert_eq!(opts.block, 30_000);
                assert_eq!(opts.dir, PathBuf::from("/tmp/dag"));
                assert!(opts.test);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }
}
