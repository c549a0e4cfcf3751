// src/utils/error.rs
use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Main error type for the proof-of-work engine
///
/// Verification failures are returned for the specific header and never
/// abort the node. Generation failures delay sealing and are retried on the
/// next request for the same epoch.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The proof-of-work result exceeds the difficulty target
    #[error("invalid proof-of-work")]
    InvalidPow,

    /// The recomputed mix digest differs from the one in the header
    #[error("invalid mix digest")]
    InvalidMixDigest,

    /// The header carries a zero difficulty
    #[error("non-positive difficulty")]
    InvalidDifficulty,

    /// The block number maps to an epoch past the supported horizon
    #[error("epoch {0} out of range")]
    EpochOutOfRange(u64),

    /// Cache or dataset generation was aborted before completion
    #[error("generation cancelled")]
    GenerationCancelled,

    /// Memory or disk could not be allocated for a cache or dataset
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    Input(String),
}

impl EngineError {
    /// Maps I/O failures caused by a full disk or exhausted memory to
    /// [`EngineError::ResourceExhausted`], leaving other errors untouched
    pub fn from_io(err: io::Error) -> Self {
        let exhausted = matches!(
            err.kind(),
            io::ErrorKind::StorageFull | io::ErrorKind::OutOfMemory
        ) || matches!(err.raw_os_error(), Some(libc::ENOSPC) | Some(libc::ENOMEM));

        if exhausted {
            EngineError::ResourceExhausted(err.to_string())
        } else {
            EngineError::Io(err)
        }
    }
}

/// Converts failed buffer reservations into `ResourceExhausted`
impl From<TryReserveError> for EngineError {
    fn from(e: TryReserveError) -> Self {
        EngineError::ResourceExhausted(format!("buffer allocation failed: {}", e))
    }
}

/// Converts hex decoding errors into `Input` errors
///
/// Used when parsing header hashes and digests given on the command line.
impl From<hex::FromHexError> for EngineError {
    fn from(e: hex::FromHexError) -> Self {
        EngineError::Input(format!("Hex conversion failed: {}", e))
    }
}

/// Converts TOML parse failures into `Config` errors
impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(format!("Invalid config format: {}", e))
    }
}
