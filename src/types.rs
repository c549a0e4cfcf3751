// src/types.rs
use clap::ValueEnum;
use ethereum_types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;

/// Proof-of-work mode selected when the engine is constructed
///
/// Each variant carries only the state it needs; `Shared` points at the
/// engine that owns the real caches and datasets.
#[derive(Clone)]
pub enum PowMode {
    /// Real generation, sealing and verification
    Normal,
    /// Real algorithm on tiny cache/dataset sizes
    Test,
    /// Accept every seal, except a header whose number equals `fail`
    Fake {
        /// Block number that is rejected as invalid
        fail: Option<u64>,
    },
    /// Sleep for the given delay, then accept the seal
    FakeDelay(Duration),
    /// Accept everything without any checks
    FakeFull,
    /// Delegate every call to another engine instance
    Shared(Arc<Engine>),
}

impl PowMode {
    /// Configuration-level name of the mode
    pub fn kind(&self) -> ModeKind {
        match self {
            PowMode::Normal => ModeKind::Normal,
            PowMode::Test => ModeKind::Test,
            PowMode::Fake { .. } => ModeKind::Fake,
            PowMode::FakeDelay(_) => ModeKind::FakeDelay,
            PowMode::FakeFull => ModeKind::FakeFull,
            PowMode::Shared(_) => ModeKind::Shared,
        }
    }

    /// Whether seals are short-circuited instead of searched for
    pub fn is_fake(&self) -> bool {
        matches!(
            self,
            PowMode::Fake { .. } | PowMode::FakeDelay(_) | PowMode::FakeFull
        )
    }
}

impl fmt::Debug for PowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Serializable mode selector used by configuration files and the CLI
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeKind {
    /// See [`PowMode::Normal`]
    #[default]
    #[clap(name = "normal")]
    Normal,
    /// See [`PowMode::Test`]
    #[clap(name = "test")]
    Test,
    /// See [`PowMode::Fake`]
    #[clap(name = "fake")]
    Fake,
    /// See [`PowMode::FakeDelay`]
    #[clap(name = "fake-delay")]
    FakeDelay,
    /// See [`PowMode::FakeFull`]
    #[clap(name = "fake-full")]
    FakeFull,
    /// See [`PowMode::Shared`]
    #[clap(name = "shared")]
    Shared,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeKind::Normal => write!(f, "normal"),
            ModeKind::Test => write!(f, "test"),
            ModeKind::Fake => write!(f, "fake"),
            ModeKind::FakeDelay => write!(f, "fake-delay"),
            ModeKind::FakeFull => write!(f, "fake-full"),
            ModeKind::Shared => write!(f, "shared"),
        }
    }
}

impl FromStr for ModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(ModeKind::Normal),
            "test" => Ok(ModeKind::Test),
            "fake" => Ok(ModeKind::Fake),
            "fake-delay" | "fakedelay" => Ok(ModeKind::FakeDelay),
            "fake-full" | "fullfake" => Ok(ModeKind::FakeFull),
            "shared" => Ok(ModeKind::Shared),
            _ => Err(format!("Unknown pow mode: {}", s)),
        }
    }
}

/// Output of the mixing function for one (buffer, header hash, nonce) triple
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MixResult {
    /// Compressed final mix, stored in the sealed header
    pub mix_digest: H256,
    /// Value compared against the difficulty target
    pub result: H256,
}

/// The parts of a block header the proof-of-work engine needs
///
/// Header encoding and hashing belong to the chain layer; the engine only
/// reads these fields and asks for a resealed copy once a nonce is found.
pub trait PowHeader: Clone + Send + Sync + 'static {
    /// Block number
    fn number(&self) -> u64;
    /// Block difficulty
    fn difficulty(&self) -> U256;
    /// Hash of the header without the nonce and mix digest
    fn hash_no_nonce(&self) -> H256;
    /// Sealed nonce
    fn nonce(&self) -> u64;
    /// Sealed mix digest
    fn mix_digest(&self) -> H256;
    /// Copy of the header carrying the given seal
    fn with_seal(&self, nonce: u64, mix_digest: H256) -> Self;
}

/// Minimal header used by the command line tools and tests
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Block number
    pub number: u64,
    /// Block difficulty
    pub difficulty: U256,
    /// Pre-seal header hash
    pub hash: H256,
    /// Sealed nonce
    pub nonce: u64,
    /// Sealed mix digest
    pub mix_digest: H256,
}

impl Header {
    /// Creates an unsealed header
    pub fn new(number: u64, difficulty: U256, hash: H256) -> Self {
        Header {
            number,
            difficulty,
            hash,
            nonce: 0,
            mix_digest: H256::zero(),
        }
    }
}

impl PowHeader for Header {
    fn number(&self) -> u64 {
        self.number
    }

    fn difficulty(&self) -> U256 {
        self.difficulty
    }

    fn hash_no_nonce(&self) -> H256 {
        self.hash
    }

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn mix_digest(&self) -> H256 {
        self.mix_digest
    }

    fn with_seal(&self, nonce: u64, mix_digest: H256) -> Self {
        Header {
            nonce,
            mix_digest,
            ..self.clone()
        }
    }
}

/// Description of an RPC service exposed by the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RpcDescriptor {
    /// Namespace the service is registered under
    pub namespace: &'static str,
    /// Service version
    pub version: &'static str,
    /// Whether the service is reachable over public transports
    pub public: bool,
}
