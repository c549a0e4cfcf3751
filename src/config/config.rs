// src/config/config.rs
use crate::miner::algorithm::EPOCH_LENGTH;
use crate::resources::ResourceConfig;
use crate::types::ModeKind;
use crate::utils::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the proof-of-work engine
///
/// Covers where caches and datasets are stored, how many of each are kept,
/// the engine mode and the number of local search threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for verification cache dumps (unset = memory only)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Number of recent caches kept in memory
    /// (default: 5)
    #[serde(default = "default_caches_in_mem")]
    pub caches_in_mem: usize,

    /// Number of recent cache dumps kept on disk, 0 disables dumps
    /// (default: 3)
    #[serde(default = "default_caches_on_disk")]
    pub caches_on_disk: u64,

    /// Directory for mining dataset dumps
    /// (default: `$HOME/.eaiash`)
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: Option<PathBuf>,

    /// Number of recent datasets kept in memory
    /// (default: 3)
    #[serde(default = "default_datasets_in_mem")]
    pub datasets_in_mem: usize,

    /// Number of recent dataset dumps kept on disk, 0 disables dumps
    /// (default: 2)
    #[serde(default = "default_datasets_on_disk")]
    pub datasets_on_disk: u64,

    /// Engine mode
    #[serde(default)]
    pub mode: ModeKind,

    /// Local search threads (0 = all logical CPUs, negative = none)
    #[serde(default)]
    pub threads: i32,

    /// Blocks before an epoch boundary at which the next epoch is prepared
    /// (default: 3000, 0 disables)
    #[serde(default = "default_generate_ahead")]
    pub generate_ahead: u64,

    /// Block number rejected in `fake` mode
    #[serde(default)]
    pub fake_fail: Option<u64>,

    /// Verification delay in `fake-delay` mode, in milliseconds
    #[serde(default)]
    pub fake_delay_ms: u64,
}

fn default_caches_in_mem() -> usize {
    5
}

fn default_caches_on_disk() -> u64 {
    3
}

fn default_dataset_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".eaiash"))
}

fn default_datasets_in_mem() -> usize {
    3
}

fn default_datasets_on_disk() -> u64 {
    2
}

fn default_generate_ahead() -> u64 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache_dir: None,
            caches_in_mem: default_caches_in_mem(),
            caches_on_disk: default_caches_on_disk(),
            dataset_dir: default_dataset_dir(),
            datasets_in_mem: default_datasets_in_mem(),
            datasets_on_disk: default_datasets_on_disk(),
            mode: ModeKind::Normal,
            threads: 0,
            generate_ahead: default_generate_ahead(),
            fake_fail: None,
            fake_delay_ms: 0,
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded and validated configuration
    /// * `Err(EngineError)` - If the file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            EngineError::Config(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Default settings with persistence and generate-ahead turned off
    pub fn in_memory() -> Self {
        Config {
            cache_dir: None,
            caches_on_disk: 0,
            dataset_dir: None,
            datasets_on_disk: 0,
            generate_ahead: 0,
            ..Config::default()
        }
    }

    /// Settings for tests: reduced sizes, memory only, one search thread
    pub fn test() -> Self {
        Config {
            cache_dir: None,
            caches_in_mem: 2,
            caches_on_disk: 0,
            dataset_dir: None,
            datasets_in_mem: 2,
            datasets_on_disk: 0,
            mode: ModeKind::Test,
            threads: 1,
            generate_ahead: 0,
            fake_fail: None,
            fake_delay_ms: 0,
        }
    }

    /// Checks values serde cannot express
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.caches_in_mem == 0 {
            return Err(EngineError::Config(
                "caches_in_mem must keep at least one cache".into(),
            ));
        }
        if self.datasets_in_mem == 0 {
            return Err(EngineError::Config(
                "datasets_in_mem must keep at least one dataset".into(),
            ));
        }
        if self.generate_ahead > EPOCH_LENGTH {
            return Err(EngineError::Config(format!(
                "generate_ahead {} exceeds the epoch length {}",
                self.generate_ahead, EPOCH_LENGTH
            )));
        }
        Ok(())
    }

    /// Verification delay for `fake-delay` mode
    pub fn fake_delay(&self) -> Duration {
        Duration::from_millis(self.fake_delay_ms)
    }

    /// Storage and retention settings for the resource manager
    pub fn resource_config(&self) -> ResourceConfig {
        ResourceConfig {
            cache_dir: self.cache_dir.clone(),
            caches_in_mem: self.caches_in_mem,
            caches_on_disk: self.caches_on_disk,
            dataset_dir: self.dataset_dir.clone(),
            datasets_in_mem: self.datasets_in_mem,
            datasets_on_disk: self.datasets_on_disk,
            generate_ahead: self.generate_ahead,
            test_sizes: self.mode == ModeKind::Test,
        }
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template whose
    /// values are the defaults
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Eaiash Proof-of-Work Engine Configuration\n\n");
        template.push_str("# Modes: normal, test, fake, fake-delay, fake-full, shared\n");
        template.push_str("mode = \"normal\"\n");
        template.push_str("# Search threads (0 = all CPUs, negative = no local sealing)\n");
        template.push_str("threads = 0\n\n");

        template.push_str("# Verification caches\n");
        template.push_str("# cache_dir = \"/var/lib/eaiash/caches\"\n");
        template.push_str("caches_in_mem = 5\n");
        template.push_str("caches_on_disk = 3\n\n");

        template.push_str("# Mining datasets (dataset_dir defaults to ~/.eaiash)\n");
        template.push_str("# dataset_dir = \"/var/lib/eaiash/datasets\"\n");
        template.push_str("datasets_in_mem = 3\n");
        template.push_str("datasets_on_disk = 2\n\n");

        template.push_str("# Blocks before an epoch boundary to start on the next epoch\n");
        template.push_str("generate_ahead = 3000\n\n");

        template.push_str("# Fake modes only\n");
        template.push_str("# fake_fail = 1234\n");
        template.push_str("fake_delay_ms = 0\n");

        template
    }
}
