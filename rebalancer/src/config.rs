//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};

use balancebot::coordinator::EngineConfig;
use balancebot::delta::DeltaConfig;
use balancebot::group::GroupStrategy;
use balancebot::search::SearchConfig;
use log::info;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchSection,
    pub delta: DeltaSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_trials_per_delta")]
    pub trials_per_delta: usize,
    #[serde(default = "default_trials_per_exchange")]
    pub trials_per_exchange: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Size of the rayon pool; `None` uses one thread per core.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub strict_liquidity: bool,
}

fn default_trials_per_delta() -> usize {
    50
}
fn default_trials_per_exchange() -> usize {
    200
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            trials_per_delta: default_trials_per_delta(),
            trials_per_exchange: default_trials_per_exchange(),
            seed: None,
            threads: None,
            strict_liquidity: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeltaSection {
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold_pct: f64,
    #[serde(default)]
    pub group_strategy: GroupStrategy,
}

fn default_noise_threshold() -> f64 {
    1.0
}

impl Default for DeltaSection {
    fn default() -> Self {
        Self {
            noise_threshold_pct: default_noise_threshold(),
            group_strategy: GroupStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        let s = &self.search;
        if s.trials_per_delta == 0 {
            return Err(Error::Config("trials_per_delta must be >= 1".into()));
        }
        if s.threads == Some(0) {
            return Err(Error::Config("threads must be >= 1".into()));
        }
        let t = self.delta.noise_threshold_pct;
        if !(0.0..100.0).contains(&t) {
            return Err(Error::Config(
                "noise_threshold_pct must be in [0, 100)".into(),
            ));
        }
        Ok(())
    }

    /// Engine settings, with an optional seed override from the command line.
    pub fn engine_config(&self, seed_override: Option<u64>) -> EngineConfig {
        EngineConfig {
            delta: DeltaConfig {
                noise_threshold_pct: self.delta.noise_threshold_pct,
                group_strategy: self.delta.group_strategy,
            },
            search: SearchConfig {
                trials_per_delta: self.search.trials_per_delta,
                trials_per_exchange: self.search.trials_per_exchange,
                seed: seed_override.or(self.search.seed),
                strict_liquidity: self.search.strict_liquidity,
            },
        }
    }

    /// Size the global rayon pool. Must run before the first search.
    pub fn init_thread_pool(&self) -> Result<()> {
        if let Some(n) = self.search.threads {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build_global()
                .map_err(|e| Error::Config(format!("thread pool: {e}")))?;
        }
        Ok(())
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
