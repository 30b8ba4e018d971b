//! Configuration file support for the anonymous signaling tools.
//!
//! Every field has a default, so a partial (or absent) TOML file is valid.

use crate::enrollment::DEFAULT_MAX_ENROLLMENT_FILE_SIZE;
use crate::merkle::MAX_TREE_DEPTH;
use crate::registry::DEFAULT_ROOT_HISTORY_SIZE;
use crate::types::{ProofLimits, DEFAULT_MAX_SIGNAL_SIZE, DEFAULT_MAX_ZK_PROOF_SIZE};
use crate::TREE_DEPTH;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_MAX_PROOF_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub proof: ProofConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Number of most recent roots (current included) accepted for proofs
    #[serde(default = "default_root_history_size")]
    pub root_history_size: usize,
    #[serde(default)]
    pub commitments_file: Option<PathBuf>,
    #[serde(default = "default_max_enrollment_file_size")]
    pub max_file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofConfig {
    #[serde(default = "default_max_proof_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_zk_proof_size")]
    pub max_zk_proof_size: usize,
    #[serde(default = "default_max_signal_size")]
    pub max_signal_size: usize,
    #[serde(default = "default_proof_output_file")]
    pub output_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_keys_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_enable_persistence")]
    pub enable_persistence: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            depth: TREE_DEPTH,
            root_history_size: DEFAULT_ROOT_HISTORY_SIZE,
            commitments_file: None,
            max_file_size: DEFAULT_MAX_ENROLLMENT_FILE_SIZE,
        }
    }
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_PROOF_FILE_SIZE,
            max_zk_proof_size: DEFAULT_MAX_ZK_PROOF_SIZE,
            max_signal_size: DEFAULT_MAX_SIGNAL_SIZE,
            output_file: default_proof_output_file(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_keys_dir(),
            enable_persistence: true,
        }
    }
}

fn default_depth() -> usize {
    TREE_DEPTH
}

fn default_root_history_size() -> usize {
    DEFAULT_ROOT_HISTORY_SIZE
}

fn default_max_enrollment_file_size() -> u64 {
    DEFAULT_MAX_ENROLLMENT_FILE_SIZE
}

fn default_max_proof_file_size() -> u64 {
    DEFAULT_MAX_PROOF_FILE_SIZE
}

fn default_max_zk_proof_size() -> usize {
    DEFAULT_MAX_ZK_PROOF_SIZE
}

fn default_max_signal_size() -> usize {
    DEFAULT_MAX_SIGNAL_SIZE
}

fn default_proof_output_file() -> PathBuf {
    PathBuf::from("proof.json")
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from(".keys")
}

fn default_enable_persistence() -> bool {
    true
}

impl Config {
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or fails [`Config::validate`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn load_from_file_or_default(path: &Path) -> Self {
        Self::load_from_file(path).unwrap_or_default()
    }

    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// # Errors
    /// Returns an error describing the first out-of-range setting.
    pub fn validate(&self) -> Result<()> {
        if self.group.depth == 0 || self.group.depth > MAX_TREE_DEPTH {
            return Err(anyhow::anyhow!(
                "group.depth must be between 1 and {MAX_TREE_DEPTH}, got {}",
                self.group.depth
            ));
        }
        if self.group.root_history_size == 0 {
            return Err(anyhow::anyhow!("group.root_history_size must be at least 1"));
        }
        if self.group.max_file_size == 0 || self.proof.max_file_size == 0 {
            return Err(anyhow::anyhow!("file size limits must be non-zero"));
        }
        if self.proof.max_zk_proof_size == 0 || self.proof.max_signal_size == 0 {
            return Err(anyhow::anyhow!("proof size limits must be non-zero"));
        }
        Ok(())
    }

    #[must_use]
    pub fn limits(&self) -> ProofLimits {
        ProofLimits {
            max_zk_proof_size: self.proof.max_zk_proof_size,
            max_signal_size: self.proof.max_signal_size,
        }
    }
}
