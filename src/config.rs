//! Configuration for the ledger binary and chain instances.
//!
//! Values come from the environment (optionally seeded by a `.env` file).

use std::env;
use std::path::PathBuf;

use crate::blockchain::ProofOfWork;
use crate::error::{ChainError, Result};

/// Default Proof-of-Work difficulty (number of leading zeros).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Difficulties above this take minutes to hours per block.
pub const MAX_DIFFICULTY: u32 = 8;

pub const DEFAULT_DATA_DIR: &str = "./data/blocks";
pub const DEFAULT_REWARD_ADDRESS: &str = "genesis";

/// Per-chain settings, passed to every chain instance explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub difficulty: u32,
    /// Lock script for coinbase outputs minted by this chain.
    pub reward_address: String,
}

impl ChainConfig {
    pub fn new(difficulty: u32, reward_address: &str) -> Self {
        Self {
            difficulty,
            reward_address: reward_address.to_string(),
        }
    }

    pub fn pow(&self) -> ProofOfWork {
        ProofOfWork::new(self.difficulty)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY, DEFAULT_REWARD_ADDRESS)
    }
}

/// Process-level settings for the `block` binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub chain: ChainConfig,
}

impl Config {
    /// Read the process environment. `main` loads `.env` beforehand.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("BLOCK_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        if data_dir.trim().is_empty() {
            return Err(ChainError::Config("BLOCK_DATA_DIR must not be empty".into()));
        }

        let difficulty = match lookup("BLOCK_DIFFICULTY") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                ChainError::Config(format!("BLOCK_DIFFICULTY is not a number: {raw:?}"))
            })?,
            None => DEFAULT_DIFFICULTY,
        };
        if difficulty > MAX_DIFFICULTY {
            return Err(ChainError::Config(format!(
                "BLOCK_DIFFICULTY {difficulty} exceeds maximum {MAX_DIFFICULTY}"
            )));
        }

        let reward_address =
            lookup("BLOCK_REWARD_ADDRESS").unwrap_or_else(|| DEFAULT_REWARD_ADDRESS.to_string());

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port: u16 = lookup("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            host,
            port,
            chain: ChainConfig {
                difficulty,
                reward_address,
            },
        })
    }
}
