//! Block persistence over an opaque key-value engine.
//!
//! Layout:
//!   "LAST"      -> encoded tip block
//!   <hex hash>  -> encoded block, for every block ever created
//!
//! No secondary indexes; traversal follows `previous_hash` links from the tip.

use log::{debug, info};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use super::block::Block;
use crate::codec::{Decode, Encode};
use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::transaction::Transaction;

/// Reserved key holding the tip block.
pub const LAST_KEY: &str = "LAST";

/// Memo carried by the genesis coinbase.
pub const GENESIS_COINBASE_DATA: &str = "Genesis Block";

/// Failure reported by a key-value engine.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl From<sled::Error> for EngineError {
    fn from(err: sled::Error) -> Self {
        EngineError(err.to_string())
    }
}

/// Minimal capability surface the ledger needs from storage.
pub trait KvEngine: Send {
    fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, EngineError>;

    fn set(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), EngineError>;

    /// Every stored entry, in key order.
    fn iterate(&self) -> std::result::Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError>;

    /// Remove everything.
    fn clear(&self) -> std::result::Result<(), EngineError>;
}

type Map = HashMap<Vec<u8>, Vec<u8>>;

/// Volatile engine for tests and throwaway chains.
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: Mutex<Map>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, Map>, EngineError> {
        self.map
            .lock()
            .map_err(|_| EngineError("memory store mutex poisoned".into()))
    }
}

impl KvEngine for MemoryKv {
    fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, EngineError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), EngineError> {
        self.lock()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn iterate(&self) -> std::result::Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        let mut entries: Vec<_> = self
            .lock()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn clear(&self) -> std::result::Result<(), EngineError> {
        self.lock()?.clear();
        Ok(())
    }
}

/// On-disk engine backed by sled.
#[derive(Clone)]
pub struct SledKv {
    db: sled::Db,
}

impl SledKv {
    pub fn open(path: &Path) -> std::result::Result<Self, EngineError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

impl KvEngine for SledKv {
    fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, EngineError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), EngineError> {
        self.db.insert(key, value)?;
        self.db.flush()?;
        Ok(())
    }

    fn iterate(&self) -> std::result::Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        self.db
            .iter()
            .map(|entry| -> std::result::Result<_, EngineError> {
                let (k, v) = entry?;
                Ok((k.to_vec(), v.to_vec()))
            })
            .collect()
    }

    fn clear(&self) -> std::result::Result<(), EngineError> {
        self.db.clear()?;
        self.db.flush()?;
        Ok(())
    }
}

/// Thin adapter turning engine bytes into blocks and back.
pub struct ChainStore<E> {
    engine: E,
}

impl<E: KvEngine> ChainStore<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Write `block` under `key` (normally its own hash). Does not move the tip.
    pub fn create(&self, key: &str, block: &Block) -> Result<()> {
        self.write(key, block)
    }

    pub fn find_by_hash(&self, hash: &str) -> Result<Block> {
        self.read(hash)
    }

    pub fn find_last(&self) -> Result<Block> {
        self.read(LAST_KEY)
    }

    /// Overwrite the tip key with `block`.
    pub fn update_last(&self, block: &Block) -> Result<()> {
        self.write(LAST_KEY, block)
    }

    /// Return the tip, or mine and persist a genesis block when the store is
    /// fresh. Genesis is written under its own hash and then as the tip.
    pub fn find_last_or_create(&self, config: &ChainConfig) -> Result<Block> {
        match self.find_last() {
            Ok(last) => Ok(last),
            Err(ChainError::NotFound(_)) => {
                info!("no tip found, creating genesis block");
                let coinbase =
                    Transaction::block_reward(&config.reward_address, GENESIS_COINBASE_DATA, 0)
                        .with_id();
                let genesis = Block::genesis(coinbase, &config.pow());
                self.create(&genesis.hash, &genesis)?;
                self.update_last(&genesis)?;
                info!("genesis block {} persisted", genesis.hash);
                Ok(genesis)
            }
            Err(e) => Err(e),
        }
    }

    pub fn contains(&self, hash: &str) -> Result<bool> {
        self.engine
            .get(hash.as_bytes())
            .map(|v| v.is_some())
            .map_err(|e| ChainError::StoreRead {
                key: hash.to_string(),
                reason: e.to_string(),
            })
    }

    /// Forward iteration over raw entries, tip key included.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.engine.iterate().map_err(|e| ChainError::StoreRead {
            key: "*".into(),
            reason: e.to_string(),
        })
    }

    /// Remove every block and the tip.
    pub fn clear(&self) -> Result<()> {
        self.engine.clear().map_err(|e| ChainError::StoreWrite {
            key: "*".into(),
            reason: e.to_string(),
        })
    }

    fn read(&self, key: &str) -> Result<Block> {
        let bytes = self
            .engine
            .get(key.as_bytes())
            .map_err(|e| ChainError::StoreRead {
                key: key.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| ChainError::NotFound(key.to_string()))?;
        debug!("read {} bytes under {}", bytes.len(), key);
        Block::from_bytes(&bytes).map_err(|source| ChainError::CorruptBlock {
            key: key.to_string(),
            source,
        })
    }

    fn write(&self, key: &str, block: &Block) -> Result<()> {
        let bytes = block.to_bytes();
        self.engine
            .set(key.as_bytes(), &bytes)
            .map_err(|e| ChainError::StoreWrite {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        debug!("wrote {} bytes under {}", bytes.len(), key);
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Memory engine that can be told to reject writes to the tip key.
    #[derive(Default, Clone)]
    pub struct FlakyKv {
        inner: Arc<MemoryKv>,
        fail_tip_writes: Arc<AtomicBool>,
    }

    impl FlakyKv {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_tip_writes(&self, fail: bool) {
            self.fail_tip_writes.store(fail, Ordering::SeqCst);
        }

        /// Overwrite raw bytes behind the engine's back.
        pub fn poke(&self, key: &str, value: &[u8]) {
            self.inner.set(key.as_bytes(), value).unwrap();
        }

        pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
            self.inner.get(key.as_bytes()).unwrap()
        }
    }

    impl KvEngine for FlakyKv {
        fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, EngineError> {
            self.inner.get(key)
        }

        fn set(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), EngineError> {
            if key == LAST_KEY.as_bytes() && self.fail_tip_writes.load(Ordering::SeqCst) {
                return Err(EngineError("injected tip write failure".into()));
            }
            self.inner.set(key, value)
        }

        fn iterate(&self) -> std::result::Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
            self.inner.iterate()
        }

        fn clear(&self) -> std::result::Result<(), EngineError> {
            self.inner.clear()
        }
    }
}
