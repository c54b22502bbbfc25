use log::{info, warn};

use super::Block;
use super::iterator::ChainIterator;
use super::store::{ChainStore, KvEngine};
use crate::config::ChainConfig;
use crate::error::{ChainError, Result, TraversalError};
use crate::transaction::{Transaction, UtxoSet, find_unspent};

/// Persistent proof-of-work chain. Holds only the tip hash; every block
/// lives in the store.
///
/// One writer at a time: concurrent `append` calls against the same store
/// must be excluded by the caller.
pub struct Blockchain<E> {
    store: ChainStore<E>,
    current_hash: String,
    config: ChainConfig,
}

impl<E: KvEngine> Blockchain<E> {
    /// Open a chain over `store`, creating genesis if the store is empty.
    pub fn open(store: ChainStore<E>, config: ChainConfig) -> Result<Self> {
        let tip = store.find_last_or_create(&config)?;
        info!("chain opened at height {} (tip {})", tip.height, tip.hash);
        Ok(Self {
            store,
            current_hash: tip.hash,
            config,
        })
    }

    pub fn current_hash(&self) -> &str {
        &self.current_hash
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Mine and append a block holding a height-stamped coinbase that
    /// carries `data`.
    pub fn append(&mut self, data: &str) -> Result<Block> {
        let mut block = self.draft(data)?;
        block.mine(&self.config.pow());
        self.commit(block)
    }

    /// Mine and append a block holding `transactions`.
    pub fn append_transactions(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        let mut block = self.draft_transactions(transactions)?;
        block.mine(&self.config.pow());
        self.commit(block)
    }

    /// Unmined successor of the stored tip with a reward carrying `data`.
    pub fn draft(&self, data: &str) -> Result<Block> {
        let prev = self.store.find_last_or_create(&self.config)?;
        let height = prev.height + 1;
        let coinbase = Transaction::block_reward(&self.config.reward_address, data, height);
        Ok(Block::new(vec![coinbase.with_id()], prev.hash, height))
    }

    /// Unmined successor of the stored tip holding `transactions`.
    pub fn draft_transactions(&self, transactions: Vec<Transaction>) -> Result<Block> {
        if transactions.is_empty() {
            return Err(ChainError::InvalidBlock(
                "a block needs at least one transaction".into(),
            ));
        }
        let prev = self.store.find_last_or_create(&self.config)?;
        Ok(Block::new(transactions, prev.hash, prev.height + 1))
    }

    /// Persist a mined draft and make it the tip.
    ///
    /// The block is written under its hash first and the tip second. If only
    /// the second write fails the error is `TipUpdateInconsistency`; pass its
    /// block to [`Blockchain::retry_tip_update`] instead of mining again.
    pub fn commit(&mut self, block: Block) -> Result<Block> {
        let prev = self.store.find_last()?;
        if block.previous_hash != prev.hash || block.height != prev.height + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "block {} does not extend tip {} at height {}",
                block.hash, prev.hash, prev.height
            )));
        }
        if !block.is_valid(&self.config.pow()) {
            return Err(ChainError::InvalidBlock(format!(
                "block {} fails proof-of-work",
                block.hash
            )));
        }

        self.store.create(&block.hash, &block)?;
        if let Err(e) = self.store.update_last(&block) {
            warn!(
                "block {} stored but tip still at {}: {}",
                block.hash, prev.hash, e
            );
            return Err(ChainError::TipUpdateInconsistency {
                hash: block.hash.clone(),
                block: Box::new(block),
                source: Box::new(e),
            });
        }

        self.current_hash = block.hash.clone();
        info!(
            "appended block #{} (hash={}, nonce={})",
            block.height, block.hash, block.nonce
        );
        Ok(block)
    }

    /// Second half of an append whose tip write failed. The block must
    /// already be stored under its own hash.
    pub fn retry_tip_update(&mut self, block: &Block) -> Result<()> {
        if !self.store.contains(&block.hash)? {
            return Err(ChainError::NotFound(block.hash.clone()));
        }
        self.store.update_last(block)?;
        self.current_hash = block.hash.clone();
        info!("tip moved to {} after retry", block.hash);
        Ok(())
    }

    pub fn iter(&self) -> ChainIterator<'_, E> {
        ChainIterator::new(&self.store, self.current_hash.clone())
    }

    /// Every reachable block, genesis first.
    pub fn all_blocks(&self) -> std::result::Result<Vec<Block>, TraversalError> {
        self.iter().get_all_blocks()
    }

    pub fn find_last(&self) -> Result<Block> {
        self.store.find_last()
    }

    pub fn find_by_hash(&self, hash: &str) -> Result<Block> {
        self.store.find_by_hash(hash)
    }

    pub fn height(&self) -> Result<u32> {
        Ok(self.find_last()?.height)
    }

    /// Unspent outputs across the whole chain.
    pub fn find_unspent(&self) -> Result<UtxoSet> {
        find_unspent(self.iter())
    }

    /// Transactions paying to or spending from `address`, newest first.
    pub fn history(&self, address: &str) -> Result<Vec<Transaction>> {
        let mut iter = self.iter();
        let mut found = Vec::new();
        while iter.has_next() {
            let block = iter.next_block()?;
            found.extend(
                block
                    .transactions
                    .into_iter()
                    .rev()
                    .filter(|t| t.involves(address)),
            );
        }
        Ok(found)
    }

    /// Audit the whole chain: hashes, proof-of-work, heights and linkage
    /// down to a genesis block. Unlike traversal, a dangling link is an error.
    pub fn verify(&self) -> Result<usize> {
        let pow = self.config.pow();
        let mut iter = self.iter();
        let mut expected_hash = self.current_hash.clone();
        let mut expected_height: Option<u32> = None;
        let mut count = 0usize;

        while !expected_hash.is_empty() {
            let block = match iter.next_block() {
                Ok(block) => block,
                Err(ChainError::IteratorExhausted) => {
                    return Err(ChainError::InvalidBlock(format!(
                        "chain broken: {expected_hash} is not stored"
                    )));
                }
                Err(e) => return Err(e),
            };

            if block.hash != expected_hash {
                return Err(ChainError::InvalidBlock(format!(
                    "block stored under {expected_hash} reports hash {}",
                    block.hash
                )));
            }
            if !block.is_valid(&pow) {
                return Err(ChainError::InvalidBlock(format!(
                    "block {} fails proof-of-work",
                    block.hash
                )));
            }
            if let Some(h) = expected_height {
                if block.height != h {
                    return Err(ChainError::InvalidBlock(format!(
                        "block {} has height {}, expected {h}",
                        block.hash, block.height
                    )));
                }
            }
            if block.is_genesis() && block.height != 0 {
                return Err(ChainError::InvalidBlock(format!(
                    "unlinked block {} at height {}",
                    block.hash, block.height
                )));
            }
            if !block.is_genesis() && block.height == 0 {
                return Err(ChainError::InvalidBlock(format!(
                    "block {} at height 0 links to {}",
                    block.hash, block.previous_hash
                )));
            }

            expected_height = block.height.checked_sub(1);
            expected_hash = block.previous_hash;
            count += 1;
        }
        Ok(count)
    }
}
