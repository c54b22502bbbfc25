use log::{debug, warn};

use super::block::Block;
use super::store::{ChainStore, KvEngine};
use crate::error::{ChainError, Result, TraversalError};

/// Backward cursor from a tip hash to genesis.
///
/// A missing block ends the walk like genesis does; callers that must tell
/// the two apart should use `Blockchain::verify`.
pub struct ChainIterator<'a, E> {
    store: &'a ChainStore<E>,
    /// Hash of the next block to yield; empty once exhausted.
    cursor: String,
    /// Block fetched by `has_next` for the current cursor.
    cached: Option<Block>,
}

impl<'a, E: KvEngine> ChainIterator<'a, E> {
    pub fn new(store: &'a ChainStore<E>, tip_hash: String) -> Self {
        Self {
            store,
            cursor: tip_hash,
            cached: None,
        }
    }

    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn has_next(&mut self) -> bool {
        if self.cursor.is_empty() {
            return false;
        }
        if self.cached.is_some() {
            return true;
        }
        match self.store.find_by_hash(&self.cursor) {
            Ok(block) => {
                self.cached = Some(block);
                true
            }
            Err(ChainError::NotFound(_)) => {
                warn!("no block under {}, ending traversal", self.cursor);
                false
            }
            // unreadable but present; next_block reports the error
            Err(e) => {
                debug!("block {} present but unreadable: {}", self.cursor, e);
                true
            }
        }
    }

    /// Yield the block under the cursor and step to its predecessor.
    pub fn next_block(&mut self) -> Result<Block> {
        if self.cursor.is_empty() {
            return Err(ChainError::IteratorExhausted);
        }
        let block = match self.cached.take() {
            Some(block) => block,
            None => match self.store.find_by_hash(&self.cursor) {
                Ok(block) => block,
                Err(ChainError::NotFound(_)) => return Err(ChainError::IteratorExhausted),
                Err(e) => return Err(e),
            },
        };
        self.cursor = block.previous_hash.clone();
        Ok(block)
    }

    /// Drain the walk and return the blocks genesis first. On failure the
    /// error carries the blocks read so far, also oldest first.
    pub fn get_all_blocks(mut self) -> std::result::Result<Vec<Block>, TraversalError> {
        let mut blocks = Vec::new();
        while self.has_next() {
            match self.next_block() {
                Ok(block) => blocks.push(block),
                Err(source) => {
                    blocks.reverse();
                    return Err(TraversalError { blocks, source });
                }
            }
        }
        blocks.reverse();
        Ok(blocks)
    }
}

impl<E: KvEngine> Iterator for ChainIterator<'_, E> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if !self.has_next() {
            return None;
        }
        match self.next_block() {
            Ok(block) => Some(block),
            Err(e) => {
                warn!("stopping traversal at {}: {}", self.cursor, e);
                self.cursor.clear();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::pow::ProofOfWork;
    use crate::blockchain::store::MemoryKv;
    use crate::blockchain::store::testing::FlakyKv;
    use crate::codec::Encode;
    use crate::transaction::Transaction;

    /// Store three linked blocks and return them oldest first.
    fn linked_chain<E: KvEngine>(store: &ChainStore<E>) -> Vec<Block> {
        let pow = ProofOfWork::new(1);
        let mut blocks: Vec<Block> = Vec::new();
        for height in 0..3u32 {
            let prev = blocks.last().map(|b| b.hash.clone()).unwrap_or_default();
            let coinbase = Transaction::coinbase("m", &format!("block {height}")).with_id();
            let mut block = Block::new(vec![coinbase], prev, height);
            block.mine(&pow);
            store.create(&block.hash, &block).unwrap();
            store.update_last(&block).unwrap();
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn walks_tip_to_genesis() {
        let store = ChainStore::new(MemoryKv::new());
        let blocks = linked_chain(&store);
        let tip = blocks[2].hash.clone();

        let mut iter = ChainIterator::new(&store, tip);
        let mut heights = Vec::new();
        while iter.has_next() {
            heights.push(iter.next_block().unwrap().height);
        }
        assert_eq!(heights, vec![2, 1, 0]);
        assert!(iter.cursor().is_empty());
        assert!(matches!(
            iter.next_block(),
            Err(ChainError::IteratorExhausted)
        ));
    }

    #[test]
    fn get_all_blocks_is_chronological() {
        let store = ChainStore::new(MemoryKv::new());
        let blocks = linked_chain(&store);
        let all = ChainIterator::new(&store, blocks[2].hash.clone())
            .get_all_blocks()
            .unwrap();
        assert_eq!(all, blocks);
    }

    #[test]
    fn repeated_has_next_reads_once_and_stays_put() {
        let store = ChainStore::new(MemoryKv::new());
        let blocks = linked_chain(&store);
        let mut iter = ChainIterator::new(&store, blocks[2].hash.clone());
        assert!(iter.has_next());
        assert!(iter.has_next());
        assert_eq!(iter.next_block().unwrap(), blocks[2]);
        assert_eq!(iter.cursor(), blocks[1].hash);
    }

    #[test]
    fn next_without_has_next_still_advances() {
        let store = ChainStore::new(MemoryKv::new());
        let blocks = linked_chain(&store);
        let mut iter = ChainIterator::new(&store, blocks[1].hash.clone());
        assert_eq!(iter.next_block().unwrap(), blocks[1]);
        assert_eq!(iter.next_block().unwrap(), blocks[0]);
        assert!(matches!(
            iter.next_block(),
            Err(ChainError::IteratorExhausted)
        ));
    }

    #[test]
    fn broken_link_ends_walk() {
        let store = ChainStore::new(MemoryKv::new());
        let mut iter = ChainIterator::new(&store, "missing".into());
        assert!(!iter.has_next());
        assert!(matches!(
            iter.next_block(),
            Err(ChainError::IteratorExhausted)
        ));
        assert_eq!(ChainIterator::new(&store, "missing".into()).count(), 0);
    }

    #[test]
    fn corrupt_middle_block_returns_partial_result() {
        let kv = FlakyKv::new();
        let store = ChainStore::new(kv.clone());
        let blocks = linked_chain(&store);

        let bytes = blocks[1].to_bytes();
        kv.poke(&blocks[1].hash, &bytes[..10]);

        let err = ChainIterator::new(&store, blocks[2].hash.clone())
            .get_all_blocks()
            .unwrap_err();
        assert_eq!(err.blocks, vec![blocks[2].clone()]);
        assert!(matches!(err.source, ChainError::CorruptBlock { .. }));

        // the std iterator view just stops
        let seen: Vec<u32> = ChainIterator::new(&store, blocks[2].hash.clone())
            .map(|b| b.height)
            .collect();
        assert_eq!(seen, vec![2]);
    }
}
